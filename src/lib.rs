//! Topology cleaning for line networks.
//!
//! Lines are snapped to a fixed precision, classified against their
//! neighbours, split at every connection, merged through pass-through
//! vertices and finally stripped of isolated edges.

pub mod breakage;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod feature;
pub mod geometry;
pub mod index;
pub mod input;
pub mod io;
pub mod line_merge;
pub mod pipeline;
pub mod progress;
pub mod prune;
pub mod split;
pub mod unlink;

pub use config::CleanerConfig;
pub use error::CleanError;
pub use pipeline::{CleanReport, CleanStats, NetworkCleaner, RunOutcome};
pub use progress::{CancellationToken, ProgressSink};
