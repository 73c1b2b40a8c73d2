use std::fmt;

use thiserror::Error;

/// Pipeline phase a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Preprocess,
    Index,
    Unlink,
    Classify,
    Split,
    Merge,
    Prune,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Preprocess => "preprocess",
            Self::Index => "index",
            Self::Unlink => "unlink",
            Self::Classify => "classify",
            Self::Split => "split",
            Self::Merge => "merge",
            Self::Prune => "prune",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum CleanError {
    #[error("no usable line features in input ({skipped} skipped)")]
    NoUsableInput { skipped: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("coordinate {value} cannot be snapped to {precision} decimal places")]
    Unsnappable { value: f64, precision: u32 },
    #[error("{phase} phase failed: {message}")]
    Internal {
        phase: Phase,
        message: String,
        trace: String,
    },
}

impl CleanError {
    pub(crate) fn internal(phase: Phase, message: impl Into<String>) -> Self {
        CleanError::Internal {
            phase,
            message: message.into(),
            trace: std::backtrace::Backtrace::capture().to_string(),
        }
    }
}

/// Run one phase, turning a panic inside it into [`CleanError::Internal`].
pub(crate) fn guarded<T>(
    phase: Phase,
    f: impl FnOnce() -> Result<T, CleanError>,
) -> Result<T, CleanError> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(CleanError::internal(phase, message))
        }
    }
}
