use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CleanError;
use crate::geometry::MAX_PRECISION;

/// Default number of decimal places vertices are snapped to.
pub const DEFAULT_PRECISION: u32 = 6;

/// Features classified per parallel batch between cancellation checks.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// Settings for one cleaning run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerConfig {
    /// Decimal places kept when snapping vertices.
    pub precision: u32,
    /// Collect per-feature error records.
    pub collect_errors: bool,
    /// Suppress crossings marked by unlink points.
    pub resolve_unlinks: bool,
    /// Distance within which an unlink marker touches a line; 0 means exact.
    pub unlink_tolerance: f64,
    /// Trim dangling end pieces shorter than this share of their line.
    pub stub_ratio: Option<f64>,
    pub batch_size: usize,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
            collect_errors: false,
            resolve_unlinks: false,
            unlink_tolerance: 0.0,
            stub_ratio: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl CleanerConfig {
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&data)?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), CleanError> {
        if self.precision > MAX_PRECISION {
            return Err(CleanError::InvalidConfig(format!(
                "precision {} exceeds {}",
                self.precision, MAX_PRECISION
            )));
        }
        if !self.unlink_tolerance.is_finite() || self.unlink_tolerance < 0.0 {
            return Err(CleanError::InvalidConfig(format!(
                "unlink tolerance {} must be a non-negative number",
                self.unlink_tolerance
            )));
        }
        if let Some(r) = self.stub_ratio {
            if !(r > 0.0 && r < 1.0) {
                return Err(CleanError::InvalidConfig(format!(
                    "stub ratio {} must lie strictly between 0 and 1",
                    r
                )));
            }
        }
        if self.batch_size == 0 {
            return Err(CleanError::InvalidConfig("batch size must be positive".into()));
        }
        Ok(())
    }
}
