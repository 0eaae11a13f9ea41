//! Run Configuration
//!
//! Both configs are plain serde structs so that a front end can fill them
//! from flags or from a file.

use crate::error::{TraceError, TraceResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Hard ceiling on race-prediction workers
pub const MAX_WORKERS: usize = 64;

/// Race prediction settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Log every pair decision
    pub verbose: bool,
    /// Write one witness file per confirmed race
    pub witness: bool,
    /// Directory receiving witness files
    pub output_dir: PathBuf,
    /// Worker count; hardware concurrency when unset
    pub threads: Option<usize>,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            witness: false,
            output_dir: PathBuf::from("witness"),
            threads: None,
        }
    }
}

impl PredictorConfig {
    /// Reject an explicit worker count of zero
    pub fn validate(&self) -> TraceResult<()> {
        if self.threads == Some(0) {
            return Err(TraceError::InvalidConfig(
                "worker thread count must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Number of workers for `candidates` pairs
    ///
    /// An explicit count is honoured as given; otherwise hardware concurrency
    /// capped at [`MAX_WORKERS`]. Never more workers than pairs, never fewer
    /// than one while there is work.
    pub fn worker_count(&self, candidates: usize) -> usize {
        if candidates == 0 {
            return 0;
        }

        let wanted = self.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map_or(MAX_WORKERS, |n| n.get())
                .min(MAX_WORKERS)
        });
        wanted.min(candidates).max(1)
    }
}

/// Windowed SC verification settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Events per window
    pub window_size: usize,
    /// Report per-window diagnostics at info level
    pub verbose: bool,
    /// Estimate the search cost of every window before verifying it
    pub estimate: bool,
    /// Seed of the estimator; drawn from the OS when unset
    pub seed: Option<u64>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_size: 2,
            verbose: false,
            estimate: false,
            seed: None,
        }
    }
}

impl WindowConfig {
    /// Reject an empty window
    pub fn validate(&self) -> TraceResult<()> {
        if self.window_size == 0 {
            return Err(TraceError::InvalidConfig(
                "window size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
