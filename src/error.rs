use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The hosting runtime refused a worker-pool adjustment the gated
    /// parallel mode depends on. This is the one loading-adjacent failure
    /// that aborts the run instead of degrading it.
    #[error("Runtime tuning error: {0}")]
    RuntimeTuning(String),

    #[error("Failed to read plan {path}: {source}")]
    PlanRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse plan {path}: {reason}")]
    PlanParse { path: PathBuf, reason: String },

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
