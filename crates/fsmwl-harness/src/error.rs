use fsmwl_config::ConfigError;
use fsmwl_core::{TransitionError, WorkloadError};

/// Errors that stop a run before it can produce a report.
///
/// Failures inside worker states are not errors at this level; they are
/// collected into the [`crate::RunReport`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HarnessError {
    #[error("Invalid transition table for workload '{workload}': {source}")]
    InvalidTransitions {
        workload: String,
        #[source]
        source: TransitionError,
    },

    #[error("Setup failed: {0}")]
    Setup(#[source] WorkloadError),

    #[error("Worker task did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Workload(#[from] WorkloadError),
}
