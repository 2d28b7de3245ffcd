mod error;
pub mod report;
pub mod runner;

pub use error::HarnessError;
pub use report::{FailureKind, FinalCheck, RunReport, TraceEntry, WorkerFailure, WorkerReport};
pub use runner::{run_config, Harness, RunOptions};
