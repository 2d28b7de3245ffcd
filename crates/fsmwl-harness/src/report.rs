use std::collections::BTreeMap;
use std::error::Error;

use fsmwl_core::{AssertLevel, CollectionScope, StoreError, Topology, WorkloadError};
use fsmwl_store::is_injected_fault;
use serde::Serialize;
use serde_json::Value;

/// A single state execution captured when tracing is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    pub tid: usize,
    pub iteration: usize,
    pub state: String,
    /// `"ok"`, or the error the state returned.
    pub outcome: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A check inside a state did not hold.
    Assertion,
    /// The store returned an error.
    Store,
    /// The worker could not continue for another reason.
    Other,
}

/// Why a worker stopped early.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerFailure {
    pub tid: usize,
    pub iteration: usize,
    pub state: String,
    pub kind: FailureKind,
    /// Level of the failed check, for assertion failures.
    pub level: Option<AssertLevel>,
    pub message: String,
    /// The error was produced by fault injection rather than the store.
    pub injected: bool,
}

impl WorkerFailure {
    pub fn from_error(tid: usize, iteration: usize, state: &str, err: &WorkloadError) -> Self {
        let (kind, level) = match err {
            WorkloadError::Assertion(failure) => (FailureKind::Assertion, Some(failure.level)),
            WorkloadError::Store(_) => (FailureKind::Store, None),
            _ => (FailureKind::Other, None),
        };
        let message = err.to_string();
        let injected = match err {
            WorkloadError::Store(store_err) => is_injected_fault(&store_error_chain(store_err)),
            _ => false,
        };
        WorkerFailure {
            tid,
            iteration,
            state: state.to_string(),
            kind,
            level,
            message,
            injected,
        }
    }

    pub fn other(tid: usize, iteration: usize, state: &str, message: impl Into<String>) -> Self {
        WorkerFailure {
            tid,
            iteration,
            state: state.to_string(),
            kind: FailureKind::Other,
            level: None,
            message: message.into(),
            injected: false,
        }
    }
}

fn store_error_chain(err: &StoreError) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// Outcome of the whole-run consistency check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum FinalCheck {
    Passed,
    Failed(String),
    /// Not run because a worker failed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerReport {
    pub tid: usize,
    pub iterations_run: usize,
    pub state_counts: BTreeMap<String, usize>,
    /// Workload-specific view of the worker's local state.
    pub summary: Value,
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub workload: String,
    pub collection: String,
    pub seed: u64,
    pub thread_count: usize,
    pub iterations: usize,
    pub topology: Topology,
    pub scope: CollectionScope,
    /// RFC 3339 timestamp.
    pub started_at: String,
    pub duration_ms: u64,
    pub workers: Vec<WorkerReport>,
    pub failures: Vec<WorkerFailure>,
    pub final_check: FinalCheck,
    /// Store counters, when the store exposes any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_stats: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<TraceEntry>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty() && self.final_check == FinalCheck::Passed
    }

    /// Total state executions across all workers.
    pub fn total_iterations(&self) -> usize {
        self.workers.iter().map(|w| w.iterations_run).sum()
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// One-line human summary.
    pub fn summary_line(&self) -> String {
        let status = if self.passed() { "PASSED" } else { "FAILED" };
        format!(
            "{} {}: {} workers, {} state executions, {} failures, final check {} ({} ms)",
            self.workload,
            status,
            self.thread_count,
            self.total_iterations(),
            self.failures.len(),
            match &self.final_check {
                FinalCheck::Passed => "passed",
                FinalCheck::Failed(_) => "failed",
                FinalCheck::Skipped => "skipped",
            },
            self.duration_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsmwl_core::AssertionFailure;
    use fsmwl_store::FAULT_PREFIX;

    fn report(failures: Vec<WorkerFailure>, final_check: FinalCheck) -> RunReport {
        RunReport {
            workload: "update_inc".to_string(),
            collection: "update_inc".to_string(),
            seed: 1,
            thread_count: 2,
            iterations: 3,
            topology: Topology::document_level(),
            scope: CollectionScope::OwnColl,
            started_at: "2026-01-01T00:00:00+00:00".to_string(),
            duration_ms: 5,
            workers: vec![
                WorkerReport {
                    tid: 0,
                    iterations_run: 3,
                    state_counts: BTreeMap::new(),
                    summary: Value::Null,
                },
                WorkerReport {
                    tid: 1,
                    iterations_run: 2,
                    state_counts: BTreeMap::new(),
                    summary: Value::Null,
                },
            ],
            failures,
            final_check,
            store_stats: None,
            trace: Vec::new(),
        }
    }

    #[test]
    fn test_passed() {
        assert!(report(vec![], FinalCheck::Passed).passed());
        assert!(!report(vec![], FinalCheck::Failed("drift".into())).passed());
        let failure = WorkerFailure::other(0, 1, "update", "boom");
        assert!(!report(vec![failure], FinalCheck::Skipped).passed());
    }

    #[test]
    fn test_summary_line() {
        let line = report(vec![], FinalCheck::Passed).summary_line();
        assert_eq!(
            line,
            "update_inc PASSED: 2 workers, 5 state executions, 0 failures, final check passed (5 ms)"
        );
    }

    #[test]
    fn test_json_shape() {
        let json = report(vec![], FinalCheck::Failed("t1 drifted".into())).to_json();
        assert_eq!(json["final_check"]["status"], "failed");
        assert_eq!(json["final_check"]["message"], "t1 drifted");
        assert_eq!(json["scope"], "own_coll");
        assert_eq!(json["topology"]["document_level_concurrency"], true);
        assert!(json.get("trace").is_none());
        assert!(json.get("store_stats").is_none());
    }

    #[test]
    fn test_failure_from_assertion() {
        let err = WorkloadError::Assertion(AssertionFailure {
            level: AssertLevel::Always,
            check: "eq".to_string(),
            message: "expected 1, got 0".to_string(),
            details: None,
        });
        let failure = WorkerFailure::from_error(3, 4, "update", &err);
        assert_eq!(failure.kind, FailureKind::Assertion);
        assert_eq!(failure.level, Some(AssertLevel::Always));
        assert!(!failure.injected);
    }

    #[test]
    fn test_failure_from_injected_fault() {
        let err = WorkloadError::Store(StoreError::ConnectionFailed {
            store: "memory".to_string(),
            source: Box::new(std::io::Error::other(format!("{} reset", FAULT_PREFIX))),
        });
        let failure = WorkerFailure::from_error(0, 2, "find", &err);
        assert_eq!(failure.kind, FailureKind::Store);
        assert!(failure.injected);
    }
}
