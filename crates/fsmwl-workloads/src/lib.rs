pub mod update_inc;

use fsmwl_config::WorkloadDefaults;

pub use update_inc::{check_update_result, IncWorker, UpdateInc};

/// A workload that can be selected by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub defaults: WorkloadDefaults,
}

/// Every workload this crate provides.
pub const WORKLOADS: &[WorkloadInfo] = &[WorkloadInfo {
    name: update_inc::NAME,
    description: "workers increment their own field of one shared document and read it back",
    defaults: WorkloadDefaults {
        thread_count: update_inc::DEFAULT_THREAD_COUNT,
        iterations: update_inc::DEFAULT_ITERATIONS,
    },
}];

/// Look up a workload by name.
pub fn lookup(name: &str) -> Option<&'static WorkloadInfo> {
    WORKLOADS.iter().find(|info| info.name == name)
}

/// Declared defaults of the named workload.
pub fn defaults_for(name: &str) -> Option<WorkloadDefaults> {
    lookup(name).map(|info| info.defaults)
}
