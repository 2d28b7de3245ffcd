use crate::types::{ConcurrencyMode, RunConfig, TopologyConfig};

/// Fallback values a workload declares for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadDefaults {
    pub thread_count: usize,
    pub iterations: usize,
}

impl RunConfig {
    /// Apply default inference rules to the configuration.
    /// This mutates the config in place.
    pub fn apply_defaults(&mut self, defaults: WorkloadDefaults) {
        if self.thread_count.is_none() {
            self.thread_count = Some(defaults.thread_count);
        }

        if self.iterations.is_none() {
            self.iterations = Some(defaults.iterations);
        }

        if self.collection.is_none() {
            self.collection = Some(derive_collection_name(&self.workload));
        }

        // A store only advertises document-level concurrency when it has it
        if self.topology.is_none() {
            self.topology = Some(infer_topology(self.store.concurrency));
        }
    }

    /// Returns a new config with all defaults applied.
    pub fn effective(&self, defaults: WorkloadDefaults) -> RunConfig {
        let mut config = self.clone();
        config.apply_defaults(defaults);
        config
    }
}

/// Derive the collection name from the workload name.
/// `update_inc` -> "update_inc"
/// `Update Inc` -> "update_inc"
fn derive_collection_name(workload: &str) -> String {
    workload
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn infer_topology(concurrency: ConcurrencyMode) -> TopologyConfig {
    TopologyConfig {
        document_level_concurrency: concurrency == ConcurrencyMode::Document,
    }
}
