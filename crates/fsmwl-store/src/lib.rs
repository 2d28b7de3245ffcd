pub mod backends;
pub mod fault;

use std::sync::Arc;

use fsmwl_config::{ConcurrencyMode, FaultsConfig, StoreConfig};
use fsmwl_core::DocStore;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub use backends::{ConcurrencyControl, MemoryStore, StoreStats};
pub use fault::{is_injected_fault, FaultStats, FaultyStore, FAULT_PREFIX};

impl From<&StoreConfig> for ConcurrencyControl {
    fn from(cfg: &StoreConfig) -> Self {
        match cfg.concurrency {
            ConcurrencyMode::Document => ConcurrencyControl::Document {
                conflict_retries: cfg.conflict_retries,
                yield_every: cfg.yield_every,
            },
            ConcurrencyMode::Collection => ConcurrencyControl::Collection {
                yield_every: cfg.yield_every,
            },
        }
    }
}

/// A store assembled from configuration.
///
/// `memory` is always the raw store so callers can read its counters;
/// `store` is what workers talk to, wrapped in fault injection when any
/// fault rate is non-zero.
pub struct BuiltStore {
    pub memory: Arc<MemoryStore>,
    pub faulty: Option<Arc<FaultyStore>>,
    pub store: Arc<dyn DocStore>,
}

/// Build the store described by `store` and `faults`, seeding fault
/// injection from `seed`.
pub fn build_store(store: &StoreConfig, faults: &FaultsConfig, seed: u64) -> BuiltStore {
    let memory = Arc::new(MemoryStore::new("memory", ConcurrencyControl::from(store)));

    if faults.is_active() {
        let faulty = Arc::new(FaultyStore::new(
            memory.clone() as Arc<dyn DocStore>,
            ChaCha8Rng::seed_from_u64(seed),
            faults.clone(),
        ));
        BuiltStore {
            memory,
            faulty: Some(faulty.clone()),
            store: faulty as Arc<dyn DocStore>,
        }
    } else {
        BuiltStore {
            store: memory.clone() as Arc<dyn DocStore>,
            memory,
            faulty: None,
        }
    }
}
