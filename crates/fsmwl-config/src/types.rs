use serde::{Deserialize, Serialize};

/// How much of the data store a run owns exclusively.
///
/// Ordered from least to most exclusive, so `scope >= CollectionScope::OwnDb`
/// reads as "at least the whole database belongs to this run".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum CollectionScope {
    /// Other tests may be using the same collection concurrently
    Shared,
    /// The run owns its database, but collections may be shared between workloads
    OwnDb,
    /// The run owns its collection outright
    #[default]
    OwnColl,
}

impl CollectionScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionScope::Shared => "shared",
            CollectionScope::OwnDb => "own_db",
            CollectionScope::OwnColl => "own_coll",
        }
    }
}

/// Concurrency control offered by the simulated store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyMode {
    /// Per-document atomicity; write conflicts are retried inside the store
    #[default]
    Document,
    /// Collection-level locking; a query that yields can be invalidated by a
    /// concurrent write and match nothing
    Collection,
}

/// Capability answer injected into every state function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Whether the deployment guarantees per-document concurrency control.
    pub document_level_concurrency: bool,
}

/// Capped collection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CappedConfig {
    /// Maximum number of documents the collection may hold.
    pub max_docs: usize,
}

fn default_conflict_retries() -> u32 {
    64
}

fn default_yield_every() -> u32 {
    1
}

/// Simulated store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub concurrency: ConcurrencyMode,

    /// Retry budget for a single update under document-level concurrency.
    #[serde(default = "default_conflict_retries")]
    pub conflict_retries: u32,

    /// Yield between the read and write phases of every Nth update. Zero
    /// disables yielding.
    #[serde(default = "default_yield_every")]
    pub yield_every: u32,

    #[serde(default)]
    pub capped: Option<CappedConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            concurrency: ConcurrencyMode::default(),
            conflict_retries: default_conflict_retries(),
            yield_every: default_yield_every(),
            capped: None,
        }
    }
}

/// Fault injection rates, each a probability in `[0, 1]` per operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FaultsConfig {
    /// Fail the operation with a transient store error.
    #[serde(default)]
    pub error_rate: f64,
    /// Report an update as matching nothing without applying it.
    #[serde(default)]
    pub phantom_miss_rate: f64,
    /// Report an update as matched but not modified, without applying it.
    #[serde(default)]
    pub lost_modify_rate: f64,
    /// Apply an update twice while reporting a single modification.
    #[serde(default)]
    pub duplicate_apply_rate: f64,
}

impl FaultsConfig {
    /// True when any fault has a non-zero rate.
    pub fn is_active(&self) -> bool {
        self.error_rate > 0.0
            || self.phantom_miss_rate > 0.0
            || self.lost_modify_rate > 0.0
            || self.duplicate_apply_rate > 0.0
    }

    pub(crate) fn rates(&self) -> [(&'static str, f64); 4] {
        [
            ("error_rate", self.error_rate),
            ("phantom_miss_rate", self.phantom_miss_rate),
            ("lost_modify_rate", self.lost_modify_rate),
            ("duplicate_apply_rate", self.duplicate_apply_rate),
        ]
    }
}

/// Root configuration for a single workload run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Name of the registered workload to execute.
    pub workload: String,

    /// Number of concurrent workers. Falls back to the workload default.
    #[serde(default)]
    pub thread_count: Option<usize>,

    /// State executions per worker. Falls back to the workload default.
    #[serde(default)]
    pub iterations: Option<usize>,

    /// Seed for transition choices and fault injection.
    #[serde(default)]
    pub seed: u64,

    /// Collection under test. Derived from the workload name when omitted.
    #[serde(default)]
    pub collection: Option<String>,

    #[serde(default)]
    pub scope: CollectionScope,

    /// Inferred from `store.concurrency` when omitted.
    #[serde(default)]
    pub topology: Option<TopologyConfig>,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub faults: FaultsConfig,

    /// Record every state execution in the run report.
    #[serde(default)]
    pub trace: bool,
}

impl RunConfig {
    /// A config with every optional field left to default inference.
    pub fn for_workload(workload: impl Into<String>) -> Self {
        RunConfig {
            workload: workload.into(),
            thread_count: None,
            iterations: None,
            seed: 0,
            collection: None,
            scope: CollectionScope::default(),
            topology: None,
            store: StoreConfig::default(),
            faults: FaultsConfig::default(),
            trace: false,
        }
    }
}
