use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use fsmwl_config::FaultsConfig;
use fsmwl_core::{
    CollectionOptions, DocStore, Document, Filter, StoreError, Update, UpdateOptions, UpdateResult,
};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::warn;

/// Prefix used in error messages to distinguish injected faults from real errors.
pub const FAULT_PREFIX: &str = "[fault-injected]";

/// Statistics about injected faults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FaultStats {
    pub errors: usize,
    pub phantom_misses: usize,
    pub lost_modifies: usize,
    pub duplicate_applies: usize,
}

impl FaultStats {
    pub fn total(&self) -> usize {
        self.errors + self.phantom_misses + self.lost_modifies + self.duplicate_applies
    }
}

/// Which lie to tell about an update, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateFault {
    None,
    PhantomMiss,
    LostModify,
    DuplicateApply,
}

/// A store wrapper that injects transient errors and misreported updates.
///
/// Only `update` and `find` are affected. Collection management and inserts
/// pass straight through so setup and teardown stay reliable.
pub struct FaultyStore {
    inner: Arc<dyn DocStore>,
    rng: Mutex<ChaCha8Rng>,
    config: FaultsConfig,
    errors: AtomicUsize,
    phantom_misses: AtomicUsize,
    lost_modifies: AtomicUsize,
    duplicate_applies: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn DocStore>, rng: ChaCha8Rng, config: FaultsConfig) -> Self {
        FaultyStore {
            inner,
            rng: Mutex::new(rng),
            config,
            errors: AtomicUsize::new(0),
            phantom_misses: AtomicUsize::new(0),
            lost_modifies: AtomicUsize::new(0),
            duplicate_applies: AtomicUsize::new(0),
        }
    }

    pub fn stats(&self) -> FaultStats {
        FaultStats {
            errors: self.errors.load(Ordering::Relaxed),
            phantom_misses: self.phantom_misses.load(Ordering::Relaxed),
            lost_modifies: self.lost_modifies.load(Ordering::Relaxed),
            duplicate_applies: self.duplicate_applies.load(Ordering::Relaxed),
        }
    }

    async fn roll(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        let roll: f64 = self.rng.lock().await.gen();
        roll < rate
    }

    /// Pick at most one update fault. Each rate gets its own roll, in a
    /// fixed order, so a given seed replays the same faults.
    async fn pick_update_fault(&self) -> UpdateFault {
        if self.roll(self.config.phantom_miss_rate).await {
            UpdateFault::PhantomMiss
        } else if self.roll(self.config.lost_modify_rate).await {
            UpdateFault::LostModify
        } else if self.roll(self.config.duplicate_apply_rate).await {
            UpdateFault::DuplicateApply
        } else {
            UpdateFault::None
        }
    }

    /// Generate a random injected error (ConnectionFailed or Timeout).
    async fn injected_error(&self, op: &str, collection: &str) -> StoreError {
        self.errors.fetch_add(1, Ordering::Relaxed);
        warn!(op, collection, "injecting store error");
        let use_timeout: bool = self.rng.lock().await.gen();
        if use_timeout {
            StoreError::Timeout {
                operation: format!("{} {}", FAULT_PREFIX, op),
                collection: collection.to_string(),
            }
        } else {
            StoreError::ConnectionFailed {
                store: format!("{} {}", FAULT_PREFIX, self.inner.name()),
                source: Box::new(std::io::Error::other(format!(
                    "{} connection failed during {}",
                    FAULT_PREFIX, op
                ))),
            }
        }
    }
}

#[async_trait]
impl DocStore for FaultyStore {
    fn name(&self) -> &str {
        "faulty"
    }

    async fn create_collection(
        &self,
        collection: &str,
        options: CollectionOptions,
    ) -> Result<(), StoreError> {
        self.inner.create_collection(collection, options).await
    }

    async fn drop_collection(&self, collection: &str) -> Result<bool, StoreError> {
        self.inner.drop_collection(collection).await
    }

    async fn insert(&self, collection: &str, doc: Document) -> Result<(), StoreError> {
        self.inner.insert(collection, doc).await
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        options: UpdateOptions,
    ) -> Result<UpdateResult, StoreError> {
        if self.roll(self.config.error_rate).await {
            return Err(self.injected_error("update", collection).await);
        }

        match self.pick_update_fault().await {
            UpdateFault::None => self.inner.update(collection, filter, update, options).await,
            UpdateFault::PhantomMiss => {
                self.phantom_misses.fetch_add(1, Ordering::Relaxed);
                warn!(collection, "dropping update and reporting no match");
                Ok(UpdateResult::default())
            }
            UpdateFault::LostModify => {
                self.lost_modifies.fetch_add(1, Ordering::Relaxed);
                warn!(collection, "dropping update and reporting match without modify");
                Ok(UpdateResult::new(1, 0, 0))
            }
            UpdateFault::DuplicateApply => {
                self.duplicate_applies.fetch_add(1, Ordering::Relaxed);
                warn!(collection, "applying update twice");
                let first = self.inner.update(collection, filter, update, options).await?;
                self.inner.update(collection, filter, update, options).await?;
                Ok(first)
            }
        }
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        if self.roll(self.config.error_rate).await {
            return Err(self.injected_error("find", collection).await);
        }
        self.inner.find(collection, filter).await
    }
}

/// Check if an error was injected by the fault layer.
pub fn is_injected_fault(msg: &str) -> bool {
    msg.contains(FAULT_PREFIX)
}
