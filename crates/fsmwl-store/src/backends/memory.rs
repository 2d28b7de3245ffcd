use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use fsmwl_core::{
    CollectionOptions, DocId, DocStore, Document, Filter, StoreError, Update, UpdateOptions,
    UpdateResult,
};

/// How concurrent writers to the same document are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyControl {
    /// Each document is updated atomically. A write that races with another
    /// write to the same document is retried transparently, so a live
    /// document is always matched.
    Document {
        conflict_retries: u32,
        yield_every: u32,
    },
    /// No per-document control. An update that yields between selecting and
    /// writing a document loses it if another writer changed it meanwhile,
    /// and reports zero matches.
    Collection { yield_every: u32 },
}

impl ConcurrencyControl {
    fn yield_every(&self) -> u32 {
        match self {
            ConcurrencyControl::Document { yield_every, .. }
            | ConcurrencyControl::Collection { yield_every } => *yield_every,
        }
    }
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub inserts: u64,
    pub updates: u64,
    pub finds: u64,
    pub yields: u64,
    pub write_conflicts: u64,
    pub invalidations: u64,
}

#[derive(Default)]
struct Counters {
    inserts: AtomicU64,
    updates: AtomicU64,
    finds: AtomicU64,
    yields: AtomicU64,
    write_conflicts: AtomicU64,
    invalidations: AtomicU64,
}

struct StoredDoc {
    doc: Document,
    version: u64,
}

#[derive(Default)]
struct Collection {
    options: CollectionOptions,
    docs: IndexMap<DocId, StoredDoc>,
}

impl Collection {
    fn with_options(options: CollectionOptions) -> Self {
        Collection {
            options,
            docs: IndexMap::new(),
        }
    }
}

/// Outcome of the write phase of an update.
enum Commit {
    Done(UpdateResult),
    Conflict,
}

/// In-memory document store for running workloads without a real database.
pub struct MemoryStore {
    name: String,
    concurrency: ConcurrencyControl,
    collections: RwLock<HashMap<String, Collection>>,
    update_seq: AtomicU64,
    counters: Counters,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new(name: impl Into<String>, concurrency: ConcurrencyControl) -> Self {
        MemoryStore {
            name: name.into(),
            concurrency,
            collections: RwLock::new(HashMap::new()),
            update_seq: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    /// A store with document-level concurrency and default settings.
    pub fn document_level() -> Self {
        Self::new(
            "memory",
            ConcurrencyControl::Document {
                conflict_retries: 64,
                yield_every: 1,
            },
        )
    }

    /// A store with collection-level concurrency that yields on every update.
    pub fn collection_level() -> Self {
        Self::new("memory", ConcurrencyControl::Collection { yield_every: 1 })
    }

    pub fn concurrency(&self) -> ConcurrencyControl {
        self.concurrency
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            inserts: self.counters.inserts.load(Ordering::Relaxed),
            updates: self.counters.updates.load(Ordering::Relaxed),
            finds: self.counters.finds.load(Ordering::Relaxed),
            yields: self.counters.yields.load(Ordering::Relaxed),
            write_conflicts: self.counters.write_conflicts.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
        }
    }

    fn should_yield(&self) -> bool {
        let every = u64::from(self.concurrency.yield_every());
        if every == 0 {
            return false;
        }
        self.update_seq.fetch_add(1, Ordering::Relaxed) % every == 0
    }

    /// Read phase: ids and versions of the documents the update will target.
    fn select(&self, collection: &str, filter: &Filter, multi: bool) -> Vec<(DocId, u64)> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        let Some(coll) = collections.get(collection) else {
            return Vec::new();
        };

        let matching = coll
            .docs
            .values()
            .filter(|stored| filter.matches(&stored.doc))
            .map(|stored| (stored.doc.id.clone(), stored.version));

        if multi {
            matching.collect()
        } else {
            matching.take(1).collect()
        }
    }

    /// Write phase: re-validate the selection under the write lock and apply.
    fn commit(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        options: UpdateOptions,
        selected: &[(DocId, u64)],
    ) -> Result<Commit, StoreError> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());

        if selected.is_empty() {
            if !options.upsert {
                return Ok(Commit::Done(UpdateResult::default()));
            }
            let coll = collections.entry(collection.to_string()).or_default();
            // Someone may have created a match since the read phase
            if coll.docs.values().any(|stored| filter.matches(&stored.doc)) {
                return Ok(Commit::Conflict);
            }
            let Filter::Id(id) = filter else {
                return Err(StoreError::Other(
                    "upsert requires a filter on _id".to_string(),
                ));
            };
            let mut doc = Document::new(id.clone());
            update.apply(&mut doc);
            insert_doc(collection, coll, doc)?;
            self.counters.inserts.fetch_add(1, Ordering::Relaxed);
            return Ok(Commit::Done(UpdateResult::new(0, 0, 1)));
        }

        let Some(coll) = collections.get_mut(collection) else {
            return self.lost(collection, selected.len());
        };

        let mut live = Vec::with_capacity(selected.len());
        for (id, version) in selected {
            match coll.docs.get(id) {
                Some(stored) if stored.version == *version => live.push(id),
                _ => {}
            }
        }

        let lost = selected.len() - live.len();
        if lost > 0 {
            if let ConcurrencyControl::Document { .. } = self.concurrency {
                return Ok(Commit::Conflict);
            }
            self.counters
                .invalidations
                .fetch_add(lost as u64, Ordering::Relaxed);
            warn!(
                store = %self.name,
                collection,
                lost,
                "update invalidated by concurrent write during yield"
            );
        }

        if coll.options.capped.is_some() {
            for id in &live {
                if let Some(stored) = coll.docs.get(*id) {
                    let new_fields = update.new_fields(&stored.doc);
                    if !new_fields.is_empty() {
                        let before = stored.doc.size();
                        return Err(StoreError::CappedSizeChange {
                            collection: collection.to_string(),
                            id: id.to_string(),
                            before,
                            after: before + new_fields.len(),
                        });
                    }
                }
            }
        }

        let mut result = UpdateResult::default();
        for id in live {
            if let Some(stored) = coll.docs.get_mut(id) {
                result.n_matched += 1;
                if update.apply(&mut stored.doc) {
                    stored.version += 1;
                    result.n_modified += 1;
                }
            }
        }

        Ok(Commit::Done(result))
    }

    /// The whole collection vanished between read and write.
    fn lost(&self, collection: &str, count: usize) -> Result<Commit, StoreError> {
        match self.concurrency {
            ConcurrencyControl::Document { .. } => Ok(Commit::Conflict),
            ConcurrencyControl::Collection { .. } => {
                self.counters
                    .invalidations
                    .fetch_add(count as u64, Ordering::Relaxed);
                debug!(store = %self.name, collection, "collection dropped during yield");
                Ok(Commit::Done(UpdateResult::default()))
            }
        }
    }
}

fn insert_doc(collection: &str, coll: &mut Collection, doc: Document) -> Result<(), StoreError> {
    if coll.docs.contains_key(&doc.id) {
        return Err(StoreError::DuplicateKey {
            collection: collection.to_string(),
            id: doc.id.to_string(),
        });
    }
    if let Some(capped) = coll.options.capped {
        // Capped collections evict in insertion order
        while coll.docs.len() >= capped.max_docs && !coll.docs.is_empty() {
            coll.docs.shift_remove_index(0);
        }
    }
    coll.docs.insert(doc.id.clone(), StoredDoc { doc, version: 0 });
    Ok(())
}

#[async_trait]
impl DocStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(store = %self.name))]
    async fn create_collection(
        &self,
        collection: &str,
        options: CollectionOptions,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        if collections.contains_key(collection) {
            return Err(StoreError::CollectionExists(collection.to_string()));
        }
        debug!("creating collection");
        collections.insert(collection.to_string(), Collection::with_options(options));
        Ok(())
    }

    #[instrument(skip(self), fields(store = %self.name))]
    async fn drop_collection(&self, collection: &str) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        Ok(collections.remove(collection).is_some())
    }

    #[instrument(skip(self, doc), fields(store = %self.name, id = %doc.id, size = doc.size()))]
    async fn insert(&self, collection: &str, doc: Document) -> Result<(), StoreError> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        let coll = collections.entry(collection.to_string()).or_default();
        insert_doc(collection, coll, doc)?;
        self.counters.inserts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    #[instrument(skip(self, update), fields(store = %self.name))]
    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        options: UpdateOptions,
    ) -> Result<UpdateResult, StoreError> {
        self.counters.updates.fetch_add(1, Ordering::Relaxed);
        let yields = self.should_yield();

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let selected = self.select(collection, filter, options.multi);
            // Retries run straight through, as a store-internal retry would
            if yields && attempts == 1 {
                self.counters.yields.fetch_add(1, Ordering::Relaxed);
                tokio::task::yield_now().await;
            }

            match self.commit(collection, filter, update, options, &selected)? {
                Commit::Done(result) => return Ok(result),
                Commit::Conflict => {
                    self.counters.write_conflicts.fetch_add(1, Ordering::Relaxed);
                    let retries = match self.concurrency {
                        ConcurrencyControl::Document {
                            conflict_retries, ..
                        } => conflict_retries,
                        ConcurrencyControl::Collection { .. } => 0,
                    };
                    if attempts > retries {
                        return Err(StoreError::WriteConflict {
                            collection: collection.to_string(),
                            id: selected
                                .first()
                                .map(|(id, _)| id.to_string())
                                .unwrap_or_default(),
                            attempts,
                        });
                    }
                    debug!(attempts, "write conflict, retrying");
                }
            }
        }
    }

    #[instrument(skip(self), fields(store = %self.name))]
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        self.counters.finds.fetch_add(1, Ordering::Relaxed);
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        Ok(collections
            .get(collection)
            .map(|coll| {
                coll.docs
                    .values()
                    .filter(|stored| filter.matches(&stored.doc))
                    .map(|stored| stored.doc.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}
