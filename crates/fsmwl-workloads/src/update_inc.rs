//! Concurrent increments against one shared document.
//!
//! Setup inserts `{_id: "update_inc", t0: 0, ..., t(N-1): 0}`. Each worker
//! owns field `t<tid>` and alternates between incrementing it and reading
//! the document back, checking that the stored value matches the number of
//! increments it saw land. Fields are declared up front so that no update
//! ever changes the document's size, which capped collections reject.
//!
//! Stores without document-level concurrency control may invalidate a
//! query that yielded while another worker updated the document, so on
//! those stores an update is allowed to match nothing. Such misses are
//! counted per worker and reported, but no bound is asserted on them.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use fsmwl_core::{
    AssertLevel, AssertionFailure, Assertions, DocId, Document, FieldName, Filter, SetupContext,
    StateContext, StateName, Topology, TransitionTable, Update, UpdateOptions, UpdateResult,
    Workload, WorkloadError,
};

pub const NAME: &str = "update_inc";

pub const INIT: StateName = "init";
pub const UPDATE: StateName = "update";
pub const FIND: StateName = "find";

const STATES: &[StateName] = &[INIT, UPDATE, FIND];

pub const DEFAULT_THREAD_COUNT: usize = 10;
pub const DEFAULT_ITERATIONS: usize = 20;

/// Local state of one worker. Never shared with other workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncWorker {
    pub tid: usize,
    pub field: FieldName,
    /// Increments this worker saw applied to the shared document.
    pub count: i64,
    /// Increments that matched no document.
    pub missed: u64,
}

impl IncWorker {
    pub fn new(tid: usize) -> Self {
        IncWorker {
            tid,
            field: FieldName::for_worker(tid),
            count: 0,
            missed: 0,
        }
    }
}

/// Check the counts reported by one increment.
///
/// Returns whether the increment landed on the shared document.
pub fn check_update_result(
    result: &UpdateResult,
    topology: Topology,
    asserts: &Assertions,
) -> Result<bool, AssertionFailure> {
    let details = result.to_json();

    // The document exists from setup onwards, an upsert means it was lost
    asserts.eq(AssertLevel::Always, 0, result.n_upserted, &details)?;

    if topology.document_level_concurrency {
        // Conflicts are retried inside the store, so the document is always found
        asserts.eq(AssertLevel::WhenOwnColl, 1, result.n_matched, &details)?;
        asserts.eq(AssertLevel::WhenOwnColl, 1, result.n_modified, &details)?;
    } else {
        asserts.contains(AssertLevel::WhenOwnColl, result.n_matched, &[0, 1], &details)?;
        asserts.contains(AssertLevel::WhenOwnColl, result.n_modified, &[0, 1], &details)?;
        // $inc always modifies what it matches
        asserts.eq(
            AssertLevel::Always,
            result.n_matched,
            result.n_modified,
            &details,
        )?;
    }

    Ok(result.n_matched >= 1)
}

/// The `update_inc` workload.
#[derive(Debug, Clone)]
pub struct UpdateInc {
    id: DocId,
}

impl UpdateInc {
    /// Use the workload name as the shared document's id.
    pub fn new() -> Self {
        Self::with_id(DocId::new(NAME))
    }

    pub fn with_id(id: DocId) -> Self {
        UpdateInc { id }
    }

    /// The document setup inserts for `thread_count` workers.
    pub fn initial_document(&self, thread_count: usize) -> Document {
        (0..thread_count).fold(Document::new(self.id.clone()), |doc, tid| {
            doc.with_field(FieldName::for_worker(tid), 0)
        })
    }

    fn init(&self, worker: &mut IncWorker) {
        worker.field = FieldName::for_worker(worker.tid);
        worker.count = 0;
    }

    async fn update(
        &self,
        worker: &mut IncWorker,
        ctx: &StateContext,
    ) -> Result<(), WorkloadError> {
        let result = ctx
            .store
            .update(
                &ctx.collection,
                &Filter::Id(self.id.clone()),
                &Update::inc_one(worker.field.clone()),
                UpdateOptions::default(),
            )
            .await?;

        if check_update_result(&result, ctx.topology, &ctx.asserts)? {
            worker.count += 1;
        } else {
            worker.missed += 1;
            warn!(
                tid = worker.tid,
                field = %worker.field,
                missed = worker.missed,
                "increment matched no document"
            );
        }
        Ok(())
    }

    async fn find(&self, worker: &IncWorker, ctx: &StateContext) -> Result<(), WorkloadError> {
        let docs = ctx.store.find(&ctx.collection, &Filter::All).await?;
        ctx.asserts.eq(AssertLevel::WhenOwnColl, 1, docs.len(), "")?;

        // Without the collection to ourselves the read-back proves nothing
        if !ctx.asserts.enabled(AssertLevel::WhenOwnColl) {
            return Ok(());
        }
        let Some(doc) = docs.first() else {
            return Ok(());
        };

        let details = serde_json::to_string(doc).unwrap_or_default();
        match doc.get(&worker.field) {
            Some(value) => ctx
                .asserts
                .eq(AssertLevel::WhenOwnColl, worker.count, value, &details)?,
            // Never written, so nothing can have landed
            None => ctx
                .asserts
                .eq(AssertLevel::WhenOwnColl, 0, worker.count, &details)?,
        }
        Ok(())
    }
}

impl Default for UpdateInc {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Workload for UpdateInc {
    type Worker = IncWorker;

    fn name(&self) -> &str {
        NAME
    }

    fn default_thread_count(&self) -> usize {
        DEFAULT_THREAD_COUNT
    }

    fn default_iterations(&self) -> usize {
        DEFAULT_ITERATIONS
    }

    fn states(&self) -> &'static [StateName] {
        STATES
    }

    fn transitions(&self) -> TransitionTable {
        TransitionTable::new(INIT)
            .edge(INIT, UPDATE, 1.0)
            .edge(UPDATE, FIND, 1.0)
            .edge(FIND, UPDATE, 1.0)
    }

    fn new_worker(&self, tid: usize) -> IncWorker {
        IncWorker::new(tid)
    }

    async fn setup(&self, ctx: &SetupContext) -> Result<(), WorkloadError> {
        if ctx.thread_count == 0 {
            return Err(WorkloadError::Setup(
                "at least one worker is needed to declare fields for".to_string(),
            ));
        }
        let doc = self.initial_document(ctx.thread_count);
        debug!(
            collection = %ctx.collection,
            id = %self.id,
            fields = doc.size(),
            "inserting shared document"
        );
        ctx.store.insert(&ctx.collection, doc).await?;
        Ok(())
    }

    async fn execute(
        &self,
        state: StateName,
        worker: &mut IncWorker,
        ctx: &StateContext,
    ) -> Result<(), WorkloadError> {
        match state {
            INIT => {
                self.init(worker);
                Ok(())
            }
            UPDATE => self.update(worker, ctx).await,
            FIND => self.find(worker, ctx).await,
            other => Err(WorkloadError::UnknownState(other.to_string())),
        }
    }

    async fn check_final(
        &self,
        workers: &[IncWorker],
        ctx: &StateContext,
    ) -> Result<(), WorkloadError> {
        let docs = ctx.store.find(&ctx.collection, &Filter::All).await?;
        let asserts = &ctx.asserts;
        let level = AssertLevel::WhenOwnColl;

        asserts.eq(level, 1, docs.len(), "")?;
        let doc = docs.iter().find(|doc| doc.id == self.id);
        asserts.check(
            level,
            "present",
            doc.is_some(),
            || format!("document '{}' is missing", self.id),
            "",
        )?;
        let Some(doc) = doc else {
            return Ok(());
        };

        let details = serde_json::to_string(doc).unwrap_or_default();
        asserts.eq(level, workers.len(), doc.size(), &details)?;
        for worker in workers {
            asserts.eq(
                level,
                worker.count,
                doc.get(&worker.field).unwrap_or(0),
                &details,
            )?;
        }

        let missed: u64 = workers.iter().map(|w| w.missed).sum();
        debug!(workers = workers.len(), missed, "final document consistent");
        Ok(())
    }

    fn summarize(&self, worker: &IncWorker) -> serde_json::Value {
        json!({
            "field": worker.field,
            "count": worker.count,
            "missed": worker.missed,
        })
    }
}
