//! State-by-state tests of update_inc against the in-memory store and a
//! store that replays canned update responses.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fsmwl_core::{
    AssertLevel, CappedOptions, CollectionOptions, CollectionScope, DocStore, Document, FieldName,
    Filter, SetupContext, StoreError, Topology, Update, UpdateOptions, UpdateResult, Workload,
    WorkloadError,
};
use fsmwl_store::MemoryStore;
use fsmwl_workloads::update_inc::{FIND, INIT, UPDATE};
use fsmwl_workloads::UpdateInc;

const COLL: &str = "update_inc";

/// Delegates to a memory store, except that queued update responses are
/// returned as-is without touching any document.
struct ScriptedStore {
    inner: MemoryStore,
    script: Mutex<VecDeque<UpdateResult>>,
}

impl ScriptedStore {
    fn new(script: Vec<UpdateResult>) -> Self {
        ScriptedStore {
            inner: MemoryStore::collection_level(),
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl DocStore for ScriptedStore {
    fn name(&self) -> &str {
        "scripted"
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
        let canned = self.script.lock().unwrap().pop_front();
        match canned {
            Some(result) => Ok(result),
            None => self.inner.update(collection, filter, update, options).await,
        }
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        self.inner.find(collection, filter).await
    }
}

fn setup_context(
    store: Arc<dyn DocStore>,
    thread_count: usize,
    topology: Topology,
    scope: CollectionScope,
) -> SetupContext {
    SetupContext {
        store,
        collection: COLL.to_string(),
        thread_count,
        topology,
        asserts: fsmwl_core::Assertions::new(scope),
    }
}

async fn field(store: &dyn DocStore, tid: usize) -> Option<i64> {
    let docs = store.find(COLL, &Filter::All).await.unwrap();
    docs[0].get(&FieldName::for_worker(tid))
}

#[tokio::test]
async fn test_setup_declares_all_fields() {
    let store: Arc<dyn DocStore> = Arc::new(MemoryStore::document_level());
    let workload = UpdateInc::new();
    let ctx = setup_context(
        store.clone(),
        4,
        Topology::document_level(),
        CollectionScope::OwnColl,
    );
    workload.setup(&ctx).await.unwrap();

    let docs = store.find(COLL, &Filter::All).await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id.as_str(), "update_inc");
    assert_eq!(docs[0].size(), 4);
    assert!(docs[0].fields.values().all(|v| *v == 0));
}

#[tokio::test]
async fn test_setup_failure_is_fatal() {
    let store: Arc<dyn DocStore> = Arc::new(MemoryStore::document_level());
    let workload = UpdateInc::new();
    let ctx = setup_context(store, 2, Topology::document_level(), CollectionScope::OwnColl);
    workload.setup(&ctx).await.unwrap();

    let err = workload.setup(&ctx).await.unwrap_err();
    assert!(matches!(
        err,
        WorkloadError::Store(StoreError::DuplicateKey { .. })
    ));
}

#[tokio::test]
async fn test_setup_needs_workers() {
    let store: Arc<dyn DocStore> = Arc::new(MemoryStore::document_level());
    let workload = UpdateInc::new();
    let ctx = setup_context(
        store.clone(),
        0,
        Topology::document_level(),
        CollectionScope::OwnColl,
    );
    let err = workload.setup(&ctx).await.unwrap_err();
    assert!(matches!(err, WorkloadError::Setup(_)));
    assert_eq!(store.count(COLL, &Filter::All).await.unwrap(), 0);
}

#[tokio::test]
async fn test_single_worker_trace() {
    let store: Arc<dyn DocStore> = Arc::new(MemoryStore::document_level());
    let workload = UpdateInc::new();
    let setup = setup_context(
        store.clone(),
        2,
        Topology::document_level(),
        CollectionScope::OwnColl,
    );
    workload.setup(&setup).await.unwrap();
    let ctx = setup.state_context();

    let mut worker = workload.new_worker(0);
    let mut counts = Vec::new();
    for state in [INIT, UPDATE, FIND, UPDATE, FIND, UPDATE, FIND] {
        workload.execute(state, &mut worker, &ctx).await.unwrap();
        counts.push(worker.count);
    }

    assert_eq!(counts, vec![0, 1, 1, 2, 2, 3, 3]);
    assert_eq!(field(store.as_ref(), 0).await, Some(3));
    assert_eq!(field(store.as_ref(), 1).await, Some(0));
    assert_eq!(worker.missed, 0);
}

#[tokio::test]
async fn test_weak_topology_tolerates_miss() {
    let store = Arc::new(ScriptedStore::new(vec![
        UpdateResult::new(1, 1, 0),
        UpdateResult::new(0, 0, 0),
    ]));
    let workload = UpdateInc::new();
    let setup = setup_context(
        store.clone(),
        1,
        Topology::collection_level(),
        CollectionScope::OwnColl,
    );
    workload.setup(&setup).await.unwrap();
    let ctx = setup.state_context();

    let mut worker = workload.new_worker(0);
    workload.execute(INIT, &mut worker, &ctx).await.unwrap();

    // The first canned hit is not applied, so write it for real afterwards
    workload.execute(UPDATE, &mut worker, &ctx).await.unwrap();
    assert_eq!(worker.count, 1);
    store
        .inner
        .update(
            COLL,
            &Filter::All,
            &Update::inc_one(FieldName::for_worker(0)),
            UpdateOptions::default(),
        )
        .await
        .unwrap();
    workload.execute(FIND, &mut worker, &ctx).await.unwrap();

    workload.execute(UPDATE, &mut worker, &ctx).await.unwrap();
    assert_eq!(worker.count, 1);
    assert_eq!(worker.missed, 1);

    workload.execute(FIND, &mut worker, &ctx).await.unwrap();
    assert_eq!(field(store.as_ref(), 0).await, Some(1));
}

#[tokio::test]
async fn test_matched_not_modified_fails() {
    let store = Arc::new(ScriptedStore::new(vec![UpdateResult::new(1, 0, 0)]));
    let workload = UpdateInc::new();
    let setup = setup_context(
        store,
        1,
        Topology::collection_level(),
        CollectionScope::OwnColl,
    );
    workload.setup(&setup).await.unwrap();
    let ctx = setup.state_context();

    let mut worker = workload.new_worker(0);
    workload.execute(INIT, &mut worker, &ctx).await.unwrap();
    let err = workload
        .execute(UPDATE, &mut worker, &ctx)
        .await
        .unwrap_err();

    match err {
        WorkloadError::Assertion(failure) => {
            assert_eq!(failure.level, AssertLevel::Always);
            assert!(failure.details.unwrap().contains("\"n_modified\":0"));
        }
        other => panic!("expected assertion failure, got {:?}", other),
    }
    assert_eq!(worker.count, 0);
}

#[tokio::test]
async fn test_unexpected_upsert_fails() {
    for topology in [Topology::document_level(), Topology::collection_level()] {
        let store = Arc::new(ScriptedStore::new(vec![UpdateResult::new(0, 0, 1)]));
        let workload = UpdateInc::new();
        let setup = setup_context(store, 1, topology, CollectionScope::Shared);
        workload.setup(&setup).await.unwrap();
        let ctx = setup.state_context();

        let mut worker = workload.new_worker(0);
        let err = workload
            .execute(UPDATE, &mut worker, &ctx)
            .await
            .unwrap_err();
        assert!(err.is_assertion(), "{:?}", err);
    }
}

#[tokio::test]
async fn test_document_level_miss_fails() {
    let store = Arc::new(ScriptedStore::new(vec![UpdateResult::new(0, 0, 0)]));
    let workload = UpdateInc::new();
    let setup = setup_context(
        store,
        1,
        Topology::document_level(),
        CollectionScope::OwnColl,
    );
    workload.setup(&setup).await.unwrap();
    let ctx = setup.state_context();

    let mut worker = workload.new_worker(0);
    let err = workload
        .execute(UPDATE, &mut worker, &ctx)
        .await
        .unwrap_err();
    assert!(err.is_assertion());
}

#[tokio::test]
async fn test_find_absent_field() {
    // Set up for one worker, then run as a second worker whose field was
    // never declared
    let store: Arc<dyn DocStore> = Arc::new(MemoryStore::document_level());
    let workload = UpdateInc::new();
    let setup = setup_context(
        store.clone(),
        1,
        Topology::document_level(),
        CollectionScope::OwnColl,
    );
    workload.setup(&setup).await.unwrap();
    let ctx = setup.state_context();

    let mut worker = workload.new_worker(1);
    workload.execute(INIT, &mut worker, &ctx).await.unwrap();
    workload.execute(FIND, &mut worker, &ctx).await.unwrap();

    // A count that claims increments the document never saw
    worker.count = 2;
    let err = workload.execute(FIND, &mut worker, &ctx).await.unwrap_err();
    assert!(err.to_string().contains("expected 0, got 2"), "{}", err);
}

#[tokio::test]
async fn test_find_detects_stale_value() {
    let store: Arc<dyn DocStore> = Arc::new(MemoryStore::document_level());
    let workload = UpdateInc::new();
    let setup = setup_context(
        store.clone(),
        1,
        Topology::document_level(),
        CollectionScope::OwnColl,
    );
    workload.setup(&setup).await.unwrap();
    let ctx = setup.state_context();

    let mut worker = workload.new_worker(0);
    workload.execute(INIT, &mut worker, &ctx).await.unwrap();
    workload.execute(UPDATE, &mut worker, &ctx).await.unwrap();

    // Another writer bumps t0 behind the worker's back
    store
        .update(
            COLL,
            &Filter::All,
            &Update::inc_one(FieldName::for_worker(0)),
            UpdateOptions::default(),
        )
        .await
        .unwrap();

    let err = workload.execute(FIND, &mut worker, &ctx).await.unwrap_err();
    assert!(err.is_assertion());
}

#[tokio::test]
async fn test_find_skipped_on_shared_collection() {
    let store: Arc<dyn DocStore> = Arc::new(MemoryStore::document_level());
    let workload = UpdateInc::new();
    let setup = setup_context(
        store.clone(),
        1,
        Topology::document_level(),
        CollectionScope::Shared,
    );
    workload.setup(&setup).await.unwrap();

    // Someone else's document in the same collection
    store
        .insert(
            COLL,
            Document::new(fsmwl_core::DocId::new("other")).with_field(FieldName::new("x"), 1),
        )
        .await
        .unwrap();

    let ctx = setup.state_context();
    let mut worker = workload.new_worker(0);
    worker.count = 5;
    workload.execute(FIND, &mut worker, &ctx).await.unwrap();
}

#[tokio::test]
async fn test_capped_collection_with_declared_fields() {
    let store: Arc<dyn DocStore> = Arc::new(MemoryStore::document_level());
    store
        .create_collection(
            COLL,
            CollectionOptions {
                capped: Some(CappedOptions { max_docs: 4 }),
            },
        )
        .await
        .unwrap();

    let workload = UpdateInc::new();
    let setup = setup_context(
        store.clone(),
        3,
        Topology::document_level(),
        CollectionScope::OwnColl,
    );
    workload.setup(&setup).await.unwrap();
    let ctx = setup.state_context();

    for tid in 0..3 {
        let mut worker = workload.new_worker(tid);
        workload.execute(INIT, &mut worker, &ctx).await.unwrap();
        workload.execute(UPDATE, &mut worker, &ctx).await.unwrap();
        workload.execute(FIND, &mut worker, &ctx).await.unwrap();
    }

    // A worker outside the declared range would grow the document
    let mut stray = workload.new_worker(3);
    let err = workload
        .execute(UPDATE, &mut stray, &ctx)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkloadError::Store(StoreError::CappedSizeChange { .. })
    ));
}

#[tokio::test]
async fn test_unknown_state() {
    let store: Arc<dyn DocStore> = Arc::new(MemoryStore::document_level());
    let workload = UpdateInc::new();
    let ctx = setup_context(store, 1, Topology::document_level(), CollectionScope::OwnColl)
        .state_context();
    let mut worker = workload.new_worker(0);
    let err = workload
        .execute("remove", &mut worker, &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkloadError::UnknownState(s) if s == "remove"));
}

#[tokio::test]
async fn test_final_check() {
    let store: Arc<dyn DocStore> = Arc::new(MemoryStore::document_level());
    let workload = UpdateInc::new();
    let setup = setup_context(
        store.clone(),
        2,
        Topology::document_level(),
        CollectionScope::OwnColl,
    );
    workload.setup(&setup).await.unwrap();
    let ctx = setup.state_context();

    let mut workers = vec![workload.new_worker(0), workload.new_worker(1)];
    for worker in workers.iter_mut() {
        workload.execute(INIT, worker, &ctx).await.unwrap();
        workload.execute(UPDATE, worker, &ctx).await.unwrap();
    }
    workload.check_final(&workers, &ctx).await.unwrap();

    // A duplicated increment shows up as drift on t1
    store
        .update(
            COLL,
            &Filter::All,
            &Update::inc_one(FieldName::for_worker(1)),
            UpdateOptions::default(),
        )
        .await
        .unwrap();
    let err = workload.check_final(&workers, &ctx).await.unwrap_err();
    assert!(err.is_assertion());
}

#[tokio::test]
async fn test_final_check_missing_document() {
    let store: Arc<dyn DocStore> = Arc::new(MemoryStore::document_level());
    store
        .create_collection(COLL, CollectionOptions::default())
        .await
        .unwrap();
    let workload = UpdateInc::new();
    let ctx = setup_context(store, 1, Topology::document_level(), CollectionScope::OwnColl)
        .state_context();

    let err = workload
        .check_final(&[workload.new_worker(0)], &ctx)
        .await
        .unwrap_err();
    assert!(err.is_assertion());
}
