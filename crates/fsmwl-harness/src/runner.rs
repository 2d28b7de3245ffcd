use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use fsmwl_config::RunConfig;
use fsmwl_core::{
    Assertions, CappedOptions, CollectionOptions, CollectionScope, DocStore, SetupContext,
    StateContext, StateName, Topology, TransitionTable, Workload,
};
use fsmwl_store::{build_store, BuiltStore};
use fsmwl_workloads::{update_inc, UpdateInc};
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::error::HarnessError;
use crate::report::{FinalCheck, RunReport, TraceEntry, WorkerFailure, WorkerReport};

/// Fully resolved parameters of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub thread_count: usize,
    /// State executions per worker, the initial state included.
    pub iterations: usize,
    pub seed: u64,
    pub collection: String,
    pub collection_options: CollectionOptions,
    pub topology: Topology,
    pub scope: CollectionScope,
    pub trace: bool,
}

impl RunOptions {
    pub fn new(collection: impl Into<String>, thread_count: usize, iterations: usize) -> Self {
        RunOptions {
            thread_count,
            iterations,
            seed: 0,
            collection: collection.into(),
            collection_options: CollectionOptions::default(),
            topology: Topology::document_level(),
            scope: CollectionScope::OwnColl,
            trace: false,
        }
    }

    /// Resolve options from a config that has had its defaults applied.
    pub fn from_config(config: &RunConfig) -> Result<Self, HarnessError> {
        let missing = |field: &str| {
            fsmwl_config::ConfigError::InvalidConfig(format!("'{}' was not resolved", field))
        };
        Ok(RunOptions {
            thread_count: config.thread_count.ok_or_else(|| missing("thread_count"))?,
            iterations: config.iterations.ok_or_else(|| missing("iterations"))?,
            seed: config.seed,
            collection: config
                .collection
                .clone()
                .ok_or_else(|| missing("collection"))?,
            collection_options: CollectionOptions {
                capped: config.store.capped.map(|capped| CappedOptions {
                    max_docs: capped.max_docs,
                }),
            },
            topology: config
                .topology
                .map(Topology::from)
                .ok_or_else(|| missing("topology"))?,
            scope: config.scope,
            trace: config.trace,
        })
    }
}

/// What one worker task hands back when it stops.
struct WorkerRun<T> {
    worker: T,
    report: WorkerReport,
    failure: Option<WorkerFailure>,
    trace: Vec<TraceEntry>,
}

/// Drives a workload: setup, parallel workers, final check, teardown.
pub struct Harness<W: Workload> {
    workload: Arc<W>,
    store: Arc<dyn DocStore>,
    options: RunOptions,
}

impl<W: Workload> Harness<W> {
    pub fn new(workload: W, store: Arc<dyn DocStore>, options: RunOptions) -> Self {
        Harness {
            workload: Arc::new(workload),
            store,
            options,
        }
    }

    /// Run to completion.
    ///
    /// Worker failures end up in the report. Only problems that prevent the
    /// run from starting, or a worker task that panicked, are returned as
    /// errors.
    pub async fn run(&self) -> Result<RunReport, HarnessError> {
        let options = &self.options;
        let name = self.workload.name().to_string();
        let table = self.workload.transitions();
        table
            .validate(self.workload.states())
            .map_err(|source| HarnessError::InvalidTransitions {
                workload: name.clone(),
                source,
            })?;

        let setup_ctx = SetupContext {
            store: self.store.clone(),
            collection: options.collection.clone(),
            thread_count: options.thread_count,
            topology: options.topology,
            asserts: Assertions::new(options.scope),
        };
        self.prepare(&setup_ctx).await?;

        info!(
            workload = %name,
            store = self.store.name(),
            threads = options.thread_count,
            iterations = options.iterations,
            seed = options.seed,
            scope = options.scope.as_str(),
            document_level = options.topology.document_level_concurrency,
            "starting run"
        );
        let started_at = chrono::Utc::now().to_rfc3339();
        let started = Instant::now();

        let state_ctx = setup_ctx.state_context();
        let table = Arc::new(table);
        let stop = Arc::new(AtomicBool::new(false));
        let mut master = ChaCha8Rng::seed_from_u64(options.seed);

        let mut handles = Vec::with_capacity(options.thread_count);
        for tid in 0..options.thread_count {
            let rng = ChaCha8Rng::seed_from_u64(master.gen());
            handles.push(tokio::spawn(run_worker(
                self.workload.clone(),
                state_ctx.clone(),
                table.clone(),
                tid,
                rng,
                options.iterations,
                stop.clone(),
                options.trace,
            )));
        }

        let mut workers = Vec::with_capacity(handles.len());
        let mut reports = Vec::with_capacity(handles.len());
        let mut failures = Vec::new();
        let mut trace = Vec::new();
        let mut join_error = None;
        for handle in handles {
            match handle.await {
                Ok(run) => {
                    workers.push(run.worker);
                    reports.push(run.report);
                    failures.extend(run.failure);
                    trace.extend(run.trace);
                }
                Err(err) => {
                    error!(error = %err, "worker task did not complete");
                    stop.store(true, Ordering::Release);
                    join_error.get_or_insert(err);
                }
            }
        }

        // Every task has finished by now, so teardown cannot race a worker
        if let Some(err) = join_error {
            for failure in &failures {
                error!(
                    tid = failure.tid,
                    state = %failure.state,
                    message = %failure.message,
                    "worker failed"
                );
            }
            if let Err(teardown_err) = self.workload.teardown(&setup_ctx).await {
                warn!(error = %teardown_err, "teardown after a lost worker failed");
            }
            return Err(HarnessError::Join(err));
        }

        let final_check = if failures.is_empty() {
            match self.workload.check_final(&workers, &state_ctx).await {
                Ok(()) => FinalCheck::Passed,
                Err(err) => {
                    error!(error = %err, "final check failed");
                    FinalCheck::Failed(err.to_string())
                }
            }
        } else {
            FinalCheck::Skipped
        };

        for (report, worker) in reports.iter_mut().zip(&workers) {
            report.summary = self.workload.summarize(worker);
        }

        self.workload.teardown(&setup_ctx).await?;

        let report = RunReport {
            workload: name,
            collection: options.collection.clone(),
            seed: options.seed,
            thread_count: options.thread_count,
            iterations: options.iterations,
            topology: options.topology,
            scope: options.scope,
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
            workers: reports,
            failures,
            final_check,
            store_stats: None,
            trace,
        };
        info!(
            passed = report.passed(),
            failures = report.failures.len(),
            duration_ms = report.duration_ms,
            "run finished"
        );
        Ok(report)
    }

    /// Recreate the collection and run the workload's setup hook.
    async fn prepare(&self, ctx: &SetupContext) -> Result<(), HarnessError> {
        let setup_err = |err| HarnessError::Setup(fsmwl_core::WorkloadError::Store(err));
        if self
            .store
            .drop_collection(&ctx.collection)
            .await
            .map_err(setup_err)?
        {
            debug!(collection = %ctx.collection, "dropped leftover collection");
        }
        self.store
            .create_collection(&ctx.collection, self.options.collection_options)
            .await
            .map_err(setup_err)?;
        self.workload.setup(ctx).await.map_err(HarnessError::Setup)
    }
}

fn next_state(
    table: &TransitionTable,
    from: StateName,
    rng: &mut ChaCha8Rng,
) -> Option<StateName> {
    let edges = table.next_states(from)?;
    let dist = WeightedIndex::new(edges.iter().map(|(_, weight)| *weight)).ok()?;
    edges.get(dist.sample(rng)).map(|(to, _)| *to)
}

#[allow(clippy::too_many_arguments)]
async fn run_worker<W: Workload>(
    workload: Arc<W>,
    ctx: StateContext,
    table: Arc<TransitionTable>,
    tid: usize,
    mut rng: ChaCha8Rng,
    iterations: usize,
    stop: Arc<AtomicBool>,
    trace: bool,
) -> WorkerRun<W::Worker> {
    let mut worker = workload.new_worker(tid);
    let mut state = table.initial();
    let mut state_counts = BTreeMap::new();
    let mut entries = Vec::new();
    let mut failure = None;
    let mut iterations_run = 0;

    for iteration in 0..iterations {
        if stop.load(Ordering::Acquire) {
            debug!(tid, iteration, "stopping, another worker failed");
            break;
        }

        debug!(tid, iteration, state, "executing");
        let result = workload.execute(state, &mut worker, &ctx).await;
        iterations_run += 1;
        *state_counts.entry(state.to_string()).or_insert(0) += 1;

        if trace {
            entries.push(TraceEntry {
                tid,
                iteration,
                state: state.to_string(),
                outcome: match &result {
                    Ok(()) => "ok".to_string(),
                    Err(err) => err.to_string(),
                },
            });
        }

        if let Err(err) = result {
            error!(tid, iteration, state, error = %err, "worker failed");
            stop.store(true, Ordering::Release);
            failure = Some(WorkerFailure::from_error(tid, iteration, state, &err));
            break;
        }

        if iteration + 1 == iterations {
            break;
        }
        match next_state(&table, state, &mut rng) {
            Some(next) => state = next,
            None => {
                warn!(tid, state, "no transition out of state");
                stop.store(true, Ordering::Release);
                failure = Some(WorkerFailure::other(
                    tid,
                    iteration,
                    state,
                    format!("no transition out of state '{}'", state),
                ));
                break;
            }
        }
    }

    WorkerRun {
        worker,
        report: WorkerReport {
            tid,
            iterations_run,
            state_counts,
            summary: serde_json::Value::Null,
        },
        failure,
        trace: entries,
    }
}

fn store_stats(built: &BuiltStore) -> serde_json::Value {
    json!({
        "store": built.memory.stats(),
        "faults": built.faulty.as_ref().map(|faulty| faulty.stats()),
    })
}

/// Run the workload a configuration names, against the store it describes.
pub async fn run_config(config: &RunConfig) -> Result<RunReport, HarnessError> {
    let defaults = fsmwl_workloads::defaults_for(&config.workload).ok_or_else(|| {
        fsmwl_config::ConfigError::UnknownWorkload(config.workload.clone())
    })?;
    let config = config.effective(defaults);
    config.validate_or_err()?;

    let options = RunOptions::from_config(&config)?;
    let built = build_store(&config.store, &config.faults, options.seed);

    let mut report = match config.workload.as_str() {
        update_inc::NAME => {
            Harness::new(UpdateInc::new(), built.store.clone(), options)
                .run()
                .await?
        }
        other => {
            return Err(fsmwl_config::ConfigError::UnknownWorkload(other.to_string()).into());
        }
    };
    report.store_stats = Some(store_stats(&built));
    Ok(report)
}
