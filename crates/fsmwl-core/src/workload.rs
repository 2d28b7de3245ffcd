use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::assert::Assertions;
use crate::error::WorkloadError;
use crate::traits::DocStore;
use crate::types::Topology;

/// Name of a state in a workload's graph.
pub type StateName = &'static str;

/// Handles passed to every state function.
#[derive(Clone)]
pub struct StateContext {
    pub store: Arc<dyn DocStore>,
    pub collection: String,
    pub topology: Topology,
    pub asserts: Assertions,
}

/// Handles passed to the one-time setup and teardown hooks.
#[derive(Clone)]
pub struct SetupContext {
    pub store: Arc<dyn DocStore>,
    pub collection: String,
    /// Total number of workers that will run.
    pub thread_count: usize,
    pub topology: Topology,
    pub asserts: Assertions,
}

impl SetupContext {
    /// The view a worker gets of the same run.
    pub fn state_context(&self) -> StateContext {
        StateContext {
            store: self.store.clone(),
            collection: self.collection.clone(),
            topology: self.topology,
            asserts: self.asserts,
        }
    }
}

/// Problems with a transition table.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransitionError {
    #[error("Initial state '{0}' is not defined by the workload")]
    UndefinedInitial(String),

    #[error("Transition references undefined state '{0}'")]
    UndefinedState(String),

    #[error("State '{0}' is reachable but has no outgoing transitions")]
    NoOutgoing(String),

    #[error("Transition {from} -> {to} has invalid weight {weight}")]
    InvalidWeight {
        from: String,
        to: String,
        weight: f64,
    },
}

/// Weighted state graph: for each state, the possible next states and their
/// relative probabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionTable {
    initial: StateName,
    edges: IndexMap<StateName, Vec<(StateName, f64)>>,
}

impl TransitionTable {
    pub fn new(initial: StateName) -> Self {
        TransitionTable {
            initial,
            edges: IndexMap::new(),
        }
    }

    /// Builder-style edge insertion.
    pub fn edge(mut self, from: StateName, to: StateName, weight: f64) -> Self {
        self.edges.entry(from).or_default().push((to, weight));
        self
    }

    pub fn initial(&self) -> StateName {
        self.initial
    }

    /// Outgoing edges of `from`, if any.
    pub fn next_states(&self, from: &str) -> Option<&[(StateName, f64)]> {
        self.edges.get(from).map(Vec::as_slice)
    }

    /// Check the table against the states a workload implements.
    ///
    /// Every weight must be finite and positive, every named state must be
    /// defined, and every state reachable from the initial one must have a
    /// way out (workers stop on their iteration budget, not on a terminal).
    pub fn validate(&self, defined: &[StateName]) -> Result<(), TransitionError> {
        if !defined.contains(&self.initial) {
            return Err(TransitionError::UndefinedInitial(self.initial.to_string()));
        }

        for (from, targets) in &self.edges {
            if !defined.contains(from) {
                return Err(TransitionError::UndefinedState(from.to_string()));
            }
            for (to, weight) in targets {
                if !defined.contains(to) {
                    return Err(TransitionError::UndefinedState(to.to_string()));
                }
                if !weight.is_finite() || *weight <= 0.0 {
                    return Err(TransitionError::InvalidWeight {
                        from: from.to_string(),
                        to: to.to_string(),
                        weight: *weight,
                    });
                }
            }
        }

        let mut seen = HashSet::new();
        let mut stack = vec![self.initial];
        while let Some(state) = stack.pop() {
            if !seen.insert(state) {
                continue;
            }
            match self.edges.get(state) {
                Some(targets) if !targets.is_empty() => {
                    stack.extend(targets.iter().map(|(to, _)| *to));
                }
                _ => return Err(TransitionError::NoOutgoing(state.to_string())),
            }
        }

        Ok(())
    }
}

/// A finite-state-machine workload.
///
/// The driver calls [`Workload::setup`] once, creates one worker per thread
/// with [`Workload::new_worker`], then repeatedly calls [`Workload::execute`]
/// for each worker, starting at the table's initial state and following
/// [`Workload::transitions`]. Worker state is owned by exactly one worker and
/// is handed in by `&mut` on every call.
#[async_trait]
pub trait Workload: Send + Sync + 'static {
    /// Per-worker local state.
    type Worker: Send + Sync + 'static;

    fn name(&self) -> &str;

    fn default_thread_count(&self) -> usize;

    fn default_iterations(&self) -> usize;

    /// Every state [`Workload::execute`] accepts.
    fn states(&self) -> &'static [StateName];

    fn transitions(&self) -> TransitionTable;

    fn new_worker(&self, tid: usize) -> Self::Worker;

    /// Prepare shared state before any worker starts.
    async fn setup(&self, ctx: &SetupContext) -> Result<(), WorkloadError>;

    /// Run `state` for one worker.
    async fn execute(
        &self,
        state: StateName,
        worker: &mut Self::Worker,
        ctx: &StateContext,
    ) -> Result<(), WorkloadError>;

    /// Whole-run consistency check once every worker has stopped cleanly.
    async fn check_final(
        &self,
        _workers: &[Self::Worker],
        _ctx: &StateContext,
    ) -> Result<(), WorkloadError> {
        Ok(())
    }

    async fn teardown(&self, _ctx: &SetupContext) -> Result<(), WorkloadError> {
        Ok(())
    }

    /// Worker details to include in a run report.
    fn summarize(&self, _worker: &Self::Worker) -> serde_json::Value {
        serde_json::Value::Null
    }
}
