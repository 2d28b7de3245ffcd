mod assert;
mod error;
mod traits;
mod types;
mod workload;

pub use assert::{AssertLevel, AssertionFailure, Assertions};
pub use error::{StoreError, WorkloadError};
pub use traits::DocStore;
pub use types::{
    CappedOptions, CollectionOptions, CollectionScope, DocId, Document, FieldName, Filter,
    Topology, Update, UpdateOptions, UpdateResult,
};
pub use workload::{
    SetupContext, StateContext, StateName, TransitionError, TransitionTable, Workload,
};
