use crate::assert::AssertionFailure;

/// Errors that can occur in store operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// A document with the same id already exists.
    #[error("Duplicate key '{id}' in collection '{collection}'")]
    DuplicateKey { collection: String, id: String },

    /// A write would change the size of a document in a capped collection.
    #[error("Cannot change the size of document '{id}' in capped collection '{collection}' ({before} -> {after} fields)")]
    CappedSizeChange {
        collection: String,
        id: String,
        before: usize,
        after: usize,
    },

    /// Collection already exists.
    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    /// Document-level conflict retries were exhausted.
    #[error("Write conflict on '{id}' in '{collection}' persisted after {attempts} attempts")]
    WriteConflict {
        collection: String,
        id: String,
        attempts: u32,
    },

    /// Connection to the store failed.
    #[error("Connection to store '{store}' failed")]
    ConnectionFailed {
        store: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out on collection: {collection}")]
    Timeout {
        operation: String,
        collection: String,
    },

    /// Other store-specific error.
    #[error("Store error: {0}")]
    Other(String),
}

impl StoreError {
    /// Returns true if this error is transient and the operation may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::ConnectionFailed { .. }
                | StoreError::Timeout { .. }
                | StoreError::WriteConflict { .. }
        )
    }
}

/// Errors raised by a workload while it runs.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum WorkloadError {
    /// A correctness check failed. Always fatal.
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),

    /// The store rejected or failed an operation.
    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),

    /// The driver asked for a state the workload does not define.
    #[error("Unknown state: {0}")]
    UnknownState(String),

    /// One-time preparation failed.
    #[error("Setup failed: {0}")]
    Setup(String),
}

impl WorkloadError {
    /// True for invariant violations, as opposed to operational failures.
    pub fn is_assertion(&self) -> bool {
        matches!(self, WorkloadError::Assertion(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert::AssertLevel;

    #[test]
    fn test_store_is_transient_timeout() {
        let err = StoreError::Timeout {
            operation: "update".to_string(),
            collection: "c".to_string(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn test_store_is_transient_connection_failed() {
        let err = StoreError::ConnectionFailed {
            store: "memory".to_string(),
            source: Box::new(std::io::Error::other("conn err")),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn test_store_not_transient_capped() {
        let err = StoreError::CappedSizeChange {
            collection: "c".to_string(),
            id: "x".to_string(),
            before: 2,
            after: 3,
        };
        assert!(!err.is_transient());
        assert!(err.to_string().contains("2 -> 3"));
    }

    #[test]
    fn test_workload_from_store_error() {
        let err: WorkloadError = StoreError::CollectionExists("c".to_string()).into();
        assert!(matches!(err, WorkloadError::Store(StoreError::CollectionExists(_))));
        assert!(!err.is_assertion());
    }

    #[test]
    fn test_workload_from_assertion() {
        let failure = AssertionFailure {
            level: AssertLevel::Always,
            check: "eq".to_string(),
            message: "expected 0, got 1".to_string(),
            details: None,
        };
        let err: WorkloadError = failure.into();
        assert!(err.is_assertion());
        assert!(err.to_string().contains("expected 0, got 1"));
    }
}
