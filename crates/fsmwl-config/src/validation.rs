use crate::types::{ConcurrencyMode, RunConfig};
use crate::ConfigError;

impl RunConfig {
    /// Validate the configuration and return a list of errors.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.workload.trim().is_empty() {
            errors.push(ConfigError::InvalidConfig(
                "workload name must not be empty".to_string(),
            ));
        }

        if self.thread_count == Some(0) {
            errors.push(ConfigError::NotPositive("thread_count"));
        }

        if self.iterations == Some(0) {
            errors.push(ConfigError::NotPositive("iterations"));
        }

        if let Some(collection) = &self.collection {
            if collection.trim().is_empty() {
                errors.push(ConfigError::InvalidConfig(
                    "collection name must not be empty".to_string(),
                ));
            }
        }

        if let Some(capped) = &self.store.capped {
            if capped.max_docs == 0 {
                errors.push(ConfigError::NotPositive("store.capped.max_docs"));
            }
        }

        if self.store.concurrency == ConcurrencyMode::Document && self.store.conflict_retries == 0
        {
            errors.push(ConfigError::NotPositive("store.conflict_retries"));
        }

        for (name, rate) in self.faults.rates() {
            if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
                errors.push(ConfigError::RateOutOfRange(name, rate));
            }
        }

        // Claiming document-level guarantees over a store that lacks them would
        // turn legitimate misses into hard failures
        if let Some(topology) = &self.topology {
            if topology.document_level_concurrency
                && self.store.concurrency == ConcurrencyMode::Collection
            {
                errors.push(ConfigError::InvalidConfig(
                    "topology claims document-level concurrency but the store uses collection-level locking"
                        .to_string(),
                ));
            }
        }

        errors
    }

    /// Validate and return Ok(()) if valid, or Err with the first error.
    pub fn validate_or_err(&self) -> Result<(), ConfigError> {
        match self.validate().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
