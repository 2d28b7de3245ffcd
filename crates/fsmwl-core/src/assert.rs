//! Assertion levels.
//!
//! Checks that compare against shared state are only deterministic when the
//! run has exclusive use of that state. Each check declares the least
//! exclusive scope under which it is still meaningful; a check whose level
//! is not satisfied by the current [`CollectionScope`] is skipped.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::types::CollectionScope;

/// When a check is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertLevel {
    /// Regardless of what else shares the store
    Always,
    /// Only when the run owns its database
    WhenOwnDb,
    /// Only when the run owns its collection
    WhenOwnColl,
}

impl AssertLevel {
    fn required_scope(self) -> CollectionScope {
        match self {
            AssertLevel::Always => CollectionScope::Shared,
            AssertLevel::WhenOwnDb => CollectionScope::OwnDb,
            AssertLevel::WhenOwnColl => CollectionScope::OwnColl,
        }
    }
}

impl fmt::Display for AssertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssertLevel::Always => "always",
            AssertLevel::WhenOwnDb => "when-own-db",
            AssertLevel::WhenOwnColl => "when-own-coll",
        };
        f.write_str(s)
    }
}

/// A failed check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("assertion ({level}) {check} failed: {message}{}", .details.as_ref().map(|d| format!(" : {}", d)).unwrap_or_default())]
pub struct AssertionFailure {
    pub level: AssertLevel,
    pub check: String,
    pub message: String,
    /// Context captured at the failure site, typically a JSON rendering of
    /// the store's response.
    pub details: Option<String>,
}

/// Evaluates checks against the scope the run was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assertions {
    scope: CollectionScope,
}

impl Assertions {
    pub fn new(scope: CollectionScope) -> Self {
        Assertions { scope }
    }

    pub fn scope(&self) -> CollectionScope {
        self.scope
    }

    /// Whether checks at `level` are enforced in this scope.
    pub fn enabled(&self, level: AssertLevel) -> bool {
        self.scope >= level.required_scope()
    }

    /// Require `actual == expected`.
    pub fn eq<T>(
        &self,
        level: AssertLevel,
        expected: T,
        actual: T,
        details: &str,
    ) -> Result<(), AssertionFailure>
    where
        T: PartialEq + fmt::Debug,
    {
        self.check(
            level,
            "eq",
            expected == actual,
            || format!("expected {:?}, got {:?}", expected, actual),
            details,
        )
    }

    /// Require `actual` to be one of `allowed`.
    pub fn contains<T>(
        &self,
        level: AssertLevel,
        actual: T,
        allowed: &[T],
        details: &str,
    ) -> Result<(), AssertionFailure>
    where
        T: PartialEq + fmt::Debug,
    {
        self.check(
            level,
            "contains",
            allowed.contains(&actual),
            || format!("{:?} is not one of {:?}", actual, allowed),
            details,
        )
    }

    /// Require `cond` to hold. `message` is only rendered on failure.
    pub fn check<F>(
        &self,
        level: AssertLevel,
        check: &str,
        cond: bool,
        message: F,
        details: &str,
    ) -> Result<(), AssertionFailure>
    where
        F: FnOnce() -> String,
    {
        if !self.enabled(level) {
            trace!(%level, check, scope = self.scope.as_str(), "assertion skipped");
            return Ok(());
        }
        if cond {
            return Ok(());
        }
        Err(AssertionFailure {
            level,
            check: check.to_string(),
            message: message(),
            details: if details.is_empty() {
                None
            } else {
                Some(details.to_string())
            },
        })
    }
}
