use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use fsmwl_config::CollectionScope;

/// Primary key of a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(String);

impl DocId {
    pub fn new(id: impl Into<String>) -> Self {
        DocId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of an integer field inside a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldName(String);

impl FieldName {
    pub fn new(name: impl Into<String>) -> Self {
        FieldName(name.into())
    }

    /// The field owned by worker `tid`: `t0`, `t1`, ...
    pub fn for_worker(tid: usize) -> Self {
        FieldName(format!("t{}", tid))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document with integer-valued fields, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: DocId,
    #[serde(flatten)]
    pub fields: IndexMap<FieldName, i64>,
}

impl Document {
    pub fn new(id: DocId) -> Self {
        Document {
            id,
            fields: IndexMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, field: FieldName, value: i64) -> Self {
        self.fields.insert(field, value);
        self
    }

    pub fn get(&self, field: &FieldName) -> Option<i64> {
        self.fields.get(field).copied()
    }

    /// Number of fields, excluding the id. Capped collections keep this fixed.
    pub fn size(&self) -> usize {
        self.fields.len()
    }
}

/// Which documents an operation targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    All,
    Id(DocId),
}

impl Filter {
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Id(id) => doc.id == *id,
        }
    }
}

/// Update operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Update {
    /// Add each amount to its field, creating absent fields from zero.
    Inc(Vec<(FieldName, i64)>),
}

impl Update {
    /// Increment a single field by one.
    pub fn inc_one(field: FieldName) -> Self {
        Update::Inc(vec![(field, 1)])
    }

    /// Apply the update in place. Returns true when the document changed.
    pub fn apply(&self, doc: &mut Document) -> bool {
        match self {
            Update::Inc(pairs) => {
                let mut changed = false;
                for (field, by) in pairs {
                    match doc.fields.get_mut(field) {
                        Some(slot) if *by != 0 => {
                            *slot = slot.saturating_add(*by);
                            changed = true;
                        }
                        Some(_) => {}
                        None => {
                            doc.fields.insert(field.clone(), *by);
                            changed = true;
                        }
                    }
                }
                changed
            }
        }
    }

    /// Fields this update would create on `doc`.
    pub fn new_fields<'a>(&'a self, doc: &Document) -> Vec<&'a FieldName> {
        match self {
            Update::Inc(pairs) => pairs
                .iter()
                .map(|(field, _)| field)
                .filter(|field| !doc.fields.contains_key(*field))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpdateOptions {
    /// Insert a new document when nothing matches.
    pub upsert: bool,
    /// Update every matching document instead of the first.
    pub multi: bool,
}

/// Counts reported by a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpdateResult {
    pub n_matched: u64,
    pub n_modified: u64,
    pub n_upserted: u64,
}

impl UpdateResult {
    pub fn new(n_matched: u64, n_modified: u64, n_upserted: u64) -> Self {
        UpdateResult {
            n_matched,
            n_modified,
            n_upserted,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

/// Capped collection options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CappedOptions {
    pub max_docs: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CollectionOptions {
    pub capped: Option<CappedOptions>,
}

/// Capability answer supplied by whoever drives the workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    /// Concurrent writers to one document are serialized and retried inside
    /// the store, so a live document is always found by a well-formed query.
    pub document_level_concurrency: bool,
}

impl Topology {
    pub const fn document_level() -> Self {
        Topology {
            document_level_concurrency: true,
        }
    }

    pub const fn collection_level() -> Self {
        Topology {
            document_level_concurrency: false,
        }
    }
}

impl From<fsmwl_config::TopologyConfig> for Topology {
    fn from(cfg: fsmwl_config::TopologyConfig) -> Self {
        Topology {
            document_level_concurrency: cfg.document_level_concurrency,
        }
    }
}
