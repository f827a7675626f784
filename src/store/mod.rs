// src/store/mod.rs

//! Document store adapter.
//!
//! The engines never talk to a database directly. They address individual
//! documents by path, stage writes inside optimistic transactions or batches,
//! and let a [`DocumentStore`] backend apply them atomically.
//!
//! Two backends ship with the crate:
//! - [`MemoryStore`] for embedded use and tests
//! - [`PgStore`] which keeps every document as a JSONB row in Postgres

mod document;
mod memory;
mod postgres;
mod transaction;
mod watch;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

pub use document::{FieldOp, FieldTransform, apply_write, compare_values, read_field};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use transaction::{Transaction, TxRunner, WriteBatch};
pub use watch::{DocWatch, QueryWatch};

/// Default upper bound on writes committed in one batch or transaction.
pub const DEFAULT_MAX_BATCH_WRITES: usize = 500;

/// Errors raised by store backends and the transaction layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The document addressed by an update does not exist.
    #[error("Document not found: {0}")]
    NotFound(DocPath),

    /// A document read inside a transaction changed before commit.
    #[error("Concurrent modification of {0}")]
    Conflict(DocPath),

    /// Optimistic retries were used up without a clean commit.
    #[error("Transaction aborted after {attempts} conflicting attempts")]
    RetryExhausted { attempts: u32 },

    /// More writes were staged than the backend accepts in one commit.
    #[error("Batch of {staged} writes exceeds the limit of {limit}")]
    BatchTooLarge { staged: usize, limit: usize },

    /// A path did not address a document or a collection.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A field path or transform could not be applied to the document shape.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    /// A transaction tried to read after staging a write.
    #[error("Transaction reads must happen before writes ({0})")]
    ReadAfterWrite(DocPath),

    /// A document could not be converted from or to its typed form.
    #[error("Serialization error at {path}: {message}")]
    Serialization { path: String, message: String },

    /// The backend itself failed.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// The change feed was shut down.
    #[error("Change feed closed")]
    Closed,
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Path of a collection, e.g. `classes/c1/members`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionPath(String);

/// Path of a single document, e.g. `classes/c1/members/u1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocPath(String);

fn segments_valid(path: &str) -> bool {
    !path.is_empty() && path.split('/').all(|s| !s.is_empty())
}

impl CollectionPath {
    /// A top-level collection such as `users`.
    pub fn root(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn parse(path: &str) -> Result<Self, StoreError> {
        if segments_valid(path) && path.split('/').count() % 2 == 1 {
            Ok(Self(path.to_string()))
        } else {
            Err(StoreError::InvalidPath(path.to_string()))
        }
    }

    /// Document `id` inside this collection.
    pub fn doc(&self, id: &str) -> DocPath {
        DocPath(format!("{}/{}", self.0, id))
    }

    /// Last segment, used for collection-group queries.
    pub fn collection_id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The document owning this sub-collection, if any.
    pub fn parent_doc(&self) -> Option<DocPath> {
        self.0.rsplit_once('/').map(|(parent, _)| DocPath(parent.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl DocPath {
    pub fn parse(path: &str) -> Result<Self, StoreError> {
        if segments_valid(path) && path.split('/').count() % 2 == 0 {
            Ok(Self(path.to_string()))
        } else {
            Err(StoreError::InvalidPath(path.to_string()))
        }
    }

    /// Document id (last segment).
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn parent(&self) -> CollectionPath {
        match self.0.rsplit_once('/') {
            Some((parent, _)) => CollectionPath(parent.to_string()),
            None => CollectionPath(String::new()),
        }
    }

    /// Sub-collection `name` under this document.
    pub fn collection(&self, name: &str) -> CollectionPath {
        CollectionPath(format!("{}/{}", self.0, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored document together with the version observed when it was read.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: DocPath,
    pub data: Value,
    pub version: u64,
}

impl Document {
    pub fn id(&self) -> &str {
        self.path.id()
    }

    /// Deserializes the document body into a typed model.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(self.data.clone()).map_err(|e| StoreError::Serialization {
            path: self.path.to_string(),
            message: e.to_string(),
        })
    }
}

/// A single staged mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Replace the document (or merge into it when `merge` is set), then apply `transforms`.
    Set {
        path: DocPath,
        data: Value,
        merge: bool,
        transforms: Vec<FieldTransform>,
    },
    /// Apply transforms to an existing document. Fails with `NotFound` otherwise.
    Update {
        path: DocPath,
        transforms: Vec<FieldTransform>,
    },
    Delete {
        path: DocPath,
    },
}

impl Write {
    pub fn path(&self) -> &DocPath {
        match self {
            Write::Set { path, .. } | Write::Update { path, .. } | Write::Delete { path } => path,
        }
    }
}

/// Commit-time guard: the document must still be at `version` (`None` = absent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
    pub path: DocPath,
    pub version: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryTarget {
    Collection(CollectionPath),
    /// Every collection whose last segment equals the given id.
    Group(String),
}

impl QueryTarget {
    pub fn matches(&self, collection: &CollectionPath) -> bool {
        match self {
            QueryTarget::Collection(path) => path == collection,
            QueryTarget::Group(id) => collection.collection_id() == id,
        }
    }
}

/// Equality/range filters, one ordering and a limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub target: QueryTarget,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(path: CollectionPath) -> Self {
        Self {
            target: QueryTarget::Collection(path),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn group(collection_id: &str) -> Self {
        Self {
            target: QueryTarget::Group(collection_id.to_string()),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn filter(mut self, field: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn where_eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Upserted,
    Deleted,
}

/// Broadcast after every committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: DocPath,
    pub kind: ChangeKind,
}

/// Backend contract for the document store.
///
/// Implementations must make `commit` atomic: either every precondition holds
/// and every write is applied, or nothing changes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads one document.
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError>;

    /// Runs a filtered, ordered, limited query.
    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Applies `writes` in order if every precondition still holds.
    ///
    /// # Errors
    /// - `Conflict` if a precondition no longer holds
    /// - `NotFound` if an `Update` targets a missing document
    /// - `BatchTooLarge` if `writes` exceeds [`DocumentStore::max_batch_writes`]
    async fn commit(&self, preconditions: &[Precondition], writes: &[Write]) -> Result<(), StoreError>;

    /// Receiver for change notifications of subsequent commits.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;

    fn max_batch_writes(&self) -> usize {
        DEFAULT_MAX_BATCH_WRITES
    }
}
