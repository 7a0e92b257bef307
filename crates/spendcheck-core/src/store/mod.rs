//! Document store access
//!
//! User data lives in a schemaless, per-user document tree:
//!
//! - `users/{uid}` - user profile (device token)
//! - `users/{uid}/transactions/{id}` - transactions
//! - `users/{uid}/budgets/{month}` - monthly budgets
//!
//! Two implementations sit behind [`DocumentStore`]:
//! - [`FirestoreStore`] - Firestore REST API (production)
//! - [`LocalStore`] - SQLite file, optionally SQLCipher-encrypted (development, CLI, tests)
//!
//! # Configuration
//!
//! - `SPENDCHECK_STORE`: `firestore` or `local` (default)

mod firestore;
mod local;
mod value;

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

pub use firestore::FirestoreStore;
pub use local::{LocalStore, DB_KEY_ENV};
pub use value::{
    fields_from_firestore, fields_to_firestore, fields_to_json, merge_field_paths, merge_fields,
    FieldValue, Fields,
};

/// A stored document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Last path segment
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_str)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(FieldValue::as_f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl FilterOp {
    /// Firestore `FieldFilter.Operator` name
    pub fn as_firestore(&self) -> &'static str {
        match self {
            FilterOp::Eq => "EQUAL",
            FilterOp::Lt => "LESS_THAN",
            FilterOp::Lte => "LESS_THAN_OR_EQUAL",
            FilterOp::Gt => "GREATER_THAN",
            FilterOp::Gte => "GREATER_THAN_OR_EQUAL",
        }
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            FilterOp::Eq => ordering == Ordering::Equal,
            FilterOp::Lt => ordering == Ordering::Less,
            FilterOp::Lte => ordering != Ordering::Greater,
            FilterOp::Gt => ordering == Ordering::Greater,
            FilterOp::Gte => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: FieldValue,
}

impl FieldFilter {
    /// Missing fields and incomparable kinds never match
    pub fn matches(&self, doc: &Document) -> bool {
        doc.get(&self.field)
            .and_then(|v| v.compare(&self.value))
            .is_some_and(|ord| self.op.accepts(ord))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    pub fn as_firestore(&self) -> &'static str {
        match self {
            Direction::Ascending => "ASCENDING",
            Direction::Descending => "DESCENDING",
        }
    }
}

/// Collection query: AND of field filters, optional ordering and limit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<FieldFilter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: &str, op: FilterOp, value: impl Into<FieldValue>) -> Self {
        self.filters.push(FieldFilter {
            field: field.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// Evaluate the query over documents held in memory.
    ///
    /// Like Firestore, ordering by a field drops documents without it.
    pub fn apply(&self, docs: Vec<Document>) -> Vec<Document> {
        let mut docs: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();

        if let Some((field, direction)) = &self.order_by {
            docs.retain(|d| d.get(field).is_some());
            docs.sort_by(|a, b| {
                let ord = match (a.get(field), b.get(field)) {
                    (Some(x), Some(y)) => x.compare(y).unwrap_or(Ordering::Equal),
                    _ => Ordering::Equal,
                };
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        docs
    }
}

/// Operations the domain layer needs from a document database
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one document; `None` when it does not exist
    async fn get(&self, path: &str) -> Result<Option<Document>>;

    /// Write a document. With `merge`, nested maps merge into the existing
    /// document; otherwise the document is replaced.
    async fn set(&self, path: &str, fields: Fields, merge: bool) -> Result<()>;

    /// Add a document with a generated id, returning the id
    async fn create(&self, collection: &str, fields: Fields) -> Result<String>;

    /// Delete a document; deleting a missing document is not an error
    async fn delete(&self, path: &str) -> Result<()>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>>;

    /// Ids of the documents in a collection
    async fn list_documents(&self, collection: &str) -> Result<Vec<String>>;
}

/// Store selected at runtime
#[derive(Clone)]
pub enum StoreClient {
    Firestore(FirestoreStore),
    Local(LocalStore),
}

impl StoreClient {
    /// Build the store named by `SPENDCHECK_STORE`.
    ///
    /// `local_path` is used for the local store; `encrypt` requires
    /// `SPENDCHECK_DB_KEY`.
    pub fn from_env(local_path: &str, encrypt: bool) -> Result<Self> {
        let kind = std::env::var("SPENDCHECK_STORE").unwrap_or_else(|_| "local".to_string());
        match kind.to_lowercase().as_str() {
            "firestore" => Ok(StoreClient::Firestore(FirestoreStore::from_env()?)),
            "local" | "" => {
                let store = if encrypt {
                    LocalStore::new(local_path)?
                } else {
                    LocalStore::new_unencrypted(local_path)?
                };
                Ok(StoreClient::Local(store))
            }
            other => Err(Error::InvalidData(format!(
                "Unknown SPENDCHECK_STORE '{}'. Use 'firestore' or 'local'.",
                other
            ))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StoreClient::Firestore(_) => "firestore",
            StoreClient::Local(_) => "local",
        }
    }

    /// Human-readable location for status output
    pub fn describe(&self) -> String {
        match self {
            StoreClient::Firestore(s) => format!("firestore project {}", s.project_id()),
            StoreClient::Local(s) => {
                let encryption = if s.is_encrypted() { "encrypted" } else { "unencrypted" };
                format!("local {} ({})", s.path(), encryption)
            }
        }
    }
}

#[async_trait]
impl DocumentStore for StoreClient {
    async fn get(&self, path: &str) -> Result<Option<Document>> {
        match self {
            StoreClient::Firestore(s) => s.get(path).await,
            StoreClient::Local(s) => s.get(path).await,
        }
    }

    async fn set(&self, path: &str, fields: Fields, merge: bool) -> Result<()> {
        match self {
            StoreClient::Firestore(s) => s.set(path, fields, merge).await,
            StoreClient::Local(s) => s.set(path, fields, merge).await,
        }
    }

    async fn create(&self, collection: &str, fields: Fields) -> Result<String> {
        match self {
            StoreClient::Firestore(s) => s.create(collection, fields).await,
            StoreClient::Local(s) => s.create(collection, fields).await,
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        match self {
            StoreClient::Firestore(s) => s.delete(path).await,
            StoreClient::Local(s) => s.delete(path).await,
        }
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        match self {
            StoreClient::Firestore(s) => s.query(collection, query).await,
            StoreClient::Local(s) => s.query(collection, query).await,
        }
    }

    async fn list_documents(&self, collection: &str) -> Result<Vec<String>> {
        match self {
            StoreClient::Firestore(s) => s.list_documents(collection).await,
            StoreClient::Local(s) => s.list_documents(collection).await,
        }
    }
}

/// A single path segment: non-empty, not `.` or `..`, no `/`
pub(crate) fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty() && segment != "." && segment != ".." && !segment.contains('/')
}

/// Split a document path into (collection path, document id).
///
/// Document paths have an even number of valid segments.
pub(crate) fn split_document_path(path: &str) -> Result<(&str, &str)> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() < 2
        || segments.len() % 2 != 0
        || !segments.iter().all(|s| is_valid_segment(s))
    {
        return Err(Error::InvalidData(format!("Invalid document path: {}", path)));
    }
    match path.rsplit_once('/') {
        Some((collection, id)) => Ok((collection, id)),
        None => Err(Error::InvalidData(format!("Invalid document path: {}", path))),
    }
}

/// Collection paths have an odd number of valid segments
pub(crate) fn validate_collection_path(path: &str) -> Result<()> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() % 2 == 0 || !segments.iter().all(|s| is_valid_segment(s)) {
        return Err(Error::InvalidData(format!(
            "Invalid collection path: {}",
            path
        )));
    }
    Ok(())
}

/// Generate a 20-character document id
pub(crate) fn generate_document_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let count = COUNTER.fetch_add(1, AtomicOrdering::SeqCst);

    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(count.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(20);
    id
}
