//! Document store adapter
//!
//! Documents are JSON objects addressed by `(collection, id)`. Field paths are
//! dotted (`password_policy.failed_login_attempts`).

pub mod memory;
pub mod postgres;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub mod collections {
    pub const USERS: &str = "users";
    pub const USER_EMAILS: &str = "user_emails";
    pub const ADMIN_USERS: &str = "admin_users";
    pub const ADMIN_EMAILS: &str = "admin_emails";
    pub const ADMIN_SESSIONS: &str = "admin_sessions";
    pub const ADMIN_AUDIT_LOGS: &str = "admin_audit_logs";
    pub const ORDERS: &str = "orders";
    pub const INVOICES: &str = "invoices";
    pub const INVOICE_NUMBERS: &str = "invoice_numbers";
    pub const INVOICE_ORDERS: &str = "invoice_orders";
    pub const PROMOTIONS: &str = "promotions";
    pub const PROMOTION_USAGE: &str = "promotion_usage";
    pub const PROMOTION_CODES: &str = "promotion_codes";
    pub const CATEGORIES: &str = "categories";
    pub const SETTINGS: &str = "settings";
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("document {collection}/{id} already exists")]
    AlreadyExists { collection: String, id: String },

    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("document {collection}/{id} is malformed: {source}")]
    Malformed { collection: String, id: String, #[source] source: serde_json::Error },

    #[error("cannot encode document: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("field path `{0}` does not address an object field")]
    InvalidPath(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self { Self::Backend(err.to_string()) }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq)]
pub struct Document { pub id: String, pub data: Value }

impl Document {
    pub fn decode<T: DeserializeOwned>(&self, collection: &str) -> StoreResult<T> {
        serde_json::from_value(self.data.clone()).map_err(|source| StoreError::Malformed {
            collection: collection.to_string(),
            id: self.id.clone(),
            source,
        })
    }

    /// Decodes with the document id injected as `id`, for records written by
    /// clients that keep the id only in the key.
    pub fn decode_with_id<T: DeserializeOwned>(&self, collection: &str) -> StoreResult<T> {
        let mut data = self.data.clone();
        if let Value::Object(map) = &mut data {
            map.insert("id".into(), Value::String(self.id.clone()));
        }
        serde_json::from_value(data).map_err(|source| StoreError::Malformed {
            collection: collection.to_string(),
            id: self.id.clone(),
            source,
        })
    }
}

pub fn encode<T: Serialize>(value: &T) -> StoreResult<Value> { Ok(serde_json::to_value(value)?) }

#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp { Set(Value), Delete, Increment(i64) }

#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate { pub path: String, pub op: FieldOp }

impl FieldUpdate {
    pub fn set(path: impl Into<String>, value: Value) -> Self { Self { path: path.into(), op: FieldOp::Set(value) } }
    pub fn delete(path: impl Into<String>) -> Self { Self { path: path.into(), op: FieldOp::Delete } }
    pub fn increment(path: impl Into<String>, by: i64) -> Self { Self { path: path.into(), op: FieldOp::Increment(by) } }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
    Gte(String, Value),
    Lt(String, Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction { Asc, Desc }

#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self { Self::default() }

    pub fn eq(mut self, path: impl Into<String>, value: Value) -> Self {
        self.filters.push(Filter::Eq(path.into(), value));
        self
    }

    pub fn any_of(mut self, path: impl Into<String>, values: Vec<Value>) -> Self {
        self.filters.push(Filter::In(path.into(), values));
        self
    }

    pub fn gte(mut self, path: impl Into<String>, value: Value) -> Self {
        self.filters.push(Filter::Gte(path.into(), value));
        self
    }

    pub fn lt(mut self, path: impl Into<String>, value: Value) -> Self {
        self.filters.push(Filter::Lt(path.into(), value));
        self
    }

    pub fn order_by(mut self, path: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((path.into(), direction));
        self
    }

    pub fn offset(mut self, offset: usize) -> Self { self.offset = offset; self }
    pub fn limit(mut self, limit: usize) -> Self { self.limit = Some(limit); self }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Create { collection: String, id: String, data: Value },
    Set { collection: String, id: String, data: Value },
    Update { collection: String, id: String, fields: Vec<FieldUpdate> },
    Delete { collection: String, id: String },
}

/// Writes committed together or not at all.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch { ops: Vec<WriteOp> }

impl WriteBatch {
    pub fn new() -> Self { Self::default() }

    pub fn create(&mut self, collection: &str, id: &str, data: Value) -> &mut Self {
        self.ops.push(WriteOp::Create { collection: collection.into(), id: id.into(), data });
        self
    }

    pub fn set(&mut self, collection: &str, id: &str, data: Value) -> &mut Self {
        self.ops.push(WriteOp::Set { collection: collection.into(), id: id.into(), data });
        self
    }

    pub fn update(&mut self, collection: &str, id: &str, fields: Vec<FieldUpdate>) -> &mut Self {
        self.ops.push(WriteOp::Update { collection: collection.into(), id: id.into(), fields });
        self
    }

    /// Removing a missing document is not an error.
    pub fn delete(&mut self, collection: &str, id: &str) -> &mut Self {
        self.ops.push(WriteOp::Delete { collection: collection.into(), id: id.into() });
        self
    }

    pub fn len(&self) -> usize { self.ops.len() }
    pub fn is_empty(&self) -> bool { self.ops.is_empty() }
    pub fn into_ops(self) -> Vec<WriteOp> { self.ops }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Fails with [`StoreError::AlreadyExists`] when the id is taken.
    async fn create(&self, collection: &str, id: &str, data: Value) -> StoreResult<()>;

    async fn set(&self, collection: &str, id: &str, data: Value) -> StoreResult<()>;

    /// Applies all field updates atomically and returns the resulting document.
    async fn update(&self, collection: &str, id: &str, fields: &[FieldUpdate]) -> StoreResult<Document>;

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<bool>;

    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>>;

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()>;

    async fn find_one(&self, collection: &str, query: Query) -> StoreResult<Option<Document>> {
        Ok(self.query(collection, &query.limit(1)).await?.into_iter().next())
    }
}

pub(crate) fn split_path(path: &str) -> Vec<String> { path.split('.').map(str::to_string).collect() }
