//! Store collaborator: schema lookups, reads, key generation and atomic commits.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::StoreError;
use crate::query::{FilterExpr, OrderBy};
use crate::schema::{Instance, SchemaModel};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Row selection pushed down to the store; projection and expansion happen above it.
#[derive(Clone, Debug, Default)]
pub struct StoreQuery {
    pub filter: Option<FilterExpr>,
    pub order_by: Vec<OrderBy>,
    pub skip: Option<u64>,
    pub top: Option<u64>,
}

/// One row-level change. `values` of an update holds only the modified columns.
#[derive(Clone, Debug, PartialEq)]
pub enum Change {
    Insert {
        entity_type: String,
        row: Instance,
    },
    Update {
        entity_type: String,
        key: Value,
        values: Instance,
    },
    Delete {
        entity_type: String,
        key: Value,
    },
}

#[async_trait]
pub trait Store: Send + Sync {
    fn schema(&self) -> &Arc<SchemaModel>;

    async fn find(&self, entity_type: &str, key: &Value) -> Result<Option<Instance>, StoreError>;

    /// Rows of `entity_type` whose `property` equals `value` (collection navigation loads).
    async fn find_by(&self, entity_type: &str, property: &str, value: &Value) -> Result<Vec<Instance>, StoreError>;

    async fn query(&self, entity_type: &str, query: &StoreQuery) -> Result<Vec<Instance>, StoreError>;

    async fn count(&self, entity_type: &str, filter: Option<&FilterExpr>) -> Result<u64, StoreError>;

    /// Next value for a store-generated integer key.
    async fn next_key(&self, entity_type: &str) -> Result<Value, StoreError>;

    /// Apply all changes atomically; returns the number of rows affected.
    async fn apply(&self, changes: Vec<Change>) -> Result<u64, StoreError>;
}

/// Canonical identity of a key value, used for identity maps and row indexes.
pub fn key_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.to_string(),
        },
        other => other.to_string(),
    }
}
