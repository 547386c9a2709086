//! Document store driver interface and the in-memory reference store.

mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::error::Result;
use crate::query::Query;

pub use memory::MemoryStore;

/// A stored document.
pub type Document = Value;

/// Lazy, single-pass sequence of query results.
pub type DocumentStream = BoxStream<'static, Result<Document>>;

/// Executes queries assembled by a [`QueryBuilder`](crate::query::QueryBuilder).
///
/// Failures are returned as-is; the adapter never retries or translates them.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Number of documents matching the query's criteria, ignoring skip and limit.
    async fn count(&self, query: &Query) -> Result<u64>;

    /// Matching documents after sort, skip, limit and projection.
    async fn find(&self, query: &Query) -> Result<DocumentStream>;
}

/// Read the value at a dotted path. Arrays met on the way are mapped over,
/// so `tags.name` on `{"tags": [{"name": "a"}, {"name": "b"}]}` yields `["a", "b"]`.
pub fn lookup(doc: &Value, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => match doc {
            Value::Object(map) => map.get(path).cloned(),
            Value::Array(items) => {
                let values: Vec<Value> = items.iter().filter_map(|v| lookup(v, path)).collect();
                (!values.is_empty()).then_some(Value::Array(values))
            }
            _ => None,
        },
        Some((head, rest)) => match doc {
            Value::Object(map) => map.get(head).and_then(|v| lookup(v, rest)),
            Value::Array(items) => {
                let values: Vec<Value> = items.iter().filter_map(|v| lookup(v, path)).collect();
                (!values.is_empty()).then_some(Value::Array(values))
            }
            _ => None,
        },
    }
}
