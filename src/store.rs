//! Document-store capability consumed by the committer and the offering book.
//!
//! The store owns identity and time: ids are assigned on write and every
//! document is stamped by a [`MonotonicClock`], so no two documents written
//! through the same store share a `created_at`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("permission denied writing to '{0}'")]
    PermissionDenied(String),
    #[error("quota exceeded for '{0}'")]
    QuotaExceeded(String),
    #[error("invalid collection name '{0}'")]
    InvalidCollection(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub fields: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }

    /// Sorts in place. `createdAt` and `id` read the document metadata,
    /// anything else reads `fields`. The sort is stable.
    pub fn sort(&self, docs: &mut [Document]) {
        docs.sort_by(|a, b| {
            let ord = match self.field.as_str() {
                "createdAt" => a.created_at.cmp(&b.created_at),
                "id" => a.id.cmp(&b.id),
                key => compare_values(a.fields.get(key), b.fields.get(key)),
            };
            match self.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            }
        });
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

/// Collection names end up in file paths, so keep them boring.
pub fn check_collection(name: &str) -> StoreResult<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidCollection(name.to_string()))
    }
}

/// Hands out strictly increasing timestamps, even within one batch.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> DateTime<Utc> {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        let stamp = match *last {
            Some(prev) if now <= prev => prev + Duration::microseconds(1),
            _ => now,
        };
        *last = Some(stamp);
        stamp
    }

    /// Never hand out anything at or before `seen` (used when a store
    /// reloads documents written by an earlier process).
    pub fn observe(&self, seen: DateTime<Utc>) {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if last.map_or(true, |prev| seen > prev) {
            *last = Some(seen);
        }
    }
}

pub(crate) fn new_document_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates one document with a store-assigned id and timestamp.
    async fn put(&self, collection: &str, fields: Value) -> StoreResult<Document>;

    /// Creates every document or none of them.
    async fn batch_put(&self, collection: &str, docs: Vec<Value>) -> StoreResult<Vec<Document>>;

    async fn query(&self, collection: &str, order_by: &OrderBy) -> StoreResult<Vec<Document>>;
}

/// In-process store. Batches are applied under a single lock, so readers
/// never see half of one.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    clock: MonotonicClock,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(collection)
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn put(&self, collection: &str, fields: Value) -> StoreResult<Document> {
        let mut docs = self.batch_put(collection, vec![fields]).await?;
        docs.pop()
            .ok_or_else(|| StoreError::Unavailable("empty write result".into()))
    }

    async fn batch_put(&self, collection: &str, docs: Vec<Value>) -> StoreResult<Vec<Document>> {
        check_collection(collection)?;
        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        let written: Vec<Document> = docs
            .into_iter()
            .map(|fields| Document {
                id: new_document_id(),
                created_at: self.clock.next(),
                fields,
            })
            .collect();
        collections
            .entry(collection.to_string())
            .or_default()
            .extend(written.iter().cloned());
        debug!(collection, count = written.len(), "memory store batch applied");
        Ok(written)
    }

    async fn query(&self, collection: &str, order_by: &OrderBy) -> StoreResult<Vec<Document>> {
        check_collection(collection)?;
        let mut docs = self
            .collections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(collection)
            .cloned()
            .unwrap_or_default();
        order_by.sort(&mut docs);
        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clock_never_repeats() {
        let clock = MonotonicClock::new();
        let stamps: Vec<_> = (0..1000).map(|_| clock.next()).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn clock_respects_observed_future() {
        let clock = MonotonicClock::new();
        let future = Utc::now() + Duration::hours(1);
        clock.observe(future);
        assert!(clock.next() > future);
    }

    #[test]
    fn collection_names_are_restricted() {
        assert!(check_collection("offerings").is_ok());
        assert!(check_collection("sunday-school_2").is_ok());
        assert!(check_collection("").is_err());
        assert!(check_collection("../etc").is_err());
    }

    #[tokio::test]
    async fn query_orders_by_field_and_metadata() {
        let store = MemoryStore::new();
        store
            .batch_put(
                "offerings",
                vec![json!({"amount": 20.0}), json!({"amount": 5.0}), json!({})],
            )
            .await
            .unwrap();

        let by_amount = store
            .query("offerings", &OrderBy::asc("amount"))
            .await
            .unwrap();
        let amounts: Vec<_> = by_amount.iter().map(|d| d.fields.get("amount").cloned()).collect();
        assert_eq!(amounts, vec![None, Some(json!(5.0)), Some(json!(20.0))]);

        let newest_first = store
            .query("offerings", &OrderBy::desc("createdAt"))
            .await
            .unwrap();
        assert!(newest_first[0].created_at > newest_first[2].created_at);
        assert_eq!(store.len("offerings"), 3);
    }
}
