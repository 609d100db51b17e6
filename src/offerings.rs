use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::record::{OfferingRecord, OfferingType, RawRow, RowError};
use crate::store::{DocumentStore, OrderBy, StoreError, StoreResult};
use crate::validate::{RowValidator, SchemaValidator};

/// Why a hand-entered offering was not recorded.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid offering: {}", .0.message)]
    Invalid(RowError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-type and overall sums of recorded offerings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferingTotals {
    pub grand_total: f64,
    pub count: usize,
    pub by_type: BTreeMap<String, f64>,
}

/// Read and single-write access to the offerings collection.
pub struct OfferingBook<S: ?Sized> {
    store: Arc<S>,
    collection: String,
}

impl<S: DocumentStore + ?Sized> OfferingBook<S> {
    pub fn new(store: Arc<S>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    /// Adds one offering entered by hand. The entry goes through the same
    /// rules as an uploaded row; nothing is written when it fails them.
    pub async fn record(&self, entry: &RawRow) -> Result<OfferingRecord, RecordError> {
        let offering = SchemaValidator.validate(entry).map_err(|e| {
            warn!(collection = %self.collection, error = %e.message, "manual offering rejected");
            RecordError::Invalid(e)
        })?;
        let doc = self
            .store
            .put(&self.collection, offering.to_fields()?)
            .await?;
        info!(collection = %self.collection, id = %doc.id, "offering recorded");
        Ok(OfferingRecord::from_document(doc)?)
    }

    /// Newest first.
    pub async fn list(&self) -> StoreResult<Vec<OfferingRecord>> {
        self.store
            .query(&self.collection, &OrderBy::desc("createdAt"))
            .await?
            .into_iter()
            .map(OfferingRecord::from_document)
            .collect()
    }

    pub async fn totals(&self) -> StoreResult<OfferingTotals> {
        let records = self.list().await?;
        let mut totals = OfferingTotals {
            by_type: OfferingType::ALL
                .iter()
                .map(|t| (t.to_string(), 0.0))
                .collect(),
            ..Default::default()
        };
        for r in &records {
            totals.grand_total += r.offering.amount;
            totals.count += 1;
            *totals
                .by_type
                .entry(r.offering.offering_type.to_string())
                .or_default() += r.offering.amount;
        }
        Ok(totals)
    }
}
