use std::sync::Arc;
use tracing::{debug, error, info};

use crate::record::{NewOffering, OfferingRecord};
use crate::store::{DocumentStore, StoreResult};

/// Writes a validated file as one store batch.
///
/// Only ever called with the full set of rows from a file that had no
/// decode or validation errors.
pub struct BatchCommitter<S: ?Sized> {
    store: Arc<S>,
    collection: String,
}

impl<S: DocumentStore + ?Sized> BatchCommitter<S> {
    pub fn new(store: Arc<S>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn commit(&self, offerings: &[NewOffering]) -> StoreResult<Vec<OfferingRecord>> {
        if offerings.is_empty() {
            return Ok(Vec::new());
        }
        let docs = offerings
            .iter()
            .map(NewOffering::to_fields)
            .collect::<StoreResult<Vec<_>>>()?;

        let written = match self.store.batch_put(&self.collection, docs).await {
            Ok(w) => w,
            Err(e) => {
                error!(
                    collection = %self.collection,
                    count = offerings.len(),
                    error = %e,
                    "batch commit rejected"
                );
                return Err(e);
            }
        };

        let records: Vec<OfferingRecord> = written
            .into_iter()
            .zip(offerings.iter().cloned())
            .map(|(doc, offering)| OfferingRecord {
                id: doc.id,
                offering,
                created_at: doc.created_at,
            })
            .collect();
        info!(collection = %self.collection, count = records.len(), "batch committed");
        debug!(ids = ?records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), "committed ids");
        Ok(records)
    }
}
