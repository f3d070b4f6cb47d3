//! Review workflow: open alert listings are collected into batches that the
//! operator finalizes, emails, and occasionally deletes.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::store::{
    AlertListing, BatchId, ClosedBatch, PropertyStore, ReviewBatch, ReviewFilter, StoreError,
};

/// Alert listings with a travel time below this count as new on the dashboard.
pub const DEFAULT_ALERT_TRAVEL_MINUTES: i64 = 45;

/// Service wrapping the property store with the review state transitions.
pub struct ReviewWorkflow<S> {
    store: Arc<S>,
    alert_max_travel_minutes: i64,
}

impl<S> ReviewWorkflow<S>
where
    S: PropertyStore + 'static,
{
    pub fn new(store: Arc<S>, alert_max_travel_minutes: i64) -> Self {
        Self {
            store,
            alert_max_travel_minutes,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Alert listings in the open batch or in one finalized batch.
    pub async fn get_properties(
        &self,
        filter: ReviewFilter,
    ) -> Result<Vec<AlertListing>, ReviewError> {
        if let ReviewFilter::Batch(id) = filter {
            self.batch(id).await?;
        }
        Ok(self.store.alert_listings(filter).await?)
    }

    /// Move every open alert listing into a new batch stamped with the current time.
    pub async fn mark_properties_reviewed(&self) -> Result<Option<ClosedBatch>, ReviewError> {
        let closed = self.store.close_open_batch(Utc::now()).await?;
        match &closed {
            Some(closed) => info!(
                batch = %closed.batch.email_id,
                listings = closed.listings,
                "open alert listings marked reviewed"
            ),
            None => info!("no open alert listings to review"),
        }
        Ok(closed)
    }

    /// Delete a batch along with the alert listings attached to it.
    pub async fn delete_review(&self, id: BatchId) -> Result<u64, ReviewError> {
        let removed = self.store.delete_batch(id).await.map_err(|err| match err {
            StoreError::BatchNotFound(id) => ReviewError::BatchNotFound(id),
            other => ReviewError::Store(other),
        })?;
        info!(batch = %id, listings = removed, "review batch deleted");
        Ok(removed)
    }

    /// Number of open alert listings under the travel-time threshold.
    pub async fn new_property_count(&self) -> Result<i64, ReviewError> {
        Ok(self
            .store
            .count_open_alerts(self.alert_max_travel_minutes)
            .await?)
    }

    /// Badge text for the new-listing count: empty when zero, else `" - N new"`.
    pub async fn count_new_properties(&self) -> Result<String, ReviewError> {
        let count = self.new_property_count().await?;
        Ok(new_properties_badge(count))
    }

    /// Finalized batches, newest first.
    pub async fn review_batches(&self) -> Result<Vec<ReviewBatch>, ReviewError> {
        Ok(self.store.review_batches().await?)
    }

    pub async fn batch(&self, id: BatchId) -> Result<ReviewBatch, ReviewError> {
        self.store
            .review_batch(id)
            .await?
            .ok_or(ReviewError::BatchNotFound(id))
    }
}

pub fn new_properties_badge(count: i64) -> String {
    if count > 0 {
        format!(" - {count} new")
    } else {
        String::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("review batch {0} not found")]
    BatchNotFound(BatchId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn badge_is_empty_without_new_listings() {
        assert_eq!(new_properties_badge(0), "");
        assert_eq!(new_properties_badge(1), " - 1 new");
        assert_eq!(new_properties_badge(12), " - 12 new");
    }
}
