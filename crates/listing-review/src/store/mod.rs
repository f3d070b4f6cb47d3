//! Persistence for scraped listings, alert listings, and review batches.
//!
//! The store is the only component that talks to the database. Everything
//! above it (review workflow, collaborators, routes) receives it as an
//! injected dependency.

mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

pub use sqlite::SqliteStore;

/// Identifier assigned by the database when a review batch is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(pub i64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Selects alert listings by their review state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewFilter {
    /// Listings not yet attached to a batch.
    Open,
    Batch(BatchId),
}

impl ReviewFilter {
    /// Value used for the `id` query parameter.
    pub fn as_param(&self) -> String {
        match self {
            ReviewFilter::Open => "latest".to_string(),
            ReviewFilter::Batch(id) => id.to_string(),
        }
    }
}

impl FromStr for ReviewFilter {
    type Err = InvalidReviewFilter;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("latest") {
            return Ok(ReviewFilter::Open);
        }
        trimmed
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .map(|id| ReviewFilter::Batch(BatchId(id)))
            .ok_or_else(|| InvalidReviewFilter(raw.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is neither 'latest' nor a review id")]
pub struct InvalidReviewFilter(pub String);

/// Listing as delivered by the ingestion feed, before it is persisted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewListing {
    pub id: i64,
    pub address: String,
    pub price: i64,
    #[serde(default)]
    pub bedrooms: Option<i64>,
    #[serde(default)]
    pub property_type: Option<String>,
    pub url: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Per-listing detail fetched after the summary list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ListingDetail {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tenure: Option<String>,
    #[serde(default)]
    pub floor_area_sqft: Option<i64>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// A scraped property record.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Listing {
    pub id: i64,
    pub address: String,
    pub price: i64,
    pub bedrooms: Option<i64>,
    pub property_type: Option<String>,
    pub url: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub description: Option<String>,
    pub tenure: Option<String>,
    pub floor_area_sqft: Option<i64>,
    pub travel_time: Option<i64>,
    pub detail_fetched: bool,
    pub first_seen: DateTime<Utc>,
}

/// A listing that matched the alert criteria, joined with its listing data.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AlertListing {
    pub listing_id: i64,
    pub address: String,
    pub price: i64,
    pub bedrooms: Option<i64>,
    pub property_type: Option<String>,
    pub url: String,
    pub description: Option<String>,
    pub travel_time: i64,
    pub review_id: Option<i64>,
}

impl AlertListing {
    pub fn batch(&self) -> Option<BatchId> {
        self.review_id.map(BatchId)
    }
}

/// A finalized group of alert listings.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewBatch {
    pub email_id: BatchId,
    pub str_date: String,
    pub reviewed_date: DateTime<Utc>,
}

/// Result of moving every open alert listing into a new batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedBatch {
    pub batch: ReviewBatch,
    pub listings: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("review batch {0} not found")]
    BatchNotFound(BatchId),
    #[error("listing {0} not found")]
    ListingNotFound(i64),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Storage abstraction consumed by the review workflow and collaborators.
#[async_trait]
pub trait PropertyStore: Send + Sync {
    /// Insert a listing or refresh its summary fields if already known.
    async fn upsert_listing(&self, listing: &NewListing) -> Result<(), StoreError>;
    async fn listing(&self, id: i64) -> Result<Option<Listing>, StoreError>;
    /// Listings lacking detail, or every listing when `include_fetched`.
    async fn listings_needing_detail(&self, include_fetched: bool)
        -> Result<Vec<Listing>, StoreError>;
    async fn record_detail(&self, id: i64, detail: &ListingDetail) -> Result<(), StoreError>;
    async fn listings_without_travel_time(&self) -> Result<Vec<Listing>, StoreError>;
    async fn record_travel_time(&self, id: i64, minutes: i64) -> Result<(), StoreError>;
    /// Flag a listing as alert-qualifying. Returns false when it already was.
    async fn insert_alert(&self, listing_id: i64, travel_time: i64) -> Result<bool, StoreError>;

    async fn alert_listings(&self, filter: ReviewFilter) -> Result<Vec<AlertListing>, StoreError>;
    async fn count_open_alerts(&self, max_travel_minutes: i64) -> Result<i64, StoreError>;
    async fn review_batches(&self) -> Result<Vec<ReviewBatch>, StoreError>;
    async fn review_batch(&self, id: BatchId) -> Result<Option<ReviewBatch>, StoreError>;
    /// Atomically attach every open alert listing to a new batch.
    /// Returns `None` without creating a batch when nothing is open.
    async fn close_open_batch(&self, now: DateTime<Utc>)
        -> Result<Option<ClosedBatch>, StoreError>;
    /// Delete a batch and its alert listings, returning how many listings went.
    async fn delete_batch(&self, id: BatchId) -> Result<u64, StoreError>;
}
