//! Ingestion collaborator: fetches listings, their detail, and travel times.

mod feed;

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use tracing::info;

use crate::store::StoreError;

pub use feed::FeedIngestor;

/// Listing channel requested from the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    Buy,
    Rent,
}

impl IngestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestMode::Buy => "BUY",
            IngestMode::Rent => "RENT",
        }
    }
}

impl fmt::Display for IngestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IngestMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(IngestMode::Buy),
            "RENT" => Ok(IngestMode::Rent),
            other => Err(format!("unknown listing channel '{other}'")),
        }
    }
}

/// Counts reported by a full ingestion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub listings: usize,
    pub details: usize,
    pub located: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("no listing feed configured (set INGEST_FEED_URL)")]
    NotConfigured,
    #[error("listing feed request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("listing feed returned {status} for {url}")]
    Status { url: String, status: u16 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait Ingestor: Send + Sync {
    /// Fetch the listing summaries for `mode` and store them.
    async fn download_properties(&self, mode: IngestMode) -> Result<usize, IngestionError>;
    /// Fetch per-listing detail; `update` refetches listings that already have it.
    async fn download_property_data(&self, update: bool) -> Result<usize, IngestionError>;
    /// Fill in travel times and flag listings that qualify for an alert.
    async fn update_locations(&self) -> Result<usize, IngestionError>;

    /// The download action: list, detail, then locations, in that order.
    async fn refresh(&self, mode: IngestMode) -> Result<IngestSummary, IngestionError> {
        let listings = self.download_properties(mode).await?;
        let details = self.download_property_data(false).await?;
        let located = self.update_locations().await?;
        let summary = IngestSummary {
            listings,
            details,
            located,
        };
        info!(%mode, ?summary, "ingestion pass finished");
        Ok(summary)
    }
}

/// Stand-in used when no feed is configured; every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledIngestor;

#[async_trait]
impl Ingestor for DisabledIngestor {
    async fn download_properties(&self, _mode: IngestMode) -> Result<usize, IngestionError> {
        Err(IngestionError::NotConfigured)
    }

    async fn download_property_data(&self, _update: bool) -> Result<usize, IngestionError> {
        Err(IngestionError::NotConfigured)
    }

    async fn update_locations(&self) -> Result<usize, IngestionError> {
        Err(IngestionError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_channels_case_insensitively() {
        assert_eq!("buy".parse::<IngestMode>(), Ok(IngestMode::Buy));
        assert_eq!(" RENT ".parse::<IngestMode>(), Ok(IngestMode::Rent));
        assert!("lease".parse::<IngestMode>().is_err());
    }

    #[tokio::test]
    async fn disabled_ingestor_refuses_to_refresh() {
        let result = DisabledIngestor.refresh(IngestMode::Buy).await;
        assert!(matches!(result, Err(IngestionError::NotConfigured)));
    }
}
