use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{IngestMode, IngestionError, Ingestor};
use crate::store::{ListingDetail, NewListing, PropertyStore};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TravelEstimate {
    minutes: i64,
}

/// Pulls listings from a JSON listing feed and writes them through the store.
///
/// Feed layout, relative to the base URL:
/// - `GET /listings?channel=BUY` returns an array of listing summaries
/// - `GET /listings/{id}` returns the listing detail
/// - `GET /listings/{id}/travel` returns `{"minutes": n}`
pub struct FeedIngestor<S> {
    client: Client,
    base_url: String,
    store: Arc<S>,
    alert_max_travel_minutes: i64,
}

impl<S> FeedIngestor<S>
where
    S: PropertyStore + 'static,
{
    pub fn new(
        base_url: impl Into<String>,
        store: Arc<S>,
        alert_max_travel_minutes: i64,
    ) -> Result<Self, IngestionError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
            alert_max_travel_minutes,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, IngestionError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "fetching from listing feed");
        let response = self.client.get(&url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestionError::Status {
                url,
                status: status.as_u16(),
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl<S> Ingestor for FeedIngestor<S>
where
    S: PropertyStore + 'static,
{
    async fn download_properties(&self, mode: IngestMode) -> Result<usize, IngestionError> {
        let listings: Vec<NewListing> = self
            .get_json("/listings", &[("channel", mode.as_str())])
            .await?;

        for listing in &listings {
            self.store.upsert_listing(listing).await?;
        }
        info!(%mode, listings = listings.len(), "listing summaries stored");
        Ok(listings.len())
    }

    async fn download_property_data(&self, update: bool) -> Result<usize, IngestionError> {
        let pending = self.store.listings_needing_detail(update).await?;
        let mut fetched = 0;

        for listing in pending {
            let path = format!("/listings/{}", listing.id);
            match self.get_json::<ListingDetail>(&path, &[]).await {
                Ok(detail) => {
                    self.store.record_detail(listing.id, &detail).await?;
                    fetched += 1;
                }
                Err(err) => warn!(listing = listing.id, error = %err, "listing detail skipped"),
            }
        }

        info!(fetched, "listing detail stored");
        Ok(fetched)
    }

    async fn update_locations(&self) -> Result<usize, IngestionError> {
        let pending = self.store.listings_without_travel_time().await?;
        let mut located = 0;

        for listing in pending {
            let path = format!("/listings/{}/travel", listing.id);
            let estimate = match self.get_json::<TravelEstimate>(&path, &[]).await {
                Ok(estimate) => estimate,
                Err(err) => {
                    warn!(listing = listing.id, error = %err, "travel time skipped");
                    continue;
                }
            };

            self.store
                .record_travel_time(listing.id, estimate.minutes)
                .await?;
            located += 1;

            if estimate.minutes < self.alert_max_travel_minutes
                && self.store.insert_alert(listing.id, estimate.minutes).await?
            {
                info!(
                    listing = listing.id,
                    minutes = estimate.minutes,
                    "listing flagged for review"
                );
            }
        }

        Ok(located)
    }
}
