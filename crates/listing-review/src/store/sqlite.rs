use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::debug;

use super::{
    AlertListing, BatchId, ClosedBatch, Listing, ListingDetail, NewListing, PropertyStore,
    ReviewBatch, ReviewFilter, StoreError,
};

const STR_DATE_FORMAT: &str = "%d %b %Y %H:%M";

const LISTING_COLUMNS: &str = "id, address, price, bedrooms, property_type, url, latitude, \
     longitude, description, tenure, floor_area_sqft, travel_time, detail_fetched, first_seen";

const ALERT_SELECT: &str = "SELECT a.listing_id, l.address, l.price, l.bedrooms, \
     l.property_type, l.url, l.description, a.travel_time, a.review_id \
     FROM alert_properties a JOIN listings l ON l.id = a.listing_id";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS listings (
    id INTEGER PRIMARY KEY,
    address TEXT NOT NULL,
    price INTEGER NOT NULL,
    bedrooms INTEGER,
    property_type TEXT,
    url TEXT NOT NULL,
    latitude REAL,
    longitude REAL,
    description TEXT,
    tenure TEXT,
    floor_area_sqft INTEGER,
    travel_time INTEGER,
    detail_fetched INTEGER NOT NULL DEFAULT 0,
    first_seen TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS reviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    str_date TEXT NOT NULL,
    reviewed_date TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS alert_properties (
    listing_id INTEGER PRIMARY KEY REFERENCES listings(id),
    travel_time INTEGER NOT NULL,
    review_id INTEGER REFERENCES reviews(id)
);

CREATE INDEX IF NOT EXISTS idx_alert_properties_review_id ON alert_properties(review_id);
"#;

/// SQLite-backed property store sharing one connection pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to `database_url` (e.g. `sqlite://data/properties.db?mode=rwc`)
    /// and create the tables if they are missing.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.create_tables().await?;
        Ok(store)
    }

    /// Single-connection in-memory store; the database lives as long as the pool.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.create_tables().await?;
        Ok(store)
    }

    async fn create_tables(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct ReviewRow {
    id: i64,
    str_date: String,
    reviewed_date: DateTime<Utc>,
}

impl From<ReviewRow> for ReviewBatch {
    fn from(row: ReviewRow) -> Self {
        ReviewBatch {
            email_id: BatchId(row.id),
            str_date: row.str_date,
            reviewed_date: row.reviewed_date,
        }
    }
}

#[async_trait]
impl PropertyStore for SqliteStore {
    async fn upsert_listing(&self, listing: &NewListing) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO listings
                (id, address, price, bedrooms, property_type, url, latitude, longitude, first_seen)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                address = excluded.address,
                price = excluded.price,
                bedrooms = excluded.bedrooms,
                property_type = excluded.property_type,
                url = excluded.url,
                latitude = COALESCE(excluded.latitude, listings.latitude),
                longitude = COALESCE(excluded.longitude, listings.longitude)
            "#,
        )
        .bind(listing.id)
        .bind(&listing.address)
        .bind(listing.price)
        .bind(listing.bedrooms)
        .bind(&listing.property_type)
        .bind(&listing.url)
        .bind(listing.latitude)
        .bind(listing.longitude)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn listing(&self, id: i64) -> Result<Option<Listing>, StoreError> {
        let sql = format!("SELECT {LISTING_COLUMNS} FROM listings WHERE id = ?");
        let listing = sqlx::query_as::<_, Listing>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(listing)
    }

    async fn listings_needing_detail(
        &self,
        include_fetched: bool,
    ) -> Result<Vec<Listing>, StoreError> {
        let sql = format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE detail_fetched = 0 OR ? ORDER BY id"
        );
        let listings = sqlx::query_as::<_, Listing>(&sql)
            .bind(include_fetched)
            .fetch_all(&self.pool)
            .await?;
        Ok(listings)
    }

    async fn record_detail(&self, id: i64, detail: &ListingDetail) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE listings SET
                description = ?,
                tenure = ?,
                floor_area_sqft = ?,
                latitude = COALESCE(?, latitude),
                longitude = COALESCE(?, longitude),
                detail_fetched = 1
            WHERE id = ?
            "#,
        )
        .bind(&detail.description)
        .bind(&detail.tenure)
        .bind(detail.floor_area_sqft)
        .bind(detail.latitude)
        .bind(detail.longitude)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ListingNotFound(id));
        }
        Ok(())
    }

    async fn listings_without_travel_time(&self) -> Result<Vec<Listing>, StoreError> {
        let sql =
            format!("SELECT {LISTING_COLUMNS} FROM listings WHERE travel_time IS NULL ORDER BY id");
        let listings = sqlx::query_as::<_, Listing>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(listings)
    }

    async fn record_travel_time(&self, id: i64, minutes: i64) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE listings SET travel_time = ? WHERE id = ?")
            .bind(minutes)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ListingNotFound(id));
        }
        Ok(())
    }

    async fn insert_alert(&self, listing_id: i64, travel_time: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO alert_properties (listing_id, travel_time) VALUES (?, ?) \
             ON CONFLICT(listing_id) DO NOTHING",
        )
        .bind(listing_id)
        .bind(travel_time)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn alert_listings(&self, filter: ReviewFilter) -> Result<Vec<AlertListing>, StoreError> {
        let listings = match filter {
            ReviewFilter::Open => {
                let sql = format!(
                    "{ALERT_SELECT} WHERE a.review_id IS NULL ORDER BY a.travel_time, a.listing_id"
                );
                sqlx::query_as::<_, AlertListing>(&sql)
                    .fetch_all(&self.pool)
                    .await?
            }
            ReviewFilter::Batch(id) => {
                let sql = format!(
                    "{ALERT_SELECT} WHERE a.review_id = ? ORDER BY a.travel_time, a.listing_id"
                );
                sqlx::query_as::<_, AlertListing>(&sql)
                    .bind(id.0)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(listings)
    }

    async fn count_open_alerts(&self, max_travel_minutes: i64) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM alert_properties WHERE review_id IS NULL AND travel_time < ?",
        )
        .bind(max_travel_minutes)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn review_batches(&self) -> Result<Vec<ReviewBatch>, StoreError> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            "SELECT id, str_date, reviewed_date FROM reviews ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ReviewBatch::from).collect())
    }

    async fn review_batch(&self, id: BatchId) -> Result<Option<ReviewBatch>, StoreError> {
        let row = sqlx::query_as::<_, ReviewRow>(
            "SELECT id, str_date, reviewed_date FROM reviews WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ReviewBatch::from))
    }

    async fn close_open_batch(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<ClosedBatch>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let open = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM alert_properties WHERE review_id IS NULL",
        )
        .fetch_one(&mut *tx)
        .await?;
        if open == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let str_date = now.format(STR_DATE_FORMAT).to_string();
        let id = sqlx::query("INSERT INTO reviews (str_date, reviewed_date) VALUES (?, ?)")
            .bind(&str_date)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        let moved = sqlx::query("UPDATE alert_properties SET review_id = ? WHERE review_id IS NULL")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        debug!(batch = id, moved, "open alert listings attached to batch");

        Ok(Some(ClosedBatch {
            batch: ReviewBatch {
                email_id: BatchId(id),
                str_date,
                reviewed_date: now,
            },
            listings: moved,
        }))
    }

    async fn delete_batch(&self, id: BatchId) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM reviews WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            tx.rollback().await?;
            return Err(StoreError::BatchNotFound(id));
        }

        let removed = sqlx::query("DELETE FROM alert_properties WHERE review_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM reviews WHERE id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: i64) -> NewListing {
        NewListing {
            id,
            address: format!("{id} Mill Lane"),
            price: 325_000,
            bedrooms: Some(3),
            property_type: Some("Semi-Detached".to_string()),
            url: format!("https://listings.example/properties/{id}"),
            latitude: None,
            longitude: None,
        }
    }

    #[tokio::test]
    async fn upsert_keeps_first_seen_and_coordinates() {
        let store = SqliteStore::in_memory().await.expect("store opens");
        let mut first = listing(1);
        first.latitude = Some(51.5);
        first.longitude = Some(-0.12);
        store.upsert_listing(&first).await.expect("insert");
        let original = store.listing(1).await.expect("read").expect("present");

        let mut repriced = listing(1);
        repriced.price = 310_000;
        store.upsert_listing(&repriced).await.expect("update");
        let updated = store.listing(1).await.expect("read").expect("present");

        assert_eq!(updated.price, 310_000);
        assert_eq!(updated.latitude, Some(51.5));
        assert_eq!(updated.first_seen, original.first_seen);
        assert!(!updated.detail_fetched);
    }

    #[tokio::test]
    async fn detail_and_travel_time_are_recorded() {
        let store = SqliteStore::in_memory().await.expect("store opens");
        store.upsert_listing(&listing(4)).await.expect("insert");

        let detail = ListingDetail {
            description: Some("Garden flat".to_string()),
            tenure: Some("Freehold".to_string()),
            floor_area_sqft: Some(840),
            latitude: Some(52.2),
            longitude: Some(0.12),
        };
        store.record_detail(4, &detail).await.expect("detail");
        assert!(store
            .listings_needing_detail(false)
            .await
            .expect("query")
            .is_empty());
        assert_eq!(store.listings_needing_detail(true).await.expect("query").len(), 1);

        assert_eq!(store.listings_without_travel_time().await.expect("query").len(), 1);
        store.record_travel_time(4, 38).await.expect("travel");
        assert!(store
            .listings_without_travel_time()
            .await
            .expect("query")
            .is_empty());

        let stored = store.listing(4).await.expect("read").expect("present");
        assert_eq!(stored.travel_time, Some(38));
        assert_eq!(stored.tenure.as_deref(), Some("Freehold"));
        assert!(stored.detail_fetched);
    }

    #[tokio::test]
    async fn updates_against_unknown_listing_fail() {
        let store = SqliteStore::in_memory().await.expect("store opens");
        assert!(matches!(
            store.record_travel_time(99, 10).await,
            Err(StoreError::ListingNotFound(99))
        ));
    }

    #[tokio::test]
    async fn alert_insert_is_idempotent() {
        let store = SqliteStore::in_memory().await.expect("store opens");
        store.upsert_listing(&listing(2)).await.expect("insert");
        assert!(store.insert_alert(2, 30).await.expect("first insert"));
        assert!(!store.insert_alert(2, 30).await.expect("second insert"));
        assert_eq!(
            store
                .alert_listings(ReviewFilter::Open)
                .await
                .expect("query")
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn closing_with_nothing_open_creates_no_batch() {
        let store = SqliteStore::in_memory().await.expect("store opens");
        let closed = store.close_open_batch(Utc::now()).await.expect("close");
        assert!(closed.is_none());
        assert!(store.review_batches().await.expect("query").is_empty());
    }

    #[tokio::test]
    async fn batches_with_identical_timestamps_stay_distinct() {
        let store = SqliteStore::in_memory().await.expect("store opens");
        let now = Utc::now();

        store.upsert_listing(&listing(10)).await.expect("insert");
        store.insert_alert(10, 20).await.expect("alert");
        let first = store.close_open_batch(now).await.expect("close").expect("batch");

        store.upsert_listing(&listing(11)).await.expect("insert");
        store.insert_alert(11, 25).await.expect("alert");
        let second = store.close_open_batch(now).await.expect("close").expect("batch");

        assert_ne!(first.batch.email_id, second.batch.email_id);
        assert_eq!(store.delete_batch(first.batch.email_id).await.expect("delete"), 1);

        let remaining = store
            .alert_listings(ReviewFilter::Batch(second.batch.email_id))
            .await
            .expect("query");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].listing_id, 11);
    }
}
