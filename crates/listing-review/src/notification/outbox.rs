use async_trait::async_trait;
use chrono::Utc;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::{NotificationError, Notifier};
use crate::html;
use crate::review::ReviewWorkflow;
use crate::settings::SettingsStore;
use crate::store::{AlertListing, PropertyStore, ReviewFilter};

#[derive(Debug, Clone)]
struct PreparedEmail {
    review: String,
    subject: String,
    body: String,
}

/// Renders digests into `<data_dir>/email/prepared.html` and delivers them as
/// message files under `<data_dir>/outbox/` for the mail relay to pick up.
pub struct OutboxNotifier<S> {
    workflow: Arc<ReviewWorkflow<S>>,
    settings: SettingsStore,
    data_dir: PathBuf,
    prepared: Mutex<Option<PreparedEmail>>,
}

impl<S> OutboxNotifier<S>
where
    S: PropertyStore + 'static,
{
    pub fn new(
        workflow: Arc<ReviewWorkflow<S>>,
        settings: SettingsStore,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            workflow,
            settings,
            data_dir: data_dir.into(),
            prepared: Mutex::new(None),
        }
    }

    pub fn preview_path(&self) -> PathBuf {
        self.data_dir.join("email").join("prepared.html")
    }

    pub fn outbox_dir(&self) -> PathBuf {
        self.data_dir.join("outbox")
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<PreparedEmail>> {
        self.prepared
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Tie-breaker for outbox names written within the same millisecond.
static OUTBOX_SEQUENCE: AtomicU64 = AtomicU64::new(1);

async fn write_file(path: &Path, contents: &str) -> Result<(), NotificationError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(NotificationError::Delivery)?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(NotificationError::Delivery)
}

impl<S> OutboxNotifier<S>
where
    S: PropertyStore + 'static,
{
    /// Render the digest for `filter` and refresh the preview file.
    async fn render(
        &self,
        filter: ReviewFilter,
    ) -> Result<Option<PreparedEmail>, NotificationError> {
        let listings = self.workflow.get_properties(filter).await?;
        if listings.is_empty() {
            info!(review = %filter.as_param(), "nothing to email for review");
            return Ok(None);
        }

        let heading = match filter {
            ReviewFilter::Open => "New property alerts".to_string(),
            ReviewFilter::Batch(id) => {
                let batch = self.workflow.batch(id).await?;
                format!("Property alerts reviewed {}", batch.str_date)
            }
        };
        let subject = format!("{heading} ({} listings)", listings.len());
        let body = render_email_html(&heading, &listings);

        write_file(&self.preview_path(), &body).await?;
        info!(review = %filter.as_param(), listings = listings.len(), "email prepared");
        Ok(Some(PreparedEmail {
            review: filter.as_param(),
            subject,
            body,
        }))
    }

    /// Queue `prepared` in the outbox. Each message gets its own file.
    async fn deliver(&self, prepared: &PreparedEmail) -> Result<(), NotificationError> {
        let settings = self.settings.load().await?;
        if settings.recipients.is_empty() {
            return Err(NotificationError::NoRecipients);
        }

        let now = Utc::now();
        let message = format!(
            "To: {}\r\nSubject: {}\r\nDate: {}\r\nMIME-Version: 1.0\r\n\
             Content-Type: text/html; charset=utf-8\r\n\r\n{}",
            settings.recipients.join(", "),
            prepared.subject,
            now.to_rfc2822(),
            prepared.body,
        );

        let outbox = self.outbox_dir();
        tokio::fs::create_dir_all(&outbox)
            .await
            .map_err(NotificationError::Delivery)?;
        let path = outbox.join(format!(
            "{}-{}-{:06}.eml",
            now.format("%Y%m%dT%H%M%S%.3f"),
            prepared.review,
            OUTBOX_SEQUENCE.fetch_add(1, Ordering::Relaxed),
        ));
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(NotificationError::Delivery)?;
        file.write_all(message.as_bytes())
            .await
            .map_err(NotificationError::Delivery)?;
        file.flush().await.map_err(NotificationError::Delivery)?;

        info!(
            review = %prepared.review,
            recipients = settings.recipients.len(),
            path = %path.display(),
            "email queued for delivery"
        );
        Ok(())
    }
}

#[async_trait]
impl<S> Notifier for OutboxNotifier<S>
where
    S: PropertyStore + 'static,
{
    async fn prepare_email_html(&self, filter: ReviewFilter) -> Result<bool, NotificationError> {
        let prepared = self.render(filter).await?;
        let ready = prepared.is_some();
        *self.slot() = prepared;
        Ok(ready)
    }

    async fn send_email(&self) -> Result<(), NotificationError> {
        let prepared = self.slot().clone().ok_or(NotificationError::NothingPrepared)?;
        self.deliver(&prepared).await?;
        *self.slot() = None;
        Ok(())
    }

    /// Renders and delivers in one call without going through the shared
    /// prepared slot, so concurrent dispatches each send their own digest.
    async fn dispatch(&self, filter: ReviewFilter) -> Result<bool, NotificationError> {
        match self.render(filter).await? {
            Some(prepared) => {
                self.deliver(&prepared).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Digest body: one table row per alert listing.
pub fn render_email_html(heading: &str, listings: &[AlertListing]) -> String {
    let mut rows = String::new();
    for listing in listings {
        let bedrooms = listing
            .bedrooms
            .map(|beds| beds.to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = write!(
            rows,
            "<tr><td><a href=\"{url}\">{address}</a></td><td>{price}</td>\
             <td>{bedrooms}</td><td>{kind}</td><td>{travel} min</td></tr>",
            url = html::escape(&listing.url),
            address = html::escape(&listing.address),
            price = html::price(listing.price),
            kind = html::escape(listing.property_type.as_deref().unwrap_or("-")),
            travel = listing.travel_time,
        );
    }

    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{heading}</title></head>\
         <body><h2>{heading}</h2><table>\
         <tr><th>Address</th><th>Price</th><th>Beds</th><th>Type</th><th>Travel</th></tr>\
         {rows}</table></body></html>",
        heading = html::escape(heading),
    )
}
