//! Notification collaborator: renders a batch digest and sends it.

mod outbox;

use async_trait::async_trait;

use crate::review::ReviewError;
use crate::settings::SettingsError;
use crate::store::ReviewFilter;

pub use outbox::{render_email_html, OutboxNotifier};

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("no email has been prepared")]
    NothingPrepared,
    #[error("no email recipients configured")]
    NoRecipients,
    #[error("email delivery failed: {0}")]
    Delivery(#[source] std::io::Error),
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Render the email for `filter`. Returns false when there is nothing to send.
    async fn prepare_email_html(&self, filter: ReviewFilter) -> Result<bool, NotificationError>;
    /// Deliver the most recently prepared email.
    async fn send_email(&self) -> Result<(), NotificationError>;

    /// Prepare then send; the email only goes out when preparation produced one.
    async fn dispatch(&self, filter: ReviewFilter) -> Result<bool, NotificationError> {
        if !self.prepare_email_html(filter).await? {
            return Ok(false);
        }
        self.send_email().await?;
        Ok(true)
    }
}
