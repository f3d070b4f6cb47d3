use crate::config::ConfigError;
use crate::html;
use crate::ingestion::IngestionError;
use crate::notification::NotificationError;
use crate::review::ReviewError;
use crate::settings::SettingsError;
use crate::store::{InvalidReviewFilter, StoreError};
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use std::fmt;
use tracing::warn;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    BadRequest(String),
    Store(StoreError),
    Review(ReviewError),
    Settings(SettingsError),
    Ingestion(IngestionError),
    Notification(NotificationError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Store(StoreError::BatchNotFound(_))
            | AppError::Review(ReviewError::BatchNotFound(_))
            | AppError::Notification(NotificationError::Review(ReviewError::BatchNotFound(_))) => {
                StatusCode::NOT_FOUND
            }
            AppError::Ingestion(IngestionError::NotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Ingestion(IngestionError::Http(_) | IngestionError::Status { .. }) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Notification(
                NotificationError::NothingPrepared
                | NotificationError::NoRecipients
                | NotificationError::Delivery(_),
            ) => StatusCode::BAD_GATEWAY,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Store(_)
            | AppError::Review(_)
            | AppError::Settings(_)
            | AppError::Ingestion(_)
            | AppError::Notification(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::BadRequest(reason) => write!(f, "bad request: {}", reason),
            AppError::Store(err) => write!(f, "storage error: {}", err),
            AppError::Review(err) => write!(f, "review error: {}", err),
            AppError::Settings(err) => write!(f, "settings error: {}", err),
            AppError::Ingestion(err) => write!(f, "ingestion failed: {}", err),
            AppError::Notification(err) => write!(f, "email failed: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::BadRequest(_) => None,
            AppError::Store(err) => Some(err),
            AppError::Review(err) => Some(err),
            AppError::Settings(err) => Some(err),
            AppError::Ingestion(err) => Some(err),
            AppError::Notification(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            warn!(%status, error = %message, "request failed");
        }

        let body = Html(format!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{code}</title></head>\
             <body><h1>{code}</h1><p>{message}</p><p><a href=\"/\">Back to reviews</a></p>\
             </body></html>",
            code = status,
            message = html::escape(&message),
        ));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<InvalidReviewFilter> for AppError {
    fn from(value: InvalidReviewFilter) -> Self {
        Self::BadRequest(value.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<ReviewError> for AppError {
    fn from(value: ReviewError) -> Self {
        Self::Review(value)
    }
}

impl From<SettingsError> for AppError {
    fn from(value: SettingsError) -> Self {
        Self::Settings(value)
    }
}

impl From<IngestionError> for AppError {
    fn from(value: IngestionError) -> Self {
        Self::Ingestion(value)
    }
}

impl From<NotificationError> for AppError {
    fn from(value: NotificationError) -> Self {
        Self::Notification(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BatchId;

    #[test]
    fn maps_error_kinds_to_statuses() {
        assert_eq!(
            AppError::from(ReviewError::BatchNotFound(BatchId(3))).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(InvalidReviewFilter("abc".to_string())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(IngestionError::Status {
                url: "http://feed/listings".to_string(),
                status: 500,
            })
            .status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::from(NotificationError::NoRecipients).status(),
            StatusCode::BAD_GATEWAY
        );
        let malformed = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(
            AppError::from(SettingsError::Malformed {
                path: "email_details.json".into(),
                source: malformed,
            })
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
