use crate::infra::AppState;
use crate::views;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Redirect};
use axum::routing::get;
use axum::{Json, Router};
use listing_review::error::AppError;
use listing_review::store::ReviewFilter;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::Ordering;
use tracing::info;

/// The `id` query parameter shared by the review actions.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ReviewQuery {
    #[serde(default)]
    pub(crate) id: Option<String>,
}

impl ReviewQuery {
    fn filter_or_latest(&self) -> Result<ReviewFilter, AppError> {
        match self.id.as_deref() {
            None => Ok(ReviewFilter::Open),
            Some(raw) => Ok(raw.parse::<ReviewFilter>()?),
        }
    }

    fn filter(&self) -> Result<ReviewFilter, AppError> {
        let raw = self
            .id
            .as_deref()
            .ok_or_else(|| AppError::BadRequest("missing review id".to_string()))?;
        Ok(raw.parse::<ReviewFilter>()?)
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/email_template", get(email_template))
        .route("/review_latest", get(review_latest))
        .route("/download", get(download))
        .route("/send_email", get(send_email))
        .route("/delete_review", get(delete_review))
        .route("/settings", get(settings).post(update_settings))
        .route("/favicon.ico", get(favicon))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
}

pub(crate) async fn index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let batches = state.workflow.review_batches().await?;
    let new_properties = state.workflow.count_new_properties().await?;
    Ok(Html(views::index_page(&batches, &new_properties)))
}

pub(crate) async fn email_template(
    State(state): State<AppState>,
    Query(query): Query<ReviewQuery>,
) -> Result<Html<String>, AppError> {
    let filter = query.filter_or_latest()?;
    let new_properties = state.workflow.count_new_properties().await?;
    let listings = state.workflow.get_properties(filter).await?;
    Ok(Html(views::template_page(filter, &listings, &new_properties)))
}

pub(crate) async fn review_latest(State(state): State<AppState>) -> Result<Redirect, AppError> {
    state.workflow.mark_properties_reviewed().await?;
    Ok(Redirect::to("/"))
}

pub(crate) async fn download(State(state): State<AppState>) -> Result<Redirect, AppError> {
    state.ingestor.refresh(state.ingest_mode).await?;
    Ok(Redirect::to("/"))
}

pub(crate) async fn send_email(
    State(state): State<AppState>,
    Query(query): Query<ReviewQuery>,
) -> Result<Redirect, AppError> {
    let filter = query.filter()?;
    let sent = state.notifier.dispatch(filter).await?;
    info!(review = %filter.as_param(), sent, "send email requested");
    Ok(Redirect::to("/"))
}

pub(crate) async fn delete_review(
    State(state): State<AppState>,
    Query(query): Query<ReviewQuery>,
) -> Result<Redirect, AppError> {
    let id = match query.filter()? {
        ReviewFilter::Batch(id) => id,
        ReviewFilter::Open => {
            return Err(AppError::BadRequest(
                "the open batch cannot be deleted".to_string(),
            ))
        }
    };
    state.workflow.delete_review(id).await?;
    Ok(Redirect::to("/"))
}

pub(crate) async fn settings(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let settings = state.settings.load().await?;
    Ok(Html(views::settings_page(&settings.recipients)))
}

pub(crate) async fn update_settings(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Redirect, AppError> {
    let recipients: Vec<String> = url::form_urlencoded::parse(&body)
        .filter(|(key, _)| key == "recipients[]" || key == "recipients")
        .map(|(_, value)| value.into_owned())
        .collect();
    state.settings.update_recipients(recipients).await?;
    Ok(Redirect::to("/"))
}

pub(crate) async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
