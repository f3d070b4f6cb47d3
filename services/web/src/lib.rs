mod cli;
mod infra;
mod routes;
mod server;
mod views;

use listing_review::error::AppError;

pub use infra::AppState;
pub use routes::app_router;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
