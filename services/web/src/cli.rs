use crate::infra::open_workflow;
use crate::server;
use clap::{Args, Parser, Subcommand};
use listing_review::config::AppConfig;
use listing_review::error::AppError;
use listing_review::review::ReviewWorkflow;
use listing_review::store::{BatchId, PropertyStore};
use std::fmt::Write as _;

#[derive(Parser, Debug)]
#[command(
    name = "Listing Review",
    about = "Review scraped property listings and email digests of new alerts",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Inspect or change review batches without the web UI
    Review {
        #[command(subcommand)]
        command: ReviewCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ReviewCommand {
    /// Print the new-listing count and past review batches
    Status,
    /// Mark every open alert listing as reviewed
    Close,
    /// Delete a review batch and its listings
    Delete {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Review { command } => run_review(command).await,
    }
}

async fn run_review(command: ReviewCommand) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let workflow = open_workflow(&config).await?;
    let report = review_report(&workflow, command).await?;
    print!("{report}");
    Ok(())
}

/// Apply `command` to the review workflow and describe the outcome.
async fn review_report<S>(
    workflow: &ReviewWorkflow<S>,
    command: ReviewCommand,
) -> Result<String, AppError>
where
    S: PropertyStore + 'static,
{
    let mut report = String::new();
    match command {
        ReviewCommand::Status => {
            let count = workflow.new_property_count().await?;
            let _ = writeln!(report, "New alert listings: {count}");

            let batches = workflow.review_batches().await?;
            if batches.is_empty() {
                report.push_str("Reviews: none\n");
            } else {
                report.push_str("Reviews\n");
                for batch in batches {
                    let _ = writeln!(report, "- #{} reviewed {}", batch.email_id, batch.str_date);
                }
            }
        }
        ReviewCommand::Close => match workflow.mark_properties_reviewed().await? {
            Some(closed) => {
                let _ = writeln!(
                    report,
                    "Review #{} created with {} listings",
                    closed.batch.email_id, closed.listings
                );
            }
            None => report.push_str("No open alert listings to review\n"),
        },
        ReviewCommand::Delete { id } => {
            let removed = workflow.delete_review(BatchId(id)).await?;
            let _ = writeln!(report, "Review #{id} deleted ({removed} listings removed)");
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use listing_review::review::DEFAULT_ALERT_TRAVEL_MINUTES;
    use listing_review::store::{NewListing, SqliteStore};
    use std::sync::Arc;

    async fn workflow_with_alert() -> ReviewWorkflow<SqliteStore> {
        let store = Arc::new(SqliteStore::in_memory().await.expect("store opens"));
        store
            .upsert_listing(&NewListing {
                id: 7,
                address: "7 Bancroft, Hitchin".to_string(),
                price: 350_000,
                bedrooms: Some(2),
                property_type: Some("Flat".to_string()),
                url: "https://listings.example/properties/7".to_string(),
                latitude: None,
                longitude: None,
            })
            .await
            .expect("listing stored");
        store.insert_alert(7, 20).await.expect("alert stored");
        ReviewWorkflow::new(store, DEFAULT_ALERT_TRAVEL_MINUTES)
    }

    #[tokio::test]
    async fn status_lists_open_count_and_batches() {
        let workflow = workflow_with_alert().await;
        let report = review_report(&workflow, ReviewCommand::Status)
            .await
            .expect("status");
        assert_eq!(report, "New alert listings: 1\nReviews: none\n");

        let closed = workflow
            .mark_properties_reviewed()
            .await
            .expect("review")
            .expect("batch");
        let report = review_report(&workflow, ReviewCommand::Status)
            .await
            .expect("status");
        assert_eq!(
            report,
            format!(
                "New alert listings: 0\nReviews\n- #{} reviewed {}\n",
                closed.batch.email_id, closed.batch.str_date
            )
        );
    }

    #[tokio::test]
    async fn close_reports_new_batch_then_nothing_open() {
        let workflow = workflow_with_alert().await;
        let report = review_report(&workflow, ReviewCommand::Close)
            .await
            .expect("close");
        assert!(report.starts_with("Review #"));
        assert!(report.ends_with("created with 1 listings\n"));

        let report = review_report(&workflow, ReviewCommand::Close)
            .await
            .expect("close");
        assert_eq!(report, "No open alert listings to review\n");
    }

    #[tokio::test]
    async fn delete_reports_removed_listings_and_rejects_unknown_ids() {
        let workflow = workflow_with_alert().await;
        let closed = workflow
            .mark_properties_reviewed()
            .await
            .expect("review")
            .expect("batch");
        let id = closed.batch.email_id.0;

        let report = review_report(&workflow, ReviewCommand::Delete { id })
            .await
            .expect("delete");
        assert_eq!(report, format!("Review #{id} deleted (1 listings removed)\n"));

        let missing = review_report(&workflow, ReviewCommand::Delete { id }).await;
        assert!(matches!(missing, Err(err) if err.status().as_u16() == 404));
    }
}
