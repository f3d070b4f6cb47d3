//! Core of the listing review service: storage, the review workflow, email
//! settings, and the ingestion and notification collaborators.

pub mod config;
pub mod error;
pub mod html;
pub mod ingestion;
pub mod notification;
pub mod review;
pub mod settings;
pub mod store;
pub mod telemetry;
