//! Boundary to the ingest worker process
//!
//! The worker does the actual mail parsing and storage. This module only knows
//! how to ask it to start, stop and report on a run.

pub mod client;
pub mod error;
pub mod types;

pub use client::{HttpIngestClient, IngestService};
pub use error::{IngestError, WorkerCall};
pub use types::{
    EmailId, EmailSummary, IngestStatus, ProgressSnapshot, StartIngestRequest, StatsSummary,
};
