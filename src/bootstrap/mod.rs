//! Setup for the tracker application: logging, configuration ingestion,
//! checkpoint restore and the background jobs.
pub mod app;
pub mod jobs;
pub mod logging;
