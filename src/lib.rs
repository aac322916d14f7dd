//! designdaily — a design-inspiration curation service.
//!
//! Content items are ingested from external platforms, browsed and searched
//! over an HTTP API, submitted by the public for review, and curated into a
//! daily award pick and top-10 shortlist.

pub mod cache;
pub mod config;
pub mod curation;
pub mod db;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod model;
