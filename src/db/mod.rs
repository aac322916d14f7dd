//! Database module: entity mapping and SQL repositories.
//!
//! - `model`: lightweight view models returned by ranking queries.
//! - `repo`: SQL-only functions that map rows into domain entities.
//!
//! External modules should import from `designdaily::db` — the repository
//! API and view models are re-exported here.

pub mod model;
pub mod repo;

pub use model::CandidateItem;
pub use repo::*;
