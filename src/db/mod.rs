//! Database module: bookkeeping models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: view models for bookkeeping rows (sync runs).
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! External modules should import from `epfl_ws_sync::db`; the repository
//! API is re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::SyncRun;
