//! Aurum Storage Layer
//!
//! SQLite-backed persistence for state that must survive a restart.
//! Today that is the backend-issued session credential; everything else the
//! client shows is fetched from the backend on demand.

mod database;
mod error;
mod migrations;

pub use database::{Database, StoredCredential};
pub use error::StorageError;

pub type Result<T> = std::result::Result<T, StorageError>;
