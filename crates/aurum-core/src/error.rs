//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] aurum_storage::StorageError),

    #[error("Session error: {0}")]
    Session(#[from] aurum_session::SessionError),

    #[error("Link error: {0}")]
    Link(#[from] aurum_links::LinkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
