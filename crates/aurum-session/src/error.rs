//! Session error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend responded with status {0}")]
    Status(u16),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Link error: {0}")]
    Link(#[from] aurum_links::LinkError),

    #[error("Storage error: {0}")]
    Storage(#[from] aurum_storage::StorageError),

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("A deep-link listener is already registered")]
    ListenerAlreadyRegistered,
}

impl SessionError {
    /// The backend rejected the credential or token itself
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, SessionError::Status(401 | 403))
    }
}
