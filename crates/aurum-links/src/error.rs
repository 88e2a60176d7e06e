//! Link error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),
}
