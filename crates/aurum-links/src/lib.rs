//! Aurum Deep Links
//!
//! Two directions of the identity-provider round trip:
//! - outbound: where the provider should send the user back to, and the
//!   provider URL that carries that target
//! - inbound: pulling the one-time `session_id` out of whatever URL
//!   re-enters the client

mod error;
mod redirect;
mod token;

pub use error::LinkError;
pub use redirect::{LaunchEnvironment, ProviderLink};
pub use token::{extract_session_token, LinkResolution, SessionToken};

pub type Result<T> = std::result::Result<T, LinkError>;
