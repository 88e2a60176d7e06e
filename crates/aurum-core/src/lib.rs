//! Aurum Core
//!
//! Configuration and wiring for the Aurum client: opens local storage, builds
//! the HTTP session backend and hands out the [`SessionManager`].

mod app;
mod config;
mod error;

pub use app::App;
pub use config::Config;
pub use error::CoreError;

pub use aurum_links::{LaunchEnvironment, LinkError, ProviderLink, SessionToken};
pub use aurum_session::{
    AuthSnapshot, AuthState, DeepLinkListener, IdentityProvider, Outcome, ProviderOutcome,
    SessionError, SessionManager, StateChange, User,
};
pub use aurum_storage::{Database, StorageError};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
