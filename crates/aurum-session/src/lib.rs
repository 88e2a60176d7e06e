//! Aurum Session Management
//!
//! Owns the answer to "is someone signed in, and who":
//! - cold start restores a persisted backend credential
//! - the identity provider hands back a one-time `session_id` through a
//!   deep link, which is exchanged for a durable credential
//! - every failure degrades to guest browsing, never to an error dialog
//!
//! Consumers hold a cloned [`SessionManager`] and observe [`AuthSnapshot`]
//! updates through [`SessionManager::subscribe`].

mod backend;
mod credentials;
mod error;
mod listener;
mod manager;
mod provider;
mod state;
mod user;

pub use aurum_links::{LaunchEnvironment, ProviderLink, SessionToken};
pub use backend::{HttpSessionBackend, SessionBackend, SESSION_COOKIE};
pub use credentials::{CredentialStore, DatabaseCredentials, MemoryCredentials};
pub use error::SessionError;
pub use listener::DeepLinkListener;
pub use manager::{Outcome, SessionManager};
pub use provider::{IdentityProvider, LoginRoute, ProviderOutcome};
pub use state::{AuthSnapshot, AuthState, StateChange};
pub use user::User;

pub type Result<T> = std::result::Result<T, SessionError>;
