//! Application container
//!
//! Owns the long-lived pieces of the client. Session state lives in the
//! [`SessionManager`]; everything else reads it from there.

use std::sync::Arc;

use aurum_session::{
    CredentialStore, DatabaseCredentials, HttpSessionBackend, IdentityProvider, LoginRoute,
    MemoryCredentials, Outcome, SessionManager,
};
use aurum_storage::Database;

use crate::config::Config;
use crate::Result;

pub struct App {
    config: Config,
    /// None when credentials are kept in memory only
    db: Option<Database>,
    session_manager: SessionManager,
}

impl App {
    /// Client whose credential survives restarts
    pub fn new(config: Config, provider: Arc<dyn IdentityProvider>) -> Result<Self> {
        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&config.database_path)?;
        let credentials = Arc::new(DatabaseCredentials::new(db.clone()));

        Self::build(config, Some(db), credentials, provider)
    }

    /// Client that forgets its credential on exit
    pub fn in_memory(config: Config, provider: Arc<dyn IdentityProvider>) -> Result<Self> {
        Self::build(config, None, Arc::new(MemoryCredentials::new()), provider)
    }

    fn build(
        config: Config,
        db: Option<Database>,
        credentials: Arc<dyn CredentialStore>,
        provider: Arc<dyn IdentityProvider>,
    ) -> Result<Self> {
        let backend_url = config.backend_url()?;
        let route = LoginRoute::new(
            config.provider_link()?,
            config.launch_environment()?,
            backend_url.clone(),
        );
        let backend = HttpSessionBackend::new(backend_url, credentials)?;

        tracing::info!(
            backend = %backend.base_url(),
            persistent = db.is_some(),
            embedded = route.environment().is_embedded(),
            "Aurum client configured"
        );

        let session_manager = SessionManager::new(Arc::new(backend), provider, route);

        Ok(Self {
            config,
            db,
            session_manager,
        })
    }

    /// Restore the persisted session, then handle the launch URL if any
    pub async fn start(&self, initial_url: Option<&str>) -> Outcome {
        self.session_manager.start(initial_url).await
    }

    pub fn session_manager(&self) -> &SessionManager {
        &self.session_manager
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> Option<&Database> {
        self.db.as_ref()
    }
}
