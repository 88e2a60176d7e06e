//! Durable credential storage
//!
//! The backend credential is opaque: it is stored and replayed, never parsed.

use parking_lot::Mutex;

use aurum_storage::Database;

use crate::backend::SESSION_COOKIE;
use crate::Result;

pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<String>>;
    fn save(&self, credential: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Credential kept in the local SQLite database across restarts
pub struct DatabaseCredentials {
    db: Database,
    name: String,
}

impl DatabaseCredentials {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            name: SESSION_COOKIE.to_string(),
        }
    }
}

impl CredentialStore for DatabaseCredentials {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.db.load_credential(&self.name)?.map(|c| c.value))
    }

    fn save(&self, credential: &str) -> Result<()> {
        Ok(self.db.save_credential(&self.name, credential)?)
    }

    fn clear(&self) -> Result<()> {
        self.db.delete_credential(&self.name)?;
        Ok(())
    }
}

/// Process-lifetime credential, forgotten on exit
#[derive(Default)]
pub struct MemoryCredentials {
    credential: Mutex<Option<String>>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: impl Into<String>) -> Self {
        Self {
            credential: Mutex::new(Some(credential.into())),
        }
    }
}

impl CredentialStore for MemoryCredentials {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.credential.lock().clone())
    }

    fn save(&self, credential: &str) -> Result<()> {
        *self.credential.lock() = Some(credential.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.credential.lock() = None;
        Ok(())
    }
}
