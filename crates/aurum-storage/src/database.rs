//! Database connection and credential persistence

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

use crate::error::StorageError;
use crate::migrations::run_migrations;
use crate::Result;

/// A credential row as persisted on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
    pub name: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for better concurrent performance
        let _: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub fn load_credential(&self, name: &str) -> Result<Option<StoredCredential>> {
        self.with_connection(|conn| {
            let row = conn
                .query_row(
                    "SELECT name, value, created_at, updated_at FROM credentials WHERE name = ?1",
                    [name],
                    |row| {
                        let created_str: String = row.get(2)?;
                        let updated_str: String = row.get(3)?;
                        Ok(StoredCredential {
                            name: row.get(0)?,
                            value: row.get(1)?,
                            created_at: parse_timestamp(&created_str),
                            updated_at: parse_timestamp(&updated_str),
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Insert or replace a credential. `created_at` keeps the first insert time.
    pub fn save_credential(&self, name: &str, value: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(StorageError::EmptyCredentialName);
        }

        let now = Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO credentials (name, value, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value,
                                                 updated_at = excluded.updated_at",
                rusqlite::params![name, value, now],
            )?;
            Ok(())
        })?;

        tracing::debug!(credential = %name, "Persisted credential");
        Ok(())
    }

    /// Returns true when a row was removed.
    pub fn delete_credential(&self, name: &str) -> Result<bool> {
        let removed = self.with_connection(|conn| {
            Ok(conn.execute("DELETE FROM credentials WHERE name = ?1", [name])?)
        })?;

        if removed > 0 {
            tracing::debug!(credential = %name, "Deleted credential");
        }
        Ok(removed > 0)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
