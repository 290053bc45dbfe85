//! The secret store contract and its SQLite implementation.

use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};

/// Durable, device-scoped string store. No enumeration.
///
/// Implementations are shared between the handshake, the pipelines and the
/// scheduler, so they must be usable from several tasks at once.
pub trait SecretStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Returns `true` if a value was removed.
    fn delete(&self, key: &str) -> Result<bool>;
}

impl Database {
    pub fn get_secret(&self, key: &str) -> Result<Option<String>> {
        self.conn()
            .query_row(
                "SELECT value FROM secrets WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::Sqlite)
    }

    pub fn set_secret(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO secrets (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                            updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn delete_secret(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM secrets WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }
}

/// [`SecretStore`] backed by the local SQLite database.
pub struct SqliteSecretStore {
    db: Mutex<Database>,
}

impl SqliteSecretStore {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Store in the platform data directory.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(Database::new()?))
    }

    pub fn open_in(data_dir: &std::path::Path) -> Result<Self> {
        Ok(Self::new(Database::open_in(data_dir)?))
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let guard = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        f(&guard)
    }
}

impl SecretStore for SqliteSecretStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_db(|db| db.get_secret(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_db(|db| db.set_secret(key, value))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.with_db(|db| db.delete_secret(key))
    }
}
