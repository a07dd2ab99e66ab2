//! Per-user note lists kept in the local key-value table

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, OptionalExtension};

use super::Database;
use crate::error::{Error, Result};
use crate::models::Note;
use crate::util::unix_millis_now;

/// Storage key for a user's note list.
pub fn notes_key(user_id: &str) -> String {
    format!("notes-app-notes-{user_id}")
}

/// Offline fallback store holding each user's notes as one JSON array.
/// SQLite work runs on the blocking pool.
#[derive(Clone)]
pub struct LocalNoteStore {
    db: Arc<Mutex<Database>>,
}

impl LocalNoteStore {
    /// Open (or create) the store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_database(Database::open(path)?))
    }

    /// In-memory store for tests and throwaway sessions
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    pub fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    async fn with_db<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let db = db
                .lock()
                .map_err(|_| Error::Task("local store lock poisoned".to_string()))?;
            work(&db)
        })
        .await?
    }

    /// Load the user's notes. A missing key yields an empty list, and so
    /// does a value that no longer parses.
    pub async fn load_notes(&self, user_id: &str) -> Result<Vec<Note>> {
        let key = notes_key(user_id);
        let raw: Option<String> = self
            .with_db({
                let key = key.clone();
                move |db| {
                    Ok(db
                        .connection()
                        .query_row(
                            "SELECT value FROM kv_store WHERE key = ?1",
                            params![key],
                            |row| row.get(0),
                        )
                        .optional()?)
                }
            })
            .await?;

        let Some(raw) = raw else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Vec<Note>>(&raw) {
            Ok(notes) => Ok(notes),
            Err(error) => {
                tracing::warn!(%key, "Discarding unreadable local notes: {error}");
                Ok(Vec::new())
            }
        }
    }

    /// Replace the user's stored note list.
    pub async fn save_notes(&self, user_id: &str, notes: &[Note]) -> Result<()> {
        let value = serde_json::to_string(notes)?;
        let key = notes_key(user_id);
        self.with_db(move |db| {
            db.connection().execute(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, unix_millis_now()],
            )?;
            Ok(())
        })
        .await?;
        tracing::debug!(count = notes.len(), "Saved local notes");
        Ok(())
    }

    pub async fn clear(&self, user_id: &str) -> Result<()> {
        let key = notes_key(user_id);
        self.with_db(move |db| {
            db.connection()
                .execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }

    #[cfg(test)]
    pub(crate) async fn put_raw(&self, user_id: &str, value: &str) -> Result<()> {
        let key = notes_key(user_id);
        let value = value.to_string();
        self.with_db(move |db| {
            db.connection().execute(
                "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?1, ?2, 0)",
                params![key, value],
            )?;
            Ok(())
        })
        .await
    }
}
