//! Persistence of the forum session between restarts.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::transport::StoredCookie;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for SessionStoreError {
    fn from(e: rusqlite::Error) -> Self {
        SessionStoreError::Database(e.to_string())
    }
}

/// The blob written after every successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    /// Forum the cookies belong to; a blob for another forum is ignored
    pub base_url: String,
    pub cookies: Vec<StoredCookie>,
    pub saved_at: DateTime<Utc>,
}

pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<PersistedSession>, SessionStoreError>;

    fn save(&self, session: &PersistedSession) -> Result<(), SessionStoreError>;
}

/// JSON file store. Writes go to a sibling temp file which is synced and then
/// renamed over the previous blob, so an interrupted write never leaves a
/// truncated file behind.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<PersistedSession>, SessionStoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save(&self, session: &PersistedSession) -> Result<(), SessionStoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.temp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&serde_json::to_vec_pretty(session)?)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// SQLite store keeping a single row.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    pub fn new(path: &Path) -> Result<Self, SessionStoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, SessionStoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), SessionStoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS forum_session (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                base_url TEXT NOT NULL,
                cookies TEXT NOT NULL,
                saved_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SessionStoreError> {
        self.conn
            .lock()
            .map_err(|_| SessionStoreError::Database("connection lock poisoned".to_string()))
    }
}

impl SessionStore for SqliteSessionStore {
    fn load(&self) -> Result<Option<PersistedSession>, SessionStoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT base_url, cookies, saved_at FROM forum_session WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((base_url, cookies_json, saved_at)) = row else {
            return Ok(None);
        };

        let saved_at = DateTime::parse_from_rfc3339(&saved_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(PersistedSession {
            base_url,
            cookies: serde_json::from_str(&cookies_json)?,
            saved_at,
        }))
    }

    fn save(&self, session: &PersistedSession) -> Result<(), SessionStoreError> {
        let cookies_json = serde_json::to_string(&session.cookies)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO forum_session (id, base_url, cookies, saved_at) VALUES (1, ?1, ?2, ?3)",
            params![session.base_url, cookies_json, session.saved_at.to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session(value: &str) -> PersistedSession {
        PersistedSession {
            base_url: "https://forum.example.org".to_string(),
            cookies: vec![StoredCookie {
                name: "phpbb3_abc_sid".to_string(),
                value: value.to_string(),
            }],
            saved_at: Utc::now(),
        }
    }

    #[test]
    fn test_file_store_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path().join("session.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_store_overwrites_and_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path().join("nested/session.json"));

        store.save(&session("first")).unwrap();
        store.save(&session("second")).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.cookies[0].value, "second");
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_file_store_corrupt_blob_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json").unwrap();
        let store = FileSessionStore::new(path);
        assert!(matches!(
            store.load(),
            Err(SessionStoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_sqlite_store_keeps_single_row() {
        let store = SqliteSessionStore::in_memory().unwrap();
        assert!(store.load().unwrap().is_none());

        store.save(&session("first")).unwrap();
        store.save(&session("second")).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.cookies.len(), 1);
        assert_eq!(loaded.cookies[0].value, "second");

        let count: i64 = store
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM forum_session", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_sqlite_store_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.db");
        SqliteSessionStore::new(&path)
            .unwrap()
            .save(&session("persisted"))
            .unwrap();

        let reopened = SqliteSessionStore::new(&path).unwrap();
        assert_eq!(reopened.load().unwrap().unwrap().cookies[0].value, "persisted");
    }
}
