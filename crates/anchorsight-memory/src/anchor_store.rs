//! SQLite-backed world-anchor provider.
//!
//! # Storage layout
//!
//! A single table `world_anchors` is created (if it does not already exist):
//!
//! | column     | type | description                                   |
//! |------------|------|-----------------------------------------------|
//! | id         | TEXT | UUID v4 primary key ([`AnchorId`])            |
//! | transform  | TEXT | JSON-encoded origin-from-anchor `Transform3D` |
//! | created_at | TEXT | RFC-3339 creation time (UTC)                  |
//!
//! The [`AnchorProvider`] methods run their queries on Tokio's blocking
//! pool; the synchronous accessors lock the connection on the caller's
//! thread.
//!
//! # Example
//!
//! ```rust
//! use anchorsight_memory::SqliteAnchorProvider;
//!
//! let store = SqliteAnchorProvider::open_in_memory(5).unwrap();
//! assert_eq!(store.count().unwrap(), 0);
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anchorsight_hal::{AnchorError, AnchorProvider, WorldAnchor};
use anchorsight_perception::Transform3D;
use anchorsight_types::{AnchorId, SightError};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Errors that can arise from anchor store operations.
#[derive(Error, Debug)]
pub enum AnchorStoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Transform encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Corrupt anchor id '{0}'")]
    CorruptId(String),
}

impl From<AnchorStoreError> for AnchorError {
    fn from(e: AnchorStoreError) -> Self {
        AnchorError::Provider(e.to_string())
    }
}

impl From<AnchorStoreError> for SightError {
    fn from(e: AnchorStoreError) -> Self {
        SightError::Storage(e.to_string())
    }
}

/// Persists world anchors to SQLite and refuses new ones once `capacity`
/// anchors are stored.
pub struct SqliteAnchorProvider {
    conn: Arc<Mutex<Connection>>,
    capacity: usize,
}

impl SqliteAnchorProvider {
    /// Open (or create) a persistent anchor database at `path`.
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self, AnchorStoreError> {
        let conn = Connection::open(path.as_ref())?;
        let store = Self::with_connection(conn, capacity)?;
        info!(path = %path.as_ref().display(), anchors = store.count()?, "anchor store opened");
        Ok(store)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory(capacity: usize) -> Result<Self, AnchorStoreError> {
        Self::with_connection(Connection::open_in_memory()?, capacity)
    }

    fn with_connection(conn: Connection, capacity: usize) -> Result<Self, AnchorStoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS world_anchors (
                id         TEXT NOT NULL PRIMARY KEY,
                transform  TEXT NOT NULL,
                created_at TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            capacity,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        lock(&self.conn)
    }

    /// Run `op` against the connection on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T, AnchorError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, AnchorStoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let outcome = tokio::task::spawn_blocking(move || op(&lock(&conn)))
            .await
            .map_err(|e| AnchorError::Provider(format!("anchor store task failed: {e}")))?;
        Ok(outcome?)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of stored anchors.
    pub fn count(&self) -> Result<usize, AnchorStoreError> {
        let n: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM world_anchors", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Look up a single anchor.
    pub fn get(&self, id: AnchorId) -> Result<Option<WorldAnchor>, AnchorStoreError> {
        let json: Option<String> = self
            .conn()
            .query_row(
                "SELECT transform FROM world_anchors WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(WorldAnchor {
                id,
                origin_from_anchor: serde_json::from_str::<Transform3D>(&json)?,
            })),
            None => Ok(None),
        }
    }

    /// All anchors, oldest first.
    pub fn all(&self) -> Result<Vec<WorldAnchor>, AnchorStoreError> {
        load_all(&self.conn())
    }
}

fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Insert `anchor` unless `capacity` anchors are already stored.  Returns
/// `false` when the store is full.
fn insert(conn: &Connection, anchor: &WorldAnchor, capacity: usize) -> Result<bool, AnchorStoreError> {
    let transform = serde_json::to_string(&anchor.origin_from_anchor)?;
    let stored: i64 = conn.query_row("SELECT COUNT(*) FROM world_anchors", [], |row| row.get(0))?;
    if stored as usize >= capacity {
        return Ok(false);
    }
    conn.execute(
        "INSERT INTO world_anchors (id, transform, created_at) VALUES (?1, ?2, ?3)",
        params![anchor.id.to_string(), transform, Utc::now().to_rfc3339()],
    )?;
    Ok(true)
}

fn delete(conn: &Connection, id: AnchorId) -> Result<bool, AnchorStoreError> {
    let removed = conn.execute("DELETE FROM world_anchors WHERE id = ?1", params![id.to_string()])?;
    Ok(removed > 0)
}

fn load_all(conn: &Connection) -> Result<Vec<WorldAnchor>, AnchorStoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, transform FROM world_anchors ORDER BY created_at ASC, rowid ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        let id: String = row.get(0)?;
        let transform: String = row.get(1)?;
        Ok((id, transform))
    })?;

    let mut anchors = Vec::new();
    for row in rows {
        let (id, transform) = row?;
        let uuid = Uuid::parse_str(&id).map_err(|_| AnchorStoreError::CorruptId(id.clone()))?;
        anchors.push(WorldAnchor {
            id: AnchorId(uuid),
            origin_from_anchor: serde_json::from_str(&transform)?,
        });
    }
    Ok(anchors)
}

#[async_trait]
impl AnchorProvider for SqliteAnchorProvider {
    async fn add_anchor(&self, anchor: WorldAnchor) -> Result<(), AnchorError> {
        let capacity = self.capacity;
        if !self.blocking(move |conn| insert(conn, &anchor, capacity)).await? {
            return Err(AnchorError::CapacityExceeded);
        }
        debug!(anchor_id = %anchor.id, "anchor stored");
        Ok(())
    }

    async fn remove_anchor(&self, id: AnchorId) -> Result<(), AnchorError> {
        if self.blocking(move |conn| delete(conn, id)).await? {
            debug!(anchor_id = %id, "anchor deleted");
        }
        Ok(())
    }

    async fn anchors(&self) -> Result<Vec<WorldAnchor>, AnchorError> {
        self.blocking(load_all).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
