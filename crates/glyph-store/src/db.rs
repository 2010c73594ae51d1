//! Turso database handle shared by the durable backends.
//!
//! Architecture:
//!   - Database file: `rate_limit.store_path` (e.g. .glyph/state.db)
//!   - WAL mode: several processes can share one file
//!   - Schema: rate_hits, dir_locks

use glyph_core::GlyphError;
use std::path::Path;
use tokio::sync::{Mutex, MutexGuard};
use turso::{params, Builder, Connection};

/// Database errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("turso error: {0}")]
    Turso(#[from] turso::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for GlyphError {
    fn from(err: StoreError) -> Self {
        GlyphError::Storage(err.to_string())
    }
}

/// Database connection wrapper for Turso
///
/// Transactions need exclusive access to the connection, so it sits behind
/// an async mutex.
pub struct Database {
    conn: Mutex<Connection>,
    path: String,
}

impl Database {
    /// Open the database at `path`, creating it and its schema if needed.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use glyph_store::Database;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Database::open(".glyph/state.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let db = Builder::new_local(&path_str).build().await?;
        let conn = db.connect()?;

        // PRAGMA statements may return rows, so use query()
        let _ = conn.query("PRAGMA journal_mode=WAL", params![]).await?;
        let _ = conn.query("PRAGMA busy_timeout=5000", params![]).await?;

        let database = Database {
            conn: Mutex::new(conn),
            path: path_str,
        };
        database.init_schema().await?;
        Ok(database)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Create tables and indexes. Idempotent.
    pub async fn init_schema(&self) -> Result<()> {
        let statements = [
            // One row per admitted hit
            r#"CREATE TABLE IF NOT EXISTS rate_hits (
                key TEXT NOT NULL,
                ts INTEGER NOT NULL
            )"#,
            "CREATE INDEX IF NOT EXISTS idx_rate_hits_key_ts ON rate_hits(key, ts)",
            "CREATE INDEX IF NOT EXISTS idx_rate_hits_ts ON rate_hits(ts)",
            // Lease-based directory locks
            r#"CREATE TABLE IF NOT EXISTS dir_locks (
                dir TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )"#,
        ];

        let conn = self.conn.lock().await;
        for stmt in statements {
            conn.execute(stmt, params![]).await?;
        }
        Ok(())
    }

    /// Exclusive access to the connection
    pub async fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }

    /// Number of recorded hits across all keys
    pub async fn hit_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        let mut rows = conn.query("SELECT COUNT(*) FROM rate_hits", params![]).await?;
        if let Some(row) = rows.next().await? {
            Ok(row.get(0)?)
        } else {
            Ok(0)
        }
    }
}
