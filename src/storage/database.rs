//! SQLite-backed Task Store schema (spec §3 DATA MODEL, §6 "Persistent
//! state layout").
//!
//! Embedded database for persistent storage using rusqlite with r2d2
//! connection pooling, mirroring the teacher's `storage/database.rs`.

use r2d2::{CustomizeConnection, Pool};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use autoforge_core::{AppError, AppResult};

/// Type alias for the connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Enables foreign-key enforcement on every pooled connection; rusqlite
/// does not turn this on by default.
#[derive(Debug)]
struct ForeignKeysOn;

impl CustomizeConnection<Connection, rusqlite::Error> for ForeignKeysOn {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    }
}

const SCHEMA: &str = include_str!("schema.sql");

/// Database service for managing SQLite operations.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (creating if absent) the sqlite file at `path` and apply schema.
    pub fn open(path: &str) -> AppResult<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(10)
            .connection_customizer(Box::new(ForeignKeysOn))
            .build(manager)
            .map_err(|e| AppError::storage(format!("failed to create connection pool: {e}")))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// In-memory database, used by tests and `Config::for_tests`.
    pub fn open_in_memory() -> AppResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .connection_customizer(Box::new(ForeignKeysOn))
            .build(manager)
            .map_err(|e| AppError::storage(format!("failed to create connection pool: {e}")))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    fn init_schema(&self) -> AppResult<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| AppError::storage(format!("failed to get connection: {e}")))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| AppError::storage(format!("failed to apply schema: {e}")))
    }
}
