use crate::error::Error;
use rusqlite::{params, Connection};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

const SCHEMA_VERSION: i64 = 1;

const DEFAULT_TAGS: [(&str, &str); 7] = [
    ("Draft", "#fbbf24"),
    ("Final", "#60a5fa"),
    ("Multi-color", "#a78bfa"),
    ("Print Next", "#fb923c"),
    ("Printed", "#4ade80"),
    ("Prototype", "#f472b6"),
    ("Urgent", "#f87171"),
];

/// The persistent catalog of models, tags and collections.
///
/// One SQLite connection behind a mutex; every public operation is a single
/// short statement (or a handful of reads), so the lock is never held across
/// an `.await` by callers.
pub struct Catalog {
    conn: Mutex<Option<Connection>>,
}

impl Catalog {
    pub fn open(path: &str) -> Result<Self, Error> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        debug!("Opened catalog at {}", path);
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, Error> {
        configure_pragmas(&conn)?;
        migrate_schema(&conn)?;
        seed_default_tags(&conn)?;
        Ok(Catalog {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>, Error> {
        self.conn
            .lock()
            .map_err(|e| Error::Other(format!("Failed to lock catalog: {}", e)))
    }

    /// Run `f` against the open connection. Fails with `NotInitialized` once
    /// the catalog has been closed.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, Error> {
        let guard = self.lock()?;
        let conn = guard.as_ref().ok_or(Error::NotInitialized)?;
        Ok(f(conn)?)
    }

    pub fn is_open(&self) -> bool {
        self.lock().map(|guard| guard.is_some()).unwrap_or(false)
    }

    pub fn close(&self) -> Result<(), Error> {
        let mut guard = self.lock()?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| Error::Database(e))?;
            info!("Catalog closed");
        }
        Ok(())
    }
}

fn configure_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    debug!("SQLite pragmas configured (WAL mode, foreign keys on)");
    Ok(())
}

/// Create missing tables and bring catalogs written by older releases up to
/// date: the `source_metadata` column and the `model_collections` join table
/// both arrived after the first release.
fn migrate_schema(conn: &Connection) -> rusqlite::Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    conn.execute_batch(include_str!("schema.sql"))?;

    if !has_column(conn, "models", "source_metadata")? {
        info!("Adding source_metadata column to models");
        conn.execute_batch("ALTER TABLE models ADD COLUMN source_metadata TEXT")?;
    }

    let join_rows: i64 =
        conn.query_row("SELECT COUNT(*) FROM model_collections", [], |row| row.get(0))?;
    let legacy_rows: i64 = conn.query_row(
        "SELECT COUNT(*) FROM models WHERE collection_id IS NOT NULL",
        [],
        |row| row.get(0),
    )?;
    if join_rows == 0 && legacy_rows > 0 {
        let moved = conn.execute(
            "INSERT OR IGNORE INTO model_collections (model_id, collection_id) \
             SELECT id, collection_id FROM models WHERE collection_id IS NOT NULL",
            [],
        )?;
        info!("Moved {} legacy collection memberships to model_collections", moved);
    }

    if version < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    debug!("SQLite schema initialized (version {})", SCHEMA_VERSION);
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM pragma_table_info('{}') WHERE name = ?1", table),
        params![column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn seed_default_tags(conn: &Connection) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare("INSERT OR IGNORE INTO tags (name, color) VALUES (?1, ?2)")?;
    for (name, color) in DEFAULT_TAGS {
        stmt.execute(params![name, color])?;
    }
    Ok(())
}
