//! Database schema management.

use std::sync::Once;

use recall_protocols::EMBEDDING_DIM;
use rusqlite::Connection;
use tracing::{info, warn};

/// Value stored in `PRAGMA user_version` once the schema is applied.
pub const SCHEMA_VERSION: i64 = 1;

/// Register sqlite-vec as an auto-extension for every connection opened
/// afterwards in this process.
pub(crate) fn register_vec_extension() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        // SAFETY: `sqlite3_vec_init` is the statically linked sqlite-vec entry
        // point and has the signature SQLite expects from an extension init.
        unsafe {
            type ExtEntryPoint = unsafe extern "C" fn(
                *mut rusqlite::ffi::sqlite3,
                *mut *mut std::os::raw::c_char,
                *const rusqlite::ffi::sqlite3_api_routines,
            ) -> std::os::raw::c_int;

            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute::<
                *const (),
                ExtEntryPoint,
            >(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        }
    });
}

/// What the connection can do with vectors after initialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct VectorSupport {
    /// Vectors are written on insert and searched.
    pub enabled: bool,
    /// `memory_vectors` exists and is readable, so deletes must cascade to it.
    pub table_present: bool,
}

/// Initialize the database schema. Safe to run on every open.
pub(crate) fn init_schema(conn: &Connection, want_vectors: bool) -> rusqlite::Result<VectorSupport> {
    conn.execute_batch(SCHEMA)?;

    let version = match conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0)) {
        Ok(version) => Some(version),
        Err(e) => {
            warn!("sqlite-vec unavailable, vector search disabled: {}", e);
            None
        }
    };

    if want_vectors && version.is_some() {
        conn.execute_batch(&vector_schema())?;
    }

    let table_present = version.is_some() && vector_table_exists(conn)?;
    let support = VectorSupport {
        enabled: want_vectors && table_present,
        table_present,
    };

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

    info!(
        vec_version = version.as_deref().unwrap_or("none"),
        vectors = support.enabled,
        "Memory schema ready"
    );
    Ok(support)
}

fn vector_table_exists(conn: &Connection) -> rusqlite::Result<bool> {
    let mut stmt =
        conn.prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'memory_vectors'")?;
    stmt.exists([])
}

fn vector_schema() -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS memory_vectors USING vec0(
            embedding float[{}] distance_metric=cosine
        );",
        EMBEDDING_DIM
    )
}

const SCHEMA: &str = r#"
-- Memory records; AUTOINCREMENT keeps ids from being reused after deletes
CREATE TABLE IF NOT EXISTS memories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    importance REAL NOT NULL DEFAULT 0.5 CHECK (importance >= 0.0 AND importance <= 1.0),
    memory_type TEXT NOT NULL DEFAULT 'general',
    source TEXT,
    created_at TEXT NOT NULL,
    last_accessed TEXT,
    access_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at);
CREATE INDEX IF NOT EXISTS idx_memories_importance ON memories(importance);

-- Full-text search table
CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    content,
    content='memories',
    content_rowid='id',
    tokenize='porter unicode61'
);

-- Triggers to keep FTS in sync
CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
    INSERT INTO memories_fts(rowid, content) VALUES (new.id, new.content);
END;

CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, content) VALUES('delete', old.id, old.content);
END;

CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE OF content ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, content) VALUES('delete', old.id, old.content);
    INSERT INTO memories_fts(rowid, content) VALUES (new.id, new.content);
END;
"#;
