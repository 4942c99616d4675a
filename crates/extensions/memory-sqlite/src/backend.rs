//! SQLite memory store implementation.

use std::collections::HashMap;
use std::path::Path;

use chrono::{Datelike, Duration, SecondsFormat, Utc};
use rusqlite::{OptionalExtension, params};
use tokio_rusqlite::Connection;
use tracing::{debug, info, warn};

use recall_protocols::{EMBEDDING_DIM, MemoryError, MemoryRecord, MemoryStats, NewMemory, SearchResult};

use crate::schema::{VectorSupport, init_schema, register_vec_extension};

#[path = "backend_search.rs"]
mod backend_search;
use backend_search::{RECORD_COLUMNS, hydrate_candidates, knn_candidates, lexical_search, row_to_record};

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;

/// SQLite-based memory store.
///
/// All statements run on the single `tokio-rusqlite` connection thread, so
/// calls are serialized. Each mutation is one transaction covering the
/// primary row and both indices.
pub struct SqliteMemoryStore {
    conn: Connection,
    vectors: VectorSupport,
}

impl SqliteMemoryStore {
    /// Create a new in-memory database with the vector index enabled.
    pub async fn in_memory() -> Result<Self, MemoryError> {
        Self::open_in_memory(true).await
    }

    /// Create a new in-memory database.
    pub async fn open_in_memory(vector_index: bool) -> Result<Self, MemoryError> {
        register_vec_extension();
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| MemoryError::ConnectionError(e.to_string()))?;
        Self::init(conn, vector_index).await
    }

    /// Open or create a file-backed database.
    pub async fn open(path: impl AsRef<Path>, vector_index: bool) -> Result<Self, MemoryError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| MemoryError::ConnectionError(e.to_string()))?;
        }

        register_vec_extension();
        let conn = Connection::open(path)
            .await
            .map_err(|e| MemoryError::ConnectionError(e.to_string()))?;
        Self::init(conn, vector_index).await
    }

    async fn init(conn: Connection, vector_index: bool) -> Result<Self, MemoryError> {
        let vectors = conn
            .call(move |conn| Ok(init_schema(conn, vector_index)?))
            .await
            .map_err(|e| MemoryError::StorageError(e.to_string()))?;

        Ok(Self { conn, vectors })
    }

    /// Whether embeddings are stored and vector search is possible.
    pub fn has_vector_index(&self) -> bool {
        self.vectors.enabled
    }

    /// Insert a record, its FTS entry and, when present, its vector row.
    ///
    /// Importance is clamped. Content must not be blank and an embedding must
    /// have exactly [`EMBEDDING_DIM`] values; otherwise nothing is written.
    pub async fn insert(&self, memory: NewMemory) -> Result<i64, MemoryError> {
        if memory.content.trim().is_empty() {
            return Err(MemoryError::EmptyContent);
        }
        if let Some(embedding) = &memory.embedding {
            check_dimension(embedding)?;
        }

        let importance = memory.clamped_importance();
        let created_at = timestamp(memory.created_at.unwrap_or_else(Utc::now));
        let blob = match memory.embedding {
            Some(embedding) if self.vectors.enabled => Some(to_blob(&embedding)),
            Some(_) => {
                warn!("Vector index disabled, storing memory without its embedding");
                None
            }
            None => None,
        };
        let has_vector = blob.is_some();

        let id = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                tx.execute(
                    "INSERT INTO memories (content, importance, memory_type, source, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        memory.content,
                        importance,
                        memory.memory_type.as_str(),
                        memory.source,
                        created_at
                    ],
                )?;
                let id = tx.last_insert_rowid();

                if let Some(blob) = blob {
                    tx.execute(
                        "INSERT INTO memory_vectors (rowid, embedding) VALUES (?1, ?2)",
                        params![id, blob],
                    )?;
                }

                tx.commit()?;
                Ok(id)
            })
            .await
            .map_err(|e| MemoryError::StorageError(e.to_string()))?;

        debug!(id, has_vector, "Stored memory");
        Ok(id)
    }

    /// Fetch a record and record the access.
    pub async fn get(&self, id: i64) -> Result<Option<MemoryRecord>, MemoryError> {
        let now = timestamp(Utc::now());
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let changed = tx.execute(
                    "UPDATE memories SET access_count = access_count + 1, last_accessed = ?1
                     WHERE id = ?2",
                    params![now, id],
                )?;
                if changed == 0 {
                    return Ok(None);
                }

                let record = tx.query_row(
                    &format!("SELECT {} FROM memories WHERE id = ?1", RECORD_COLUMNS),
                    [id],
                    row_to_record,
                )?;

                tx.commit()?;
                Ok(Some(record))
            })
            .await
            .map_err(|e| MemoryError::StorageError(e.to_string()))
    }

    /// Delete a record and its vector row. Returns whether a record existed.
    pub async fn delete(&self, id: i64) -> Result<bool, MemoryError> {
        let cascade_vectors = self.vectors.table_present;
        let deleted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                if cascade_vectors {
                    tx.execute("DELETE FROM memory_vectors WHERE rowid = ?1", [id])?;
                }
                let deleted = tx.execute("DELETE FROM memories WHERE id = ?1", [id])?;

                tx.commit()?;
                Ok(deleted > 0)
            })
            .await
            .map_err(|e| MemoryError::StorageError(e.to_string()))?;

        debug!(id, deleted, "Deleted memory");
        Ok(deleted)
    }

    /// Most recently created records first. Does not count as an access.
    pub async fn recent(&self, limit: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM memories ORDER BY created_at DESC, id DESC LIMIT ?1",
                    RECORD_COLUMNS
                ))?;
                let records = stmt
                    .query_map([limit as i64], row_to_record)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(records)
            })
            .await
            .map_err(|e| MemoryError::QueryError(e.to_string()))
    }

    /// Delete records that are both older than `older_than_days` and less
    /// important than `importance_below`. Returns the number removed.
    pub async fn prune(
        &self,
        older_than_days: u32,
        importance_below: f32,
    ) -> Result<usize, MemoryError> {
        let cutoff = Duration::try_days(i64::from(older_than_days))
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .filter(|cutoff| cutoff.year() >= 0);
        let Some(cutoff) = cutoff.map(timestamp) else {
            debug!(older_than_days, "Prune cutoff precedes every record, nothing to remove");
            return Ok(0);
        };
        let cascade_vectors = self.vectors.table_present;

        let removed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let ids: Vec<i64> = {
                    let mut stmt = tx.prepare(
                        "SELECT id FROM memories WHERE created_at < ?1 AND importance < ?2",
                    )?;
                    stmt.query_map(params![cutoff, importance_below], |row| row.get(0))?
                        .collect::<Result<Vec<_>, _>>()?
                };

                for id in &ids {
                    if cascade_vectors {
                        tx.execute("DELETE FROM memory_vectors WHERE rowid = ?1", [id])?;
                    }
                    tx.execute("DELETE FROM memories WHERE id = ?1", [id])?;
                }

                tx.commit()?;
                Ok(ids.len())
            })
            .await
            .map_err(|e| MemoryError::StorageError(e.to_string()))?;

        info!(removed, older_than_days, importance_below, "Pruned memories");
        Ok(removed)
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<usize, MemoryError> {
        self.conn
            .call(|conn| {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
            .map_err(|e| MemoryError::QueryError(e.to_string()))
    }

    pub async fn stats(&self) -> Result<MemoryStats, MemoryError> {
        let vectors = self.vectors.table_present;
        self.conn
            .call(move |conn| {
                let (total, avg): (i64, Option<f64>) = conn.query_row(
                    "SELECT COUNT(*), AVG(importance) FROM memories",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;

                let with_embeddings: i64 = if vectors {
                    conn.query_row("SELECT COUNT(*) FROM memory_vectors", [], |row| row.get(0))?
                } else {
                    0
                };

                let mut by_type = HashMap::new();
                let mut stmt =
                    conn.prepare("SELECT memory_type, COUNT(*) FROM memories GROUP BY memory_type")?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?;
                for row in rows {
                    let (memory_type, count) = row?;
                    by_type.insert(memory_type, count as usize);
                }

                Ok(MemoryStats {
                    total: total as usize,
                    with_embeddings: with_embeddings as usize,
                    by_type,
                    avg_importance: avg.unwrap_or(0.0) as f32,
                })
            })
            .await
            .map_err(|e| MemoryError::QueryError(e.to_string()))
    }

    /// Records with an id above `after_id` that have no vector row yet,
    /// ascending by id.
    pub async fn missing_embeddings(
        &self,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<(i64, String)>, MemoryError> {
        if !self.vectors.enabled {
            return Ok(Vec::new());
        }

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, content FROM memories
                     WHERE id > ?1 AND id NOT IN (SELECT rowid FROM memory_vectors)
                     ORDER BY id LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(params![after_id, limit as i64], |row| {
                        Ok((row.get(0)?, row.get(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(|e| MemoryError::QueryError(e.to_string()))
    }

    /// Attach or replace the embedding of an existing record.
    ///
    /// Returns `false` when the record does not exist or vectors are disabled.
    pub async fn put_embedding(&self, id: i64, embedding: &[f32]) -> Result<bool, MemoryError> {
        check_dimension(embedding)?;
        if !self.vectors.enabled {
            return Ok(false);
        }

        let blob = to_blob(embedding);
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let exists = tx
                    .query_row("SELECT 1 FROM memories WHERE id = ?1", [id], |_| Ok(()))
                    .optional()?
                    .is_some();
                if !exists {
                    return Ok(false);
                }

                // vec0 has no upsert
                tx.execute("DELETE FROM memory_vectors WHERE rowid = ?1", [id])?;
                tx.execute(
                    "INSERT INTO memory_vectors (rowid, embedding) VALUES (?1, ?2)",
                    params![id, blob],
                )?;

                tx.commit()?;
                Ok(true)
            })
            .await
            .map_err(|e| MemoryError::StorageError(e.to_string()))
    }

    /// Full-text search. Scores are negated BM25, so higher is better.
    pub async fn search_lexical(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, MemoryError> {
        let query = query.to_string();
        if limit == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let results = self
            .conn
            .call(move |conn| Ok(lexical_search(conn, &query, limit)?))
            .await
            .map_err(|e| MemoryError::QueryError(e.to_string()))?;

        debug!(count = results.len(), "Lexical search");
        Ok(results)
    }

    /// Nearest-neighbour search by cosine similarity.
    ///
    /// Phase one reads only ids and distances from the vector index, phase
    /// two loads those records, and the hydrated list is re-sorted by
    /// similarity. Returns nothing when vectors are disabled.
    pub async fn search_vector(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>, MemoryError> {
        check_dimension(embedding)?;
        if !self.vectors.enabled || limit == 0 {
            return Ok(Vec::new());
        }

        let blob = to_blob(embedding);
        let results = self
            .conn
            .call(move |conn| {
                let candidates = knn_candidates(conn, &blob, limit)?;
                Ok(hydrate_candidates(conn, candidates)?)
            })
            .await
            .map_err(|e| MemoryError::QueryError(e.to_string()))?;

        debug!(count = results.len(), "Vector search");
        Ok(results)
    }
}

fn check_dimension(embedding: &[f32]) -> Result<(), MemoryError> {
    if embedding.len() != EMBEDDING_DIM {
        return Err(MemoryError::DimensionMismatch {
            expected: EMBEDDING_DIM,
            actual: embedding.len(),
        });
    }
    Ok(())
}

/// Little-endian f32 blob as expected by vec0.
fn to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Fixed-width RFC 3339 so that text comparison orders by time.
fn timestamp(time: chrono::DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}
