//! Search queries for the SQLite memory store.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params, params_from_iter};

use recall_protocols::{MatchType, MemoryRecord, SearchResult};

/// Column list understood by [`row_to_record`].
pub(crate) const RECORD_COLUMNS: &str =
    "id, content, importance, memory_type, source, created_at, last_accessed, access_count";

/// Largest `k` sqlite-vec accepts for a KNN query.
const MAX_KNN: usize = 4096;

pub(crate) fn row_to_record(row: &Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let memory_type: String = row.get(3)?;
    let created_at: String = row.get(5)?;
    let last_accessed: Option<String> = row.get(6)?;
    let access_count: i64 = row.get(7)?;

    Ok(MemoryRecord {
        id: row.get(0)?,
        content: row.get(1)?,
        importance: row.get(2)?,
        memory_type: memory_type.into(),
        source: row.get(4)?,
        created_at: parse_timestamp(5, &created_at)?,
        last_accessed: last_accessed
            .map(|value| parse_timestamp(6, &value))
            .transpose()?,
        access_count: access_count.max(0) as u64,
    })
}

fn parse_timestamp(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

/// Turn free text into an FTS5 query: each word quoted, words OR-ed.
pub(crate) fn escape_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|w| w.replace('"', ""))
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{}\"", w))
        .collect::<Vec<_>>()
        .join(" OR ")
}

pub(crate) fn lexical_search(
    conn: &Connection,
    query: &str,
    limit: usize,
) -> rusqlite::Result<Vec<SearchResult>> {
    let fts_query = escape_fts_query(query);
    if fts_query.is_empty() {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT m.id, m.content, m.importance, m.memory_type, m.source, m.created_at,
                m.last_accessed, m.access_count, bm25(memories_fts) AS rank
         FROM memories_fts
         JOIN memories m ON m.id = memories_fts.rowid
         WHERE memories_fts MATCH ?1
         ORDER BY rank ASC, m.id ASC
         LIMIT ?2",
    )?;

    let results = stmt
        .query_map(params![fts_query, limit as i64], |row| {
            let rank: f64 = row.get(8)?;
            Ok(SearchResult {
                record: row_to_record(row)?,
                score: -rank,
                match_type: MatchType::Lexical,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(results)
}

/// Phase one: ids and cosine distances straight from the vector index.
pub(crate) fn knn_candidates(
    conn: &Connection,
    query_blob: &[u8],
    limit: usize,
) -> rusqlite::Result<Vec<(i64, f64)>> {
    let mut stmt = conn.prepare(
        "SELECT rowid, distance FROM memory_vectors
         WHERE embedding MATCH ?1 AND k = ?2
         ORDER BY distance",
    )?;

    let candidates = stmt
        .query_map(params![query_blob, limit.min(MAX_KNN) as i64], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(candidates)
}

/// Phase two: load the candidate records and rank them by similarity.
pub(crate) fn hydrate_candidates(
    conn: &Connection,
    candidates: Vec<(i64, f64)>,
) -> rusqlite::Result<Vec<SearchResult>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let distances: HashMap<i64, f64> = candidates.iter().copied().collect();
    let placeholders = vec!["?"; candidates.len()].join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM memories WHERE id IN ({})",
        RECORD_COLUMNS, placeholders
    ))?;

    let mut results = stmt
        .query_map(params_from_iter(candidates.iter().map(|(id, _)| id)), row_to_record)?
        .map(|record| {
            let record = record?;
            let distance = distances.get(&record.id).copied().unwrap_or(1.0);
            Ok(SearchResult {
                record,
                score: 1.0 - distance,
                match_type: MatchType::Vector,
            })
        })
        .collect::<rusqlite::Result<Vec<_>>>()?;

    // IN (...) returns rows in table order, not KNN order
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.record.id.cmp(&b.record.id))
    });

    Ok(results)
}
