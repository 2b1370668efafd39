//! In-memory vector index using SQLite and sqlite-vec.
//!
//! One row per chunk: `position` is the chunk's index in the document's chunk
//! sequence, which is the only link between a vector and its chunk. The index
//! is built once per document and never modified afterwards.
use rusqlite::{Connection, OptionalExtension, params};
use sqlite_vec::sqlite3_vec_init;
use std::sync::{Mutex, MutexGuard, Once};
use thiserror::Error;
use tracing::{debug, info};

use crate::indexer::chunker::Chunk;

pub mod search;

const SCHEMA_SQL: &str = r#"
CREATE TABLE vectors (
    position INTEGER PRIMARY KEY,
    section TEXT NOT NULL,
    embedding BLOB NOT NULL
);

CREATE INDEX idx_vectors_section ON vectors(section);
"#;

/// Errors raised while building or querying a [`VectorIndex`].
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("index misaligned: {chunks} chunks but {vectors} vectors")]
    Misaligned { chunks: usize, vectors: usize },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("position {position} out of range for an index of {len} vectors")]
    PositionOutOfRange { position: usize, len: usize },

    #[error("index lock poisoned")]
    LockPoisoned,
}

static INIT_VEC: Once = Once::new();

/// Initialize the sqlite-vec extension. Safe to call multiple times.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Exact inner-product index over unit-normalized chunk embeddings.
///
/// The connection sits behind a `Mutex` so a built index can be shared
/// read-only between threads.
pub struct VectorIndex {
    conn: Mutex<Connection>,
    dimensions: usize,
    len: usize,
}

impl VectorIndex {
    /// Build an index where vector `i` belongs to `chunks[i]`.
    ///
    /// Fails with [`IndexError::Misaligned`] when the two sequences differ in
    /// length and with [`IndexError::DimensionMismatch`] when a vector is not
    /// `dimensions` long.
    pub fn build(
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        dimensions: usize,
    ) -> Result<Self, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::Misaligned {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
            return Err(IndexError::DimensionMismatch {
                expected: dimensions,
                actual: bad.len(),
            });
        }

        init_sqlite_vec();
        let mut conn = Connection::open_in_memory()?;
        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        debug!("sqlite-vec version: {}", vec_version);
        conn.execute_batch(SCHEMA_SQL)?;

        let tx = conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO vectors (position, section, embedding) VALUES (?, ?, ?)")?;
            for (position, (chunk, vector)) in chunks.iter().zip(vectors).enumerate() {
                stmt.execute(params![
                    position as i64,
                    chunk.section,
                    serialize_vector(vector)
                ])?;
            }
        }
        tx.commit()?;

        info!(
            "Built vector index: {} vectors, {} dimensions",
            vectors.len(),
            dimensions
        );

        Ok(Self {
            conn: Mutex::new(conn),
            dimensions,
            len: vectors.len(),
        })
    }

    /// Number of indexed vectors (equal to the chunk count).
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Return the stored vector at `position`.
    pub fn vector(&self, position: usize) -> Result<Vec<f32>, IndexError> {
        let blob: Option<Vec<u8>> = self
            .conn()?
            .query_row(
                "SELECT embedding FROM vectors WHERE position = ?",
                params![position as i64],
                |row| row.get(0),
            )
            .optional()?;

        blob.map(|b| deserialize_vector(&b))
            .ok_or(IndexError::PositionOutOfRange {
                position,
                len: self.len,
            })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>, IndexError> {
        self.conn.lock().map_err(|_| IndexError::LockPoisoned)
    }

    pub(crate) fn check_query(&self, query: &[f32]) -> Result<(), IndexError> {
        if query.len() == self.dimensions {
            Ok(())
        } else {
            Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            })
        }
    }
}

/// Helper to serialize a float32 vector into little-endian bytes for sqlite-vec
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Inverse of [`serialize_vector`]; trailing partial floats are ignored.
pub fn deserialize_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
