use super::{IndexError, VectorIndex, serialize_vector};
use rusqlite::params;
use rusqlite::types::Value;

/// A nearest-neighbour hit, pointing back into the chunk sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub position: usize,
    /// Inner product of the query and the stored vector (cosine similarity).
    pub similarity: f32,
}

fn map_hit(row: &rusqlite::Row<'_>) -> rusqlite::Result<Hit> {
    let position: i64 = row.get(0)?;
    let distance: f64 = row.get(1)?;
    Ok(Hit {
        position: position as usize,
        similarity: (1.0 - distance) as f32,
    })
}

impl VectorIndex {
    /// Exact top-k search over the whole index.
    pub fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<Hit>, IndexError> {
        self.search_with_filter(query_vector, top_k, None)
    }

    /// Exact top-k search, optionally restricted to chunks of one section.
    ///
    /// Hits are ordered by descending similarity; ties keep document order.
    /// When `section` is set, only that section's vectors are candidates.
    pub fn search_with_filter(
        &self,
        query_vector: &[f32],
        top_k: usize,
        section: Option<&str>,
    ) -> Result<Vec<Hit>, IndexError> {
        self.check_query(query_vector)?;
        if top_k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        // Unit vectors: cosine distance = 1 - inner product.
        let mut query = String::from(
            "SELECT position, vec_distance_cosine(embedding, ?) AS distance FROM vectors",
        );
        let mut params: Vec<Value> = vec![Value::Blob(serialize_vector(query_vector))];

        if let Some(name) = section {
            query.push_str(" WHERE section = ?");
            params.push(Value::Text(name.to_string()));
        }

        query.push_str(" ORDER BY distance ASC, position ASC LIMIT ?");
        params.push(Value::Integer(top_k as i64));

        let param_refs: Vec<&dyn rusqlite::ToSql> =
            params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(param_refs.as_slice(), map_hit)?;

        let mut hits = Vec::new();
        for row in rows {
            hits.push(row?);
        }

        Ok(hits)
    }

    /// Number of indexed vectors tagged with `section`.
    pub fn count_in_section(&self, section: &str) -> Result<usize, IndexError> {
        let count: i64 = self.conn()?.query_row(
            "SELECT count(*) FROM vectors WHERE section = ?",
            params![section],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
