//! Vector Index Client (C2): nearest-neighbour search over stored
//! `(vector, segment, metadata)` triples.
//!
//! Diesel's query builder has no support for the pgvector `Vector` SQL type
//! in `ORDER BY`, so the cosine-distance search is issued as a raw SQL query
//! with bound parameters, the same pattern the donor codebase uses for its
//! `passages` similarity search. The wire format of the backing store is a
//! provider concern per spec.md §6; this implementation backs it with
//! Postgres+pgvector (SPEC_FULL.md §11.2).

use anyhow::Result;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{Float4, Int4, Nullable, Text};
use pgvector::Vector as PgVector;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::VectorSegment;

#[derive(QueryableByName, Debug)]
struct SegmentRow {
    #[diesel(sql_type = Text)]
    text: String,
    #[diesel(sql_type = Nullable<Text>)]
    filename: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    document_id: Option<String>,
    #[diesel(sql_type = Nullable<Int4>)]
    chunk_index: Option<i32>,
    #[diesel(sql_type = Float4)]
    score: f32,
}

pub struct VectorIndexClient {
    database_url: String,
    conn: Mutex<Option<PgConnection>>,
}

impl VectorIndexClient {
    /// Stores the connection string without connecting. The connection is
    /// established lazily on first use and kept open afterward, so
    /// constructing a client never blocks on network I/O.
    pub fn new(database_url: &str) -> Result<Self> {
        Ok(Self {
            database_url: database_url.to_string(),
            conn: Mutex::new(None),
        })
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut PgConnection) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("vector index lock poisoned: {e}"))?;
        if guard.is_none() {
            *guard = Some(PgConnection::establish(&self.database_url)?);
        }
        f(guard.as_mut().expect("connection just established"))
    }

    /// `search(vector, k, minScore) -> [{text, metadata, score}]`. Results
    /// below `min_score` are dropped here, inside the client, so callers can
    /// never observe a sub-threshold match (spec.md §3 invariant).
    pub fn search(&self, vector: &[f32], k: usize, min_score: f32) -> Result<Vec<VectorSegment>> {
        let query_vector = PgVector::from(vector.to_vec());
        self.with_connection(|conn| {
            let rows: Vec<SegmentRow> = diesel::sql_query(
                "SELECT text, filename, document_id, chunk_index, \
                 (1.0 - (embedding <=> $1))::real AS score \
                 FROM vector_segments \
                 WHERE embedding IS NOT NULL \
                 ORDER BY embedding <=> $1 \
                 LIMIT $2",
            )
            .bind::<pgvector::sql_types::Vector, _>(query_vector.clone())
            .bind::<diesel::sql_types::BigInt, _>(k as i64)
            .load(conn)?;

            Ok(rows
                .into_iter()
                .map(|row| VectorSegment {
                    text: row.text,
                    filename: row.filename,
                    document_id: row.document_id,
                    chunk_index: row.chunk_index,
                    score: row.score.clamp(0.0, 1.0),
                })
                .filter(|segment| segment.score >= min_score)
                .collect())
        })
    }

    /// Insert a pre-embedded segment. Ingestion/chunking itself is out of
    /// scope (spec.md §1); this is the narrow write path the core needs to
    /// seed or extend the index.
    pub fn insert(
        &self,
        text: &str,
        filename: Option<&str>,
        document_id: Option<&str>,
        chunk_index: Option<i32>,
        embedding: &[f32],
    ) -> Result<Uuid> {
        use crate::schema::vector_segments;

        #[derive(Insertable)]
        #[diesel(table_name = vector_segments)]
        struct NewSegment<'a> {
            id: Uuid,
            text: &'a str,
            filename: Option<&'a str>,
            document_id: Option<&'a str>,
            chunk_index: Option<i32>,
            embedding: Option<PgVector>,
        }

        let id = Uuid::new_v4();
        let new_row = NewSegment {
            id,
            text,
            filename,
            document_id,
            chunk_index,
            embedding: Some(PgVector::from(embedding.to_vec())),
        };

        self.with_connection(|conn| {
            diesel::insert_into(vector_segments::table)
                .values(&new_row)
                .execute(conn)?;
            Ok(())
        })?;

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn score_clamps_into_unit_range() {
        let raw_scores = [-0.2f32, 0.0, 0.5, 1.0, 1.3];
        let clamped: Vec<f32> = raw_scores.iter().map(|s| s.clamp(0.0, 1.0)).collect();
        assert_eq!(clamped, vec![0.0, 0.0, 0.5, 1.0, 1.0]);
    }
}
