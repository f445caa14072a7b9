use async_trait::async_trait;
use sqlx::PgPool;

use crate::dal::search_result_db;
use crate::domain::{SearchQuery, SearchResult};
use crate::error::SinkError;

/// Downstream consumer of extracted records. Every write is independently
/// durable or comes back as a SinkError; the core never retries it.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn write(&self, query: &SearchQuery, results: &[SearchResult]) -> Result<(), SinkError>;
}

/// Postgres sink. Plain append-only inserts, safe for any number of
/// concurrent workers.
pub struct PgResultSink {
    pool: PgPool,
}

impl PgResultSink {
    pub fn new(pool: PgPool) -> Self {
        PgResultSink { pool }
    }
}

#[async_trait]
impl ResultSink for PgResultSink {
    async fn write(&self, query: &SearchQuery, results: &[SearchResult]) -> Result<(), SinkError> {
        search_result_db::insert_results(&self.pool, &query.query, query.page_kind, results)
            .await
            .map_err(SinkError::from)
    }
}
