use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{FetchAttempt, SearchQuery};

pub async fn insert_run(
    pool: &PgPool,
    run_id: Uuid,
    query: &SearchQuery,
    outcome: &str,
    result_count: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        insert into scrape_run
            (id, search_query, page_kind, outcome, result_count)
        values
            ($1, $2, $3, $4, $5)
        ",
    )
    .bind(run_id)
    .bind(&query.query)
    .bind(query.page_kind.label())
    .bind(outcome)
    .bind(result_count)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn insert_attempts(
    pool: &PgPool,
    run_id: Uuid,
    attempts: &[FetchAttempt],
) -> Result<(), sqlx::Error> {
    for attempt in attempts {
        sqlx::query(
            r"
            insert into fetch_attempt
                (run_id, ordinal, user_agent, proxy, outcome, latency_ms)
            values
                ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(run_id)
        .bind(attempt.ordinal as i32)
        .bind(&attempt.user_agent)
        .bind(attempt.proxy.as_deref())
        .bind(attempt.outcome.label())
        .bind(attempt.latency_ms as i64)
        .execute(pool)
        .await?;
    }

    Ok(())
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ScrapeRunRow {
    pub id: Uuid,
    pub search_query: String,
    pub page_kind: String,
    pub outcome: String,
    pub result_count: i32,
}

pub async fn get_recent_runs(pool: &PgPool, limit: i64) -> Result<Vec<ScrapeRunRow>, sqlx::Error> {
    sqlx::query_as::<_, ScrapeRunRow>(
        r"
        select
            id, search_query, page_kind, outcome, result_count
        from
            scrape_run
        order by
            created_at desc
        limit $1
        ",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}
