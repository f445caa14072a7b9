use serde::Serialize;
use sqlx::PgPool;

use crate::domain::{PageKind, SearchResult};

pub async fn insert_results(
    pool: &PgPool,
    search_query: &str,
    page_kind: PageKind,
    results: &[SearchResult],
) -> Result<(), sqlx::Error> {
    for record in results {
        sqlx::query(
            r"
            insert into search_result
                (search_query, page_kind, position, title, url, snippet, rating, review_count, address, category)
            values
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(search_query)
        .bind(page_kind.label())
        .bind(record.position as i32)
        .bind(record.title.as_deref())
        .bind(record.url.as_deref())
        .bind(record.snippet.as_deref())
        .bind(record.rating)
        .bind(record.review_count.map(i64::from))
        .bind(record.address.as_deref())
        .bind(record.category.as_deref())
        .execute(pool)
        .await?;
    }

    Ok(())
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct SearchResultRow {
    pub search_query: String,
    pub page_kind: String,
    pub position: i32,
    pub title: Option<String>,
    pub url: Option<String>,
    pub snippet: Option<String>,
    pub rating: Option<f32>,
    pub review_count: Option<i64>,
    pub address: Option<String>,
    pub category: Option<String>,
}

pub async fn get_results_for_query(
    pool: &PgPool,
    search_query: &str,
) -> Result<Vec<SearchResultRow>, sqlx::Error> {
    sqlx::query_as::<_, SearchResultRow>(
        r"
        select
            search_query, page_kind, position, title, url, snippet,
            rating, review_count, address, category
        from
            search_result
        where
            search_query = $1
        order by
            id, position
        ",
    )
    .bind(search_query)
    .fetch_all(pool)
    .await
}
