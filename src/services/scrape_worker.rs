use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::orchestrator::ScrapeOrchestrator;
use crate::dal::scrape_run_db;
use crate::domain::{FetchAttempt, SearchQuery};

const SET_RESET_LEN: usize = 10_000;

pub struct ScrapeQuerySender {
    pub sender: mpsc::UnboundedSender<SearchQuery>,
}

/// Pulls submitted queries off the channel and runs each one in its own
/// task. Each run owns its attempt history; the policy and fetcher are
/// shared read-only.
pub async fn scrape_worker_handler(
    mut query_receiver: mpsc::UnboundedReceiver<SearchQuery>,
    orchestrator: Arc<ScrapeOrchestrator>,
    pool: PgPool,
) {
    log::info!("Started scrape worker");
    let mut seen_queries: HashSet<String> = HashSet::new();

    while let Some(query) = query_receiver.recv().await {
        let dedup_key = format!("{}:{}", query.page_kind.label(), query.query);
        if seen_queries.contains(&dedup_key) {
            continue;
        }
        // TODO: Implement time based reset like 10 mins after channel was empty
        if seen_queries.len() > SET_RESET_LEN {
            seen_queries.clear();
        }
        seen_queries.insert(dedup_key);

        let orchestrator = orchestrator.clone();
        let pool = pool.clone();
        tokio::spawn(async move { run_scrape_query(query, orchestrator, pool).await });
    }
}

async fn run_scrape_query(
    query: SearchQuery,
    orchestrator: Arc<ScrapeOrchestrator>,
    pool: PgPool,
) {
    // Per-run cancellation handle. Nothing signals it on this path yet; the
    // run API takes one so callers that need to abort can.
    let (_cancel_sender, cancel_receiver) = watch::channel(false);

    let (run_id, outcome, result_count, attempts) =
        match orchestrator.run(&query, cancel_receiver).await {
            Ok(report) => {
                log::info!(
                    "Run {} done: {} results over {} attempts for query '{}'",
                    report.run_id,
                    report.results.len(),
                    report.attempts.len(),
                    query.query
                );

                let outcome = match &report.sink_error {
                    None => "done".to_string(),
                    Some(e) => {
                        log::error!("Run {} results were not persisted: {}", report.run_id, e);
                        "done:sink_failed".to_string()
                    }
                };
                (
                    report.run_id,
                    outcome,
                    report.results.len() as i32,
                    report.attempts,
                )
            }
            Err(failure) => {
                log::error!(
                    "Run {} failed for query '{}': {} after {} attempts",
                    failure.run_id,
                    query.query,
                    failure.kind,
                    failure.attempts.len()
                );
                let outcome = format!("failed:{}", failure.kind.label());
                (failure.run_id, outcome, 0, failure.attempts)
            }
        };

    if let Err(e) = persist_run(&pool, run_id, &query, &outcome, result_count, &attempts).await {
        log::error!("Error persisting run {} in db: {:?}", run_id, e);
    }
}

async fn persist_run(
    pool: &PgPool,
    run_id: Uuid,
    query: &SearchQuery,
    outcome: &str,
    result_count: i32,
    attempts: &[FetchAttempt],
) -> anyhow::Result<()> {
    scrape_run_db::insert_run(pool, run_id, query, outcome, result_count)
        .await
        .context("Failed to insert run record")?;
    scrape_run_db::insert_attempts(pool, run_id, attempts)
        .await
        .context("Failed to insert attempt records")?;
    Ok(())
}
