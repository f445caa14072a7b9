use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use uuid::Uuid;

use super::anti_block::{AntiBlockPolicy, BlockSignal};
use super::page_fetcher::PageFetcher;
use super::result_extractor::ResultExtractor;
use super::result_sink::ResultSink;
use crate::domain::{AttemptOutcome, FetchAttempt, SearchQuery, SearchResult};
use crate::error::{BlockedError, ConfigurationError, ScrapeError, SinkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    Delaying,
    Fetching,
    Checking,
    Extracting,
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub max_attempts: u32,
    pub fetch_timeout: Duration,
}

/// Outcome of a finished run. Sink trouble rides along instead of
/// invalidating the extracted records; re-submitting is the caller's call.
#[derive(Debug)]
pub struct ScrapeReport {
    pub run_id: Uuid,
    pub results: Vec<SearchResult>,
    pub attempts: Vec<FetchAttempt>,
    pub sink_error: Option<SinkError>,
}

#[derive(Debug)]
pub struct ScrapeFailure {
    pub run_id: Uuid,
    pub kind: ScrapeError,
    pub attempts: Vec<FetchAttempt>,
}

/// Drives one query through delay, fetch, block check and extraction. The
/// sole retry authority: fetchers attempt once, the policy only classifies.
pub struct ScrapeOrchestrator {
    policy: Arc<AntiBlockPolicy>,
    fetcher: Arc<dyn PageFetcher>,
    sink: Arc<dyn ResultSink>,
    settings: RunSettings,
}

impl ScrapeOrchestrator {
    pub fn new(
        policy: Arc<AntiBlockPolicy>,
        fetcher: Arc<dyn PageFetcher>,
        sink: Arc<dyn ResultSink>,
        settings: RunSettings,
    ) -> Self {
        ScrapeOrchestrator {
            policy,
            fetcher,
            sink,
            settings,
        }
    }

    /// Runs to exactly one of Ok(report) or Err(failure-with-history).
    /// Cancellation aborts a pending delay or in-flight fetch directly.
    pub async fn run(
        &self,
        query: &SearchQuery,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<ScrapeReport, ScrapeFailure> {
        let run_id = Uuid::new_v4();
        let url = query.search_url();
        let mut attempts: Vec<FetchAttempt> = vec![];
        let mut last_error: Option<ScrapeError> = None;

        for ordinal in 1..=self.settings.max_attempts {
            log_phase(run_id, RunPhase::Delaying);
            let delay = self.policy.next_delay();
            log::info!(
                "Run {} waiting {}ms before attempt {}/{}",
                run_id,
                delay.as_millis(),
                ordinal,
                self.settings.max_attempts
            );
            if !wait_or_cancelled(delay, &mut cancel).await {
                return Err(self.cancelled(run_id, attempts));
            }

            log_phase(run_id, RunPhase::Fetching);
            let identity = self.policy.select_identity();
            let proxy = self.policy.select_proxy();
            let proxy_url = proxy.as_ref().map(|endpoint| endpoint.url.clone());

            let started = Instant::now();
            let fetched = tokio::select! {
                result = self.fetcher.fetch(&url, &identity, proxy.as_ref(), self.settings.fetch_timeout) => result,
                _ = cancelled(&mut cancel) => {
                    return Err(self.cancelled(run_id, attempts));
                }
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            let page = match fetched {
                Ok(page) => page,
                Err(e) => {
                    log::error!("Run {} attempt {} fetch failed: {}", run_id, ordinal, e);
                    attempts.push(FetchAttempt {
                        ordinal,
                        user_agent: identity,
                        proxy: proxy_url,
                        outcome: AttemptOutcome::Error(e.clone()),
                        latency_ms,
                    });
                    last_error = Some(ScrapeError::Fetch(e));
                    continue;
                }
            };

            log_phase(run_id, RunPhase::Checking);
            let blocked = match self.policy.detect_block(&page.html) {
                BlockSignal::CaptchaDetected => Some(BlockedError::Captcha),
                BlockSignal::RateLimited => Some(BlockedError::RateLimited),
                BlockSignal::LayoutUnrecognized => {
                    // Unknown markup still goes through extraction and comes
                    // back sentinel-filled.
                    log::error!(
                        "Run {} attempt {} got an unrecognized layout, extracting anyway",
                        run_id,
                        ordinal
                    );
                    None
                }
                BlockSignal::Clean => None,
            };

            if let Some(kind) = blocked {
                log::error!("Run {} attempt {} blocked: {}", run_id, ordinal, kind);
                attempts.push(FetchAttempt {
                    ordinal,
                    user_agent: identity,
                    proxy: proxy_url,
                    outcome: AttemptOutcome::Blocked(kind),
                    latency_ms,
                });
                last_error = Some(ScrapeError::Blocked(kind));
                continue;
            }

            attempts.push(FetchAttempt {
                ordinal,
                user_agent: identity,
                proxy: proxy_url,
                outcome: AttemptOutcome::Success,
                latency_ms,
            });

            log_phase(run_id, RunPhase::Extracting);
            let mut results = ResultExtractor::extract(&page.html, query.page_kind);
            if query.target_results > 0 {
                results.truncate(query.target_results);
            }
            log::info!(
                "Run {} extracted {} results on attempt {}",
                run_id,
                results.len(),
                ordinal
            );

            let sink_error = self.sink.write(query, &results).await.err();
            if let Some(e) = &sink_error {
                log::error!("Run {} sink write failed: {}", run_id, e);
            }

            return Ok(ScrapeReport {
                run_id,
                results,
                attempts,
                sink_error,
            });
        }

        // Budget exhausted, or a zero budget was configured.
        let kind = last_error.unwrap_or_else(|| {
            ScrapeError::Configuration(ConfigurationError(
                "max attempts must be at least 1".to_string(),
            ))
        });
        log::error!(
            "Run {} failed after {} attempts: {}",
            run_id,
            attempts.len(),
            kind
        );
        Err(ScrapeFailure {
            run_id,
            kind,
            attempts,
        })
    }

    fn cancelled(&self, run_id: Uuid, attempts: Vec<FetchAttempt>) -> ScrapeFailure {
        log::info!(
            "Run {} cancelled after {} recorded attempts",
            run_id,
            attempts.len()
        );
        ScrapeFailure {
            run_id,
            kind: ScrapeError::Cancelled,
            attempts,
        }
    }
}

fn log_phase(run_id: Uuid, phase: RunPhase) {
    log::debug!("Run {} entered {:?}", run_id, phase);
}

/// True when the delay elapsed, false when cancellation won.
async fn wait_or_cancelled(delay: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = cancelled(cancel) => false,
    }
}

/// Resolves only on cancellation. A dropped sender is not a cancellation,
/// so that path parks forever instead of aborting the run.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if *cancel.borrow() {
        return;
    }
    while cancel.changed().await.is_ok() {
        if *cancel.borrow() {
            return;
        }
    }
    std::future::pending::<()>().await
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::watch;

    use super::{RunSettings, ScrapeOrchestrator};
    use crate::domain::{
        AttemptOutcome, IdentityPool, PageKind, ProxyEndpoint, ProxyPool, SearchQuery,
        SearchResult,
    };
    use crate::error::{BlockedError, FetchError, ScrapeError, SinkError};
    use crate::services::anti_block::AntiBlockPolicy;
    use crate::services::page_fetcher::{PageFetcher, RenderedPage};
    use crate::services::result_sink::ResultSink;

    const CAPTCHA_PAGE: &str = r#"<html><form id="captcha-form" action="/sorry/index">
        Our systems have detected unusual traffic from your computer network.
    </form></html>"#;

    fn clean_page(count: usize) -> String {
        let blocks: String = (1..=count)
            .map(|i| {
                format!(
                    r#"<div class="g"><a href="https://example{i}.com"><h3>Result {i}</h3></a></div>"#
                )
            })
            .collect();
        format!(r#"<html><body><div id="search">{blocks}</div></body></html>"#)
    }

    struct ScriptedFetcher {
        script: Mutex<VecDeque<Result<String, FetchError>>>,
    }

    impl ScriptedFetcher {
        fn new(script: Vec<Result<String, FetchError>>) -> Self {
            ScriptedFetcher {
                script: Mutex::new(script.into()),
            }
        }

        /// Repeats the same page for every attempt.
        fn always(html: &str, times: usize) -> Self {
            Self::new(vec![Ok(html.to_string()); times])
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch(
            &self,
            _url: &str,
            _identity: &str,
            _proxy: Option<&ProxyEndpoint>,
            _timeout: Duration,
        ) -> Result<RenderedPage, FetchError> {
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .expect("fetcher script exhausted");
            next.map(|html| RenderedPage { html })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        written: Mutex<Vec<(String, Vec<SearchResult>)>>,
        fail: bool,
    }

    impl RecordingSink {
        fn failing() -> Self {
            RecordingSink {
                written: Mutex::new(vec![]),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl ResultSink for RecordingSink {
        async fn write(
            &self,
            query: &SearchQuery,
            results: &[SearchResult],
        ) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError("connection reset".to_string()));
            }
            self.written
                .lock()
                .unwrap()
                .push((query.query.clone(), results.to_vec()));
            Ok(())
        }
    }

    fn test_policy() -> Arc<AntiBlockPolicy> {
        let identities = IdentityPool::new(vec!["test-agent".to_string()], false).unwrap();
        Arc::new(AntiBlockPolicy::with_seed(identities, ProxyPool::disabled(), (1, 2), 11).unwrap())
    }

    fn orchestrator(
        fetcher: ScriptedFetcher,
        sink: Arc<RecordingSink>,
        max_attempts: u32,
    ) -> ScrapeOrchestrator {
        ScrapeOrchestrator::new(
            test_policy(),
            Arc::new(fetcher),
            sink,
            RunSettings {
                max_attempts,
                fetch_timeout: Duration::from_secs(5),
            },
        )
    }

    fn never_cancelled() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive for the whole test process; a dropped
        // sender must not read as cancellation either way.
        std::mem::forget(tx);
        rx
    }

    #[tokio::test]
    async fn captcha_on_every_attempt_exhausts_budget() {
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = orchestrator(ScriptedFetcher::always(CAPTCHA_PAGE, 3), sink.clone(), 3);
        let query = SearchQuery::new("blocked query", PageKind::OrganicSearch);

        let failure = orchestrator
            .run(&query, never_cancelled())
            .await
            .expect_err("run should fail");

        assert_eq!(failure.kind, ScrapeError::Blocked(BlockedError::Captcha));
        assert_eq!(failure.attempts.len(), 3);
        for (i, attempt) in failure.attempts.iter().enumerate() {
            assert_eq!(attempt.ordinal, i as u32 + 1);
            assert_eq!(attempt.outcome, AttemptOutcome::Blocked(BlockedError::Captcha));
        }
        assert!(sink.written.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_during_initial_delay_records_no_attempts() {
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = orchestrator(ScriptedFetcher::new(vec![]), sink, 3);
        let query = SearchQuery::new("cancelled query", PageKind::OrganicSearch);

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let failure = orchestrator
            .run(&query, rx)
            .await
            .expect_err("run should be cancelled");

        assert_eq!(failure.kind, ScrapeError::Cancelled);
        assert!(failure.attempts.is_empty());
    }

    #[tokio::test]
    async fn fetch_error_retries_then_succeeds() {
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = orchestrator(
            ScriptedFetcher::new(vec![Err(FetchError::Timeout), Ok(clean_page(2))]),
            sink.clone(),
            3,
        );
        let query = SearchQuery::new("flaky query", PageKind::OrganicSearch);

        let report = orchestrator
            .run(&query, never_cancelled())
            .await
            .expect("run should recover");

        assert_eq!(report.attempts.len(), 2);
        assert_eq!(
            report.attempts[0].outcome,
            AttemptOutcome::Error(FetchError::Timeout)
        );
        assert_eq!(report.attempts[1].outcome, AttemptOutcome::Success);
        assert_eq!(report.results.len(), 2);
        assert!(report.sink_error.is_none());

        let written = sink.written.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].0, "flaky query");
        assert_eq!(written[0].1.len(), 2);
    }

    #[tokio::test]
    async fn unrecognized_layout_still_extracts_best_effort() {
        let sink = Arc::new(RecordingSink::default());
        let page = "<html><body><p>layout from the future</p></body></html>";
        let orchestrator = orchestrator(ScriptedFetcher::always(page, 1), sink.clone(), 3);
        let query = SearchQuery::new("drifted query", PageKind::OrganicSearch);

        let report = orchestrator
            .run(&query, never_cancelled())
            .await
            .expect("layout drift is not terminal");

        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.attempts[0].outcome, AttemptOutcome::Success);
        assert!(report.results.is_empty());
        assert_eq!(sink.written.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn results_are_truncated_to_the_target() {
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = orchestrator(
            ScriptedFetcher::new(vec![Ok(clean_page(5))]),
            sink,
            3,
        );
        let mut query = SearchQuery::new("three only", PageKind::OrganicSearch);
        query.target_results = 3;

        let report = orchestrator
            .run(&query, never_cancelled())
            .await
            .expect("run should succeed");

        assert_eq!(report.results.len(), 3);
        assert_eq!(
            report.results.iter().map(|r| r.position).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn sink_failure_is_reported_without_losing_results() {
        let sink = Arc::new(RecordingSink::failing());
        let orchestrator = orchestrator(
            ScriptedFetcher::new(vec![Ok(clean_page(4))]),
            sink,
            3,
        );
        let query = SearchQuery::new("durable results", PageKind::OrganicSearch);

        let report = orchestrator
            .run(&query, never_cancelled())
            .await
            .expect("sink failure must not fail the run");

        assert_eq!(report.results.len(), 4);
        assert!(report.sink_error.is_some());
    }
}
