use crate::error::{BlockedError, FetchError};

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success,
    Blocked(BlockedError),
    Error(FetchError),
}

impl AttemptOutcome {
    pub fn label(&self) -> String {
        match self {
            AttemptOutcome::Success => "success".to_string(),
            AttemptOutcome::Blocked(kind) => format!("blocked:{}", kind.label()),
            AttemptOutcome::Error(kind) => format!("error:{}", kind.label()),
        }
    }
}

/// One try at loading the target URL. Owned by its run, kept for
/// diagnostics and backoff decisions, persisted with the run record.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchAttempt {
    pub ordinal: u32,
    pub user_agent: String,
    pub proxy: Option<String>,
    pub outcome: AttemptOutcome,
    pub latency_ms: u64,
}
