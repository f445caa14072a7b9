use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("configuration error: {0}")]
pub struct ConfigurationError(pub String);

/// Classified single-attempt fetch failure. The orchestrator owns retries,
/// so every failure must come back as one of these kinds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("fetch timed out")]
    Timeout,
    #[error("connection refused by target or proxy")]
    ConnectionRefused,
    #[error("proxy authentication failed")]
    ProxyAuthFailed,
    #[error("fetch failed: {0}")]
    Unknown(String),
}

impl FetchError {
    pub fn label(&self) -> &'static str {
        match self {
            FetchError::Timeout => "timeout",
            FetchError::ConnectionRefused => "connection_refused",
            FetchError::ProxyAuthFailed => "proxy_auth_failed",
            FetchError::Unknown(_) => "unknown",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return FetchError::Timeout;
        }
        if err.is_connect() {
            return FetchError::ConnectionRefused;
        }
        if let Some(status) = err.status() {
            if status == reqwest::StatusCode::PROXY_AUTHENTICATION_REQUIRED {
                return FetchError::ProxyAuthFailed;
            }
        }
        FetchError::Unknown(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BlockedError {
    #[error("captcha challenge served")]
    Captcha,
    #[error("rate limited by target")]
    RateLimited,
}

impl BlockedError {
    pub fn label(&self) -> &'static str {
        match self {
            BlockedError::Captcha => "captcha",
            BlockedError::RateLimited => "rate_limited",
        }
    }
}

/// Terminal failure kind for a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Blocked(#[from] BlockedError),
    #[error("run cancelled")]
    Cancelled,
}

impl ScrapeError {
    pub fn label(&self) -> &'static str {
        match self {
            ScrapeError::Configuration(_) => "configuration",
            ScrapeError::Fetch(e) => e.label(),
            ScrapeError::Blocked(e) => e.label(),
            ScrapeError::Cancelled => "cancelled",
        }
    }
}

/// Sink failures are surfaced to the caller, never retried by the core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sink write failed: {0}")]
pub struct SinkError(pub String);

impl From<sqlx::Error> for SinkError {
    fn from(err: sqlx::Error) -> Self {
        SinkError(err.to_string())
    }
}
