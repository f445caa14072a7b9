use std::time::Duration;

use async_trait::async_trait;

use crate::domain::ProxyEndpoint;
use crate::error::FetchError;

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
}

/// Single-attempt page rendering. No retry logic lives behind this trait;
/// the orchestrator is the only retry authority.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        identity: &str,
        proxy: Option<&ProxyEndpoint>,
        timeout: Duration,
    ) -> Result<RenderedPage, FetchError>;
}

/// Plain HTTP fetcher. The client is rebuilt per attempt so each attempt
/// carries its own user-agent and proxy.
pub struct HttpPageFetcher;

impl HttpPageFetcher {
    pub fn new() -> Self {
        HttpPageFetcher
    }
}

impl Default for HttpPageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(
        &self,
        url: &str,
        identity: &str,
        proxy: Option<&ProxyEndpoint>,
        timeout: Duration,
    ) -> Result<RenderedPage, FetchError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(identity)
            .timeout(timeout)
            .read_timeout(timeout);

        if let Some(endpoint) = proxy {
            let mut http_proxy = reqwest::Proxy::http(&endpoint.url)
                .map_err(|e| FetchError::Unknown(e.to_string()))?;
            let mut https_proxy = reqwest::Proxy::https(&endpoint.url)
                .map_err(|e| FetchError::Unknown(e.to_string()))?;
            if let (Some(user), Some(pass)) = (&endpoint.username, &endpoint.password) {
                http_proxy = http_proxy.basic_auth(user, pass);
                https_proxy = https_proxy.basic_auth(user, pass);
            }
            builder = builder.proxy(http_proxy).proxy(https_proxy);
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::Unknown(e.to_string()))?;

        let response = client.get(url).send().await?;

        if response.status() == reqwest::StatusCode::PROXY_AUTHENTICATION_REQUIRED {
            return Err(FetchError::ProxyAuthFailed);
        }

        // Block pages (captcha, 429 interstitials) come back as documents;
        // classification is the policy's job, not the fetcher's.
        let html = response.text().await?;

        Ok(RenderedPage { html })
    }
}
