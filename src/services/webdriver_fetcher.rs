use std::time::Duration;

use async_trait::async_trait;
use thirtyfour::error::WebDriverError;
use thirtyfour::{CapabilitiesHelper, DesiredCapabilities, Proxy, WebDriver};

use super::page_fetcher::{PageFetcher, RenderedPage};
use crate::domain::ProxyEndpoint;
use crate::error::FetchError;

/// Browser-rendering collaborator for pages that only populate under JS.
/// One WebDriver session per fetch, torn down afterwards, so identity and
/// proxy rotate per attempt like they do on the HTTP path.
pub struct WebDriverFetcher {
    server_url: String,
}

impl WebDriverFetcher {
    pub fn new(server_url: impl Into<String>) -> Self {
        WebDriverFetcher {
            server_url: server_url.into(),
        }
    }
}

#[async_trait]
impl PageFetcher for WebDriverFetcher {
    async fn fetch(
        &self,
        url: &str,
        identity: &str,
        proxy: Option<&ProxyEndpoint>,
        timeout: Duration,
    ) -> Result<RenderedPage, FetchError> {
        let mut caps = DesiredCapabilities::chrome();
        caps.add_arg(&format!("--user-agent={}", identity))
            .map_err(classify_webdriver_error)?;

        if let Some(endpoint) = proxy {
            let proxy_url = endpoint.url_with_credentials();
            caps.set_proxy(Proxy::Manual {
                ftp_proxy: None,
                http_proxy: Some(proxy_url.clone()),
                ssl_proxy: Some(proxy_url),
                socks_proxy: None,
                socks_version: None,
                socks_username: None,
                socks_password: None,
                no_proxy: None,
            })
            .map_err(classify_webdriver_error)?;
        }

        let driver = WebDriver::new(&self.server_url, caps)
            .await
            .map_err(classify_webdriver_error)?;

        let rendered = render(&driver, url, timeout).await;
        if let Err(e) = driver.quit().await {
            log::error!("Failed to quit webdriver session: {:?}", e);
        }

        let html = rendered.map_err(classify_webdriver_error)?;
        Ok(RenderedPage { html })
    }
}

async fn render(
    driver: &WebDriver,
    url: &str,
    timeout: Duration,
) -> Result<String, WebDriverError> {
    driver.set_page_load_timeout(timeout).await?;
    driver.goto(url).await?;
    driver.source().await
}

fn classify_webdriver_error(err: WebDriverError) -> FetchError {
    let message = err.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("timeout") || lowered.contains("timed out") {
        FetchError::Timeout
    } else if lowered.contains("connection refused") {
        FetchError::ConnectionRefused
    } else if lowered.contains("proxyauth") || lowered.contains("407") {
        FetchError::ProxyAuthFailed
    } else {
        FetchError::Unknown(message)
    }
}
