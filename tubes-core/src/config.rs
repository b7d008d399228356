//! Crawl configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tubes_http::{CookieStore, ProxyMode, RequestConfig};
use url::Url;

use crate::error::{CrawlError, Result};

/// Settings for one crawl run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Page the category tree is discovered from.
    pub start_page: String,

    /// Fetches in flight at once, per stage
    #[serde(default = "defaults::max_concurrency")]
    pub max_concurrency: usize,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "defaults::max_redirects")]
    pub max_redirects: usize,

    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl CrawlerConfig {
    pub fn new(start_page: impl Into<String>) -> Self {
        Self {
            start_page: start_page.into(),
            max_concurrency: defaults::max_concurrency(),
            timeout_secs: defaults::timeout_secs(),
            max_redirects: defaults::max_redirects(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        let start = Url::parse(&self.start_page)
            .map_err(|e| CrawlError::InvalidUrl(format!("start_page {}: {}", self.start_page, e)))?;
        if !matches!(start.scheme(), "http" | "https") {
            return Err(CrawlError::config(format!(
                "start_page must be http or https, got {}",
                start.scheme()
            )));
        }
        if self.max_concurrency == 0 {
            return Err(CrawlError::config("max_concurrency must be > 0"));
        }
        if self.timeout_secs == 0 {
            return Err(CrawlError::config("timeout_secs must be > 0"));
        }
        Ok(())
    }

    /// Request settings shared by every fetch of the crawl.
    pub fn request_config(&self, proxy: ProxyMode, cookies: CookieStore) -> Result<RequestConfig> {
        let mut config = RequestConfig::new()
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_max_redirects(self.max_redirects)
            .with_proxy(proxy)
            .with_cookies(cookies);

        for (name, value) in &self.headers {
            config = config.with_header(name, value)?;
        }
        Ok(config)
    }
}

mod defaults {
    pub fn max_concurrency() -> usize {
        10
    }

    pub fn timeout_secs() -> u64 {
        10
    }

    pub fn max_redirects() -> usize {
        10
    }
}
