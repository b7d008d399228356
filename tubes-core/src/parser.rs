use crate::error::{CrawlError, Result};
use crate::model::{Category, Details, Listing, is_placeholder_href};
use scraper::Html;
use serde::de::DeserializeOwned;
use url::Url;

/// A fetched, decoded page handed to a `SiteParser`.
#[derive(Debug, Clone)]
pub struct Page {
    url: Url,
    body: String,
}

impl Page {
    pub fn new(url: Url, body: impl Into<String>) -> Self {
        Self {
            url,
            body: body.into(),
        }
    }

    /// Final URL of the page, after redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Parse the body as an HTML document.
    pub fn html(&self) -> Html {
        Html::parse_document(&self.body)
    }

    /// Parse the body as JSON, for sites that serve catalog data from an API.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| CrawlError::parse(self.url.as_str(), e))
    }

    /// Resolve a possibly relative href against this page.
    ///
    /// Placeholder hrefs (`#`, `javascript:...`) are returned verbatim so that
    /// category flattening can recognise them.
    pub fn resolve(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if is_placeholder_href(href) {
            return Some(href.to_string());
        }
        self.url.join(href).ok().map(String::from)
    }

    pub fn parse_error(&self, message: impl std::fmt::Display) -> CrawlError {
        CrawlError::parse(self.url.as_str(), message)
    }
}

/// Site-specific page understanding, one method per crawl stage.
///
/// Implementations run synchronously on an already fetched page and must not
/// block.
pub trait SiteParser: Send + Sync {
    /// Top-level categories of the start page, optionally with children.
    fn parse_categories(&self, page: &Page) -> Result<Vec<Category>>;

    /// Products of one listing page plus the next page's href.
    fn parse_listing(&self, page: &Page) -> Result<Listing>;

    /// Attributes of one product, including an optional `sku`.
    fn parse_detail(&self, page: &Page) -> Result<Details>;
}
