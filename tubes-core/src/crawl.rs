use crate::config::CrawlerConfig;
use crate::dedupe::{dedupe_by_href, dedupe_by_id};
use crate::error::{CrawlError, Result};
use crate::identity::product_id;
use crate::model::{Category, Product, flatten_categories};
use crate::parser::{Page, SiteParser};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info, warn};
use tubes_http::{CookieStore, ProxyMode, RequestConfig, RequestEngine};

/// Callback for reporting crawl progress
pub type CrawlProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Stops a running crawl from another task.
///
/// Once triggered no new fetch is admitted; fetches already in flight finish and
/// the crawl returns `CrawlError::Cancelled`.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters collected over one crawl run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlStats {
    pub categories: usize,
    pub listing_pages: usize,
    /// Products seen across all listing pages, duplicates included.
    pub listed_products: usize,
    /// Products left after merging identical hrefs.
    pub unique_hrefs: usize,
    pub detail_failures: usize,
    /// Products left after merging identical identifiers.
    pub products: usize,
    /// Most fetches ever outstanding at the same moment.
    pub peak_in_flight: usize,
}

#[derive(Debug)]
pub struct CrawlOutcome {
    pub products: Vec<Product>,
    pub stats: CrawlStats,
}

/// Tracks outstanding fetches.
#[derive(Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

struct FlightSlot<'a>(&'a InFlight);

impl InFlight {
    fn enter(&self) -> (FlightSlot<'_>, usize) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        (FlightSlot(self), now)
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Drop for FlightSlot<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Category -> listing -> detail crawl of one site.
pub struct Crawler {
    engine: Arc<RequestEngine>,
    parser: Arc<dyn SiteParser>,
    config: CrawlerConfig,
    proxy: ProxyMode,
    cookies: CookieStore,
    progress: Option<CrawlProgressCallback>,
    stop: StopHandle,
}

impl Crawler {
    pub fn new(
        engine: Arc<RequestEngine>,
        parser: Arc<dyn SiteParser>,
        config: CrawlerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            engine,
            parser,
            config,
            proxy: ProxyMode::Default,
            cookies: CookieStore::new(),
            progress: None,
            stop: StopHandle::default(),
        })
    }

    pub fn with_proxy(mut self, proxy: ProxyMode) -> Self {
        self.proxy = proxy;
        self
    }

    /// Share a cookie jar with the caller, e.g. one already holding a session.
    pub fn with_cookies(mut self, cookies: CookieStore) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn with_progress(mut self, callback: CrawlProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn cookies(&self) -> &CookieStore {
        &self.cookies
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    /// Run all stages and return the deduplicated, enriched products.
    pub async fn crawl(&self) -> Result<CrawlOutcome> {
        let proxy = match self.engine.resolve_proxy(&self.proxy) {
            Some(proxy) => {
                info!("Crawling {} via proxy {}", self.config.start_page, proxy);
                ProxyMode::Via(proxy)
            }
            None => {
                info!("Crawling {} without a proxy", self.config.start_page);
                ProxyMode::Direct
            }
        };
        let request = self.config.request_config(proxy, self.cookies.clone())?;
        let flight = InFlight::default();
        let mut stats = CrawlStats::default();

        let categories = self.discover_categories(&request, &flight).await?;
        stats.categories = categories.len();
        self.report(format!("Found {} categories", categories.len()));

        let (listed, pages) = self.scan_listings(categories, &request, &flight).await?;
        stats.listing_pages = pages;
        stats.listed_products = listed.len();

        let unique = dedupe_by_href(listed);
        stats.unique_hrefs = unique.len();
        info!(
            "{} products listed, {} unique hrefs",
            stats.listed_products, stats.unique_hrefs
        );
        self.report(format!("Fetching details for {} products", unique.len()));

        let (detailed, failures) = self.fetch_details(unique, &request, &flight).await?;
        stats.detail_failures = failures;

        let products = dedupe_by_id(detailed, &self.config.start_page);
        stats.products = products.len();
        stats.peak_in_flight = flight.peak();
        info!(
            "Crawl finished: {} products ({} detail failures)",
            stats.products, stats.detail_failures
        );
        self.report(format!("Done: {} products", stats.products));

        Ok(CrawlOutcome { products, stats })
    }

    async fn discover_categories(
        &self,
        request: &RequestConfig,
        flight: &InFlight,
    ) -> Result<Vec<Category>> {
        info!("Discovering categories from {}", self.config.start_page);
        self.check_stopped()?;

        let page = self.fetch(&self.config.start_page, request, flight).await?;
        let roots = self.parser.parse_categories(&page)?;
        Ok(flatten_categories(&roots).into_values().collect())
    }

    async fn scan_listings(
        &self,
        categories: Vec<Category>,
        request: &RequestConfig,
        flight: &InFlight,
    ) -> Result<(Vec<Product>, usize)> {
        info!("Scanning {} categories", categories.len());

        let mut scans = stream::iter(categories.into_iter().enumerate())
            .map(|(index, category)| async move {
                (index, self.scan_category(category, request, flight).await)
            })
            .buffer_unordered(self.config.max_concurrency);

        let mut scanned = Vec::new();
        let mut cancelled = false;
        while let Some((index, result)) = scans.next().await {
            match result {
                Ok((products, pages)) => scanned.push((index, products, pages)),
                Err(CrawlError::Cancelled) => cancelled = true,
                Err(err) => return Err(err),
            }
        }
        if cancelled {
            return Err(CrawlError::Cancelled);
        }

        // Fold in category order so duplicate resolution does not depend on timing.
        scanned.sort_by_key(|(index, _, _)| *index);
        let mut pages = 0;
        let mut products = Vec::new();
        for (_, listed, scanned_pages) in scanned {
            pages += scanned_pages;
            products.extend(listed);
        }
        Ok((products, pages))
    }

    /// Walk one category's pagination. Pages are strictly sequential.
    async fn scan_category(
        &self,
        category: Category,
        request: &RequestConfig,
        flight: &InFlight,
    ) -> Result<(Vec<Product>, usize)> {
        let mut href = category.href.clone();
        let mut visited = HashSet::new();
        let mut products = Vec::new();
        let mut pages = 0;

        loop {
            self.check_stopped()?;
            visited.insert(href.clone());

            let page = self.fetch(&href, request, flight).await?;
            let listing = self.parser.parse_listing(&page)?;
            pages += 1;

            products.extend(
                listing
                    .products
                    .into_iter()
                    .map(|product| product.with_category(category.name.clone())),
            );

            match listing.next.filter(|next| !next.is_empty()) {
                Some(next) if visited.contains(&next) => {
                    warn!("{} links back to {}, stopping pagination", href, next);
                    break;
                }
                Some(next) => href = next,
                None => break,
            }
        }

        debug!(
            "Category {} yielded {} products over {} pages",
            category.name,
            products.len(),
            pages
        );
        self.report(format!("Scanned {} ({} products)", category.name, products.len()));
        Ok((products, pages))
    }

    async fn fetch_details(
        &self,
        products: Vec<Product>,
        request: &RequestConfig,
        flight: &InFlight,
    ) -> Result<(Vec<Product>, usize)> {
        let mut details = stream::iter(products)
            .map(|product| async move { self.enrich(product, request, flight).await })
            .buffered(self.config.max_concurrency);

        let mut enriched = Vec::new();
        let mut failures = 0;
        let mut cancelled = false;
        while let Some(result) = details.next().await {
            match result {
                Ok((product, failed)) => {
                    if failed {
                        failures += 1;
                    }
                    enriched.push(product);
                }
                Err(_) => cancelled = true,
            }
        }
        if cancelled {
            return Err(CrawlError::Cancelled);
        }
        Ok((enriched, failures))
    }

    /// Fetch and merge one product's details. A failed detail page leaves the
    /// product as listed; only cancellation is an error here.
    async fn enrich(
        &self,
        mut product: Product,
        request: &RequestConfig,
        flight: &InFlight,
    ) -> Result<(Product, bool)> {
        self.check_stopped()?;

        let details = match self.fetch(&product.href, request, flight).await {
            Ok(page) => self.parser.parse_detail(&page),
            Err(err) => Err(err),
        };

        match details {
            Ok(details) => {
                product.merge_details(details);
                if product.id.is_none() {
                    product.id = Some(product_id(&self.config.start_page, &product));
                }
                self.report(format!("Fetched {}", product.name));
                Ok((product, false))
            }
            Err(err) => {
                warn!("Failed to fetch details for {}: {}", product.href, err);
                Ok((product, true))
            }
        }
    }

    async fn fetch(&self, href: &str, request: &RequestConfig, flight: &InFlight) -> Result<Page> {
        let (_slot, waiting) = flight.enter();
        debug!("Fetching: {}. Waiting on {}", href, waiting);

        let response = self.engine.send(href, request).await?;
        debug!("{} finished loading", href);
        Ok(Page::new(response.meta.url.clone(), response.text()))
    }

    fn check_stopped(&self) -> Result<()> {
        if self.stop.is_stopped() {
            return Err(CrawlError::Cancelled);
        }
        Ok(())
    }

    fn report(&self, message: String) {
        if let Some(callback) = &self.progress {
            callback(message);
        }
    }
}
