pub mod config;
pub mod crawl;
pub mod dedupe;
pub mod error;
pub mod identity;
pub mod model;
pub mod parser;
pub mod site;

pub use config::CrawlerConfig;
pub use crawl::{CrawlOutcome, CrawlProgressCallback, CrawlStats, Crawler, StopHandle};
pub use error::CrawlError;
pub use model::{Category, CategorySet, Details, Listing, Product, flatten_categories};
pub use parser::{Page, SiteParser};
pub use site::{SelectorParser, SiteDefinition};
