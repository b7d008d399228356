//! Selector-driven site definitions.
//!
//! A site is described in TOML: where to start, how hard to crawl, and which CSS
//! selectors find categories, listing entries and detail attributes. The
//! definition compiles into a `SelectorParser`, a ready-made `SiteParser`.

use crate::config::CrawlerConfig;
use crate::error::{CrawlError, Result};
use crate::model::{Category, Details, Listing, Product};
use crate::parser::{Page, SiteParser};
use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteDefinition {
    /// Display name, defaults to the start page's host.
    #[serde(default)]
    pub name: Option<String>,
    pub crawler: CrawlerConfig,
    pub categories: CategoryRules,
    pub listing: ListingRules,
    #[serde(default)]
    pub detail: DetailRules,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRules {
    /// One match per top-level category.
    pub item: String,
    /// Anchor inside `item`. Without it `item` must be the anchor.
    #[serde(default)]
    pub link: Option<String>,
    /// Text inside `item` used as the name. Defaults to the link text.
    #[serde(default)]
    pub name: Option<String>,
    /// Sub-category anchors inside `item`.
    #[serde(default)]
    pub children: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingRules {
    pub item: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Anchor pointing at the next listing page.
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetailRules {
    #[serde(default)]
    pub sku: Option<String>,
    /// Attribute name -> selector whose trimmed text becomes the value.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl SiteDefinition {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let site: SiteDefinition = toml::from_str(content)?;
        site.crawler.validate()?;
        Ok(site)
    }

    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            url::Url::parse(&self.crawler.start_page)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_else(|| self.crawler.start_page.clone())
        })
    }

    pub fn compile(&self) -> Result<SelectorParser> {
        SelectorParser::new(self)
    }
}

struct Anchor {
    item: Selector,
    link: Option<Selector>,
    name: Option<Selector>,
}

impl Anchor {
    fn compile(item: &str, link: Option<&String>, name: Option<&String>) -> Result<Self> {
        Ok(Self {
            item: compile(item)?,
            link: link.map(|s| compile(s)).transpose()?,
            name: name.map(|s| compile(s)).transpose()?,
        })
    }

    /// Name and resolved href of one matched item.
    fn extract(&self, page: &Page, item: ElementRef<'_>) -> Option<(String, String)> {
        let link = match &self.link {
            Some(selector) => item.select(selector).next()?,
            None => item,
        };
        let href = page.resolve(link.value().attr("href")?)?;
        let name = match &self.name {
            Some(selector) => item.select(selector).next().map(text_of)?,
            None => text_of(link),
        };
        Some((name, href))
    }
}

/// `SiteParser` backed by compiled CSS selectors.
pub struct SelectorParser {
    categories: Anchor,
    children: Option<Selector>,
    listing: Anchor,
    next: Option<Selector>,
    sku: Option<Selector>,
    fields: Vec<(String, Selector)>,
}

impl SelectorParser {
    pub fn new(site: &SiteDefinition) -> Result<Self> {
        let categories = &site.categories;
        let listing = &site.listing;

        Ok(Self {
            categories: Anchor::compile(
                &categories.item,
                categories.link.as_ref(),
                categories.name.as_ref(),
            )?,
            children: categories.children.as_deref().map(compile).transpose()?,
            listing: Anchor::compile(&listing.item, listing.link.as_ref(), listing.name.as_ref())?,
            next: listing.next.as_deref().map(compile).transpose()?,
            sku: site.detail.sku.as_deref().map(compile).transpose()?,
            fields: site
                .detail
                .fields
                .iter()
                .map(|(name, selector)| compile(selector).map(|s| (name.clone(), s)))
                .collect::<Result<_>>()?,
        })
    }
}

impl SiteParser for SelectorParser {
    fn parse_categories(&self, page: &Page) -> Result<Vec<Category>> {
        let document = page.html();
        let mut categories = Vec::new();

        for item in document.select(&self.categories.item) {
            let Some((name, href)) = self.categories.extract(page, item) else {
                debug!("Skipping category without a link on {}", page.url());
                continue;
            };
            let mut category = Category::new(name, href);

            if let Some(children) = &self.children {
                for child in item.select(children) {
                    let Some(href) = child.value().attr("href").and_then(|h| page.resolve(h))
                    else {
                        continue;
                    };
                    category.add_sub_category(&text_of(child), href);
                }
            }
            categories.push(category);
        }

        Ok(categories)
    }

    fn parse_listing(&self, page: &Page) -> Result<Listing> {
        let document = page.html();
        let products = document
            .select(&self.listing.item)
            .filter_map(|item| self.listing.extract(page, item))
            .map(|(name, href)| Product::new(name, href))
            .collect();

        let next = self.next.as_ref().and_then(|selector| {
            document
                .select(selector)
                .next()
                .and_then(|a| a.value().attr("href"))
                .and_then(|href| page.resolve(href))
        });

        Ok(Listing { products, next })
    }

    fn parse_detail(&self, page: &Page) -> Result<Details> {
        let document = page.html();
        let mut details = Details::new();

        if let Some(selector) = &self.sku {
            if let Some(sku) = document.select(selector).next().map(text_of) {
                details.insert("sku".to_string(), Value::String(sku));
            }
        }
        for (name, selector) in &self.fields {
            if let Some(value) = document.select(selector).next().map(text_of) {
                details.insert(name.clone(), Value::String(value));
            }
        }

        Ok(details)
    }
}

fn compile(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| CrawlError::selector(selector, format!("{e:?}")))
}

/// Text content with runs of whitespace collapsed.
fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    const SITE: &str = r##"
name = "Demo Shop"

[crawler]
start_page = "http://shop.test/"
max_concurrency = 4

[categories]
item = "nav > ul > li"
link = "a.top"
children = "ul.sub a"

[listing]
item = ".product"
link = "a"
next = "a.next"

[detail]
sku = ".sku"

[detail.fields]
price = ".price"
colour = ".colour"
"##;

    fn parser() -> SelectorParser {
        SiteDefinition::from_toml(SITE).unwrap().compile().unwrap()
    }

    fn page(url: &str, body: &str) -> Page {
        Page::new(Url::parse(url).unwrap(), body)
    }

    #[test]
    fn test_definition_defaults() {
        let site = SiteDefinition::from_toml(SITE).unwrap();
        assert_eq!(site.display_name(), "Demo Shop");
        assert_eq!(site.crawler.max_concurrency, 4);
        assert_eq!(site.crawler.timeout_secs, 10);
        assert_eq!(site.detail.fields.len(), 2);
    }

    #[test]
    fn test_invalid_selector_rejected() {
        let broken = SITE.replace(r#"item = ".product""#, r#"item = ".product[""#);
        let err = SiteDefinition::from_toml(&broken)
            .unwrap()
            .compile()
            .err()
            .unwrap();
        assert!(matches!(err, CrawlError::Selector { ref selector, .. } if selector == ".product["));
    }

    #[test]
    fn test_invalid_start_page_rejected() {
        let broken = SITE.replace("http://shop.test/", "shop.test");
        assert!(matches!(
            SiteDefinition::from_toml(&broken),
            Err(CrawlError::Config(_))
        ));
    }

    #[test]
    fn test_parse_categories_with_children() {
        let html = r##"<nav><ul>
            <li><a class="top" href="/kitchen">Kitchen</a>
                <ul class="sub">
                    <li><a href="/kitchen/kettles">Kettles</a></li>
                    <li><a href="/kitchen">All kitchen</a></li>
                </ul>
            </li>
            <li><a class="top" href="#">  More
                stuff </a></li>
            <li><span>no link</span></li>
        </ul></nav>"##;

        let categories = parser()
            .parse_categories(&page("http://shop.test/", html))
            .unwrap();

        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].name, "Kitchen");
        assert_eq!(categories[0].href, "http://shop.test/kitchen");
        assert_eq!(categories[0].children.len(), 1);
        assert_eq!(
            categories[0].children["http://shop.test/kitchen/kettles"].name,
            "Kitchen / Kettles"
        );
        assert_eq!(categories[1].name, "More stuff");
        assert_eq!(categories[1].href, "#");
    }

    #[test]
    fn test_parse_listing_with_next() {
        let html = r#"
            <div class="product"><a href="/p/1">Red kettle</a></div>
            <div class="product"><a href="p/2">Blue kettle</a></div>
            <div class="product">sold out</div>
            <a class="next" href="?page=2">Next</a>"#;

        let listing = parser()
            .parse_listing(&page("http://shop.test/kitchen/", html))
            .unwrap();

        assert_eq!(listing.products.len(), 2);
        assert_eq!(listing.products[0].href, "http://shop.test/p/1");
        assert_eq!(listing.products[1].href, "http://shop.test/kitchen/p/2");
        assert_eq!(listing.products[1].name, "Blue kettle");
        assert_eq!(
            listing.next.as_deref(),
            Some("http://shop.test/kitchen/?page=2")
        );
    }

    #[test]
    fn test_parse_detail_fields() {
        let html = r#"<h1>Kettle</h1><span class="sku"> K-100 </span><span class="price">£19.99</span>"#;
        let details = parser()
            .parse_detail(&page("http://shop.test/p/1", html))
            .unwrap();

        assert_eq!(details["sku"], "K-100");
        assert_eq!(details["price"], "£19.99");
        assert!(!details.contains_key("colour"));
    }
}
