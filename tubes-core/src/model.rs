use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Whether `href` is a menu heading with no page behind it: `#` or any
/// `javascript:` link.
pub fn is_placeholder_href(href: &str) -> bool {
    let href = href.trim();
    href == "#"
        || href
            .get(..11)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("javascript:"))
}

/// Product fields owned by the listing stage. Detail pages cannot overwrite them.
pub const RESERVED_FIELDS: [&str; 4] = ["name", "href", "id", "categories"];

/// Flattened categories keyed by href, children stripped.
pub type CategorySet = BTreeMap<String, Category>;

/// Attributes scraped from a detail page.
pub type Details = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub href: String,
    /// Href of the category this one was discovered under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, Category>,
}

impl Category {
    pub fn new(name: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            href: href.into(),
            parent: None,
            children: BTreeMap::new(),
        }
    }

    /// Attach a child named `"<parent> / <name>"`.
    ///
    /// Returns `None` (and attaches nothing) when `href` is this category's own
    /// href.
    pub fn add_sub_category(
        &mut self,
        name: &str,
        href: impl Into<String>,
    ) -> Option<&mut Category> {
        let href = href.into();
        if href == self.href {
            return None;
        }

        let child = Category {
            name: format!("{} / {}", self.name, name),
            href: href.clone(),
            parent: Some(self.href.clone()),
            children: BTreeMap::new(),
        };
        self.children.insert(href.clone(), child);
        self.children.get_mut(&href)
    }

    fn is_placeholder(&self) -> bool {
        is_placeholder_href(&self.href)
    }
}

/// Flatten a category tree into an href-keyed set.
///
/// Placeholder entries are left out but their descendants are still absorbed.
/// A child whose href equals its parent's is dropped together with its subtree.
pub fn flatten_categories<'a>(roots: impl IntoIterator<Item = &'a Category>) -> CategorySet {
    let mut out = CategorySet::new();
    for root in roots {
        absorb(root, None, &mut out);
    }
    out
}

fn absorb(category: &Category, parent_href: Option<&str>, out: &mut CategorySet) {
    if parent_href == Some(category.href.as_str()) {
        return;
    }

    if !category.is_placeholder() {
        let mut flat = category.clone();
        flat.children.clear();
        out.insert(flat.href.clone(), flat);
    }

    for child in category.children.values() {
        absorb(child, Some(&category.href), out);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Names of every category the product was listed under.
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(flatten)]
    pub details: Details,
}

impl Product {
    pub fn new(name: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            href: href.into(),
            id: None,
            categories: BTreeSet::new(),
            details: Details::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.insert(category.into());
        self
    }

    pub fn sku(&self) -> Option<String> {
        sku_of(&self.details)
    }

    /// Merge detail attributes. Reserved fields and keys already present win.
    pub fn merge_details(&mut self, details: Details) {
        for (key, value) in details {
            if RESERVED_FIELDS.contains(&key.as_str()) {
                continue;
            }
            self.details.entry(key).or_insert(value);
        }
    }

    /// Fold another sighting of the same item into this one.
    pub fn absorb(&mut self, other: Product) {
        self.categories.extend(other.categories);
    }
}

/// Non-empty `sku` attribute, whether scraped as text or as a number.
pub fn sku_of(details: &Details) -> Option<String> {
    match details.get("sku")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// One page of a category listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub products: Vec<Product>,
    /// Absolute href of the following page, if any.
    pub next: Option<String>,
}
