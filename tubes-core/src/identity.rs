use crate::model::Product;
use sha2::{Digest, Sha256};

/// `hex(sha256(start_page + key))`.
pub fn stable_id(start_page: &str, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(start_page.as_bytes());
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Identifier for a product: its SKU when the detail page supplied one,
/// otherwise its href.
pub fn product_id(start_page: &str, product: &Product) -> String {
    match product.sku() {
        Some(sku) => stable_id(start_page, &sku),
        None => stable_id(start_page, &product.href),
    }
}
