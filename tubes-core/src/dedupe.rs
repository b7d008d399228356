use crate::identity::product_id;
use crate::model::Product;
use std::collections::HashMap;

/// Merge products sharing an exact href. First sighting wins, categories union.
pub fn dedupe_by_href(products: Vec<Product>) -> Vec<Product> {
    dedupe_by(products, |p| p.href.clone())
}

/// Assign every product its stable identifier, then merge products sharing one.
pub fn dedupe_by_id(products: Vec<Product>, start_page: &str) -> Vec<Product> {
    let products = products
        .into_iter()
        .map(|mut p| {
            if p.id.is_none() {
                p.id = Some(product_id(start_page, &p));
            }
            p
        })
        .collect();

    dedupe_by(products, |p| p.id.clone().unwrap_or_default())
}

fn dedupe_by(products: Vec<Product>, key: impl Fn(&Product) -> String) -> Vec<Product> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Product> = Vec::with_capacity(products.len());

    for product in products {
        let k = key(&product);
        match index.get(&k) {
            Some(&i) => out[i].absorb(product),
            None => {
                index.insert(k, out.len());
                out.push(product);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn listed(name: &str, href: &str, category: &str) -> Product {
        Product::new(name, href).with_category(category)
    }

    fn categories(p: &Product) -> BTreeSet<&str> {
        p.categories.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_href_dedupe_unions_categories() {
        let products = vec![
            listed("P1", "/p1", "a"),
            listed("P2", "/p2", "b"),
            listed("P1 again", "/p1", "b"),
        ];
        let deduped = dedupe_by_href(products);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].name, "P1");
        assert_eq!(categories(&deduped[0]), BTreeSet::from(["a", "b"]));
    }

    #[test]
    fn test_href_dedupe_is_idempotent() {
        let products = vec![
            listed("P1", "/p1", "a"),
            listed("P1", "/p1", "b"),
            listed("P3", "/p3", "c"),
        ];
        let once = dedupe_by_href(products);
        let twice = dedupe_by_href(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_union_independent_of_order() {
        let forward = dedupe_by_href(vec![listed("P", "/p", "a"), listed("P", "/p", "b")]);
        let backward = dedupe_by_href(vec![listed("P", "/p", "b"), listed("P", "/p", "a")]);
        assert_eq!(forward[0].categories, backward[0].categories);
    }

    #[test]
    fn test_id_dedupe_merges_same_sku() {
        let mut p2 = listed("P2", "/p2", "b");
        p2.details.insert("sku".into(), json!("SKU-9"));
        let mut p3 = listed("P3", "/p3", "c");
        p3.details.insert("sku".into(), json!("SKU-9"));
        let p1 = listed("P1", "/p1", "a");

        let deduped = dedupe_by_id(vec![p1, p2, p3], "http://shop.test/");

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[1].name, "P2");
        assert_eq!(categories(&deduped[1]), BTreeSet::from(["b", "c"]));
        assert!(deduped.iter().all(|p| p.id.is_some()));
    }

    #[test]
    fn test_id_dedupe_without_sku_keys_on_href() {
        let deduped = dedupe_by_id(
            vec![listed("A", "/a", "x"), listed("B", "/b", "x")],
            "http://shop.test/",
        );
        assert_eq!(deduped.len(), 2);
        assert_ne!(deduped[0].id, deduped[1].id);
    }
}
