use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// A cookie captured from a `Set-Cookie` header.
///
/// Attributes (`Path`, `Domain`, `Expires`, `HttpOnly`, ...) are kept verbatim as
/// metadata. They are never used for expiry or domain filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub key: String,
    pub value: String,
    /// Attribute name as sent by the server -> value (`None` for bare flags).
    pub attributes: BTreeMap<String, Option<String>>,
}

impl Cookie {
    /// Parse a single `Set-Cookie` header value.
    ///
    /// The first `key=value` pair names the cookie; every later `;`-separated token
    /// is an attribute. Returns `None` when the first pair has no `=` or an empty key.
    pub fn parse(raw: &str) -> Option<Cookie> {
        let mut parts = raw.split(';');
        let (key, value) = parts.next()?.split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }

        let attributes = parts
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| match part.split_once('=') {
                Some((name, value)) => (name.trim().to_string(), Some(value.trim().to_string())),
                None => (part.to_string(), None),
            })
            .collect();

        Some(Cookie {
            key: key.to_string(),
            value: value.trim().to_string(),
            attributes,
        })
    }

    /// Case-insensitive attribute lookup. Bare flags yield `Some(None)`.
    pub fn attribute(&self, name: &str) -> Option<Option<&str>> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_deref())
    }
}

/// Flat key -> latest-cookie jar shared by every request of a crawl.
///
/// Cloning the store clones a handle; all clones see the same cookies. Each write
/// replaces the previous cookie for that key.
#[derive(Clone, Default)]
pub struct CookieStore {
    jar: Arc<Mutex<BTreeMap<String, Cookie>>>,
}

impl CookieStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Cookie>> {
        // Writes are single inserts, a poisoned jar is still consistent
        self.jar.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<Cookie> {
        self.lock().get(key).cloned()
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        self.lock().get(key).map(|cookie| cookie.value.clone())
    }

    /// Store the cookie described by one raw `Set-Cookie` header value.
    pub fn set(&self, raw: &str) {
        match Cookie::parse(raw) {
            Some(cookie) => {
                debug!("Storing cookie {}", cookie.key);
                self.lock().insert(cookie.key.clone(), cookie);
            }
            None => debug!("Ignoring malformed Set-Cookie value: {}", raw),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Key to value, without attributes.
    pub fn values(&self) -> BTreeMap<String, String> {
        self.lock()
            .values()
            .map(|cookie| (cookie.key.clone(), cookie.value.clone()))
            .collect()
    }

    /// `key=value; key=value` for the `Cookie` request header.
    pub fn serialize(&self) -> String {
        self.lock()
            .values()
            .map(|cookie| format!("{}={}", cookie.key, cookie.value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for CookieStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl fmt::Debug for CookieStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieStore")
            .field("cookies", &self.len())
            .finish()
    }
}
