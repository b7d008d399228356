use crate::config::{EngineConfig, ProxyMode, RequestConfig};
use crate::decode::BodyDecoder;
use crate::error::{HttpError, Result};
use crate::proxy::ProxyDescriptor;
use crate::response::{Response, ResponseMeta};
use reqwest::Client;
use reqwest::header::{
    CONTENT_ENCODING, COOKIE, HeaderMap, HeaderValue, LOCATION, SET_COOKIE,
};
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Issues logical requests: one call, any number of redirect hops, one outcome.
///
/// The engine owns a direct connection pool plus one pool per proxy it has been
/// asked to use. It is meant to be shared (behind an `Arc`) by every concurrent
/// fetch of a crawl.
pub struct RequestEngine {
    direct: Client,
    proxied: Mutex<HashMap<ProxyDescriptor, Client>>,
    default_proxy: RwLock<Option<ProxyDescriptor>>,
    default_headers: HeaderMap,
}

/// One hop's raw outcome before status dispatch.
struct Hop {
    status: u16,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl RequestEngine {
    pub fn new() -> Result<Self> {
        Self::from_config(EngineConfig::default())
    }

    pub fn from_config(config: EngineConfig) -> Result<Self> {
        Ok(Self {
            direct: build_client(None)?,
            proxied: Mutex::new(HashMap::new()),
            default_proxy: RwLock::new(config.default_proxy.clone()),
            default_headers: config.default_headers()?,
        })
    }

    pub fn with_default_proxy(self, proxy: Option<ProxyDescriptor>) -> Self {
        self.set_default_proxy(proxy);
        self
    }

    /// Replace the engine-wide proxy used by `ProxyMode::Default` requests.
    pub fn set_default_proxy(&self, proxy: Option<ProxyDescriptor>) {
        match &proxy {
            Some(p) => debug!("Default proxy set to {}", p),
            None => debug!("Default proxy cleared"),
        }
        *self
            .default_proxy
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = proxy;
    }

    pub fn default_proxy(&self) -> Option<ProxyDescriptor> {
        self.default_proxy
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Resolve `ProxyMode::Default` against the current engine default.
    pub fn resolve_proxy(&self, mode: &ProxyMode) -> Option<ProxyDescriptor> {
        match mode {
            ProxyMode::Default => self.default_proxy(),
            ProxyMode::Direct => None,
            ProxyMode::Via(proxy) => Some(proxy.clone()),
        }
    }

    pub async fn get(&self, location: &str) -> Result<Response> {
        self.send(location, &RequestConfig::default()).await
    }

    /// Fetch `location`, following redirects until a terminal response.
    ///
    /// 3xx responses are chased while the redirect budget lasts; every hop reuses
    /// `config` (headers, payload, proxy, cookie store) and rebuilds its connection
    /// target from the hop's own URL. Statuses of 400 and above fail with
    /// `HttpError::Status`.
    pub async fn send(&self, location: &str, config: &RequestConfig) -> Result<Response> {
        let mut url = Url::parse(location)
            .map_err(|e| HttpError::InvalidUrl(format!("{}: {}", location, e)))?;
        let mut redirects = config.redirects;

        loop {
            let hop = self.dispatch(&url, config, redirects).await?;

            match hop.status {
                300..=399 => {
                    let Some(target) = hop.headers.get(LOCATION).and_then(|v| v.to_str().ok())
                    else {
                        debug!("{} returned {} without a Location", url, hop.status);
                        return Ok(hop.into_response(url, redirects));
                    };

                    if redirects >= config.max_redirects {
                        return Err(HttpError::MaxRedirectsExceeded {
                            url: url.to_string(),
                            max: config.max_redirects,
                        });
                    }

                    let next = redirect_target(&url, target)?;
                    redirects += 1;
                    debug!("Redirect {} -> {} ({}/{})", url, next, redirects, config.max_redirects);
                    url = next;
                }
                400.. => {
                    return Err(HttpError::Status {
                        url: url.to_string(),
                        status: hop.status,
                        body: String::from_utf8_lossy(&hop.body).into_owned(),
                    });
                }
                _ => return Ok(hop.into_response(url, redirects)),
            }
        }
    }

    async fn dispatch(&self, url: &Url, config: &RequestConfig, redirects: usize) -> Result<Hop> {
        let client = self.client_for(&config.proxy)?;

        let mut headers = self.default_headers.clone();
        headers.extend(config.headers.clone());

        if let Some(store) = &config.cookies {
            let cookie = store.serialize();
            if !cookie.is_empty() {
                let value = HeaderValue::from_str(&cookie)
                    .map_err(|e| HttpError::InvalidHeader(format!("cookie: {}", e)))?;
                headers.insert(COOKIE, value);
            }
        }

        let method = config.effective_method();
        debug!("{} {} (redirects so far: {})", method, url, redirects);

        let mut request = client
            .request(method, url.clone())
            .timeout(config.timeout);
        if let Some(payload) = &config.payload {
            request = request.body(payload.encode(&mut headers)?);
        }

        let mut response = request
            .headers(headers)
            .send()
            .await
            .map_err(|e| transport(url, e))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();

        if let Some(store) = &config.cookies {
            for value in headers.get_all(SET_COOKIE) {
                if let Ok(raw) = value.to_str() {
                    store.set(raw);
                }
            }
        }

        let mut decoder =
            BodyDecoder::for_encoding(headers.get(CONTENT_ENCODING).and_then(|v| v.to_str().ok()));
        let encoding = decoder.name();
        let decode_error = |source: std::io::Error| HttpError::Decode {
            url: url.to_string(),
            encoding: encoding.to_string(),
            source,
        };

        while let Some(chunk) = response.chunk().await.map_err(|e| transport(url, e))? {
            decoder.write(&chunk).map_err(decode_error)?;
        }
        let body = decoder.finish().map_err(decode_error)?;

        Ok(Hop {
            status,
            headers,
            body,
        })
    }

    fn client_for(&self, mode: &ProxyMode) -> Result<Client> {
        let Some(proxy) = self.resolve_proxy(mode) else {
            return Ok(self.direct.clone());
        };

        let mut clients = self
            .proxied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(client) = clients.get(&proxy) {
            return Ok(client.clone());
        }

        debug!("Building connection pool for proxy {}", proxy);
        let client = build_client(Some(&proxy))?;
        clients.insert(proxy, client.clone());
        Ok(client)
    }
}

impl Hop {
    fn into_response(self, url: Url, redirects: usize) -> Response {
        Response {
            body: self.body,
            meta: ResponseMeta {
                url,
                status: self.status,
                headers: self.headers,
                redirects,
            },
        }
    }
}

fn build_client(proxy: Option<&ProxyDescriptor>) -> Result<Client> {
    let builder = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(50)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60));

    let builder = match proxy {
        Some(proxy) => builder.proxy(proxy.to_reqwest()?),
        None => builder.no_proxy(),
    };

    builder.build().map_err(HttpError::Client)
}

fn transport(url: &Url, source: reqwest::Error) -> HttpError {
    HttpError::Transport {
        url: url.to_string(),
        source,
    }
}

/// Resolve a `Location` value against the scheme and host of the request that
/// produced it.
fn redirect_target(current: &Url, location: &str) -> Result<Url> {
    let mut base = current.clone();
    base.set_path("/");
    base.set_query(None);
    base.set_fragment(None);
    base.join(location)
        .map_err(|e| HttpError::InvalidUrl(format!("redirect to {}: {}", location, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_target_absolute_path() {
        let current = Url::parse("http://shop.example:8080/a/b?page=1").unwrap();
        let next = redirect_target(&current, "/login?next=%2Fa").unwrap();
        assert_eq!(next.as_str(), "http://shop.example:8080/login?next=%2Fa");
    }

    #[test]
    fn test_redirect_target_relative_resolves_from_host() {
        let current = Url::parse("https://shop.example/a/b").unwrap();
        let next = redirect_target(&current, "c").unwrap();
        assert_eq!(next.as_str(), "https://shop.example/c");
    }

    #[test]
    fn test_redirect_target_absolute_url() {
        let current = Url::parse("http://shop.example/").unwrap();
        let next = redirect_target(&current, "https://cdn.example/x").unwrap();
        assert_eq!(next.as_str(), "https://cdn.example/x");
    }

    #[test]
    fn test_resolve_proxy_modes() {
        let engine = RequestEngine::new().unwrap();
        assert_eq!(engine.resolve_proxy(&ProxyMode::Default), None);

        let proxy = ProxyDescriptor::new("proxy.example", 3128);
        engine.set_default_proxy(Some(proxy.clone()));
        assert_eq!(engine.resolve_proxy(&ProxyMode::Default), Some(proxy.clone()));
        assert_eq!(engine.resolve_proxy(&ProxyMode::Direct), None);

        let other = ProxyDescriptor::new("other.example", 8080);
        assert_eq!(
            engine.resolve_proxy(&ProxyMode::Via(other.clone())),
            Some(other)
        );

        engine.set_default_proxy(None);
        assert_eq!(engine.default_proxy(), None);
    }
}
