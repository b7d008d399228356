use crate::error::{HttpError, Result};
use std::fmt;
use url::Url;

/// Port used when a proxy URL does not name one.
pub const DEFAULT_PROXY_PORT: u16 = 80;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An HTTP proxy, optionally with basic-auth credentials.
///
/// `http` targets are sent to the proxy in absolute form with a
/// `Proxy-Authorization` header; `https` targets are tunnelled with `CONNECT`
/// and the credentials only ever appear in the CONNECT handshake.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyDescriptor {
    pub host: String,
    pub port: u16,
    pub auth: Option<ProxyCredentials>,
}

impl ProxyDescriptor {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            auth: None,
        }
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(ProxyCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Parse `http://[user:password@]host[:port]`. The port defaults to 80.
    pub fn parse(proxy_url: &str) -> Result<Self> {
        let url = Url::parse(proxy_url)
            .map_err(|e| HttpError::InvalidProxy(format!("{}: {}", proxy_url, e)))?;

        if url.scheme() != "http" {
            return Err(HttpError::InvalidProxy(format!(
                "{}: only http:// proxies are supported",
                proxy_url
            )));
        }

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| HttpError::InvalidProxy(format!("{}: missing host", proxy_url)))?;

        let mut proxy = Self::new(host, url.port().unwrap_or(DEFAULT_PROXY_PORT));
        if !url.username().is_empty() {
            proxy = proxy.with_auth(url.username(), url.password().unwrap_or(""));
        }

        Ok(proxy)
    }

    /// Proxy endpoint without credentials.
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub(crate) fn to_reqwest(&self) -> Result<reqwest::Proxy> {
        let proxy = reqwest::Proxy::all(self.endpoint())
            .map_err(|e| HttpError::InvalidProxy(format!("{}: {}", self, e)))?;

        Ok(match &self.auth {
            Some(auth) => proxy.basic_auth(&auth.username, &auth.password),
            None => proxy,
        })
    }
}

impl fmt::Display for ProxyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
