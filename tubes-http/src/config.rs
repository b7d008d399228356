use crate::cookies::CookieStore;
use crate::error::{HttpError, Result};
use crate::proxy::ProxyDescriptor;
use reqwest::Method;
use reqwest::header::{
    ACCEPT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT,
};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_REDIRECTS: usize = 10;
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_7_4) AppleWebKit/537.1 (KHTML, like Gecko) Chrome/24.0.1312.70 Safari/537.1";
pub const DEFAULT_ACCEPT_ENCODING: &str = "gzip, deflate";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Sent as-is.
    Raw(Vec<u8>),
    /// URL-form-encoded.
    Form(Vec<(String, String)>),
    /// JSON text unless an explicit non-JSON `content-type` asks for a form.
    Json(Value),
}

impl Payload {
    /// Serialize the payload, filling in `content-type` and `content-length`.
    pub(crate) fn encode(&self, headers: &mut HeaderMap) -> Result<Vec<u8>> {
        let body = match self {
            Payload::Raw(bytes) => bytes.clone(),
            Payload::Form(pairs) => {
                default_content_type(headers, FORM_CONTENT_TYPE);
                form_encode(pairs.iter().map(|(k, v)| (k.as_str(), v.clone())))
            }
            Payload::Json(value) => {
                default_content_type(headers, JSON_CONTENT_TYPE);
                let wants_json = headers
                    .get(CONTENT_TYPE)
                    .and_then(|ct| ct.to_str().ok())
                    .is_some_and(|ct| ct.starts_with(JSON_CONTENT_TYPE));

                match value {
                    Value::Object(fields) if !wants_json => {
                        form_encode(fields.iter().map(|(k, v)| (k.as_str(), form_value(v))))
                    }
                    _ => serde_json::to_vec(value)?,
                }
            }
        };

        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        Ok(body)
    }
}

fn default_content_type(headers: &mut HeaderMap, content_type: &'static str) {
    headers
        .entry(CONTENT_TYPE)
        .or_insert(HeaderValue::from_static(content_type));
}

fn form_encode<'a>(pairs: impl Iterator<Item = (&'a str, String)>) -> Vec<u8> {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key, &value);
    }
    serializer.finish().into_bytes()
}

fn form_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Engine-wide settings applied to every request.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub user_agent: String,
    pub accept_encoding: String,
    /// Used by `ProxyMode::Default` requests.
    pub default_proxy: Option<ProxyDescriptor>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_encoding: DEFAULT_ACCEPT_ENCODING.to_string(),
            default_proxy: None,
        }
    }
}

impl EngineConfig {
    pub(crate) fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.user_agent)
                .map_err(|e| HttpError::InvalidHeader(format!("user-agent: {}", e)))?,
        );
        headers.insert(
            ACCEPT_ENCODING,
            HeaderValue::from_str(&self.accept_encoding)
                .map_err(|e| HttpError::InvalidHeader(format!("accept-encoding: {}", e)))?,
        );
        Ok(headers)
    }
}

/// Which proxy a request goes through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ProxyMode {
    /// Whatever the engine's current default is (possibly none).
    #[default]
    Default,
    /// Connect directly even if the engine has a default proxy.
    Direct,
    Via(ProxyDescriptor),
}

/// Per-request settings.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// `None` means GET, or POST when a payload is present.
    pub method: Option<Method>,
    /// Merged over the engine defaults; these win on conflicts.
    pub headers: HeaderMap,
    pub payload: Option<Payload>,
    pub timeout: Duration,
    pub max_redirects: usize,
    /// Redirects already followed for this logical request.
    pub redirects: usize,
    pub proxy: ProxyMode,
    pub cookies: Option<CookieStore>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            method: None,
            headers: HeaderMap::new(),
            payload: None,
            timeout: DEFAULT_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            redirects: 0,
            proxy: ProxyMode::Default,
            cookies: None,
        }
    }
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HttpError::InvalidHeader(format!("{}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| HttpError::InvalidHeader(format!("{}: {}", name, e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyMode) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_cookies(mut self, cookies: CookieStore) -> Self {
        self.cookies = Some(cookies);
        self
    }

    pub(crate) fn effective_method(&self) -> Method {
        match (&self.method, &self.payload) {
            (Some(method), _) => method.clone(),
            (None, Some(_)) => Method::POST,
            (None, None) => Method::GET,
        }
    }
}
