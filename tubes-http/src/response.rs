use reqwest::header::HeaderMap;
use url::Url;

/// Metadata of the final (non-redirect) response.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    /// URL of the last hop.
    pub url: Url,
    pub status: u16,
    pub headers: HeaderMap,
    /// Redirects followed to get here.
    pub redirects: usize,
}

/// Decoded body plus metadata.
#[derive(Debug, Clone)]
pub struct Response {
    pub body: Vec<u8>,
    pub meta: ResponseMeta,
}

impl Response {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.meta.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn url(&self) -> &Url {
        &self.meta.url
    }

    pub fn status(&self) -> u16 {
        self.meta.status
    }
}
