use thiserror::Error;

/// Terminal failure of a single logical request.
#[derive(Error, Debug)]
pub enum HttpError {
    /// Connection refused, DNS failure, TLS/tunnel failure or timeout.
    #[error("Transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Any response with a status of 400 or above.
    #[error("HTTP {status} from {url}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Max redirects ({max}) reached while fetching {url}")]
    MaxRedirectsExceeded { url: String, max: usize },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid proxy: {0}")]
    InvalidProxy(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Failed to decode {encoding} body from {url}: {source}")]
    Decode {
        url: String,
        encoding: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode request body: {0}")]
    Body(#[from] serde_json::Error),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl HttpError {
    pub fn is_transport(&self) -> bool {
        matches!(self, HttpError::Transport { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, HttpError::Transport { source, .. } if source.is_timeout())
    }

    /// Status code carried by a `Status` error.
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 401 and 403 mean the supplied credentials were rejected.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }
}

pub type Result<T> = std::result::Result<T, HttpError>;
