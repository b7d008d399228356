use std::fmt;
use thiserror::Error;
use tubes_http::HttpError;

pub type Result<T> = std::result::Result<T, CrawlError>;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error(transparent)]
    Http(#[from] HttpError),

    /// A page parser rejected the document it was given.
    #[error("Failed to parse {url}: {message}")]
    Parse { url: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("Crawl cancelled")]
    Cancelled,

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl CrawlError {
    pub fn parse(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Parse {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// The underlying request failure, if this error came from the engine.
    pub fn as_http(&self) -> Option<&HttpError> {
        match self {
            CrawlError::Http(err) => Some(err),
            _ => None,
        }
    }
}
