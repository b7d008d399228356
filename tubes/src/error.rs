use thiserror::Error;
use tubes_core::CrawlError;
use tubes_http::HttpError;

pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_MISSING_CREDENTIALS: i32 = 3;
pub const EXIT_INVALID_CREDENTIALS: i32 = 4;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Crawl(#[from] CrawlError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Missing credentials: {0}")]
    MissingCredential(String),

    #[error("{0}")]
    Usage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    fn http(&self) -> Option<&HttpError> {
        match self {
            CliError::Http(err) => Some(err),
            CliError::Crawl(err) => err.as_http(),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.http().is_some_and(HttpError::is_unauthorized) {
            return EXIT_INVALID_CREDENTIALS;
        }
        match self {
            CliError::MissingCredential(_) => EXIT_MISSING_CREDENTIALS,
            CliError::Usage(_)
            | CliError::Crawl(
                CrawlError::Config(_)
                | CrawlError::InvalidUrl(_)
                | CrawlError::Selector { .. }
                | CrawlError::Toml(_)
                | CrawlError::Io(_),
            ) => EXIT_USAGE,
            _ => EXIT_FAILURE,
        }
    }

    /// Message shown on stderr.
    pub fn describe(&self) -> String {
        if self.http().is_some_and(HttpError::is_unauthorized) {
            return format!("Invalid credentials ({})", self);
        }
        self.to_string()
    }
}
