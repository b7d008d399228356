pub mod config;
pub mod cookies;
mod decode;
pub mod engine;
pub mod error;
pub mod proxy;
pub mod response;

pub use config::{EngineConfig, Payload, ProxyMode, RequestConfig};
pub use cookies::{Cookie, CookieStore};
pub use engine::RequestEngine;
pub use error::HttpError;
pub use proxy::{ProxyCredentials, ProxyDescriptor};
pub use response::{Response, ResponseMeta};
pub use reqwest::Method;
