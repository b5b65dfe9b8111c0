//! fOS Networking
//!
//! Resource fetching for the bundle runtime.

pub mod loader;
pub mod request_dedup;

pub use loader::{HttpTransport, ResourceLoader, Transport};
pub use request_dedup::{DeduplicationStats, InFlightTable};
pub use url::Url;

use std::time::Duration;

/// HTTP Response
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    /// Check if the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Get a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body as UTF-8 text
    pub fn text(&self) -> Result<&str, NetError> {
        std::str::from_utf8(&self.body).map_err(|e| NetError::Decode(e.to_string()))
    }
}

/// Network error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetError {
    #[error("HTTP error: {status}")]
    HttpError { status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl NetError {
    /// The resource does not exist on the server
    pub fn is_not_found(&self) -> bool {
        matches!(self, NetError::HttpError { status: 404 | 410 })
    }
}
