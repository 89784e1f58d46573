//! Error types for scraping operations.
//!
//! [`ScrapeError`] names the failure categories an adapter can hit. Adapters return
//! `anyhow::Result` and attach these as the root cause, so callers can downcast when they
//! care about the category and print the context chain otherwise.

use thiserror::Error;

/// Errors that can occur while fetching or mapping a product.
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// Connection failure or timeout after retries were exhausted.
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    /// Non-success HTTP status after retries were exhausted.
    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// Body was not valid JSON where JSON was expected.
    #[error("JSON decode failed for {url}: {message}")]
    Decode { url: String, message: String },

    /// A required query parameter is absent from the product URL.
    #[error("Missing {parameter} in {url}")]
    MissingParameter { parameter: String, url: String },

    /// Request signing could not be performed.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// No adapter is registered for the URL's host.
    #[error("Unsupported URL: {0}")]
    UnsupportedUrl(String),

    /// Any other domain-level failure.
    #[error("{0}")]
    Domain(String),
}

impl ScrapeError {
    /// Whether the HTTP transport may retry the request.
    pub fn is_retryable_status(status: u16) -> bool {
        matches!(status, 404 | 408 | 429 | 500 | 502 | 503 | 504)
    }
}
