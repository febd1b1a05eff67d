// src/error.rs
// =============================================================================
// Typed errors for the crawl core.
//
// Only `InvalidUrl` (and `JobNotFound` on the job endpoints) ever reaches an
// HTTP caller. Everything that goes wrong while fetching becomes a log line
// instead; see crawl/worker.rs.
//
// The application layer (main, cli, config, server start-up) uses
// anyhow::Result instead.
// =============================================================================

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrawlError {
    /// The submitted URL is malformed, has no host, or uses a scheme we don't crawl
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Timed out after {}ms", after.as_millis())]
    FetchTimeout { after: Duration },

    /// Network-level failure (DNS, connect, TLS, body read, redirect loop)
    #[error("{reason}")]
    FetchError { reason: String },

    /// The server answered, but not with a 2xx
    #[error("HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("Queue full ({capacity} pending)")]
    QueueFull { capacity: usize },

    /// The per-job page budget has been spent
    #[error("Crawl budget exhausted ({limit} pages)")]
    ResourceExhausted { limit: usize },

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CrawlError {
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        CrawlError::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    // Whether another attempt at the same URL could plausibly succeed.
    // 4xx answers are the server telling us "no", so they are final
    // (except 408 and 429, which are explicitly "try later").
    pub fn is_retryable(&self) -> bool {
        match self {
            CrawlError::FetchTimeout { .. } | CrawlError::FetchError { .. } => true,
            CrawlError::HttpStatus { status } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CrawlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        let timeout = CrawlError::FetchTimeout {
            after: Duration::from_secs(1),
        };
        let refused = CrawlError::FetchError {
            reason: "connection refused".into(),
        };
        assert!(timeout.is_retryable());
        assert!(refused.is_retryable());
        assert!(CrawlError::HttpStatus { status: 503 }.is_retryable());
        assert!(CrawlError::HttpStatus { status: 429 }.is_retryable());
        assert!(!CrawlError::HttpStatus { status: 404 }.is_retryable());
        assert!(!CrawlError::invalid_url("x", "y").is_retryable());
    }

    #[test]
    fn test_messages() {
        let err = CrawlError::FetchTimeout {
            after: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "Timed out after 1500ms");
        assert_eq!(CrawlError::HttpStatus { status: 404 }.to_string(), "HTTP 404");
    }
}
