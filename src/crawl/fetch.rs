// src/crawl/fetch.rs
// =============================================================================
// Fetches one URL and classifies what happened.
//
// Key functionality:
// - One shared reqwest Client (connection pooling) with a per-request timeout
// - Follows up to 5 redirects
// - Anything other than a 2xx answer is an error (CrawlError::HttpStatus)
// - Network failures are sorted into timeout vs. other fetch errors
// - The body is read in chunks and capped, so a huge file can't eat memory
// - fetch_text() and status_of() serve robots.txt and the domain checks
//
// The worker pool turns every result of fetch() into exactly one log line.
// =============================================================================

use anyhow::Result as AnyResult;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::{Duration, Instant};
use url::Url;

use crate::config::CrawlConfig;
use crate::error::{CrawlError, Result};

// What a successful fetch produced
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Where we ended up after redirects
    pub final_url: Url,
    pub status: u16,
    /// Body size as received, even if we stopped keeping it
    pub bytes: usize,
    pub content_type: Option<String>,
    /// Decoded body, only for HTML pages that fit under the size cap
    pub html: Option<String>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    timeout: Duration,
    max_body_bytes: usize,
}

impl Fetcher {
    // Builds the HTTP client from the crawl settings.
    // Fails only if the TLS backend can't be initialised.
    pub fn new(config: &CrawlConfig) -> AnyResult<Self> {
        let client = Client::builder()
            .timeout(config.fetch_timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            timeout: config.fetch_timeout,
            max_body_bytes: config.max_body_bytes,
        })
    }

    pub async fn fetch(&self, url: &Url) -> Result<FetchedPage> {
        let started = Instant::now();

        let mut response = self.send(url).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let (body, bytes) = self.read_capped(&mut response).await?;

        let html = if is_html(content_type.as_deref()) && bytes <= self.max_body_bytes {
            Some(String::from_utf8_lossy(&body).into_owned())
        } else {
            None
        };

        Ok(FetchedPage {
            final_url,
            status: status.as_u16(),
            bytes,
            content_type,
            html,
            elapsed: started.elapsed(),
        })
    }

    // Fetches a small text resource such as robots.txt. Any content type is
    // accepted; non-2xx answers are errors, like in fetch().
    pub async fn fetch_text(&self, url: &Url) -> Result<String> {
        let mut response = self.send(url).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let (body, _) = self.read_capped(&mut response).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    // The status code `url` answers with, whatever it is. The body is not read.
    pub async fn status_of(&self, url: &Url) -> Result<u16> {
        let response = self.send(url).await?;
        Ok(response.status().as_u16())
    }

    async fn send(&self, url: &Url) -> Result<reqwest::Response> {
        self.client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.categorize_error(e))
    }

    // Keeps at most max_body_bytes, but keeps counting so the log shows the
    // real size. Returns (kept bytes, total size).
    async fn read_capped(&self, response: &mut reqwest::Response) -> Result<(Vec<u8>, usize)> {
        let mut body = Vec::new();
        let mut bytes = 0usize;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.categorize_error(e))?
        {
            bytes += chunk.len();
            let room = self.max_body_bytes.saturating_sub(body.len());
            body.extend_from_slice(&chunk[..room.min(chunk.len())]);
        }
        Ok((body, bytes))
    }

    // Sorts reqwest errors into our error kinds.
    //
    // reqwest errors can happen for many reasons:
    // - Network timeout
    // - DNS resolution failure
    // - SSL certificate issues
    // - Too many redirects
    // The interesting detail usually sits in the error's source chain, so
    // the whole chain is searched, not just the top-level message.
    fn categorize_error(&self, error: reqwest::Error) -> CrawlError {
        if error.is_timeout() {
            return CrawlError::FetchTimeout {
                after: self.timeout,
            };
        }

        let chain = error_chain(&error);
        let lowered = chain.to_lowercase();

        let reason = if error.is_redirect() {
            "Too many redirects".to_string()
        } else if lowered.contains("dns") || lowered.contains("failed to lookup") {
            "Could not resolve hostname".to_string()
        } else if lowered.contains("certificate") || lowered.contains("tls") {
            format!("SSL certificate error: {}", chain)
        } else if error.is_connect() {
            format!("Connection failed: {}", chain)
        } else {
            chain
        };

        CrawlError::FetchError { reason }
    }
}

fn is_html(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| {
        let ct = ct.to_ascii_lowercase();
        ct.starts_with("text/html") || ct.starts_with("application/xhtml+xml")
    })
}

// "outer: inner: innermost"
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = inner.source();
    }
    message
}
