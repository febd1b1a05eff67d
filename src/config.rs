// src/config.rs
// =============================================================================
// Runtime settings for the crawl core.
//
// Values normally come from the command line / CRAWLER_* environment
// variables (see cli.rs). Tests build a CrawlConfig directly, usually with
// `..Default::default()` and a zero politeness interval.
// =============================================================================

use anyhow::{bail, Result};
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; DomainCrawler/1.0)";

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Number of fetch workers in the pool
    pub workers: usize,
    /// Minimum gap between two requests to the same host
    pub politeness_interval: Duration,
    /// Upper bound on a single fetch, connect to last body byte
    pub fetch_timeout: Duration,
    /// Ceiling for link-following depth (the seed is depth 0)
    pub max_depth: usize,
    /// How many URLs a single job may enqueue in total
    pub max_pages: usize,
    /// How many URLs may wait in a job's queue at once
    pub queue_capacity: usize,
    /// How many log lines GET /logs can return
    pub log_capacity: usize,
    /// If set, log lines older than this are dropped too
    pub log_retention: Option<Duration>,
    /// Extra attempts after a failed fetch (0 = no retry)
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each further retry
    pub retry_backoff: Duration,
    /// Bodies larger than this are not scanned for links
    pub max_body_bytes: usize,
    pub user_agent: String,
    pub allowed_schemes: Vec<String>,
    /// Skip URLs that robots.txt disallows and honour its Crawl-delay
    pub obey_robots: bool,
    /// Run a DNS + HTTP check on each new external domain a job links to
    pub check_domains: bool,
    /// Finished jobs kept for GET /jobs; the oldest are forgotten first
    pub max_jobs: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            politeness_interval: Duration::from_millis(1000),
            fetch_timeout: Duration::from_secs(10),
            max_depth: 10,
            max_pages: 500,
            queue_capacity: 10_000,
            log_capacity: 1000,
            log_retention: None,
            max_retries: 0,
            retry_backoff: Duration::from_millis(500),
            max_body_bytes: 5 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            allowed_schemes: vec!["http".to_string(), "https".to_string()],
            obey_robots: true,
            check_domains: true,
            max_jobs: 100,
        }
    }
}

impl CrawlConfig {
    // Rejects settings that would leave the controller unable to do anything
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.max_pages == 0 {
            bail!("max_pages must be at least 1");
        }
        if self.queue_capacity == 0 {
            bail!("queue_capacity must be at least 1");
        }
        if self.log_capacity == 0 {
            bail!("log_capacity must be at least 1");
        }
        if self.fetch_timeout.is_zero() {
            bail!("fetch_timeout must be greater than zero");
        }
        if self.max_jobs == 0 {
            bail!("max_jobs must be at least 1");
        }
        if self.allowed_schemes.is_empty() {
            bail!("at least one URL scheme must be allowed");
        }
        Ok(())
    }

    pub fn allows_scheme(&self, scheme: &str) -> bool {
        self.allowed_schemes
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(scheme))
    }

    // Backoff before retry number `retry` (1-based): base, 2x base, 4x base...
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(16);
        self.retry_backoff.saturating_mul(factor)
    }
}
