// src/context.rs
// =============================================================================
// The process-wide application context.
//
// Everything shared lives here and is built exactly once, on start-up:
// config, the log buffer, the politeness gate, the worker pool, and the
// controller on top of them. It is handed explicitly to the HTTP server or
// the CLI command; there are no global statics, so tests can build as many
// independent contexts as they like.
//
// There is no teardown besides shutdown(), which stops the workers.
// =============================================================================

use anyhow::{Context as _, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::CrawlConfig;
use crate::crawl::{CrawlController, Fetcher, PolitenessGate, WorkerPool};
use crate::logs::LogBuffer;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<CrawlConfig>,
    pub logs: Arc<LogBuffer>,
    pub controller: Arc<CrawlController>,
}

impl AppContext {
    pub fn new(config: CrawlConfig) -> Result<Self> {
        config.validate().context("invalid crawl configuration")?;
        let config = Arc::new(config);

        let logs = Arc::new(LogBuffer::with_retention(
            config.log_capacity,
            config.log_retention,
        ));
        let gate = Arc::new(PolitenessGate::new(config.politeness_interval));
        let fetcher = Fetcher::new(&config).context("failed to build HTTP client")?;
        let pool = Arc::new(WorkerPool::new(
            Arc::clone(&config),
            gate,
            fetcher,
            Arc::clone(&logs),
        ));
        let controller = Arc::new(CrawlController::new(
            Arc::clone(&config),
            Arc::clone(&logs),
            pool,
        ));

        info!(
            workers = config.workers,
            politeness_ms = config.politeness_interval.as_millis() as u64,
            timeout_ms = config.fetch_timeout.as_millis() as u64,
            max_depth = config.max_depth,
            "Crawl controller ready"
        );

        Ok(Self {
            config,
            logs,
            controller,
        })
    }

    pub async fn shutdown(&self) {
        self.controller.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_config() {
        let config = CrawlConfig {
            log_capacity: 0,
            ..CrawlConfig::default()
        };
        assert!(AppContext::new(config).is_err());
    }

    #[tokio::test]
    async fn test_contexts_are_independent() {
        let a = AppContext::new(CrawlConfig::default()).unwrap();
        let b = AppContext::new(CrawlConfig::default()).unwrap();

        a.logs.info("only in a");
        assert_eq!(a.controller.log_lines().len(), 1);
        assert!(b.controller.log_lines().is_empty());
    }
}
