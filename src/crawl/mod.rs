// src/crawl/mod.rs
// =============================================================================
// This module is the crawl core.
//
// Submodules, leaf first:
// - normalize: canonical URL form used for deduplication
// - queue: per-job FIFO + seen-set + in-flight tracking
// - gate: per-host politeness (minimum gap between requests)
// - fetch: the HTTP client and error classification
// - robots: robots.txt rules, cached per origin
// - links: <a href> extraction, split into same-site and external
// - domains: DNS + HTTP checks for external domains
// - job: job state machine and counters
// - worker: the fixed fetch worker pool
// - controller: the entry point used by the HTTP server and the CLI
// =============================================================================

mod controller;
mod domains;
mod fetch;
mod gate;
mod job;
mod links;
mod normalize;
mod queue;
mod robots;
mod worker;

pub use controller::CrawlController;
pub use fetch::Fetcher;
pub use gate::PolitenessGate;
pub use job::{CrawlJob, JobStatus};
pub use worker::WorkerPool;
