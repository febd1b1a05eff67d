// src/cli.rs
// =============================================================================
// The command-line interface, built with clap's derive API.
//
// Two subcommands:
// - serve: run the HTTP service (POST /crawl, GET /logs, ...)
// - crawl: run a single crawl in the foreground and print its log
//
// Every crawl setting can also come from a CRAWLER_* environment variable
// (or a .env file, loaded in main.rs). A flag on the command line wins.
// =============================================================================

use clap::{ArgAction, Args, Parser, Subcommand};
use std::time::Duration;

use crate::config::{CrawlConfig, DEFAULT_USER_AGENT};

#[derive(Parser, Debug)]
#[command(
    name = "crawl-controller",
    version,
    about = "A polite, single-node web crawl controller",
    long_about = "crawl-controller accepts crawl jobs over HTTP, fetches pages with a fixed \
                  worker pool while keeping a minimum gap between requests to the same host, \
                  and exposes a bounded, ordered activity log."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP service until Ctrl+C or SIGTERM
    ///
    /// Example: crawl-controller serve --port 8000 --workers 8
    Serve {
        /// Address to bind
        #[arg(long, env = "CRAWLER_HOST", default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on
        #[arg(long, env = "CRAWLER_PORT", default_value_t = 8000)]
        port: u16,

        #[command(flatten)]
        crawl: CrawlArgs,
    },

    /// Crawl one site in the foreground and print the log
    ///
    /// Exits 0 when the crawl completes, 1 when it fails, 2 on error.
    ///
    /// Example: crawl-controller crawl https://example.com --max-depth 2
    Crawl {
        /// Seed URL (http or https)
        url: String,

        /// Print a JSON report (job summary + log lines) instead of plain lines
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        crawl: CrawlArgs,
    },
}

// Settings shared by both subcommands. Turned into a CrawlConfig with
// `CrawlConfig::from(&args)`.
#[derive(Args, Debug, Clone)]
pub struct CrawlArgs {
    /// Number of fetch workers
    #[arg(long, env = "CRAWLER_WORKERS", default_value_t = 4)]
    pub workers: usize,

    /// Minimum gap between two requests to the same host, in milliseconds
    #[arg(long, env = "CRAWLER_POLITENESS_MS", default_value_t = 1000)]
    pub politeness_ms: u64,

    /// Per-request timeout, in seconds
    #[arg(long, env = "CRAWLER_TIMEOUT_SECS", default_value_t = 10)]
    pub timeout_secs: u64,

    /// Maximum link depth; the seed is depth 0. Requests asking for more are clamped.
    #[arg(long, env = "CRAWLER_MAX_DEPTH", default_value_t = 10)]
    pub max_depth: usize,

    /// Maximum number of URLs one job may enqueue
    #[arg(long, env = "CRAWLER_MAX_PAGES", default_value_t = 500)]
    pub max_pages: usize,

    /// Maximum number of URLs waiting in one job's queue
    #[arg(long, env = "CRAWLER_QUEUE_CAPACITY", default_value_t = 10_000)]
    pub queue_capacity: usize,

    /// Number of log lines kept for GET /logs
    #[arg(long, env = "CRAWLER_LOG_CAPACITY", default_value_t = 1000)]
    pub log_capacity: usize,

    /// Also drop log lines older than this many seconds
    #[arg(long, env = "CRAWLER_LOG_RETENTION_SECS")]
    pub log_retention_secs: Option<u64>,

    /// Extra attempts for timeouts, network errors and 5xx answers
    #[arg(long, env = "CRAWLER_MAX_RETRIES", default_value_t = 0)]
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds (doubles each retry)
    #[arg(long, env = "CRAWLER_RETRY_BACKOFF_MS", default_value_t = 500)]
    pub retry_backoff_ms: u64,

    /// Largest body scanned for links, in bytes
    #[arg(long, env = "CRAWLER_MAX_BODY_BYTES", default_value_t = 5 * 1024 * 1024)]
    pub max_body_bytes: usize,

    /// User-Agent header sent with every request
    #[arg(long, env = "CRAWLER_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Respect robots.txt (Disallow rules and Crawl-delay)
    ///
    /// Takes a value: --obey-robots false
    #[arg(long, env = "CRAWLER_OBEY_ROBOTS", default_value_t = true, action = ArgAction::Set)]
    pub obey_robots: bool,

    /// Check every new external domain a page links to (DNS + HTTP)
    #[arg(long, env = "CRAWLER_CHECK_DOMAINS", default_value_t = true, action = ArgAction::Set)]
    pub check_domains: bool,

    /// Number of jobs remembered for GET /jobs
    #[arg(long, env = "CRAWLER_MAX_JOBS", default_value_t = 100)]
    pub max_jobs: usize,
}

impl From<&CrawlArgs> for CrawlConfig {
    fn from(args: &CrawlArgs) -> Self {
        CrawlConfig {
            workers: args.workers,
            politeness_interval: Duration::from_millis(args.politeness_ms),
            fetch_timeout: Duration::from_secs(args.timeout_secs),
            max_depth: args.max_depth,
            max_pages: args.max_pages,
            queue_capacity: args.queue_capacity,
            log_capacity: args.log_capacity,
            log_retention: args.log_retention_secs.map(Duration::from_secs),
            max_retries: args.max_retries,
            retry_backoff: Duration::from_millis(args.retry_backoff_ms),
            max_body_bytes: args.max_body_bytes,
            user_agent: args.user_agent.clone(),
            obey_robots: args.obey_robots,
            check_domains: args.check_domains,
            max_jobs: args.max_jobs,
            ..CrawlConfig::default()
        }
    }
}


// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why #[command(flatten)]?
//    - Both subcommands take the same crawl settings. Flattening one Args
//      struct into each keeps the flags (and their env names) in one place.
//
// 2. Why From<&CrawlArgs> instead of building CrawlConfig in main?
//    - The conversion (ms/secs to Duration, Option handling) gets tested here
//      without touching the process environment.
// -----------------------------------------------------------------------------
