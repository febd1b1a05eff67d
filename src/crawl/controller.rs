// src/crawl/controller.rs
// =============================================================================
// The crawl controller: what POST /crawl and GET /logs actually call.
//
// start_crawl():
// 1. Validate the URL (parseable, allowed scheme, has a host)
// 2. Create a job and put the seed in its queue
// 3. Make sure the worker pool is running and hand it the job
// 4. Return right away; the crawl continues in the background
//
// An invalid URL is rejected before ANY state changes: no job, no queue
// entry, no log line.
//
// The controller also keeps the job table, so jobs can be looked up,
// listed, cancelled and waited on. The table remembers at most max_jobs
// jobs: past that, the oldest finished ones are forgotten. Running jobs are
// never dropped.
// =============================================================================

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use super::job::{CrawlJob, Job};
use super::worker::WorkerPool;
use crate::config::CrawlConfig;
use crate::error::{CrawlError, Result};
use crate::logs::{LogBuffer, LogEntry};

pub struct CrawlController {
    config: Arc<CrawlConfig>,
    logs: Arc<LogBuffer>,
    pool: Arc<WorkerPool>,
    jobs: RwLock<HashMap<Uuid, Arc<Job>>>,
}

impl CrawlController {
    pub fn new(config: Arc<CrawlConfig>, logs: Arc<LogBuffer>, pool: Arc<WorkerPool>) -> Self {
        Self {
            config,
            logs,
            pool,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    // Starts a crawl of `raw_url` and returns the new job.
    //
    // Parameters:
    //   raw_url: whatever the client sent
    //   max_depth: requested link depth; None means the configured maximum,
    //              larger values are clamped to it
    pub fn start_crawl(&self, raw_url: &str, max_depth: Option<usize>) -> Result<CrawlJob> {
        let seed = self.validate_url(raw_url)?;
        let max_depth = max_depth
            .unwrap_or(self.config.max_depth)
            .min(self.config.max_depth);

        let job = Arc::new(Job::new(seed, max_depth, &self.config));
        job.queue.enqueue(&job.seed, 0)?;

        {
            let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
            jobs.insert(job.id, Arc::clone(&job));
            self.forget_finished(&mut jobs);
        }

        self.logs.info(format!(
            "Crawl started for {} (job {}, max depth {})",
            job.seed, job.id, job.max_depth
        ));

        self.pool.ensure_started();
        self.pool.submit(Arc::clone(&job));

        Ok(job.snapshot())
    }

    // Every retained log line, oldest first. Logs are global, not per job.
    pub fn logs(&self) -> Vec<LogEntry> {
        self.logs.snapshot()
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.logs.lines()
    }

    pub fn job(&self, id: Uuid) -> Option<CrawlJob> {
        self.find(id).map(|job| job.snapshot())
    }

    // All jobs, oldest first
    pub fn jobs(&self) -> Vec<CrawlJob> {
        let mut jobs: Vec<CrawlJob> = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|job| job.snapshot())
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    // Cancels a job: nothing new is queued, pending URLs are dropped, and
    // fetches already in flight finish on their own (bounded by the timeout).
    // Cancelling a finished job is a no-op that returns its snapshot.
    pub fn cancel(&self, id: Uuid) -> Result<CrawlJob> {
        let job = self.find(id).ok_or(CrawlError::JobNotFound(id))?;

        if !job.status().is_terminal() && !job.is_cancelled() {
            let dropped = job.cancel();
            self.logs.warn(format!(
                "Cancelling crawl for {} (job {}): {} queued URL(s) dropped",
                job.seed, job.id, dropped
            ));
            // If nothing was in flight, nobody else will notice the job is done
            self.pool.finish_if_drained(&job);
            self.pool.wake();
        }

        Ok(job.snapshot())
    }

    // Waits until the job reaches a terminal state
    pub async fn wait_for(&self, id: Uuid) -> Result<CrawlJob> {
        let job = self.find(id).ok_or(CrawlError::JobNotFound(id))?;
        job.finished().await;
        Ok(job.snapshot())
    }

    pub fn active_jobs(&self) -> usize {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|job| !job.status().is_terminal())
            .count()
    }

    // Stops the worker pool. Jobs still running stay in their current state.
    pub async fn shutdown(&self) {
        if self.pool.is_running() {
            self.pool.shutdown().await;
        }
    }

    fn find(&self, id: Uuid) -> Option<Arc<Job>> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    // Drops the oldest finished jobs until the table fits in max_jobs,
    // or until only running jobs are left
    fn forget_finished(&self, jobs: &mut HashMap<Uuid, Arc<Job>>) {
        while jobs.len() > self.config.max_jobs {
            let oldest = jobs
                .values()
                .filter(|job| job.status().is_terminal())
                .min_by_key(|job| job.created_at)
                .map(|job| job.id);
            let Some(id) = oldest else {
                break;
            };
            jobs.remove(&id);
            debug!(job_id = %id, "Forgot finished job");
        }
    }

    fn validate_url(&self, raw_url: &str) -> Result<Url> {
        let raw_url = raw_url.trim();
        let url =
            Url::parse(raw_url).map_err(|e| CrawlError::invalid_url(raw_url, e.to_string()))?;

        if !self.config.allows_scheme(url.scheme()) {
            return Err(CrawlError::invalid_url(
                raw_url,
                format!("scheme '{}' is not allowed", url.scheme()),
            ));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(CrawlError::invalid_url(raw_url, "URL has no host"));
        }
        Ok(url)
    }
}
