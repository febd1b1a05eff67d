// src/crawl/worker.rs
// =============================================================================
// The fetch worker pool.
//
// A fixed number of workers, started once and shared by every job. Each
// worker runs the same loop:
//
//   claim entry ─> robots.txt ─> gate.acquire(host) ─> fetch ─> log ─> links
//        ^                                                                │
//        └──────────────────────── mark_done ─────────────────────────────┘
//
// Claiming walks the "board" of active jobs round-robin, so one huge job
// can't starve a small one, while each job's own queue stays FIFO.
// When nothing is claimable, workers sleep on a Notify until new work shows
// up (a new job, new links, or a fetch finishing).
//
// After a successful fetch, links to other domains are not followed but
// checked (see domains.rs), each domain once per job.
//
// Failure isolation: every fetch runs in its own spawned task. If that task
// panics, the JoinError is caught here, logged as an internal error, and
// the worker carries on with the next entry.
// =============================================================================

use chrono::Utc;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use super::domains::{check_domain, domain_key};
use super::fetch::Fetcher;
use super::gate::PolitenessGate;
use super::job::{Job, JobStatus};
use super::links::extract_links;
use super::queue::{Dequeued, EnqueueOutcome, QueueEntry};
use super::robots::RobotsCache;
use crate::config::CrawlConfig;
use crate::error::CrawlError;
use crate::logs::LogBuffer;

// How many domain checks one page may run at the same time
const DOMAIN_CHECKS_PER_PAGE: usize = 8;

pub struct WorkerPool {
    config: Arc<CrawlConfig>,
    gate: Arc<PolitenessGate>,
    fetcher: Fetcher,
    robots: RobotsCache,
    logs: Arc<LogBuffer>,
    board: Mutex<VecDeque<Arc<Job>>>,
    wakeup: Notify,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        config: Arc<CrawlConfig>,
        gate: Arc<PolitenessGate>,
        fetcher: Fetcher,
        logs: Arc<LogBuffer>,
    ) -> Self {
        let robots = RobotsCache::new(fetcher.clone(), Arc::clone(&gate), &config.user_agent);
        Self {
            config,
            gate,
            fetcher,
            robots,
            logs,
            board: Mutex::new(VecDeque::new()),
            wakeup: Notify::new(),
            shutdown: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    // Starts the workers if they aren't running yet. Safe to call on every
    // submission; only the first call spawns anything.
    pub fn ensure_started(self: &Arc<Self>) {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        if !handles.is_empty() || self.shutdown.is_cancelled() {
            return;
        }

        info!(
            workers = self.config.workers,
            politeness_ms = self.gate.interval().as_millis() as u64,
            "Starting fetch workers"
        );
        for worker_id in 0..self.config.workers {
            let pool = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                pool.run_worker(worker_id).await;
            }));
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handles.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
            && !self.shutdown.is_cancelled()
    }

    // Puts a job on the board and wakes idle workers
    pub fn submit(&self, job: Arc<Job>) {
        self.board().push_back(job);
        self.wakeup.notify_waiters();
    }

    // Lets sleeping workers re-check the board (after a cancel, for example)
    pub fn wake(&self) {
        self.wakeup.notify_waiters();
    }

    // Stops all workers after their current task and waits for them
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.wakeup.notify_waiters();

        let handles: Vec<_> = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for result in join_all(handles).await {
            if let Err(e) = result {
                tracing::error!("Worker ended abnormally: {}", e);
            }
        }
        info!(hosts = self.gate.hosts_tracked(), "Fetch workers stopped");
    }

    // Completes `job` if its queue is drained. Idempotent: only the first
    // caller actually moves the job to a terminal state and logs it.
    //
    // The job's URL and domain sets are released before the state changes,
    // so whoever wakes up on the terminal state sees them gone.
    pub fn finish_if_drained(&self, job: &Job) {
        if !job.queue.is_quiescent() {
            return;
        }
        job.release();

        // A job cancelled before any worker claimed it goes straight from
        // Pending to Cancelled, which the state machine allows
        let outcome = job.outcome();
        if job.transition(outcome) {
            let summary = format!(
                "Crawl {} for {} (job {}): {} page(s) fetched, {} failed",
                outcome,
                job.seed,
                job.id,
                job.pages_fetched(),
                job.pages_failed()
            );
            match outcome {
                JobStatus::Failed => self.logs.error(summary),
                JobStatus::Cancelled => self.logs.warn(summary),
                _ => self.logs.info(summary),
            };
        }
    }

    async fn run_worker(self: Arc<Self>, worker_id: usize) {
        debug!(worker_id, "Worker started");

        while let Some((job, entry)) = self.next_task().await {
            let url = entry.url.clone();
            let task = {
                let pool = Arc::clone(&self);
                let job = Arc::clone(&job);
                tokio::spawn(async move { pool.process(&job, entry).await })
            };

            // A panic inside one fetch must not take the worker down with it
            if let Err(e) = task.await {
                job.record_failed();
                let err = CrawlError::Internal(e.to_string());
                self.logs.error(format!("Failed {}: {}", url, err));
            }

            job.queue.mark_done();
            self.finish_if_drained(&job);
            self.wakeup.notify_waiters();
        }

        debug!(worker_id, "Worker stopped");
    }

    // Waits for the next claimable entry; None once the pool shuts down
    async fn next_task(&self) -> Option<(Arc<Job>, QueueEntry)> {
        loop {
            if self.shutdown.is_cancelled() {
                return None;
            }

            // Register for wake-ups BEFORE looking at the board, so a
            // notify_waiters() between the check and the wait isn't lost
            let notified = self.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(task) = self.claim() {
                return Some(task);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = self.shutdown.cancelled() => return None,
            }
        }
    }

    // One round-robin pass over the board.
    // Drained jobs are taken off the board and finished.
    fn claim(&self) -> Option<(Arc<Job>, QueueEntry)> {
        let mut drained = Vec::new();
        let mut claimed = None;
        {
            let mut board = self.board();
            for _ in 0..board.len() {
                let Some(job) = board.pop_front() else {
                    break;
                };
                match job.queue.dequeue() {
                    Dequeued::Ready(entry) => {
                        board.push_back(Arc::clone(&job));
                        claimed = Some((job, entry));
                        break;
                    }
                    Dequeued::Waiting => board.push_back(job),
                    Dequeued::Drained => drained.push(job),
                }
            }
        }

        for job in drained {
            self.finish_if_drained(&job);
        }
        if let Some((job, _)) = &claimed {
            job.transition(JobStatus::Running);
        }
        claimed
    }

    // Fetches one entry, retrying if configured, and logs every attempt
    async fn process(&self, job: &Job, entry: QueueEntry) {
        #[cfg(test)]
        if entry.url.path() == crate::testing::PANIC_PATH {
            panic!("fetch task panicked on {}", entry.url);
        }

        let crawl_delay = if self.config.obey_robots {
            let rules = self.robots.rules_for(&entry.url).await;
            if !rules.allows(&entry.url) {
                job.record_skipped();
                self.logs.warn(format!("Skipped {}: disallowed by robots.txt", entry.url));
                return;
            }
            rules.crawl_delay()
        } else {
            None
        };

        let attempts = self.config.max_retries + 1;

        for attempt in 1..=attempts {
            if let Some(host) = entry.url.host_str() {
                self.gate.acquire_with_delay(host, crawl_delay).await;
            }
            // The gate may have held us for a while
            if job.is_cancelled() {
                job.record_skipped();
                self.logs.warn(format!("Skipped {}: crawl cancelled", entry.url));
                return;
            }
            debug!(
                url = %entry.url,
                attempt,
                queued_ms = (Utc::now() - entry.discovered_at).num_milliseconds(),
                "Dispatching fetch"
            );

            let started = Instant::now();
            match self.fetcher.fetch(&entry.url).await {
                Ok(page) => {
                    job.record_fetched();
                    debug!(
                        url = %page.final_url,
                        content_type = page.content_type.as_deref().unwrap_or("-"),
                        "Fetch succeeded"
                    );
                    self.logs.info(format!(
                        "Fetched {} status={} bytes={} in {}ms (depth {})",
                        entry.url,
                        page.status,
                        page.bytes,
                        page.elapsed.as_millis(),
                        entry.depth
                    ));

                    let Some(html) = page.html.as_deref() else {
                        return;
                    };
                    let links = extract_links(html, &page.final_url);
                    self.follow_links(job, &entry, &links.same_site);
                    if self.config.check_domains {
                        self.check_domains(job, &entry.url, &links.external).await;
                    }
                    return;
                }
                Err(err) => {
                    let attempt_note = if attempts > 1 {
                        format!(" (attempt {}/{})", attempt, attempts)
                    } else {
                        String::new()
                    };
                    self.logs.error(format!(
                        "Failed {}: {} after {}ms{}",
                        entry.url,
                        err,
                        started.elapsed().as_millis(),
                        attempt_note
                    ));

                    if attempt == attempts || !err.is_retryable() || job.is_cancelled() {
                        job.record_failed();
                        return;
                    }
                    tokio::time::sleep(self.config.backoff_for(attempt)).await;
                }
            }
        }
    }

    // Queues the same-site links of a fetched page, one level deeper
    fn follow_links(&self, job: &Job, entry: &QueueEntry, links: &[Url]) {
        if entry.depth >= job.max_depth || job.is_cancelled() {
            return;
        }

        let mut accepted = 0usize;
        let mut dropped: Option<(usize, CrawlError)> = None;
        for link in links {
            match job.queue.enqueue(link, entry.depth + 1) {
                Ok(EnqueueOutcome::Accepted) => accepted += 1,
                Ok(_) => {}
                Err(err) => {
                    let count = dropped.as_ref().map_or(0, |(n, _)| *n);
                    dropped = Some((count + 1, err));
                }
            }
        }

        if let Some((count, err)) = dropped {
            self.logs.warn(format!(
                "Dropped {} link(s) from {}: {}",
                count, entry.url, err
            ));
        }
        if accepted > 0 {
            debug!(url = %entry.url, accepted, "Queued new links");
            self.wakeup.notify_waiters();
        }
    }

    // Checks the external domains of a page that this job hasn't checked
    // yet, logging one line per domain. Depth doesn't matter here: a page
    // at the depth limit still has its outgoing domains checked.
    async fn check_domains(&self, job: &Job, page_url: &Url, external: &[Url]) {
        if job.is_cancelled() {
            return;
        }

        let fresh: Vec<&Url> = external
            .iter()
            .filter(|link| domain_key(link).is_some_and(|domain| job.claim_domain(&domain)))
            .collect();
        if fresh.is_empty() {
            return;
        }
        debug!(url = %page_url, domains = fresh.len(), "Checking external domains");

        let timeout = self.config.fetch_timeout;
        let pending: Vec<_> = fresh
            .into_iter()
            .map(|link| check_domain(&self.fetcher, &self.gate, link, timeout))
            .collect();
        let mut checks = stream::iter(pending).buffered(DOMAIN_CHECKS_PER_PAGE);

        while let Some(check) = checks.next().await {
            let line = format!("{} (linked from {})", check, page_url);
            if check.is_healthy() {
                self.logs.info(line);
            } else {
                self.logs.warn(line);
            }
        }
    }

    fn board(&self) -> MutexGuard<'_, VecDeque<Arc<Job>>> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why Notify + enable() instead of a channel?
//    - Work doesn't arrive as messages; it appears inside per-job queues
//    - Workers only need a "go look again" signal, and notify_waiters()
//      wakes all of them at once
//    - enable() registers the waiter up front, so the signal can't slip in
//      between "board is empty" and "go to sleep"
//
// 2. Why does the worker, not the task, call mark_done()?
//    - If the task panics it never reaches its last line
//    - The worker always gets control back through the JoinHandle, so the
//      in-flight count is always decremented exactly once
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, TestSite, PANIC_PATH};
    use std::time::Duration;

    fn pool(config: CrawlConfig) -> (Arc<WorkerPool>, Arc<LogBuffer>) {
        let config = Arc::new(config);
        let logs = Arc::new(LogBuffer::new(config.log_capacity));
        let gate = Arc::new(PolitenessGate::new(config.politeness_interval));
        let fetcher = Fetcher::new(&config).unwrap();
        let pool = Arc::new(WorkerPool::new(
            Arc::clone(&config),
            gate,
            fetcher,
            Arc::clone(&logs),
        ));
        (pool, logs)
    }

    async fn run_job(pool: &Arc<WorkerPool>, job: Arc<Job>) -> JobStatus {
        pool.ensure_started();
        pool.submit(Arc::clone(&job));
        tokio::time::timeout(Duration::from_secs(10), job.finished())
            .await
            .expect("job did not finish in time")
    }

    #[tokio::test]
    async fn test_every_attempt_logs_exactly_once() {
        let site = TestSite::spawn().await;
        let config = test_config();
        let (pool, logs) = pool(config.clone());

        let job = Arc::new(Job::new(site.url("/"), 1, &config));
        job.queue.enqueue(&job.seed, 0).unwrap();

        assert_eq!(run_job(&pool, Arc::clone(&job)).await, JobStatus::Completed);

        // "/", "/a", "/b" and "/missing": one line each, plus the summary
        let lines = logs.lines();
        let fetch_lines = lines
            .iter()
            .filter(|l| l.contains(" Fetched ") || l.contains(" Failed "))
            .count();
        assert_eq!(fetch_lines, 4);
        assert_eq!(site.total_hits(), 4);
        assert_eq!(job.pages_fetched(), 3);
        assert_eq!(job.pages_failed(), 1);
        assert!(lines.iter().any(|l| l.contains("HTTP 404")));
    }

    #[tokio::test]
    async fn test_retries_with_backoff_then_gives_up() {
        let site = TestSite::spawn().await;
        let config = CrawlConfig {
            max_retries: 2,
            ..test_config()
        };
        let (pool, logs) = pool(config.clone());

        let job = Arc::new(Job::new(site.url("/flaky"), 0, &config));
        job.queue.enqueue(&job.seed, 0).unwrap();

        assert_eq!(run_job(&pool, Arc::clone(&job)).await, JobStatus::Failed);
        assert_eq!(site.hits("/flaky"), 3);

        let attempts: Vec<_> = logs
            .lines()
            .into_iter()
            .filter(|l| l.contains("HTTP 503"))
            .collect();
        assert_eq!(attempts.len(), 3);
        assert!(attempts[2].contains("(attempt 3/3)"));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let site = TestSite::spawn().await;
        let config = CrawlConfig {
            max_retries: 3,
            ..test_config()
        };
        let (pool, _logs) = pool(config.clone());

        let job = Arc::new(Job::new(site.url("/missing"), 0, &config));
        job.queue.enqueue(&job.seed, 0).unwrap();

        assert_eq!(run_job(&pool, job).await, JobStatus::Failed);
        assert_eq!(site.hits("/missing"), 1);
    }

    #[tokio::test]
    async fn test_budget_drops_are_logged() {
        let site = TestSite::spawn().await;
        let config = CrawlConfig {
            max_pages: 2,
            ..test_config()
        };
        let (pool, logs) = pool(config.clone());

        let job = Arc::new(Job::new(site.url("/"), 3, &config));
        job.queue.enqueue(&job.seed, 0).unwrap();

        assert_eq!(run_job(&pool, Arc::clone(&job)).await, JobStatus::Completed);
        assert_eq!(site.total_hits(), 2);
        assert!(logs
            .lines()
            .iter()
            .any(|l| l.contains("Crawl budget exhausted (2 pages)")));
    }

    #[tokio::test]
    async fn test_two_jobs_share_the_pool() {
        let site = TestSite::spawn().await;
        let config = test_config();
        let (pool, _logs) = pool(config.clone());

        let first = Arc::new(Job::new(site.url("/b"), 0, &config));
        first.queue.enqueue(&first.seed, 0).unwrap();
        let second = Arc::new(Job::new(site.url("/deep/2"), 0, &config));
        second.queue.enqueue(&second.seed, 0).unwrap();

        pool.ensure_started();
        pool.submit(Arc::clone(&first));
        pool.submit(Arc::clone(&second));

        let (a, b) = tokio::time::timeout(
            Duration::from_secs(10),
            futures::future::join(first.finished(), second.finished()),
        )
        .await
        .unwrap();
        assert_eq!(a, JobStatus::Completed);
        assert_eq!(b, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_workers() {
        let (pool, _logs) = pool(test_config());
        pool.ensure_started();
        assert!(pool.is_running());

        tokio::time::timeout(Duration::from_secs(5), pool.shutdown())
            .await
            .unwrap();
        assert!(!pool.is_running());
    }

    #[tokio::test]
    async fn test_panicking_fetch_fails_only_its_job() {
        let site = TestSite::spawn().await;
        let config = test_config();
        let (pool, logs) = pool(config.clone());

        let broken = Arc::new(Job::new(site.url(PANIC_PATH), 0, &config));
        broken.queue.enqueue(&broken.seed, 0).unwrap();
        assert_eq!(run_job(&pool, Arc::clone(&broken)).await, JobStatus::Failed);
        assert_eq!(broken.pages_failed(), 1);

        let internal: Vec<_> = logs
            .lines()
            .into_iter()
            .filter(|l| l.contains("Internal error"))
            .collect();
        assert_eq!(internal.len(), 1);
        assert!(internal[0].contains(PANIC_PATH));

        // The worker that caught the panic keeps serving other jobs
        let next = Arc::new(Job::new(site.url("/b"), 0, &config));
        next.queue.enqueue(&next.seed, 0).unwrap();
        assert_eq!(run_job(&pool, Arc::clone(&next)).await, JobStatus::Completed);
        assert_eq!(site.hits("/b"), 1);
    }

    #[tokio::test]
    async fn test_robots_disallowed_urls_are_skipped() {
        let site = TestSite::spawn().await;
        let config = CrawlConfig {
            obey_robots: true,
            ..test_config()
        };
        let (pool, logs) = pool(config.clone());

        let job = Arc::new(Job::new(site.url("/guarded"), 1, &config));
        job.queue.enqueue(&job.seed, 0).unwrap();

        assert_eq!(run_job(&pool, Arc::clone(&job)).await, JobStatus::Completed);
        assert_eq!(site.hits("/private/page"), 0);
        assert_eq!(site.hits("/b"), 1);
        assert_eq!(site.hits("/robots.txt"), 1);
        assert_eq!(job.pages_skipped(), 1);

        let skipped: Vec<_> = logs
            .lines()
            .into_iter()
            .filter(|l| l.contains("disallowed by robots.txt"))
            .collect();
        assert_eq!(skipped.len(), 1);
        assert!(skipped[0].contains(site.url("/private/page").as_str()));
    }

    #[tokio::test]
    async fn test_external_domains_are_checked_once_per_job() {
        let site = TestSite::spawn().await;
        let config = CrawlConfig {
            check_domains: true,
            ..test_config()
        };
        let (pool, logs) = pool(config.clone());

        let job = Arc::new(Job::new(site.url("/outbound"), 1, &config));
        job.queue.enqueue(&job.seed, 0).unwrap();

        assert_eq!(run_job(&pool, Arc::clone(&job)).await, JobStatus::Completed);

        let port = site.base.port().unwrap();
        let checked: Vec<_> = logs
            .lines()
            .into_iter()
            .filter(|l| l.contains("Domain checked:"))
            .collect();
        assert_eq!(checked.len(), 1);
        assert!(checked[0].contains(&format!(
            "Domain checked: localhost:{} - HTTP: 200, DNS: ACTIVE",
            port
        )));
        assert_eq!(job.domains_checked(), 1);

        // The check asks for the domain's root; the external pages
        // themselves are never crawled
        assert_eq!(site.hits("/"), 1);
        assert_eq!(site.hits("/deep/2"), 0);
        assert_eq!(site.hits("/b"), 1);
    }

    #[tokio::test]
    async fn test_drained_job_releases_its_queue() {
        let site = TestSite::spawn().await;
        let config = test_config();
        let (pool, _logs) = pool(config.clone());

        let job = Arc::new(Job::new(site.url("/a"), 0, &config));
        job.queue.enqueue(&job.seed, 0).unwrap();

        assert_eq!(run_job(&pool, Arc::clone(&job)).await, JobStatus::Completed);
        assert!(!job.queue.contains(&job.seed));
        assert_eq!(job.snapshot().seen, 1);
    }
}
