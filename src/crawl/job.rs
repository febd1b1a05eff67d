// src/crawl/job.rs
// =============================================================================
// A crawl job: one POST /crawl, its queue, its counters, and its state.
//
// State machine:
//
//   Pending ──> Running ──> Completed
//      │           ├──────> Failed
//      │           └──────> Cancelled
//      ├──────────────────> Failed
//      └──────────────────> Cancelled
//
// Terminal states are final: a new POST /crawl always creates a new job.
//
// The status lives in a tokio watch channel, so transitions are atomic
// (send_if_modified runs the check and the update under one lock) and
// anyone can wait for a job to finish without polling.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use super::queue::CrawlQueue;
use crate::config::CrawlConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    // Exit code for the `crawl` command: 0 completed, 1 anything else
    pub fn exit_code(self) -> i32 {
        match self {
            JobStatus::Completed => 0,
            _ => 1,
        }
    }

    // Whether the state machine allows moving from `self` to `next`
    pub fn can_become(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

// Read-only view of a job, as returned by the controller and the API
#[derive(Debug, Clone, Serialize)]
pub struct CrawlJob {
    pub id: Uuid,
    pub seed_url: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub max_depth: usize,
    pub pages_fetched: usize,
    pub pages_failed: usize,
    /// Disallowed by robots.txt, or dropped after a cancel
    pub pages_skipped: usize,
    pub domains_checked: usize,
    pub pending: usize,
    pub in_flight: usize,
    pub seen: usize,
}

#[derive(Debug)]
pub struct Job {
    pub id: Uuid,
    pub seed: Url,
    pub created_at: DateTime<Utc>,
    pub max_depth: usize,
    pub queue: CrawlQueue,
    status: watch::Sender<JobStatus>,
    finished_at: Mutex<Option<DateTime<Utc>>>,
    cancel: CancellationToken,
    fetched: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    /// External domains already checked for this job
    domains: Mutex<HashSet<String>>,
    domains_checked: AtomicUsize,
}

impl Job {
    pub fn new(seed: Url, max_depth: usize, config: &CrawlConfig) -> Self {
        let (status, _) = watch::channel(JobStatus::Pending);
        Self {
            id: Uuid::new_v4(),
            seed,
            created_at: Utc::now(),
            max_depth,
            queue: CrawlQueue::new(config.queue_capacity, config.max_pages),
            status,
            finished_at: Mutex::new(None),
            cancel: CancellationToken::new(),
            fetched: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            domains: Mutex::new(HashSet::new()),
            domains_checked: AtomicUsize::new(0),
        }
    }

    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    // Moves the job to `next` if the state machine allows it.
    // Returns false (and changes nothing) otherwise.
    pub fn transition(&self, next: JobStatus) -> bool {
        let changed = self.status.send_if_modified(|current| {
            if current.can_become(next) {
                *current = next;
                true
            } else {
                false
            }
        });

        if changed && next.is_terminal() {
            *self
                .finished_at
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        }
        changed
    }

    pub fn record_fetched(&self) {
        self.fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    // Returns true the first time `domain` is seen by this job, so each
    // external domain is checked once per job.
    pub fn claim_domain(&self, domain: &str) -> bool {
        let claimed = self
            .domains
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(domain.to_ascii_lowercase());
        if claimed {
            self.domains_checked.fetch_add(1, Ordering::Relaxed);
        }
        claimed
    }

    pub fn pages_fetched(&self) -> usize {
        self.fetched.load(Ordering::Relaxed)
    }

    pub fn pages_failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn pages_skipped(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn domains_checked(&self) -> usize {
        self.domains_checked.load(Ordering::Relaxed)
    }

    // Stops the job from taking on new work. Returns how many pending URLs
    // were dropped; fetches already running are left to finish.
    pub fn cancel(&self) -> usize {
        self.cancel.cancel();
        self.queue.close()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    // Drops the per-job URL and domain sets once the job is over.
    // Counters and the snapshot stay valid.
    pub fn release(&self) {
        self.queue.release();
        *self.domains.lock().unwrap_or_else(PoisonError::into_inner) = HashSet::new();
    }

    // The terminal state this job should end in once its queue is drained
    pub fn outcome(&self) -> JobStatus {
        if self.is_cancelled() {
            JobStatus::Cancelled
        } else if self.pages_fetched() == 0 {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        }
    }

    // Resolves once the job reaches a terminal state
    pub async fn finished(&self) -> JobStatus {
        let mut updates = self.status.subscribe();
        let status = match updates.wait_for(|status| status.is_terminal()).await {
            Ok(status) => *status,
            Err(_) => self.status(),
        };
        status
    }

    pub fn snapshot(&self) -> CrawlJob {
        let stats = self.queue.stats();
        CrawlJob {
            id: self.id,
            seed_url: self.seed.to_string(),
            status: self.status(),
            created_at: self.created_at,
            finished_at: *self
                .finished_at
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            max_depth: self.max_depth,
            pages_fetched: self.pages_fetched(),
            pages_failed: self.pages_failed(),
            pages_skipped: self.pages_skipped(),
            domains_checked: self.domains_checked(),
            pending: stats.pending,
            in_flight: stats.in_flight,
            seen: stats.seen,
        }
    }
}
