// src/crawl/queue.rs
// =============================================================================
// The per-job crawl queue and its seen-set.
//
// How it works:
// 1. enqueue() normalizes the URL and checks the seen-set
// 2. New URLs go into the seen-set AND the pending FIFO in one step
// 3. dequeue() hands out the oldest pending entry and counts it as in flight
// 4. mark_done() is called when the fetch for that entry is over
// 5. When nothing is pending and nothing is in flight, the job is finished
//
// All of this state sits behind one small mutex per job, so workers crawling
// different jobs never contend here, and the lock is never held across an
// await.
//
// Rust concepts:
// - HashSet: To track seen URLs (O(1) lookup)
// - VecDeque: FIFO queue for breadth-first crawling
// =============================================================================

use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use url::Url;

use super::normalize::normalize_url;
use crate::error::{CrawlError, Result};

// A URL waiting to be fetched
#[derive(Debug, Clone)]
pub struct QueueEntry {
    /// Already normalized
    pub url: Url,
    /// How many link hops from the seed (seed = 0)
    pub depth: usize,
    pub discovered_at: DateTime<Utc>,
}

// What happened to an enqueue() call that didn't fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted,
    AlreadySeen,
    /// The job was cancelled; nothing new is accepted
    Closed,
}

// What dequeue() found
#[derive(Debug)]
pub enum Dequeued {
    /// An entry, now counted as in flight
    Ready(QueueEntry),
    /// Nothing pending, but fetches are still running and may add more
    Waiting,
    /// Nothing pending and nothing in flight: the job is done
    Drained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub in_flight: usize,
    pub seen: usize,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<QueueEntry>,
    seen: HashSet<String>,
    /// URLs ever accepted; survives release()
    accepted: usize,
    in_flight: usize,
    closed: bool,
}

#[derive(Debug)]
pub struct CrawlQueue {
    state: Mutex<QueueState>,
    /// Max entries waiting at once
    capacity: usize,
    /// Max URLs accepted over the job's lifetime
    max_pages: usize,
}

impl CrawlQueue {
    pub fn new(capacity: usize, max_pages: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            capacity,
            max_pages,
        }
    }

    // Adds `url` at `depth` unless it has been seen before.
    //
    // Errors:
    //   QueueFull          - `capacity` entries are already waiting
    //   ResourceExhausted  - the job already accepted `max_pages` URLs
    //
    // A rejected URL is NOT marked as seen, so it could be accepted later
    // (for example once the queue has room again).
    pub fn enqueue(&self, url: &Url, depth: usize) -> Result<EnqueueOutcome> {
        let url = normalize_url(url);
        let key = url.to_string();

        let mut state = self.lock();
        if state.closed {
            return Ok(EnqueueOutcome::Closed);
        }
        if state.seen.contains(&key) {
            return Ok(EnqueueOutcome::AlreadySeen);
        }
        if state.accepted >= self.max_pages {
            return Err(CrawlError::ResourceExhausted {
                limit: self.max_pages,
            });
        }
        if state.pending.len() >= self.capacity {
            return Err(CrawlError::QueueFull {
                capacity: self.capacity,
            });
        }

        state.seen.insert(key);
        state.accepted += 1;
        state.pending.push_back(QueueEntry {
            url,
            depth,
            discovered_at: Utc::now(),
        });
        Ok(EnqueueOutcome::Accepted)
    }

    // Takes the oldest pending entry and marks it in flight.
    //
    // Popping and counting happen under the same lock; if they didn't, a
    // second worker could see "nothing pending, nothing in flight" in
    // between and declare the job finished too early.
    pub fn dequeue(&self) -> Dequeued {
        let mut state = self.lock();
        match state.pending.pop_front() {
            Some(entry) => {
                state.in_flight += 1;
                Dequeued::Ready(entry)
            }
            None if state.in_flight > 0 => Dequeued::Waiting,
            None => Dequeued::Drained,
        }
    }

    // Marks one in-flight entry as finished.
    // Returns true if the queue is now quiescent (nothing left to do).
    pub fn mark_done(&self) -> bool {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.pending.is_empty() && state.in_flight == 0
    }

    // Stops accepting URLs and throws away everything still pending.
    // In-flight entries are unaffected. Returns how many entries were dropped.
    pub fn close(&self) -> usize {
        let mut state = self.lock();
        state.closed = true;
        let dropped = state.pending.len();
        state.pending.clear();
        dropped
    }

    // Frees the seen-set and anything pending once the job is over.
    // Only the counters stay, for the job's snapshot.
    pub fn release(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.pending = VecDeque::new();
        state.seen = HashSet::new();
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn is_quiescent(&self) -> bool {
        let state = self.lock();
        state.pending.is_empty() && state.in_flight == 0
    }

    #[cfg(test)]
    pub fn contains(&self, url: &Url) -> bool {
        let key = normalize_url(url).to_string();
        self.lock().seen.contains(&key)
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            pending: state.pending.len(),
            in_flight: state.in_flight,
            seen: state.accepted,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why is the seen-set never shrunk while the job runs?
//    - A URL stays "seen" for the whole job, even after it was fetched
//    - That is what stops A -> B -> A link cycles from looping forever
//    - It is bounded by max_pages, and release() frees it once the job
//      reaches a terminal state
//
// 2. Why does close() clear `pending` instead of letting it drain?
//    - Cancelling a job means "stop crawling", not "finish what's queued"
//    - Fetches already running are left alone; they end at their timeout
//      at the latest
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    fn ready(queue: &CrawlQueue) -> QueueEntry {
        match queue.dequeue() {
            Dequeued::Ready(entry) => entry,
            other => panic!("expected an entry, got {:?}", other),
        }
    }

    #[test]
    fn test_second_enqueue_is_noop() {
        let queue = CrawlQueue::new(100, 100);
        let page = url("https://example.com/docs");

        assert_eq!(queue.enqueue(&page, 0), Ok(EnqueueOutcome::Accepted));
        assert_eq!(queue.enqueue(&page, 1), Ok(EnqueueOutcome::AlreadySeen));
        assert_eq!(queue.stats().pending, 1);
    }

    #[test]
    fn test_dedup_uses_normalized_form() {
        let queue = CrawlQueue::new(100, 100);
        queue.enqueue(&url("https://example.com/docs"), 0).unwrap();

        for variant in [
            "HTTPS://EXAMPLE.com/docs",
            "https://example.com/docs/",
            "https://example.com/docs#top",
            "https://example.com:443/docs",
        ] {
            assert_eq!(
                queue.enqueue(&url(variant), 1),
                Ok(EnqueueOutcome::AlreadySeen),
                "{} should be a duplicate",
                variant
            );
        }
    }

    #[test]
    fn test_seen_survives_dequeue() {
        let queue = CrawlQueue::new(100, 100);
        let page = url("https://example.com/");
        queue.enqueue(&page, 0).unwrap();
        ready(&queue);
        queue.mark_done();

        assert_eq!(queue.enqueue(&page, 2), Ok(EnqueueOutcome::AlreadySeen));
        assert!(queue.contains(&page));
    }

    #[test]
    fn test_fifo_order() {
        let queue = CrawlQueue::new(100, 100);
        for path in ["a", "b", "c"] {
            queue
                .enqueue(&url(&format!("https://example.com/{}", path)), 1)
                .unwrap();
        }

        let order: Vec<String> = (0..3).map(|_| ready(&queue).url.path().to_string()).collect();
        assert_eq!(order, vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn test_quiescence_tracks_in_flight() {
        let queue = CrawlQueue::new(100, 100);
        queue.enqueue(&url("https://example.com/"), 0).unwrap();
        assert!(!queue.is_quiescent());

        ready(&queue);
        assert!(matches!(queue.dequeue(), Dequeued::Waiting));
        assert!(!queue.is_quiescent());

        assert!(queue.mark_done());
        assert!(matches!(queue.dequeue(), Dequeued::Drained));
    }

    #[test]
    fn test_mark_done_not_quiescent_while_pending() {
        let queue = CrawlQueue::new(100, 100);
        queue.enqueue(&url("https://example.com/a"), 0).unwrap();
        ready(&queue);
        queue.enqueue(&url("https://example.com/b"), 1).unwrap();

        assert!(!queue.mark_done());
    }

    #[test]
    fn test_queue_full_is_not_marked_seen() {
        let queue = CrawlQueue::new(1, 100);
        queue.enqueue(&url("https://example.com/a"), 0).unwrap();

        let b = url("https://example.com/b");
        assert_eq!(
            queue.enqueue(&b, 1),
            Err(CrawlError::QueueFull { capacity: 1 })
        );
        assert!(!queue.contains(&b));

        // Once there is room again, the same URL goes in
        ready(&queue);
        assert_eq!(queue.enqueue(&b, 1), Ok(EnqueueOutcome::Accepted));
    }

    #[test]
    fn test_page_budget() {
        let queue = CrawlQueue::new(100, 2);
        queue.enqueue(&url("https://example.com/a"), 0).unwrap();
        queue.enqueue(&url("https://example.com/b"), 1).unwrap();

        assert_eq!(
            queue.enqueue(&url("https://example.com/c"), 1),
            Err(CrawlError::ResourceExhausted { limit: 2 })
        );
        // Duplicates are still reported as duplicates, not as over budget
        assert_eq!(
            queue.enqueue(&url("https://example.com/a"), 1),
            Ok(EnqueueOutcome::AlreadySeen)
        );
    }

    #[test]
    fn test_close_drops_pending_and_refuses_new() {
        let queue = CrawlQueue::new(100, 100);
        queue.enqueue(&url("https://example.com/a"), 0).unwrap();
        queue.enqueue(&url("https://example.com/b"), 1).unwrap();
        ready(&queue);

        assert_eq!(queue.close(), 1);
        assert!(queue.is_closed());
        assert_eq!(
            queue.enqueue(&url("https://example.com/c"), 1),
            Ok(EnqueueOutcome::Closed)
        );

        // The in-flight fetch still has to report back
        assert!(matches!(queue.dequeue(), Dequeued::Waiting));
        assert!(queue.mark_done());
        assert!(matches!(queue.dequeue(), Dequeued::Drained));
    }

    #[test]
    fn test_release_frees_urls_but_keeps_counts() {
        let queue = CrawlQueue::new(100, 100);
        let a = url("https://example.com/a");
        queue.enqueue(&a, 0).unwrap();
        queue.enqueue(&url("https://example.com/b"), 1).unwrap();
        ready(&queue);
        queue.mark_done();

        queue.release();

        let stats = queue.stats();
        assert_eq!(stats.seen, 2);
        assert_eq!(stats.pending, 0);
        assert!(!queue.contains(&a));
        assert_eq!(queue.enqueue(&a, 0), Ok(EnqueueOutcome::Closed));
    }
}
