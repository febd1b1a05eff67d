// src/logs/buffer.rs
// =============================================================================
// The crawl log: a bounded, append-only list of timestamped lines.
//
// Every worker appends here, and GET /logs reads a snapshot of it. Nothing
// else in the service looks at it, so it is the single source of truth for
// what the front-end shows.
//
// Guarantees:
// - Entries come back in exactly the order they were appended
// - At most `capacity` entries are kept; the oldest go first
// - Optionally, entries older than `retention` are dropped as well
// - The lock is only held long enough to push or clone, never across I/O
// =============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.write_str(label)
    }
}

// One line of the crawl log. Never modified after it is appended.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    /// Position in the global log, starting at 0. Survives eviction, so a
    /// reader can tell how many lines it missed.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.message
        )
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: VecDeque<LogEntry>,
    next_seq: u64,
}

#[derive(Debug)]
pub struct LogBuffer {
    inner: Mutex<Inner>,
    capacity: usize,
    retention: Option<Duration>,
}

impl LogBuffer {
    // Creates a buffer that keeps the last `capacity` entries.
    // A capacity of 0 is bumped to 1 so the latest line is always visible.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(1),
            retention: None,
        }
    }

    // Same as new(), but entries older than `retention` are also evicted
    pub fn with_retention(capacity: usize, retention: Option<Duration>) -> Self {
        Self {
            retention,
            ..Self::new(capacity)
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // Appends a line and returns its sequence number.
    //
    // The entry is also mirrored to `tracing` so the process log shows
    // the same activity the front-end sees.
    pub fn append(&self, level: LogLevel, message: impl Into<String>) -> u64 {
        let message = message.into();
        let seq = {
            let mut inner = self.lock();
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.entries.push_back(LogEntry {
                seq,
                timestamp: Utc::now(),
                level,
                message: message.clone(),
            });
            while inner.entries.len() > self.capacity {
                inner.entries.pop_front();
            }
            self.prune_expired(&mut inner);
            seq
        };

        match level {
            LogLevel::Info => tracing::info!(target: "crawl", seq, "{}", message),
            LogLevel::Warn => tracing::warn!(target: "crawl", seq, "{}", message),
            LogLevel::Error => tracing::error!(target: "crawl", seq, "{}", message),
        }

        seq
    }

    pub fn info(&self, message: impl Into<String>) -> u64 {
        self.append(LogLevel::Info, message)
    }

    pub fn warn(&self, message: impl Into<String>) -> u64 {
        self.append(LogLevel::Warn, message)
    }

    pub fn error(&self, message: impl Into<String>) -> u64 {
        self.append(LogLevel::Error, message)
    }

    // Point-in-time copy of the retained entries, oldest first
    pub fn snapshot(&self) -> Vec<LogEntry> {
        let mut inner = self.lock();
        self.prune_expired(&mut inner);
        inner.entries.iter().cloned().collect()
    }

    // The snapshot rendered the way GET /logs returns it
    pub fn lines(&self) -> Vec<String> {
        self.snapshot().iter().map(LogEntry::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune_expired(&self, inner: &mut Inner) {
        let Some(retention) = self.retention else {
            return;
        };
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return;
        };
        // A retention longer than chrono's date range keeps everything
        let Some(cutoff) = Utc::now().checked_sub_signed(retention) else {
            return;
        };
        while inner
            .entries
            .front()
            .is_some_and(|entry| entry.timestamp < cutoff)
        {
            inner.entries.pop_front();
        }
    }

    // Nothing panics while holding this lock, but if something ever did the
    // log is still a valid deque, so keep serving it.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_snapshot_keeps_append_order() {
        let logs = LogBuffer::new(10);
        logs.info("A");
        logs.warn("B");
        logs.error("C");

        let messages: Vec<_> = logs.snapshot().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_eviction_keeps_last_entries() {
        let logs = LogBuffer::new(3);
        for i in 0..7 {
            logs.info(format!("line {}", i));
        }

        let snapshot = logs.snapshot();
        let messages: Vec<_> = snapshot.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["line 4", "line 5", "line 6"]);
        assert_eq!(snapshot[0].seq, 4);
    }

    #[test]
    fn test_concurrent_appends_are_all_kept_in_sequence() {
        let logs = Arc::new(LogBuffer::new(10_000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let logs = Arc::clone(&logs);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        logs.info(format!("thread {} line {}", t, i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = logs.snapshot();
        assert_eq!(snapshot.len(), 2000);
        assert!(snapshot.windows(2).all(|w| w[0].seq + 1 == w[1].seq));

        // Each thread's own lines must still be in the order it wrote them
        for t in 0..8 {
            let prefix = format!("thread {} line ", t);
            let ours: Vec<usize> = snapshot
                .iter()
                .filter_map(|e| e.message.strip_prefix(&prefix))
                .map(|n| n.parse().unwrap())
                .collect();
            assert_eq!(ours, (0..250).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_huge_retention_keeps_everything() {
        let logs = LogBuffer::with_retention(10, Some(Duration::from_secs(10_000_000_000_000)));
        logs.info("Crawl started");
        logs.info("Fetched");

        assert_eq!(logs.len(), 2);
        assert_eq!(logs.lines().len(), 2);
    }

    #[test]
    fn test_retention_drops_old_entries() {
        let logs = LogBuffer::with_retention(100, Some(Duration::from_millis(50)));
        logs.info("old");
        std::thread::sleep(Duration::from_millis(120));
        logs.info("new");

        let messages: Vec<_> = logs.snapshot().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["new"]);
    }

    #[test]
    fn test_line_format() {
        let logs = LogBuffer::new(5);
        logs.error("Failed https://example.com/");

        let line = &logs.lines()[0];
        assert!(line.ends_with(" ERROR Failed https://example.com/"));
    }

    #[test]
    fn test_zero_capacity_still_keeps_latest() {
        let logs = LogBuffer::new(0);
        logs.info("first");
        logs.info("second");
        assert_eq!(logs.len(), 1);
        assert_eq!(logs.snapshot()[0].message, "second");
    }
}
