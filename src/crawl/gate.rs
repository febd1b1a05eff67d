// src/crawl/gate.rs
// =============================================================================
// The politeness gate: at most one request per host per interval.
//
// A fixed sleep after every page isn't enough once there are several
// workers: four workers on the same host would still hit it four times at
// once. Instead every host gets its own slot:
//
//   hosts: Mutex<HashMap<host, Arc<tokio Mutex<HostState>>>>
//
// acquire(host):
// 1. Briefly lock the map to find (or create) the host's slot
// 2. Release the map, then lock the host's slot (async, may wait)
// 3. Sleep until last dispatch + gap
// 4. Record "now" as the new last dispatch and return it
//
// Workers waiting on the same host queue up on that host's slot, so their
// dispatch times are at least `interval` apart. Workers on different hosts
// hold different slots and never wait on each other; the map lock is only
// held for a HashMap lookup.
//
// A host may ask for a longer gap (robots.txt Crawl-delay). The longer gap
// sticks to the host until its slot is dropped. Slots nobody holds and whose
// gap has already run out are dropped on the next lookup, so the map only
// keeps hosts that could still make someone wait.
// =============================================================================

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct HostState {
    last: Option<Instant>,
    gap: Duration,
}

impl HostState {
    // True when a new request could go out right away
    fn is_idle(&self, now: Instant) -> bool {
        self.last.map_or(true, |last| last + self.gap <= now)
    }
}

type HostSlot = Arc<tokio::sync::Mutex<HostState>>;

#[derive(Debug)]
pub struct PolitenessGate {
    interval: Duration,
    hosts: Mutex<HashMap<String, HostSlot>>,
}

impl PolitenessGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    // Waits until `host` may be fetched again, then claims the slot.
    //
    // Returns the dispatch instant that was recorded for this request.
    // Host names are compared case-insensitively.
    pub async fn acquire(&self, host: &str) -> Instant {
        self.acquire_with_delay(host, None).await
    }

    // Same as acquire(), but the host asked for at least `delay` between
    // requests. The configured interval still applies when it is longer.
    pub async fn acquire_with_delay(&self, host: &str, delay: Option<Duration>) -> Instant {
        let slot = self.slot(host);

        // Holding the host lock across the sleep is what serializes
        // requests to one host; it is the only lock held across an await.
        let mut state = slot.lock().await;
        state.gap = state.gap.max(self.interval).max(delay.unwrap_or_default());
        if let Some(previous) = state.last {
            tokio::time::sleep_until(previous + state.gap).await;
        }
        let dispatched = Instant::now();
        state.last = Some(dispatched);
        dispatched
    }

    // How many hosts currently have a slot
    pub fn hosts_tracked(&self) -> usize {
        self.hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn slot(&self, host: &str) -> HostSlot {
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);

        // A slot with no other owner and an elapsed gap carries no state
        // worth keeping: a fresh one behaves the same
        let now = Instant::now();
        hosts.retain(|_, slot| {
            Arc::strong_count(slot) > 1
                || slot.try_lock().map_or(true, |state| !state.is_idle(now))
        });

        Arc::clone(
            hosts
                .entry(host.to_ascii_lowercase())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(HostState::default()))),
        )
    }
}
