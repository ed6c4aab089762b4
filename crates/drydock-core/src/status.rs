//! Status hub — deployment and scheduler progress fan-out.
//!
//! Producers (the pipeline worker, scheduler actions) push [`StatusUpdate`]s
//! keyed by instance id. Each update lands in a short-TTL cache serving the
//! polling path (`latest`) and on a per-id broadcast channel serving push
//! subscribers (`subscribe`). Lagging or absent subscribers never block a
//! producer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of each per-id broadcast channel. Slow subscribers that fall
/// further behind than this observe a lag error, not producer backpressure.
const BROADCAST_CAPACITY: usize = 64;

/// One progress report from a deployment stage or scheduler action.
///
/// `percent` is monotonically non-decreasing within one job; `Some(-1)` is
/// reserved for terminal failure. `cause` carries the triggering error's
/// message verbatim when there is one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub message: String,
    pub percent: Option<i16>,
    pub error: bool,
    pub cause: Option<String>,
}

impl StatusUpdate {
    /// A plain informational update with no progress figure.
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            percent: None,
            error: false,
            cause: None,
        }
    }

    /// A progress update at the given percentage.
    pub fn progress(message: impl Into<String>, percent: i16) -> Self {
        Self {
            message: message.into(),
            percent: Some(percent),
            error: false,
            cause: None,
        }
    }

    /// A non-terminal error note (a best-effort sub-step that failed).
    pub fn warning(message: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            percent: None,
            error: true,
            cause: Some(cause.into()),
        }
    }

    /// Terminal failure: percent pinned to −1.
    pub fn failure(message: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            percent: Some(-1),
            error: true,
            cause: Some(cause.into()),
        }
    }

    /// True when this update marks the terminal failure of its job.
    pub fn is_terminal_failure(&self) -> bool {
        self.percent == Some(-1)
    }
}

/// Callback handed to the pipeline so stages can report without knowing
/// about the hub.
pub type ProgressFn = Arc<dyn Fn(StatusUpdate) + Send + Sync>;

struct Entry {
    latest: Option<(StatusUpdate, Instant)>,
    tx: broadcast::Sender<StatusUpdate>,
}

impl Entry {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { latest: None, tx }
    }
}

/// Shared status fan-out. `Clone` hands out another reference to the same
/// hub; there is exactly one per process.
#[derive(Clone)]
pub struct StatusHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    ttl: Duration,
    entries: Mutex<HashMap<u64, Entry>>,
}

impl StatusHub {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(HubInner {
                ttl,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Record `update` for `id` and push it to any subscribers.
    pub fn publish(&self, id: u64, update: StatusUpdate) {
        let mut entries = self.inner.entries.lock().unwrap();
        Self::prune(&mut entries, self.inner.ttl);
        let entry = entries.entry(id).or_insert_with(Entry::new);
        entry.latest = Some((update.clone(), Instant::now()));
        // No subscribers is fine; the cache still serves pollers.
        let _ = entry.tx.send(update);
    }

    /// Most recent update for `id`, if one was published within the TTL.
    pub fn latest(&self, id: u64) -> Option<StatusUpdate> {
        let entries = self.inner.entries.lock().unwrap();
        let (update, at) = entries.get(&id)?.latest.as_ref()?;
        if at.elapsed() > self.inner.ttl {
            return None;
        }
        Some(update.clone())
    }

    /// Subscribe to live updates for `id`. The receiver observes every
    /// update published after this call, subject to channel capacity.
    pub fn subscribe(&self, id: u64) -> broadcast::Receiver<StatusUpdate> {
        let mut entries = self.inner.entries.lock().unwrap();
        entries.entry(id).or_insert_with(Entry::new).tx.subscribe()
    }

    /// A callback that publishes into this hub under `id`.
    pub fn reporter(&self, id: u64) -> ProgressFn {
        let hub = self.clone();
        Arc::new(move |update| hub.publish(id, update))
    }

    /// Drop entries whose cached update expired and which nobody is
    /// subscribed to.
    fn prune(entries: &mut HashMap<u64, Entry>, ttl: Duration) {
        let before = entries.len();
        entries.retain(|_, entry| {
            let fresh = entry
                .latest
                .as_ref()
                .is_some_and(|(_, at)| at.elapsed() <= ttl);
            fresh || entry.tx.receiver_count() > 0
        });
        let dropped = before - entries.len();
        if dropped > 0 {
            debug!(dropped, "pruned expired status entries");
        }
    }
}
