//! Publish/subscribe progress reporting.
//!
//! Downloads publish events onto a bus with bounded per-subscriber
//! channels. Publishers never block: when a subscriber falls behind its
//! events are dropped. Channel close is guarded so racing shutdown paths
//! cannot close twice.

use std::collections::HashMap;
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const EVENT_BUFFER: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Start,
    Progress,
    Complete,
    Error,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub kind: EventKind,
    pub id: String,
    pub message: String,
    pub current: u64,
    pub total: u64,
}

impl ProgressEvent {
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.current as f64 / self.total as f64 * 100.0).min(100.0)
    }
}

/// Snapshot of one download's progress.
#[derive(Debug, Clone, Default)]
pub struct DownloadProgress {
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub speed: f64,
    pub eta: Option<Duration>,
    pub started: bool,
    pub finished: bool,
    pub failed: bool,
}

/// A bounded event channel whose close is idempotent.
///
/// Dropping the sender closes an mpsc channel implicitly, but the bus
/// hands shared senders to many publishers; this wrapper gives them a
/// single close point that is safe to hit from several shutdown paths.
pub struct SafeEventChannel {
    tx: Mutex<Option<SyncSender<ProgressEvent>>>,
}

impl SafeEventChannel {
    pub fn new(buffer: usize) -> (Arc<Self>, Receiver<ProgressEvent>) {
        let (tx, rx) = std::sync::mpsc::sync_channel(buffer);
        (
            Arc::new(Self {
                tx: Mutex::new(Some(tx)),
            }),
            rx,
        )
    }

    /// Non-blocking send; returns false if the channel is closed or full.
    pub fn send(&self, event: ProgressEvent) -> bool {
        let guard = self.tx.lock().unwrap();
        match guard.as_ref() {
            Some(tx) => !matches!(
                tx.try_send(event),
                Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_))
            ),
            None => false,
        }
    }

    pub fn close(&self) {
        self.tx.lock().unwrap().take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().unwrap().is_none()
    }
}

/// Fan-out of progress events to any number of subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<String, Arc<SafeEventChannel>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber and return its receiving end.
    pub fn subscribe(&self, id: &str) -> Receiver<ProgressEvent> {
        let (channel, rx) = SafeEventChannel::new(EVENT_BUFFER);
        self.subscribers
            .lock()
            .unwrap()
            .insert(id.to_string(), channel);
        rx
    }

    pub fn unsubscribe(&self, id: &str) {
        if let Some(channel) = self.subscribers.lock().unwrap().remove(id) {
            channel.close();
        }
    }

    /// Deliver an event to every subscriber, dropping it for any whose
    /// buffer is full.
    pub fn publish(&self, event: &ProgressEvent) {
        let subscribers = self.subscribers.lock().unwrap();
        for channel in subscribers.values() {
            channel.send(event.clone());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

/// Per-download tracker publishing onto the shared bus.
pub struct Tracker {
    id: String,
    bus: Arc<EventBus>,
    progress: Mutex<TrackerState>,
}

struct TrackerState {
    progress: DownloadProgress,
    updated_at: Instant,
}

impl Tracker {
    pub fn start(&self, total: u64) {
        {
            let mut state = self.progress.lock().unwrap();
            state.progress.total_bytes = total;
            state.progress.started = true;
            state.updated_at = Instant::now();
        }
        self.bus.publish(&ProgressEvent {
            kind: EventKind::Start,
            id: self.id.clone(),
            message: "download started".into(),
            current: 0,
            total,
        });
    }

    pub fn update(&self, current: u64) {
        let total = {
            let mut state = self.progress.lock().unwrap();
            let now = Instant::now();
            let elapsed = now.duration_since(state.updated_at).as_secs_f64();
            if elapsed > 0.0 {
                let delta = current.saturating_sub(state.progress.downloaded_bytes);
                state.progress.speed = delta as f64 / elapsed;
            }
            let remaining = state.progress.total_bytes.saturating_sub(current);
            state.progress.eta = if state.progress.speed > 0.0 && remaining > 0 {
                Some(Duration::from_secs_f64(
                    remaining as f64 / state.progress.speed,
                ))
            } else {
                None
            };
            state.progress.downloaded_bytes = current;
            state.updated_at = now;
            state.progress.total_bytes
        };
        self.bus.publish(&ProgressEvent {
            kind: EventKind::Progress,
            id: self.id.clone(),
            message: "downloading".into(),
            current,
            total,
        });
    }

    pub fn complete(&self) {
        let total = {
            let mut state = self.progress.lock().unwrap();
            state.progress.finished = true;
            state.progress.downloaded_bytes = state.progress.total_bytes;
            state.progress.total_bytes
        };
        self.bus.publish(&ProgressEvent {
            kind: EventKind::Complete,
            id: self.id.clone(),
            message: "download complete".into(),
            current: total,
            total,
        });
    }

    pub fn error(&self, message: &str) {
        let (current, total) = {
            let mut state = self.progress.lock().unwrap();
            state.progress.finished = true;
            state.progress.failed = true;
            (state.progress.downloaded_bytes, state.progress.total_bytes)
        };
        self.bus.publish(&ProgressEvent {
            kind: EventKind::Error,
            id: self.id.clone(),
            message: message.to_string(),
            current,
            total,
        });
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn snapshot(&self) -> DownloadProgress {
        self.progress.lock().unwrap().progress.clone()
    }
}

/// Aggregate view across all registered trackers.
#[derive(Debug, Clone, Default)]
pub struct AggregateProgress {
    pub total_downloads: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
}

/// Owns the bus and the set of per-download trackers.
#[derive(Default)]
pub struct ProgressManager {
    bus: Arc<EventBus>,
    trackers: Mutex<HashMap<String, Arc<Tracker>>>,
}

impl ProgressManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: &str) -> Arc<Tracker> {
        let tracker = Arc::new(Tracker {
            id: id.to_string(),
            bus: self.bus.clone(),
            progress: Mutex::new(TrackerState {
                progress: DownloadProgress::default(),
                updated_at: Instant::now(),
            }),
        });
        self.trackers
            .lock()
            .unwrap()
            .insert(id.to_string(), tracker.clone());
        tracker
    }

    pub fn unregister(&self, id: &str) {
        self.trackers.lock().unwrap().remove(id);
    }

    pub fn subscribe(&self, id: &str) -> Receiver<ProgressEvent> {
        self.bus.subscribe(id)
    }

    pub fn unsubscribe(&self, id: &str) {
        self.bus.unsubscribe(id)
    }

    pub fn aggregate(&self) -> AggregateProgress {
        let trackers = self.trackers.lock().unwrap();
        let mut agg = AggregateProgress {
            total_downloads: trackers.len(),
            ..Default::default()
        };
        for tracker in trackers.values() {
            let p = tracker.snapshot();
            agg.total_bytes += p.total_bytes;
            agg.downloaded_bytes += p.downloaded_bytes;
            if p.failed {
                agg.failed += 1;
            } else if p.finished {
                agg.completed += 1;
            } else if p.started {
                agg.active += 1;
            }
        }
        agg
    }
}
