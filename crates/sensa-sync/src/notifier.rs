//! # Sync Progress Notifier
//!
//! Listeners receive the signals of a sync run. The engine holds a
//! [`ListenerSet`] and fans every signal out to each registered listener.
//!
//! ## Signals
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  on_sync_started(total)          once per run, before the first batch   │
//! │  on_progress(sent, total, id)    after each batch is marked synced      │
//! │  on_transmit_error(msg, code)    network or collector failure           │
//! │  on_read_error(msg, code)        store or codec failure                 │
//! │  on_sync_finished()              once per run, unconditionally          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use sensa_core::MeasurementId;

use crate::error::ErrorCode;

// =============================================================================
// Listener Trait
// =============================================================================

/// Receiver of sync run signals.
///
/// Every method defaults to a no-op. Implementations must not block: they are
/// called inline from the sync task.
pub trait SyncListener: Send + Sync {
    /// A run started with `total_points` points left to transmit.
    fn on_sync_started(&self, _total_points: u64) {}

    /// `transmitted` of `total` points are on the collector.
    fn on_progress(&self, _transmitted: u64, _total: u64, _measurement_id: MeasurementId) {}

    /// The run is over, whether it succeeded, failed or was cancelled.
    fn on_sync_finished(&self) {}

    /// Sending a batch failed.
    fn on_transmit_error(&self, _message: &str, _code: ErrorCode) {}

    /// Reading or marking local data failed.
    fn on_read_error(&self, _message: &str, _code: ErrorCode) {}
}

/// Listener that ignores every signal.
pub struct NoOpListener;

impl SyncListener for NoOpListener {}

/// Mirrors every signal into tracing.
pub struct LogListener;

impl SyncListener for LogListener {
    fn on_sync_started(&self, total_points: u64) {
        info!(total_points, "Sync started");
    }

    fn on_progress(&self, transmitted: u64, total: u64, measurement_id: MeasurementId) {
        info!(transmitted, total, measurement_id, "Sync progress");
    }

    fn on_sync_finished(&self) {
        info!("Sync finished");
    }

    fn on_transmit_error(&self, message: &str, code: ErrorCode) {
        warn!(code = code.as_u16(), %message, "Transmit error");
    }

    fn on_read_error(&self, message: &str, code: ErrorCode) {
        error!(code = code.as_u16(), %message, "Read error");
    }
}

// =============================================================================
// Channel Listener
// =============================================================================

/// A sync signal as a value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    Started { total_points: u64 },
    Progress { transmitted: u64, total: u64, measurement_id: MeasurementId },
    Finished,
    TransmitError { message: String, code: ErrorCode },
    ReadError { message: String, code: ErrorCode },
}

/// Publishes signals on a tokio broadcast channel.
///
/// Sending never blocks. Slow subscribers see `RecvError::Lagged`.
#[derive(Clone)]
pub struct ChannelListener {
    tx: broadcast::Sender<SyncEvent>,
}

impl ChannelListener {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        ChannelListener { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    fn send(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

impl SyncListener for ChannelListener {
    fn on_sync_started(&self, total_points: u64) {
        self.send(SyncEvent::Started { total_points });
    }

    fn on_progress(&self, transmitted: u64, total: u64, measurement_id: MeasurementId) {
        self.send(SyncEvent::Progress {
            transmitted,
            total,
            measurement_id,
        });
    }

    fn on_sync_finished(&self) {
        self.send(SyncEvent::Finished);
    }

    fn on_transmit_error(&self, message: &str, code: ErrorCode) {
        self.send(SyncEvent::TransmitError {
            message: message.to_string(),
            code,
        });
    }

    fn on_read_error(&self, message: &str, code: ErrorCode) {
        self.send(SyncEvent::ReadError {
            message: message.to_string(),
            code,
        });
    }
}

// =============================================================================
// Listener Set
// =============================================================================

/// The listeners registered on an engine.
#[derive(Default, Clone)]
pub struct ListenerSet {
    listeners: Arc<RwLock<Vec<Arc<dyn SyncListener>>>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    // The Vec is only ever pushed to, so a poisoned lock still holds a valid list.
    pub fn add(&self, listener: Arc<dyn SyncListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn each(&self, f: impl Fn(&dyn SyncListener)) {
        // Snapshot so a listener may register another one without deadlocking.
        let snapshot: Vec<Arc<dyn SyncListener>> =
            self.listeners.read().unwrap_or_else(PoisonError::into_inner).clone();
        for listener in &snapshot {
            f(listener.as_ref());
        }
    }

    pub fn sync_started(&self, total_points: u64) {
        self.each(|l| l.on_sync_started(total_points));
    }

    pub fn progress(&self, transmitted: u64, total: u64, measurement_id: MeasurementId) {
        self.each(|l| l.on_progress(transmitted, total, measurement_id));
    }

    pub fn sync_finished(&self) {
        self.each(|l| l.on_sync_finished());
    }

    pub fn transmit_error(&self, message: &str, code: ErrorCode) {
        self.each(|l| l.on_transmit_error(message, code));
    }

    pub fn read_error(&self, message: &str, code: ErrorCode) {
        self.each(|l| l.on_read_error(message, code));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Counting {
        calls: Mutex<Vec<String>>,
    }

    impl SyncListener for Counting {
        fn on_sync_started(&self, total_points: u64) {
            self.calls.lock().unwrap().push(format!("started:{total_points}"));
        }

        fn on_sync_finished(&self) {
            self.calls.lock().unwrap().push("finished".into());
        }
    }

    #[test]
    fn test_fan_out_to_all_listeners() {
        let set = ListenerSet::new();
        let a = Arc::new(Counting::default());
        let b = Arc::new(Counting::default());
        set.add(a.clone());
        set.add(b.clone());
        set.add(Arc::new(NoOpListener));
        assert_eq!(set.len(), 3);

        set.sync_started(42);
        set.progress(1, 42, 7);
        set.sync_finished();

        for listener in [a, b] {
            assert_eq!(*listener.calls.lock().unwrap(), vec!["started:42", "finished"]);
        }
    }

    #[test]
    fn test_poisoned_set_still_fans_out() {
        let set = ListenerSet::new();
        let first = Arc::new(Counting::default());
        set.add(first.clone());

        let poisoner = set.clone();
        let joined = std::thread::spawn(move || {
            let _guard = poisoner.listeners.write().unwrap();
            panic!("listener registration panicked");
        })
        .join();
        assert!(joined.is_err());
        assert!(set.listeners.is_poisoned());

        let second = Arc::new(Counting::default());
        set.add(second.clone());
        assert_eq!(set.len(), 2);

        set.sync_started(5);
        set.sync_finished();

        for listener in [first, second] {
            assert_eq!(*listener.calls.lock().unwrap(), vec!["started:5", "finished"]);
        }
    }

    #[tokio::test]
    async fn test_channel_listener_events() {
        let channel = ChannelListener::new(16);
        let mut rx = channel.subscribe();

        let set = ListenerSet::new();
        set.add(Arc::new(channel));

        set.sync_started(10);
        set.progress(4, 10, 3);
        set.transmit_error("boom", ErrorCode::ServerUnavailable);
        set.read_error("disk", ErrorCode::Database);
        set.sync_finished();

        assert_eq!(rx.recv().await.unwrap(), SyncEvent::Started { total_points: 10 });
        assert_eq!(
            rx.recv().await.unwrap(),
            SyncEvent::Progress {
                transmitted: 4,
                total: 10,
                measurement_id: 3
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            SyncEvent::TransmitError {
                message: "boom".into(),
                code: ErrorCode::ServerUnavailable
            }
        );
        assert!(matches!(rx.recv().await.unwrap(), SyncEvent::ReadError { .. }));
        assert_eq!(rx.recv().await.unwrap(), SyncEvent::Finished);
    }

    #[test]
    fn test_channel_without_subscribers() {
        let channel = ChannelListener::new(1);
        channel.on_sync_started(1);
        channel.on_sync_finished();
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(SyncEvent::TransmitError {
            message: "x".into(),
            code: ErrorCode::Unauthorized,
        })
        .unwrap();
        assert_eq!(json["event"], "transmit_error");
        assert_eq!(json["code"], "UNAUTHORIZED");
    }
}
