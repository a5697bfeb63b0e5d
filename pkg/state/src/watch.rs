use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::sync::broadcast;

/// Type of event in the watch stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventType {
    Put,
    Delete,
}

/// A single watch event representing a state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    pub seq: u64,
    pub event_type: EventType,
    pub key: String,
    #[serde(default)]
    pub value: Option<Vec<u8>>,
}

/// In-memory event log tracking all state mutations with monotonic
/// sequence numbers. Subscribers get at-least-once delivery: a slow
/// consumer that lags the broadcast channel can replay from the buffer
/// via `events_since`, and duplicates are expected to be harmless
/// because reconciliation is idempotent.
#[derive(Clone)]
pub struct EventLog {
    inner: Arc<RwLock<EventLogInner>>,
    sender: broadcast::Sender<WatchEvent>,
}

struct EventLogInner {
    seq: u64,
    /// Ring buffer of recent events
    events: VecDeque<WatchEvent>,
    capacity: usize,
}

impl EventLog {
    /// Create a new event log retaining up to `capacity` recent events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(RwLock::new(EventLogInner {
                seq: 0,
                events: VecDeque::with_capacity(capacity),
                capacity,
            })),
            sender,
        }
    }

    /// Record a new event. Called internally by StateStore on put/delete.
    pub async fn emit(&self, event_type: EventType, key: String, value: Option<Vec<u8>>) {
        let mut inner = self.inner.write().await;
        inner.seq += 1;
        let event = WatchEvent {
            seq: inner.seq,
            event_type,
            key,
            value,
        };
        if inner.events.len() >= inner.capacity {
            inner.events.pop_front();
        }
        inner.events.push_back(event.clone());
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    /// Get the current sequence number.
    pub async fn current_seq(&self) -> u64 {
        self.inner.read().await.seq
    }

    /// Get all buffered events newer than the given sequence number.
    pub async fn events_since(&self, from_seq: u64) -> Vec<WatchEvent> {
        let inner = self.inner.read().await;
        inner
            .events
            .iter()
            .filter(|e| e.seq > from_seq)
            .cloned()
            .collect()
    }

    /// Subscribe to receive new events as they are emitted.
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequence_numbers_are_monotonic() {
        let log = EventLog::new(8);
        log.emit(EventType::Put, "/a".to_string(), None).await;
        log.emit(EventType::Put, "/b".to_string(), None).await;
        log.emit(EventType::Delete, "/a".to_string(), None).await;

        let events = log.events_since(0).await;
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(log.current_seq().await, 3);
    }

    #[tokio::test]
    async fn buffer_drops_oldest_beyond_capacity() {
        let log = EventLog::new(2);
        for key in ["/a", "/b", "/c"] {
            log.emit(EventType::Put, key.to_string(), None).await;
        }
        let events = log.events_since(0).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].key, "/b");
        assert_eq!(events[1].key, "/c");
    }

    #[tokio::test]
    async fn subscribers_see_live_events() {
        let log = EventLog::new(8);
        let mut rx = log.subscribe();
        log.emit(EventType::Put, "/live".to_string(), Some(b"v".to_vec()))
            .await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.key, "/live");
        assert_eq!(event.value.as_deref(), Some(b"v".as_ref()));
    }
}
