//! Shared ingestor behavior: lifecycle state, push/dedup/emit, status
//! reporting, and event retrieval, common to every protocol.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::id_gen::IdGenerator;
use crate::ring_buffer::RingBuffer;
use crate::seen_keys::SeenKeys;
use crate::types::{IngestedEvent, IngestorState, IngestorStatus};

type PushObserver = Box<dyn Fn(&IngestedEvent) + Send + Sync>;

/// Shared state and behavior every protocol ingestor is built on. Owns its
/// ring buffer, seen-keys set, and id allocator; driven from exactly one
/// logical task per ingestor, protected here with short, synchronous
/// critical sections so status/event reads from the manager stay consistent.
pub struct IngestorCore {
    connection_alias: String,
    instance_id: Option<String>,
    ingestor_type: String,
    secrets: HashMap<String, String>,

    id_gen: IdGenerator,
    buffer: Mutex<RingBuffer>,
    seen_keys: Mutex<SeenKeys>,
    state: Mutex<IngestorState>,
    error: Mutex<Option<String>>,
    last_event_at: Mutex<Option<String>>,
    total_events_received: AtomicU64,
    total_duplicates_dropped: AtomicU64,
    total_reconnects: AtomicU64,

    observer: Mutex<Option<PushObserver>>,
}

impl IngestorCore {
    pub fn new(
        connection_alias: impl Into<String>,
        ingestor_type: impl Into<String>,
        secrets: HashMap<String, String>,
        buffer_capacity: usize,
        instance_id: Option<String>,
    ) -> Self {
        Self {
            connection_alias: connection_alias.into(),
            instance_id,
            ingestor_type: ingestor_type.into(),
            secrets,
            id_gen: IdGenerator::new(),
            buffer: Mutex::new(RingBuffer::new(buffer_capacity)),
            seen_keys: Mutex::new(SeenKeys::new()),
            state: Mutex::new(IngestorState::Stopped),
            error: Mutex::new(None),
            last_event_at: Mutex::new(None),
            total_events_received: AtomicU64::new(0),
            total_duplicates_dropped: AtomicU64::new(0),
            total_reconnects: AtomicU64::new(0),
            observer: Mutex::new(None),
        }
    }

    pub fn alias(&self) -> &str {
        &self.connection_alias
    }

    pub fn instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref()
    }

    pub fn secret(&self, name: &str) -> Option<&str> {
        self.secrets.get(name).map(String::as_str)
    }

    /// Register a callback invoked synchronously after every successful
    /// push. This is how the manager observes new events without holding
    /// a reference back into the ingestor.
    pub fn set_observer(&self, observer: PushObserver) {
        *self.observer.lock().unwrap() = Some(observer);
    }

    pub fn set_state(&self, state: IngestorState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn state(&self) -> IngestorState {
        *self.state.lock().unwrap()
    }

    pub fn set_error(&self, message: impl Into<String>) {
        *self.error.lock().unwrap() = Some(message.into());
    }

    pub fn clear_error(&self) {
        *self.error.lock().unwrap() = None;
    }

    /// Dedup against the idempotency key, allocate an id, push onto the
    /// ring buffer, and notify the observer.
    ///
    /// Returns the stored event, or `None` if it was dropped as a duplicate.
    pub fn push_event(
        &self,
        event_type: impl Into<String>,
        data: Value,
        idempotency_key: Option<String>,
    ) -> Option<IngestedEvent> {
        let event_type = event_type.into();

        if let Some(ref key) = idempotency_key
            && self.seen_keys.lock().unwrap().contains(key)
        {
            debug!(
                alias = %self.connection_alias,
                key = %key,
                "dropping duplicate event"
            );
            self.total_duplicates_dropped.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let key =
            idempotency_key.unwrap_or_else(|| format!("{}:{}", self.connection_alias, Uuid::new_v4()));

        let id = self.id_gen.next_id();
        let now = Utc::now();
        let received_at = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let received_at_ms = now.timestamp_millis().max(0) as u64;

        let event = IngestedEvent {
            id,
            idempotency_key: key.clone(),
            received_at: received_at.clone(),
            received_at_ms,
            source: self.connection_alias.clone(),
            instance_id: self.instance_id.clone(),
            event_type,
            data,
        };

        self.buffer.lock().unwrap().push(event.clone());
        *self.last_event_at.lock().unwrap() = Some(received_at);
        self.seen_keys.lock().unwrap().insert(key);
        self.total_events_received.fetch_add(1, Ordering::Relaxed);

        info!(
            alias = %self.connection_alias,
            id,
            event_type = %event.event_type,
            "pushed event"
        );
        debug!(alias = %self.connection_alias, data = %event.data, "event payload");

        if let Some(observer) = self.observer.lock().unwrap().as_ref() {
            observer(&event);
        }

        Some(event)
    }

    /// `getEvents(afterId = -1)`. Negative returns the entire buffer.
    pub fn get_events(&self, after_id: i64) -> Vec<IngestedEvent> {
        let buffer = self.buffer.lock().unwrap();
        if after_id < 0 {
            buffer.to_array()
        } else {
            buffer.since(after_id)
        }
    }

    /// Ambient observability counters, not part of [`IngestorStatus`]'s
    /// public snapshot: backing the remote-agent binary's Prometheus gauges.
    pub fn duplicates_dropped(&self) -> u64 {
        self.total_duplicates_dropped.load(Ordering::Relaxed)
    }

    pub fn record_reconnect(&self) {
        self.total_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnects(&self) -> u64 {
        self.total_reconnects.load(Ordering::Relaxed)
    }

    pub fn get_status(&self) -> IngestorStatus {
        IngestorStatus {
            connection: self.connection_alias.clone(),
            instance_id: self.instance_id.clone(),
            ingestor_type: self.ingestor_type.clone(),
            state: self.state(),
            buffered_events: self.buffer.lock().unwrap().size(),
            total_events_received: self.total_events_received.load(Ordering::Relaxed),
            last_event_at: self.last_event_at.lock().unwrap().clone(),
            error: self.error.lock().unwrap().clone(),
        }
    }
}

/// The capability set every protocol ingestor exposes: start, stop, get
/// events, get status. Object-safe so the registry and manager can hold
/// `Arc<dyn Ingestor>` without knowing the concrete protocol.
///
/// `start`/`stop` return boxed futures rather than using `async fn` so the
/// trait stays object-safe; `get_events`/`get_status` stay synchronous
/// because `IngestorCore`'s critical sections are short enough not to need
/// an async lock.
pub trait Ingestor: Send + Sync {
    fn core(&self) -> &IngestorCore;

    /// Idempotent: calling `start` while already running/starting is a no-op.
    fn start(self: std::sync::Arc<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>>;

    /// Idempotent: calling `stop` while already stopped is a no-op. Must
    /// complete within a bounded time and leave the ingestor in `Stopped`.
    fn stop(&self) -> Pin<Box<dyn Future<Output = ()> + Send>>;

    fn get_events(&self, after_id: i64) -> Vec<IngestedEvent> {
        self.core().get_events(after_id)
    }

    fn get_status(&self) -> IngestorStatus {
        self.core().get_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> IngestorCore {
        IngestorCore::new("discord-bot", "websocket", HashMap::new(), 2, None)
    }

    #[test]
    fn push_allocates_strictly_increasing_ids() {
        let core = core();
        let a = core.push_event("MESSAGE_CREATE", Value::Null, None).unwrap();
        let b = core.push_event("MESSAGE_CREATE", Value::Null, None).unwrap();
        assert!(a.id < b.id);
    }

    #[test]
    fn duplicate_idempotency_key_is_deduped() {
        let core = core();
        let first = core.push_event("push", Value::Null, Some("x".to_string()));
        let second = core.push_event("push", Value::Null, Some("x".to_string()));
        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(core.get_status().total_events_received, 1);
    }

    #[test]
    fn missing_idempotency_key_is_synthesized() {
        let core = core();
        let event = core.push_event("push", Value::Null, None).unwrap();
        assert!(event.idempotency_key.starts_with("discord-bot:"));
    }

    #[test]
    fn get_events_respects_buffer_capacity() {
        let core = core(); // capacity 2
        core.push_event("a", Value::Null, None);
        core.push_event("b", Value::Null, None);
        core.push_event("c", Value::Null, None);
        assert_eq!(core.get_events(-1).len(), 2);
    }

    #[test]
    fn observer_is_invoked_on_push() {
        let core = core();
        let seen = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen_clone = seen.clone();
        core.set_observer(Box::new(move |_event| {
            seen_clone.fetch_add(1, Ordering::Relaxed);
        }));
        core.push_event("a", Value::Null, None);
        core.push_event("b", Value::Null, Some("dup".to_string()));
        core.push_event("b", Value::Null, Some("dup".to_string()));
        assert_eq!(seen.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn status_reflects_state_and_counts() {
        let core = core();
        core.set_state(IngestorState::Running);
        core.push_event("a", Value::Null, None);
        let status = core.get_status();
        assert_eq!(status.state, IngestorState::Running);
        assert_eq!(status.total_events_received, 1);
        assert_eq!(status.buffered_events, 1);
        assert!(status.last_event_at.is_some());
    }
}
