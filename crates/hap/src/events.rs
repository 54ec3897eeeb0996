//! Event bus
//!
//! Topic-keyed subscriber lists plus an unbounded event queue. Any thread
//! may publish; the control loop drains the queue and hands each payload to
//! the transport for every subscriber except the client that caused it.

use std::sync::Arc;

use dashmap::DashMap;
use hap_runtime::StopHandle;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

use crate::transport::{ClientAddr, Transport};

/// An event waiting to be delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedEvent {
    pub topic: String,
    pub payload: Vec<u8>,
    /// Client excluded from delivery; `None` delivers to every subscriber
    pub origin: Option<ClientAddr>,
}

/// Topic registry and event queue
///
/// Cheap to clone; clones share the same topics and queue.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

struct EventBusInner {
    /// Subscribers per topic, in subscription order
    topics: DashMap<String, Vec<ClientAddr>>,

    tx: mpsc::UnboundedSender<QueuedEvent>,
    rx: Mutex<mpsc::UnboundedReceiver<QueuedEvent>>,

    /// Wakes the pump when events are queued
    notify: Notify,

    transport: Arc<dyn Transport>,
}

impl EventBus {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(EventBusInner {
                topics: DashMap::new(),
                tx,
                rx: Mutex::new(rx),
                notify: Notify::new(),
                transport,
            }),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Topics
    // ─────────────────────────────────────────────────────────────────────────

    /// Subscribe a client to a topic; subscribing twice has no effect
    pub fn subscribe(&self, topic: &str, client: ClientAddr) {
        let mut subscribers = self.inner.topics.entry(topic.to_string()).or_default();
        if !subscribers.contains(&client) {
            subscribers.push(client);
            tracing::debug!(topic, %client, "Client subscribed");
        }
    }

    /// Unsubscribe a client; unknown topics and clients are ignored
    pub fn unsubscribe(&self, topic: &str, client: ClientAddr) {
        if let Some(mut subscribers) = self.inner.topics.get_mut(topic) {
            subscribers.retain(|c| *c != client);
        }
        self.inner.topics.remove_if(topic, |_, subscribers| subscribers.is_empty());
    }

    /// Drop a client from every topic, e.g. after it disconnected
    pub fn remove_client(&self, client: ClientAddr) {
        self.inner.topics.retain(|_, subscribers| {
            subscribers.retain(|c| *c != client);
            !subscribers.is_empty()
        });
        tracing::debug!(%client, "Client removed from all topics");
    }

    /// Subscribers of a topic in subscription order
    pub fn subscribers(&self, topic: &str) -> Vec<ClientAddr> {
        self.inner
            .topics
            .get(topic)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    pub fn is_subscribed(&self, topic: &str, client: ClientAddr) -> bool {
        self.inner
            .topics
            .get(topic)
            .is_some_and(|s| s.contains(&client))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queue
    // ─────────────────────────────────────────────────────────────────────────

    /// Queue an event if the topic has subscribers; returns whether it was queued
    pub fn publish(&self, topic: &str, payload: Vec<u8>, origin: Option<ClientAddr>) -> bool {
        if !self.inner.topics.contains_key(topic) {
            tracing::trace!(topic, "No subscribers, event dropped");
            return false;
        }
        self.enqueue(QueuedEvent {
            topic: topic.to_string(),
            payload,
            origin,
        });
        true
    }

    /// Queue an event unconditionally
    pub fn enqueue(&self, event: QueuedEvent) {
        // The receiver lives as long as the bus, so sending cannot fail
        let _ = self.inner.tx.send(event);
        self.inner.notify.notify_one();
    }

    /// Number of queued events
    pub fn pending(&self) -> usize {
        self.inner.rx.lock().len()
    }

    /// Deliver the events queued so far; returns how many were processed
    ///
    /// Never waits for new events. Events queued while draining are left
    /// for the next call.
    pub fn send_events(&self) -> usize {
        let mut rx = self.inner.rx.lock();
        let backlog = rx.len();

        for _ in 0..backlog {
            let Ok(event) = rx.try_recv() else { break };
            self.deliver(&event);
        }
        backlog
    }

    fn deliver(&self, event: &QueuedEvent) {
        // Copy the subscriber list so no map lock is held across pushes
        let subscribers = self.subscribers(&event.topic);

        for client in subscribers {
            if Some(client) == event.origin {
                continue;
            }
            if !self.inner.transport.push_event(&event.payload, client) {
                tracing::warn!(topic = %event.topic, %client, "Event delivery failed");
            }
        }
    }

    /// Drain the queue whenever events arrive, until a stop is requested
    pub async fn pump(&self, stop: StopHandle) {
        loop {
            tokio::select! {
                _ = self.inner.notify.notified() => {
                    self.send_events();
                }
                _ = stop.stopped() => break,
            }
        }
        tracing::debug!("Event pump stopped");
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("topics", &self.inner.topics.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;

    /// Transport recording every push; pushes to `failing` clients fail
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub pushed: Mutex<Vec<(Vec<u8>, ClientAddr)>>,
        pub failing: Mutex<HashSet<ClientAddr>>,
        pub started: std::sync::atomic::AtomicBool,
        pub stopped: std::sync::atomic::AtomicBool,
    }

    impl RecordingTransport {
        pub fn clients(&self) -> Vec<ClientAddr> {
            self.pushed.lock().iter().map(|(_, c)| *c).collect()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn start(&self) -> anyhow::Result<()> {
            self.started.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            self.stopped.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }

        fn push_event(&self, data: &[u8], client: ClientAddr) -> bool {
            if self.failing.lock().contains(&client) {
                return false;
            }
            self.pushed.lock().push((data.to_vec(), client));
            true
        }
    }

    pub(crate) fn client(n: u16) -> ClientAddr {
        ClientAddr::from(([127, 0, 0, 1], 50000 + n))
    }

    fn bus() -> (EventBus, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        (EventBus::new(transport.clone()), transport)
    }

    #[test]
    fn test_send_events_excludes_origin() {
        let (bus, transport) = bus();
        for n in 1..=3 {
            bus.subscribe("mocktopic", client(n));
        }

        bus.enqueue(QueuedEvent {
            topic: "mocktopic".into(),
            payload: b"bytedata".to_vec(),
            origin: Some(client(1)),
        });
        assert_eq!(bus.send_events(), 1);

        assert_eq!(transport.clients(), vec![client(2), client(3)]);
        assert!(transport.pushed.lock().iter().all(|(d, _)| d == b"bytedata"));
    }

    #[test]
    fn test_no_origin_delivers_to_all() {
        let (bus, transport) = bus();
        bus.subscribe("1.9", client(1));
        bus.subscribe("1.9", client(2));

        assert!(bus.publish("1.9", b"x".to_vec(), None));
        bus.send_events();
        assert_eq!(transport.clients(), vec![client(1), client(2)]);
    }

    #[test]
    fn test_unsubscribed_origin_delivers_to_all() {
        let (bus, transport) = bus();
        bus.subscribe("1.9", client(1));
        bus.subscribe("1.9", client(2));

        assert!(bus.publish("1.9", b"x".to_vec(), Some(client(9))));
        bus.send_events();
        assert_eq!(transport.clients(), vec![client(1), client(2)]);
    }

    #[test]
    fn test_failed_push_does_not_block_others() {
        let (bus, transport) = bus();
        for n in 1..=3 {
            bus.subscribe("t", client(n));
        }
        transport.failing.lock().insert(client(2));

        bus.publish("t", b"a".to_vec(), None);
        bus.publish("t", b"b".to_vec(), None);
        assert_eq!(bus.send_events(), 2);

        let pushed = transport.pushed.lock().clone();
        assert_eq!(
            pushed,
            vec![
                (b"a".to_vec(), client(1)),
                (b"a".to_vec(), client(3)),
                (b"b".to_vec(), client(1)),
                (b"b".to_vec(), client(3)),
            ]
        );
    }

    #[test]
    fn test_identical_events_are_not_coalesced() {
        let (bus, transport) = bus();
        bus.subscribe("t", client(1));

        bus.publish("t", b"same".to_vec(), None);
        bus.publish("t", b"same".to_vec(), None);
        bus.send_events();
        assert_eq!(transport.pushed.lock().len(), 2);
    }

    #[test]
    fn test_send_events_on_empty_queue_returns() {
        let (bus, _) = bus();
        assert_eq!(bus.send_events(), 0);
    }

    #[test]
    fn test_unsubscribe_is_noop_when_absent() {
        let (bus, _) = bus();
        bus.unsubscribe("nonexistent", client(1));

        bus.subscribe("t", client(1));
        bus.unsubscribe("t", client(2));
        assert_eq!(bus.subscribers("t"), vec![client(1)]);

        bus.unsubscribe("t", client(1));
        assert!(bus.subscribers("t").is_empty());
        assert!(!bus.publish("t", b"x".to_vec(), None));
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn test_duplicate_subscribe_and_remove_client() {
        let (bus, _) = bus();
        bus.subscribe("a", client(1));
        bus.subscribe("a", client(1));
        bus.subscribe("b", client(1));
        bus.subscribe("b", client(2));
        assert_eq!(bus.subscribers("a"), vec![client(1)]);

        bus.remove_client(client(1));
        assert!(bus.subscribers("a").is_empty());
        assert_eq!(bus.subscribers("b"), vec![client(2)]);
        assert!(!bus.is_subscribed("b", client(1)));
    }

    #[test]
    fn test_publish_from_other_threads() {
        let (bus, transport) = bus();
        bus.subscribe("t", client(1));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let bus = bus.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        bus.publish("t", b"x".to_vec(), None);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(bus.send_events(), 40);
        assert_eq!(transport.pushed.lock().len(), 40);
    }
}
