use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};
use vaultmesh_core::EVENT_BUFFER_PER_SUBSCRIBER;

use crate::events::CustodianEvent;

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<CustodianEvent>,
}

/// Multi-subscriber fan-out of custodian events.
///
/// Each subscriber gets its own bounded buffer; delivery uses non-blocking
/// sends so a slow subscriber never blocks the custodian or its peers. On
/// overflow the event is dropped for that subscriber only — it reconciles by
/// polling the custodian and registry on reconnect.
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_buffer(EVENT_BUFFER_PER_SUBSCRIBER)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            buffer,
        }
    }

    /// Register a new subscriber. Only events published after this call are
    /// delivered.
    pub fn subscribe(&self) -> EventStream {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        self.subscribers
            .lock()
            .expect("bus lock poisoned")
            .push(Subscriber { id, tx });
        debug!(subscriber = id, "event subscriber added");
        EventStream { rx }
    }

    /// Deliver `event` to every live subscriber, FIFO per subscriber.
    /// Closed subscribers are pruned on the way through.
    pub fn publish(&self, event: &CustodianEvent) {
        let mut subs = self.subscribers.lock().expect("bus lock poisoned");
        subs.retain(|sub| match sub.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(subscriber = sub.id, kind = event.kind(), "event buffer full — dropping");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(subscriber = sub.id, "subscriber gone — pruning");
                false
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("bus lock poisoned").len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscriber's view of the event feed.
pub struct EventStream {
    rx: mpsc::Receiver<CustodianEvent>,
}

impl EventStream {
    /// Next event, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<CustodianEvent> {
        self.rx.recv().await
    }

    /// Non-blocking drain of whatever is already buffered.
    pub fn try_recv(&mut self) -> Option<CustodianEvent> {
        self.rx.try_recv().ok()
    }

    pub fn into_stream(self) -> ReceiverStream<CustodianEvent> {
        ReceiverStream::new(self.rx)
    }
}
