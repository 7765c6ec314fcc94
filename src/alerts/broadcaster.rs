use super::event::AlertEvent;
use crate::error::AlertError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub type SubscriberId = u64;

/// Delivery counters since the broadcaster started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertStats {
    pub published: u64,
    pub dispatched: u64,
    pub delivered: u64,
    pub dropped_subscribers: u64,
}

#[derive(Default)]
struct Shared {
    subscribers: RwLock<HashMap<SubscriberId, mpsc::UnboundedSender<AlertEvent>>>,
    next_id: AtomicU64,
    published: AtomicU64,
    dispatched: AtomicU64,
    delivered: AtomicU64,
    dropped_subscribers: AtomicU64,
}

impl Shared {
    fn remove(&self, id: SubscriberId) -> bool {
        self.subscribers.write().remove(&id).is_some()
    }

    /// Push one event to everyone subscribed right now
    fn dispatch(&self, event: &AlertEvent) {
        let mut failed = Vec::new();
        let mut delivered = 0u64;

        {
            let subscribers = self.subscribers.read();
            for (id, sender) in subscribers.iter() {
                if sender.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    failed.push(*id);
                }
            }
        }

        if !failed.is_empty() {
            let mut subscribers = self.subscribers.write();
            for id in &failed {
                if subscribers.remove(id).is_some() {
                    debug!("Dropped alert subscriber {} after failed send", id);
                    self.dropped_subscribers.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.delivered.fetch_add(delivered, Ordering::Relaxed);
        debug!(
            "Dispatched alert for incident {} to {} subscribers",
            event.incident_id, delivered
        );
    }
}

/// Ordered, best-effort fan-out of [`AlertEvent`]s to connected subscribers.
///
/// Producers enqueue with [`publish`](Self::publish), which never waits. A
/// single dispatch task drains the queue in FIFO order and hands each event to
/// the subscribers present at that moment. There is no replay for late
/// subscribers and no retry for failed ones.
#[derive(Clone)]
pub struct AlertBroadcaster {
    queue: mpsc::UnboundedSender<AlertEvent>,
    shared: Arc<Shared>,
}

impl AlertBroadcaster {
    /// Create the broadcaster and spawn its dispatch task
    pub fn start(cancel: CancellationToken) -> (Self, JoinHandle<()>) {
        let (queue, queue_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());

        let task = tokio::spawn(dispatch_loop(queue_rx, Arc::clone(&shared), cancel));

        (Self { queue, shared }, task)
    }

    /// Enqueue an event for delivery without blocking
    pub fn publish(&self, event: AlertEvent) -> Result<(), AlertError> {
        info!("Alert: {}", event.description());
        self.queue
            .send(event)
            .map_err(|_| AlertError::DispatcherClosed)?;
        self.shared.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Register a new subscriber; it only sees events dispatched from now on
    pub fn subscribe(&self) -> AlertSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.shared.subscribers.write().insert(id, tx);
        debug!("Alert subscriber {} connected", id);

        AlertSubscription {
            id,
            receiver: rx,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Remove a subscriber; returns false if it was already gone
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.shared.remove(id);
        if removed {
            debug!("Alert subscriber {} disconnected", id);
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.read().len()
    }

    pub fn stats(&self) -> AlertStats {
        AlertStats {
            published: self.shared.published.load(Ordering::Relaxed),
            dispatched: self.shared.dispatched.load(Ordering::Relaxed),
            delivered: self.shared.delivered.load(Ordering::Relaxed),
            dropped_subscribers: self.shared.dropped_subscribers.load(Ordering::Relaxed),
        }
    }
}

async fn dispatch_loop(
    mut queue: mpsc::UnboundedReceiver<AlertEvent>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    info!("Alert dispatcher started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            }
            event = queue.recv() => {
                match event {
                    Some(event) => shared.dispatch(&event),
                    None => break,
                }
            }
        }
    }

    let pending = {
        queue.close();
        let mut n = 0usize;
        while queue.try_recv().is_ok() {
            n += 1;
        }
        n
    };
    if pending > 0 {
        warn!("Alert dispatcher stopped with {} undelivered alerts", pending);
    }
    info!("Alert dispatcher stopped");
}

/// Receiving end of one subscriber; dropping it unsubscribes
pub struct AlertSubscription {
    id: SubscriberId,
    receiver: mpsc::UnboundedReceiver<AlertEvent>,
    shared: Weak<Shared>,
}

impl AlertSubscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next alert; `None` once unsubscribed or the broadcaster is gone
    pub async fn recv(&mut self) -> Option<AlertEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<AlertEvent> {
        self.receiver.try_recv().ok()
    }

    /// Take the receiver while leaving the registration in place
    #[cfg(test)]
    pub(crate) fn detach(mut self) -> mpsc::UnboundedReceiver<AlertEvent> {
        self.shared = Weak::new();
        let (_tx, placeholder) = mpsc::unbounded_channel();
        std::mem::replace(&mut self.receiver, placeholder)
    }
}

impl Drop for AlertSubscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.remove(self.id);
        }
    }
}
