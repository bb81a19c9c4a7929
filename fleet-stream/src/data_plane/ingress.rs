//! Bounded ingress queue and the per-subscription sink adapter feeding it.
//!
//! Every inbound transport message is enqueued before dispatch, decoupling
//! transport I/O from potentially slow consumer code. Overflow drops the
//! oldest queued entry (freshest data wins) with accounting; queue length
//! never exceeds the configured maximum.

use crate::control_plane::subscription_key::CanonicalKey;
use crate::observability::events;
use crate::stats::EngineTelemetry;
use crate::transport::{InboundMessage, InboundSink};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, trace};

const COMPONENT: &str = "ingress_queue";

/// One queued inbound message, tagged with its owning subscription key.
#[derive(Clone, Debug)]
pub(crate) struct QueuedInbound {
    pub(crate) key: CanonicalKey,
    pub(crate) subject: String,
    pub(crate) payload: Vec<u8>,
    pub(crate) revision: Option<u64>,
    pub(crate) received_at: SystemTime,
}

/// Bounded FIFO between transport callbacks and dispatch.
pub(crate) struct IngressQueue {
    max_len: usize,
    entries: Mutex<VecDeque<QueuedInbound>>,
    notify: Notify,
}

impl IngressQueue {
    pub(crate) fn new(max_len: usize) -> Self {
        Self {
            max_len,
            entries: Mutex::new(VecDeque::with_capacity(max_len)),
            notify: Notify::new(),
        }
    }

    pub(crate) fn max_len(&self) -> usize {
        self.max_len
    }

    /// Enqueues one entry, returning the dropped oldest entry on overflow.
    pub(crate) async fn enqueue(&self, item: QueuedInbound) -> Option<QueuedInbound> {
        let dropped = {
            let mut entries = self.entries.lock().await;
            let dropped = if entries.len() == self.max_len {
                entries.pop_front()
            } else {
                None
            };
            entries.push_back(item);
            dropped
        };
        self.notify.notify_one();
        dropped
    }

    pub(crate) async fn dequeue(&self) -> Option<QueuedInbound> {
        self.entries.lock().await.pop_front()
    }

    pub(crate) async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub(crate) async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    /// Resolves once at least one enqueue happened since the last wait.
    pub(crate) async fn wait_nonempty(&self) {
        self.notify.notified().await;
    }
}

/// Sink adapter bound to one open transport subscription.
///
/// Holds the canonical key so dispatch can resolve the owning subscription
/// without consulting the transport.
pub(crate) struct IngressListener {
    key: CanonicalKey,
    queue: Arc<IngressQueue>,
    telemetry: Arc<EngineTelemetry>,
}

impl IngressListener {
    pub(crate) fn new(
        key: CanonicalKey,
        queue: Arc<IngressQueue>,
        telemetry: Arc<EngineTelemetry>,
    ) -> Self {
        Self {
            key,
            queue,
            telemetry,
        }
    }
}

#[async_trait]
impl InboundSink for IngressListener {
    async fn on_inbound(&self, message: InboundMessage) {
        trace!(
            event = events::INGRESS_ENQUEUE,
            component = COMPONENT,
            key = %self.key,
            subject = %message.subject,
            "enqueueing inbound message"
        );

        let dropped = self
            .queue
            .enqueue(QueuedInbound {
                key: self.key.clone(),
                subject: message.subject,
                payload: message.payload,
                revision: message.revision,
                received_at: SystemTime::now(),
            })
            .await;

        if let Some(dropped) = dropped {
            self.telemetry.record_drop();
            debug!(
                event = events::INGRESS_DROP_OLDEST,
                component = COMPONENT,
                key = %dropped.key,
                subject = %dropped.subject,
                "queue full, dropped oldest entry"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{IngressListener, IngressQueue, QueuedInbound};
    use crate::control_plane::subscription_key::SubscriptionKey;
    use crate::stats::EngineTelemetry;
    use crate::transport::{InboundMessage, InboundSink};
    use std::sync::Arc;
    use std::time::SystemTime;

    fn queued(i: u8) -> QueuedInbound {
        QueuedInbound {
            key: SubscriptionKey::core("sensors.temp").canonical(),
            subject: "sensors.temp".to_string(),
            payload: vec![i],
            revision: None,
            received_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_never_exceeds_max() {
        let queue = IngressQueue::new(3);

        assert!(queue.enqueue(queued(0)).await.is_none());
        assert!(queue.enqueue(queued(1)).await.is_none());
        assert!(queue.enqueue(queued(2)).await.is_none());

        let dropped = queue.enqueue(queued(3)).await.expect("oldest dropped");
        assert_eq!(dropped.payload, vec![0]);
        assert_eq!(queue.len().await, 3);

        let front = queue.dequeue().await.expect("entry");
        assert_eq!(front.payload, vec![1]);
    }

    #[tokio::test]
    async fn listener_counts_drops_in_telemetry() {
        let queue = Arc::new(IngressQueue::new(2));
        let telemetry = Arc::new(EngineTelemetry::default());
        let listener = IngressListener::new(
            SubscriptionKey::core("sensors.temp").canonical(),
            queue.clone(),
            telemetry.clone(),
        );

        for i in 0..5u8 {
            listener
                .on_inbound(InboundMessage {
                    subject: "sensors.temp".to_string(),
                    payload: vec![i],
                    revision: None,
                })
                .await;
        }

        assert_eq!(queue.len().await, 2);
        assert_eq!(telemetry.messages_dropped(), 3);
        assert!(telemetry.last_drop_time().is_some());
    }

    #[tokio::test]
    async fn wait_nonempty_sees_enqueues_that_raced_ahead() {
        let queue = IngressQueue::new(4);
        queue.enqueue(queued(0)).await;

        // The stored permit means a pre-wait enqueue is never missed.
        queue.wait_nonempty().await;
        assert_eq!(queue.len().await, 1);
    }
}
