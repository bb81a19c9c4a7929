//! Listener dispatch: per-key ordered delivery with per-listener fault
//! isolation.

use crate::buffer::store::{BufferEntry, BufferStore};
use crate::control_plane::registry::SubscriptionRegistry;
use crate::data_plane::ingress::QueuedInbound;
use crate::extract::extract_value;
use crate::listener::StreamUpdate;
use crate::observability::{events, fields};
use crate::stats::EngineTelemetry;
use tracing::{debug, trace, warn};

const COMPONENT: &str = "dispatch";

/// Delivers one dequeued entry to the buffer store and every listener of the
/// owning subscription, in listener-registration order.
///
/// Returns `true` when the entry was dispatched (and should count as
/// received). A failing listener is logged and counted; it never stops
/// delivery to the remaining listeners or the drain loop.
pub(crate) async fn dispatch_entry(
    registry: &SubscriptionRegistry,
    buffers: &BufferStore,
    telemetry: &EngineTelemetry,
    item: QueuedInbound,
) -> bool {
    let Some(snapshot) = registry.dispatch_snapshot(&item.key).await else {
        // Unsubscribed while queued; not counted as received.
        debug!(
            event = events::DISPATCH_ORPHANED,
            component = COMPONENT,
            key = %item.key,
            subject = %item.subject,
            "dropping entry with no owning subscription"
        );
        return false;
    };

    buffers
        .push(
            &item.key,
            BufferEntry {
                subject: item.subject.clone(),
                payload: item.payload.clone(),
                received_at: item.received_at,
                revision: item.revision,
            },
        )
        .await;

    let update = StreamUpdate {
        value: extract_value(&item.payload, snapshot.json_path.as_deref()),
        subject: item.subject,
        payload: item.payload,
        received_at: item.received_at,
        revision: item.revision,
    };

    trace!(
        event = events::DISPATCH_DELIVER,
        component = COMPONENT,
        key = %item.key,
        subject = %update.subject,
        listener_count = snapshot.listeners.len(),
        payload = %fields::format_payload_preview(&update.payload),
        "delivering to listeners"
    );

    for (listener_id, listener) in &snapshot.listeners {
        if let Err(err) = listener.on_message(&update).await {
            telemetry.record_subscription_error();
            warn!(
                event = events::DISPATCH_LISTENER_FAILED,
                component = COMPONENT,
                key = %item.key,
                listener_id = %listener_id,
                err = %err,
                "listener failed, continuing with remaining listeners"
            );
        }
    }

    telemetry.record_received();
    true
}
