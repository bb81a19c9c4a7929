//! Reconnect & replay coordination.
//!
//! On transport disconnect every subscription is suspended but retained. On
//! reconnect, every key still holding listeners is re-issued with its
//! original deliver policy; a widget configured for full history replay gets
//! full replay again, one configured for new-only data misses the outage gap
//! by design. Connection retry/backoff belongs to the transport, never here.

use crate::buffer::store::BufferStore;
use crate::control_plane::registry::SubscriptionRegistry;
use crate::control_plane::subscription_key::SubscriptionKey;
use crate::data_plane::ingress::{IngressListener, IngressQueue};
use crate::observability::events;
use crate::stats::EngineTelemetry;
use crate::transport::{BusTransport, InboundSink, SubscriptionHandle, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

const COMPONENT: &str = "reconnect";

/// Opens one transport subscription, folding the creation timeout into the
/// error message recorded on the entry.
pub(crate) async fn open_with_timeout(
    transport: &Arc<dyn BusTransport>,
    key: &SubscriptionKey,
    sink: Arc<dyn InboundSink>,
    open_timeout: Duration,
) -> Result<SubscriptionHandle, String> {
    match timeout(open_timeout, transport.open(key, sink)).await {
        Ok(Ok(handle)) => Ok(handle),
        Ok(Err(err)) => Err(err.to_string()),
        Err(_) => Err(TransportError::Timeout(open_timeout).to_string()),
    }
}

pub(crate) struct ReplayCoordinator;

impl ReplayCoordinator {
    /// Suspends every subscription, discarding handles the broken connection
    /// already invalidated. Returns the number of suspended entries.
    pub(crate) async fn suspend_all(registry: &SubscriptionRegistry) -> usize {
        let handles = registry.suspend_all().await;
        debug!(
            event = events::RECONNECT_SUSPEND,
            component = COMPONENT,
            suspended = handles.len(),
            "suspended subscriptions, keeping listeners warm"
        );
        handles.len()
    }

    /// Re-issues a transport subscription for every key still holding
    /// listeners but no live handle, with its original deliver policy.
    /// Idempotent against repeated `Connected` events: already-active
    /// entries are left untouched. Failures leave the entry inactive with
    /// the error recorded; they never propagate.
    ///
    /// Keys whose policy replays history get their buffer cleared first so
    /// the replayed history is not double-counted against retained entries.
    pub(crate) async fn resubscribe_all(
        registry: &SubscriptionRegistry,
        buffers: &BufferStore,
        transport: &Arc<dyn BusTransport>,
        queue: &Arc<IngressQueue>,
        telemetry: &Arc<EngineTelemetry>,
        open_timeout: Duration,
    ) -> usize {
        let mut reactivated = 0;

        for key in registry.reopen_targets().await {
            let canonical = key.canonical();

            if key.deliver_policy.replays_history() {
                buffers.clear(&canonical).await;
            }

            let sink: Arc<dyn InboundSink> = Arc::new(IngressListener::new(
                canonical.clone(),
                queue.clone(),
                telemetry.clone(),
            ));

            match open_with_timeout(transport, &key, sink, open_timeout).await {
                Ok(handle) => {
                    if registry.record_open_success(&canonical, handle).await {
                        reactivated += 1;
                        debug!(
                            event = events::RECONNECT_REOPEN,
                            component = COMPONENT,
                            key = %canonical,
                            deliver_policy = %key.deliver_policy,
                            "re-issued subscription with original deliver policy"
                        );
                    } else if let Err(err) = transport.close(handle).await {
                        warn!(
                            event = events::RECONNECT_REOPEN,
                            component = COMPONENT,
                            key = %canonical,
                            err = %err,
                            "unable to close handle for entry detached mid-reopen"
                        );
                    }
                }
                Err(err) => {
                    registry.record_open_failure(&canonical, err.clone()).await;
                    telemetry.record_subscription_error();
                    warn!(
                        event = events::RECONNECT_REOPEN_FAILED,
                        component = COMPONENT,
                        key = %canonical,
                        err = %err,
                        "re-subscription failed, entry stays inactive"
                    );
                }
            }
        }

        reactivated
    }
}
