/********************************************************************************
 * Copyright (c) 2026 Contributors to the Fleetboard project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Engine facade: the layer between N independently-configured widgets and
//! one underlying transport connection.

use crate::buffer::store::{BufferEntry, BufferStore};
use crate::config::{validate_buffer_size, ConfigError, WidgetStreamConfig};
use crate::control_plane::reconnect::{open_with_timeout, ReplayCoordinator};
use crate::control_plane::registry::{AttachOutcome, DetachOutcome, SubscriptionRegistry};
use crate::control_plane::subscription_key::SubscriptionKey;
use crate::data_plane::dispatch::dispatch_entry;
use crate::data_plane::ingress::{IngressListener, IngressQueue};
use crate::listener::{ListenerId, StreamListener};
use crate::observability::events;
use crate::stats::{BufferStats, EngineStats, EngineTelemetry};
use crate::transport::{BusTransport, ConnectionStatus, InboundSink, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const COMPONENT: &str = "stream_engine";

/// Tunables owned by the composition root.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Ingress queue bound; overflow drops the oldest queued entry.
    pub max_queue_size: usize,
    /// Budget the buffer-store memory estimate is reported against.
    pub memory_budget_bytes: usize,
    /// Ring-buffer capacity for keys without an explicit configuration.
    pub default_buffer_size: usize,
    /// Timeout for remote subscription/consumer creation.
    pub open_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 256,
            memory_budget_bytes: 32 << 20,
            default_buffer_size: 100,
            open_timeout: Duration::from_secs(5),
        }
    }
}

/// The two session-teardown modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Pause subscriptions, retain entries, listeners and buffers; used on
    /// lightweight navigation.
    Suspend,
    /// Unsubscribe everything, clear all buffers, zero all counters; used on
    /// logout.
    Destroy,
}

/// Subscription multiplexing and buffering engine for one bus connection.
///
/// Owned explicitly by the application's composition root and shared by
/// reference; there is no ambient singleton. All state is in-memory and
/// scoped to the active session.
pub struct StreamEngine {
    name: String,
    transport: Arc<dyn BusTransport>,
    config: EngineConfig,
    registry: SubscriptionRegistry,
    queue: Arc<IngressQueue>,
    buffers: BufferStore,
    telemetry: Arc<EngineTelemetry>,
}

impl StreamEngine {
    pub fn new(name: &str, transport: Arc<dyn BusTransport>, config: EngineConfig) -> Self {
        debug!(component = COMPONENT, name, "engine created");
        Self {
            name: name.to_string(),
            transport,
            queue: Arc::new(IngressQueue::new(config.max_queue_size)),
            buffers: BufferStore::new(config.default_buffer_size, config.memory_budget_bytes),
            registry: SubscriptionRegistry::new(),
            telemetry: Arc::new(EngineTelemetry::default()),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a listener for `key`, deduplicating against structurally
    /// equal keys: the first listener opens one transport subscription, later
    /// ones share it.
    ///
    /// Open failures (bad subject, permission denial, creation timeout) leave
    /// the subscription in an errored inactive state, observable via
    /// [`stats`](Self::stats); they are never returned to the caller.
    pub async fn subscribe(
        &self,
        key: SubscriptionKey,
        listener: Arc<dyn StreamListener>,
    ) -> ListenerId {
        let canonical = key.canonical();
        let (listener_id, outcome) = self.registry.attach(&key, listener).await;

        match outcome {
            AttachOutcome::Attached => {
                debug!(
                    event = events::SUBSCRIBE_ATTACH,
                    component = COMPONENT,
                    key = %canonical,
                    listener_id = %listener_id,
                    "attached listener to existing subscription"
                );
            }
            AttachOutcome::Created => {
                debug!(
                    event = events::SUBSCRIBE_OPEN,
                    component = COMPONENT,
                    key = %canonical,
                    listener_id = %listener_id,
                    "opening transport subscription"
                );
                let sink: Arc<dyn InboundSink> = Arc::new(IngressListener::new(
                    canonical.clone(),
                    self.queue.clone(),
                    self.telemetry.clone(),
                ));

                match open_with_timeout(&self.transport, &key, sink, self.config.open_timeout)
                    .await
                {
                    Ok(handle) => {
                        if !self.registry.record_open_success(&canonical, handle).await {
                            // Every listener detached while the open was in
                            // flight; the handle is ours to close.
                            if let Err(err) = self.transport.close(handle).await {
                                warn!(
                                    event = events::UNSUBSCRIBE_CLOSE,
                                    component = COMPONENT,
                                    key = %canonical,
                                    err = %err,
                                    "unable to close orphaned handle"
                                );
                            }
                        }
                    }
                    Err(err) => {
                        self.registry
                            .record_open_failure(&canonical, err.clone())
                            .await;
                        self.telemetry.record_subscription_error();
                        warn!(
                            event = events::SUBSCRIBE_OPEN_FAILED,
                            component = COMPONENT,
                            key = %canonical,
                            err = %err,
                            "subscription open failed, entry created in errored state"
                        );
                    }
                }
            }
        }

        listener_id
    }

    /// Convenience entry point for widget configuration: validates the
    /// config, applies its buffer size, then subscribes.
    pub async fn subscribe_widget(
        &self,
        config: &WidgetStreamConfig,
        listener: Arc<dyn StreamListener>,
    ) -> Result<ListenerId, ConfigError> {
        let key = config.subscription_key()?;
        if let Some(size) = config.validated_buffer_size()? {
            self.buffers.configure(&key.canonical(), size).await;
        }
        Ok(self.subscribe(key, listener).await)
    }

    /// Detaches one listener; the transport subscription closes exactly when
    /// the last listener for its key detaches.
    ///
    /// Safe to call from inside a listener callback: dispatch iterates a
    /// snapshot, so removal takes effect after the current pass.
    pub async fn unsubscribe(&self, listener_id: &ListenerId) -> bool {
        match self.registry.detach(listener_id).await {
            DetachOutcome::Unknown => {
                warn!(
                    event = events::UNSUBSCRIBE_UNKNOWN,
                    component = COMPONENT,
                    listener_id = %listener_id,
                    "no such listener"
                );
                false
            }
            DetachOutcome::Remaining => {
                debug!(
                    event = events::UNSUBSCRIBE_DETACH,
                    component = COMPONENT,
                    listener_id = %listener_id,
                    "detached listener, subscription still referenced"
                );
                true
            }
            DetachOutcome::Closed { handle } => {
                debug!(
                    event = events::UNSUBSCRIBE_CLOSE,
                    component = COMPONENT,
                    listener_id = %listener_id,
                    "last listener detached, closing transport subscription"
                );
                if let Some(handle) = handle {
                    if let Err(err) = self.transport.close(handle).await {
                        warn!(
                            event = events::UNSUBSCRIBE_CLOSE,
                            component = COMPONENT,
                            err = %err,
                            "unable to close transport subscription"
                        );
                    }
                }
                true
            }
        }
    }

    /// One drain pass: dispatches every currently queued entry, in receipt
    /// order. Returns the number of dispatched entries.
    pub async fn pump(&self) -> usize {
        let mut dispatched = 0;
        while let Some(item) = self.queue.dequeue().await {
            if dispatch_entry(&self.registry, &self.buffers, &self.telemetry, item).await {
                dispatched += 1;
            }
        }
        dispatched
    }

    /// Deep, immutable snapshot of registry, queue and counter state.
    pub async fn stats(&self) -> EngineStats {
        let (subscription_count, subscriptions) = self.registry.snapshot().await;
        EngineStats {
            subscription_count,
            queue_size: self.queue.len().await,
            max_queue_size: self.queue.max_len(),
            messages_received: self.telemetry.messages_received(),
            messages_dropped: self.telemetry.messages_dropped(),
            subscription_errors: self.telemetry.subscription_errors(),
            last_drop_time: self.telemetry.last_drop_time(),
            subscriptions,
        }
    }

    /// Buffer-store accounting snapshot.
    pub async fn buffer_stats(&self) -> BufferStats {
        self.buffers.stats().await
    }

    /// Buffered history for one key, oldest first; used for widget initial
    /// paint.
    pub async fn buffered_entries(&self, key: &SubscriptionKey) -> Vec<BufferEntry> {
        self.buffers.entries(&key.canonical()).await
    }

    /// Creates or resizes the buffer for `key`.
    pub async fn configure_buffer(
        &self,
        key: &SubscriptionKey,
        max_size: usize,
    ) -> Result<(), ConfigError> {
        let max_size = validate_buffer_size(max_size)?;
        self.buffers.configure(&key.canonical(), max_size).await;
        Ok(())
    }

    /// Wipes the buffered history of one key, keeping its configuration.
    pub async fn clear_buffer(&self, key: &SubscriptionKey) {
        self.buffers.clear(&key.canonical()).await;
    }

    /// Empties every buffer and zeroes buffer accounting. A data reset only:
    /// subscriptions and listeners stay untouched.
    pub async fn clear_all_buffers(&self) {
        self.buffers.clear_all().await;
    }

    /// Feeds one connection-status transition from the transport into the
    /// reconnect/replay coordinator.
    pub async fn handle_connection_event(&self, status: ConnectionStatus) {
        match status {
            ConnectionStatus::Disconnected | ConnectionStatus::Reconnecting => {
                ReplayCoordinator::suspend_all(&self.registry).await;
            }
            ConnectionStatus::Connected => {
                ReplayCoordinator::resubscribe_all(
                    &self.registry,
                    &self.buffers,
                    &self.transport,
                    &self.queue,
                    &self.telemetry,
                    self.config.open_timeout,
                )
                .await;
            }
            ConnectionStatus::Connecting => {
                debug!(component = COMPONENT, "transport connecting");
            }
        }
    }

    /// Session teardown with explicit semantics: [`ShutdownMode::Suspend`]
    /// keeps everything warm, [`ShutdownMode::Destroy`] is a full reset.
    pub async fn shutdown(&self, mode: ShutdownMode) {
        match mode {
            ShutdownMode::Suspend => {
                let handles = self.registry.suspend_all().await;
                let results = futures::future::join_all(
                    handles.into_iter().map(|handle| self.transport.close(handle)),
                )
                .await;
                for err in results.into_iter().filter_map(Result::err) {
                    warn!(
                        event = events::ENGINE_SHUTDOWN,
                        component = COMPONENT,
                        err = %err,
                        "unable to close subscription during suspend"
                    );
                }
            }
            ShutdownMode::Destroy => {
                let handles = self.registry.drain_all().await;
                let results = futures::future::join_all(
                    handles.into_iter().map(|handle| self.transport.close(handle)),
                )
                .await;
                for err in results.into_iter().filter_map(Result::err) {
                    warn!(
                        event = events::ENGINE_SHUTDOWN,
                        component = COMPONENT,
                        err = %err,
                        "unable to close subscription during destroy"
                    );
                }
                self.buffers.drop_all().await;
                self.queue.clear().await;
                self.telemetry.reset();
            }
        }
        info!(
            event = events::ENGINE_SHUTDOWN,
            component = COMPONENT,
            name = %self.name,
            mode = ?mode,
            "engine shut down"
        );
    }

    /// Publish passthrough to the underlying connection.
    pub async fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.transport.publish(subject, payload).await
    }

    /// Request-reply passthrough to the underlying connection.
    pub async fn request(
        &self,
        subject: &str,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.transport.request(subject, payload, timeout).await
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.transport.status()
    }

    pub(crate) async fn wait_for_inbound(&self) {
        self.queue.wait_nonempty().await;
    }
}
