/********************************************************************************
 * Copyright (c) 2026 Contributors to the Fleetboard project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Test doubles for the `fleet-stream` engine: a recording, scriptable
//! [`BusTransport`] plus listener implementations that capture or fail.

use async_trait::async_trait;
use fleet_stream::{
    BusTransport, ConnectionStatus, InboundMessage, InboundSink, ListenerError, StreamListener,
    StreamUpdate, SubscriptionHandle, SubscriptionKey, TransportError,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::sync::broadcast;

static TRACING_INIT: Once = Once::new();

/// One-time `tracing_subscriber` initialization for test binaries.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_test_writer()
            .init();
    });
}

#[derive(Default)]
struct MockState {
    open_keys: Vec<SubscriptionKey>,
    close_count: usize,
    sinks: HashMap<u64, (SubscriptionKey, Arc<dyn InboundSink>)>,
    failing_subjects: HashSet<String>,
    published: Vec<(String, Vec<u8>)>,
}

/// Recording, scriptable bus transport.
///
/// Records every open/close, retains sinks so tests can inject inbound
/// messages, and can be scripted to deny subjects or change connection
/// status (broadcasting the transition for `spawn_status_loop` consumers).
pub struct MockBusTransport {
    next_handle: AtomicU64,
    state: Mutex<MockState>,
    status: Mutex<ConnectionStatus>,
    status_events: broadcast::Sender<ConnectionStatus>,
}

impl Default for MockBusTransport {
    fn default() -> Self {
        let (status_events, _) = broadcast::channel(16);
        Self {
            next_handle: AtomicU64::new(0),
            state: Mutex::new(MockState::default()),
            status: Mutex::new(ConnectionStatus::Connected),
            status_events,
        }
    }
}

impl MockBusTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Subscribes to scripted status transitions, for `spawn_status_loop`.
    pub fn status_events(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.status_events.subscribe()
    }

    /// Scripts a status transition; returns the receiver count notified.
    pub fn set_status(&self, status: ConnectionStatus) -> usize {
        *self.status.lock().expect("status lock") = status;
        self.status_events.send(status).unwrap_or(0)
    }

    /// Makes every later `open` for `subject` fail with permission denial.
    pub fn deny_subject(&self, subject: &str) {
        self.state
            .lock()
            .expect("state lock")
            .failing_subjects
            .insert(subject.to_string());
    }

    pub fn allow_subject(&self, subject: &str) {
        self.state
            .lock()
            .expect("state lock")
            .failing_subjects
            .remove(subject);
    }

    /// Every key opened so far, in open order (reopens appear again).
    pub fn opened_keys(&self) -> Vec<SubscriptionKey> {
        self.state.lock().expect("state lock").open_keys.clone()
    }

    /// Open count for one structural key.
    pub fn open_count(&self, key: &SubscriptionKey) -> usize {
        self.state
            .lock()
            .expect("state lock")
            .open_keys
            .iter()
            .filter(|k| *k == key)
            .count()
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().expect("state lock").close_count
    }

    /// Number of currently live transport subscriptions.
    pub fn live_subscription_count(&self) -> usize {
        self.state.lock().expect("state lock").sinks.len()
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.state.lock().expect("state lock").published.clone()
    }

    /// Injects one inbound message into every live subscription on `subject`.
    pub async fn emit(&self, subject: &str, payload: &[u8]) {
        self.emit_with_revision(subject, payload, None).await;
    }

    pub async fn emit_with_revision(&self, subject: &str, payload: &[u8], revision: Option<u64>) {
        let sinks: Vec<Arc<dyn InboundSink>> = {
            let state = self.state.lock().expect("state lock");
            state
                .sinks
                .values()
                .filter(|(key, _)| key.subject == subject)
                .map(|(_, sink)| sink.clone())
                .collect()
        };
        for sink in sinks {
            sink.on_inbound(InboundMessage {
                subject: subject.to_string(),
                payload: payload.to_vec(),
                revision,
            })
            .await;
        }
    }
}

#[async_trait]
impl BusTransport for MockBusTransport {
    async fn connect(&self, _urls: &[String]) -> Result<(), TransportError> {
        self.set_status(ConnectionStatus::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.set_status(ConnectionStatus::Disconnected);
        Ok(())
    }

    fn status(&self) -> ConnectionStatus {
        *self.status.lock().expect("status lock")
    }

    async fn open(
        &self,
        key: &SubscriptionKey,
        sink: Arc<dyn InboundSink>,
    ) -> Result<SubscriptionHandle, TransportError> {
        let mut state = self.state.lock().expect("state lock");
        if state.failing_subjects.contains(&key.subject) {
            return Err(TransportError::PermissionDenied(key.subject.clone()));
        }
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        state.open_keys.push(key.clone());
        state.sinks.insert(handle, (key.clone(), sink));
        Ok(SubscriptionHandle(handle))
    }

    async fn close(&self, handle: SubscriptionHandle) -> Result<(), TransportError> {
        let mut state = self.state.lock().expect("state lock");
        state.close_count += 1;
        if state.sinks.remove(&handle.0).is_none() {
            return Err(TransportError::UnknownHandle);
        }
        Ok(())
    }

    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.state
            .lock()
            .expect("state lock")
            .published
            .push((subject.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn request(
        &self,
        subject: &str,
        payload: &[u8],
        _timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        // Echo semantics are enough for engine tests.
        let _ = subject;
        Ok(payload.to_vec())
    }
}

/// Listener that records every update it receives.
#[derive(Default)]
pub struct CollectingListener {
    updates: Mutex<Vec<StreamUpdate>>,
}

impl CollectingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.updates
            .lock()
            .expect("updates lock")
            .iter()
            .map(|u| u.payload.clone())
            .collect()
    }

    pub fn updates(&self) -> Vec<StreamUpdate> {
        self.updates.lock().expect("updates lock").clone()
    }
}

#[async_trait]
impl StreamListener for CollectingListener {
    async fn on_message(&self, update: &StreamUpdate) -> Result<(), ListenerError> {
        self.updates
            .lock()
            .expect("updates lock")
            .push(update.clone());
        Ok(())
    }
}

/// Listener that fails every delivery, for fault-isolation tests.
#[derive(Default)]
pub struct FailingListener {
    calls: AtomicUsize,
}

impl FailingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamListener for FailingListener {
    async fn on_message(&self, _update: &StreamUpdate) -> Result<(), ListenerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ListenerError::new("widget render failed"))
    }
}
