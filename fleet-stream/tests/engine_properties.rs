/********************************************************************************
 * Copyright (c) 2026 Contributors to the Fleetboard project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

use async_trait::async_trait;
use fleet_stream::runtime::spawn_status_loop;
use fleet_stream::{
    ConnectionStatus, DeliverPolicy, EngineConfig, ListenerError, ListenerId, StreamEngine,
    StreamListener, StreamUpdate, SubscriptionKey,
};
use integration_test_utils::{
    init_tracing, CollectingListener, FailingListener, MockBusTransport,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

fn engine_with(config: EngineConfig) -> (Arc<StreamEngine>, Arc<MockBusTransport>) {
    init_tracing();
    let transport = MockBusTransport::new();
    let engine = Arc::new(StreamEngine::new("test", transport.clone(), config));
    (engine, transport)
}

#[tokio::test]
async fn structurally_equal_keys_share_one_transport_subscription() {
    let (engine, transport) = engine_with(EngineConfig::default());
    let key = SubscriptionKey::core("sensors.temp");

    let gauge = CollectingListener::new();
    let chart = CollectingListener::new();
    engine.subscribe(key.clone(), gauge.clone()).await;
    engine.subscribe(key.clone(), chart.clone()).await;

    assert_eq!(transport.open_count(&key), 1);
    assert_eq!(transport.live_subscription_count(), 1);

    transport.emit("sensors.temp", b"21.5").await;
    engine.pump().await;

    assert_eq!(gauge.payloads(), vec![b"21.5".to_vec()]);
    assert_eq!(chart.payloads(), vec![b"21.5".to_vec()]);
}

#[tokio::test]
async fn differing_deliver_policies_open_separate_subscriptions() {
    let (engine, transport) = engine_with(EngineConfig::default());
    let live = SubscriptionKey::jet_stream("orders.events", DeliverPolicy::New);
    let replay = SubscriptionKey::jet_stream("orders.events", DeliverPolicy::All);

    engine.subscribe(live.clone(), CollectingListener::new()).await;
    engine.subscribe(replay.clone(), CollectingListener::new()).await;

    assert_eq!(transport.open_count(&live), 1);
    assert_eq!(transport.open_count(&replay), 1);
    assert_eq!(engine.stats().await.subscription_count, 2);
}

#[tokio::test]
async fn refcounted_teardown_closes_exactly_once() {
    let (engine, transport) = engine_with(EngineConfig::default());
    let key = SubscriptionKey::core("sensors.temp");

    let ids = [
        engine.subscribe(key.clone(), CollectingListener::new()).await,
        engine.subscribe(key.clone(), CollectingListener::new()).await,
        engine.subscribe(key.clone(), CollectingListener::new()).await,
    ];

    assert!(engine.unsubscribe(&ids[0]).await);
    assert_eq!(transport.close_count(), 0);
    assert!(engine.unsubscribe(&ids[1]).await);
    assert_eq!(transport.close_count(), 0);
    assert!(engine.unsubscribe(&ids[2]).await);
    assert_eq!(transport.close_count(), 1);
    assert_eq!(transport.live_subscription_count(), 0);

    assert!(!engine.unsubscribe(&ids[2]).await);
    assert_eq!(transport.close_count(), 1);
}

#[tokio::test]
async fn bounded_buffer_keeps_most_recent_in_order() {
    let (engine, transport) = engine_with(EngineConfig::default());
    let key = SubscriptionKey::core("sensors.temp");

    engine.subscribe(key.clone(), CollectingListener::new()).await;
    engine
        .configure_buffer(&key, 10)
        .await
        .expect("valid buffer size");

    for n in 0..15u32 {
        transport
            .emit("sensors.temp", format!("m{n}").as_bytes())
            .await;
        engine.pump().await;
    }

    let entries = engine.buffered_entries(&key).await;
    assert_eq!(entries.len(), 10);
    assert_eq!(entries.first().expect("oldest").payload, b"m5");
    assert_eq!(entries.last().expect("newest").payload, b"m14");

    engine.clear_buffer(&key).await;
    assert!(engine.buffered_entries(&key).await.is_empty());
    assert_eq!(engine.stats().await.subscription_count, 1);
}

#[tokio::test]
async fn full_queue_drops_oldest_and_counts_it() {
    let (engine, transport) = engine_with(EngineConfig {
        max_queue_size: 3,
        ..EngineConfig::default()
    });
    let key = SubscriptionKey::core("sensors.temp");
    let widget = CollectingListener::new();
    engine.subscribe(key.clone(), widget.clone()).await;

    // 5 arrivals before any drain pass: the 2 oldest fall off.
    for n in 1..=5u32 {
        transport
            .emit("sensors.temp", format!("m{n}").as_bytes())
            .await;
    }

    let stats = engine.stats().await;
    assert_eq!(stats.queue_size, 3);
    assert_eq!(stats.max_queue_size, 3);
    assert_eq!(stats.messages_dropped, 2);
    assert!(stats.last_drop_time.is_some());

    engine.pump().await;
    assert_eq!(
        widget.payloads(),
        vec![b"m3".to_vec(), b"m4".to_vec(), b"m5".to_vec()]
    );
    assert_eq!(engine.stats().await.messages_received, 3);
}

#[tokio::test]
async fn listener_failure_never_starves_its_siblings() {
    let (engine, transport) = engine_with(EngineConfig::default());
    let key = SubscriptionKey::core("sensors.temp");

    let broken = FailingListener::new();
    let healthy = CollectingListener::new();
    engine.subscribe(key.clone(), broken.clone()).await;
    engine.subscribe(key.clone(), healthy.clone()).await;

    transport.emit("sensors.temp", b"m1").await;
    transport.emit("sensors.temp", b"m2").await;
    engine.pump().await;

    assert_eq!(broken.calls(), 2);
    assert_eq!(healthy.payloads(), vec![b"m1".to_vec(), b"m2".to_vec()]);

    let stats = engine.stats().await;
    assert_eq!(stats.messages_received, 2);
    assert_eq!(stats.subscription_errors, 2);
}

struct SelfCancellingListener {
    engine: Arc<StreamEngine>,
    id: StdMutex<Option<ListenerId>>,
    seen: AtomicUsize,
}

impl SelfCancellingListener {
    fn new(engine: Arc<StreamEngine>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            id: StdMutex::new(None),
            seen: AtomicUsize::new(0),
        })
    }

    fn arm(&self, id: ListenerId) {
        *self.id.lock().expect("id lock") = Some(id);
    }

    fn seen(&self) -> usize {
        self.seen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamListener for SelfCancellingListener {
    async fn on_message(&self, _update: &StreamUpdate) -> Result<(), ListenerError> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        let id = self.id.lock().expect("id lock").take();
        if let Some(id) = id {
            self.engine.unsubscribe(&id).await;
        }
        Ok(())
    }
}

#[tokio::test]
async fn unsubscribe_from_inside_a_callback_takes_effect_after_the_pass() {
    let (engine, transport) = engine_with(EngineConfig::default());
    let key = SubscriptionKey::core("sensors.temp");

    let cancelling = SelfCancellingListener::new(engine.clone());
    let sibling = CollectingListener::new();
    let id = engine.subscribe(key.clone(), cancelling.clone()).await;
    cancelling.arm(id);
    engine.subscribe(key.clone(), sibling.clone()).await;

    transport.emit("sensors.temp", b"m1").await;
    engine.pump().await;

    // The pass completed: the sibling, registered after the cancelling
    // listener, still got the same message.
    assert_eq!(cancelling.seen(), 1);
    assert_eq!(sibling.payloads(), vec![b"m1".to_vec()]);

    // Removal took effect after the pass; the subscription survives on the
    // sibling's refcount.
    let stats = engine.stats().await;
    assert_eq!(stats.subscription_count, 1);
    assert_eq!(stats.subscriptions[0].listener_count, 1);
    assert_eq!(transport.close_count(), 0);

    transport.emit("sensors.temp", b"m2").await;
    engine.pump().await;
    assert_eq!(cancelling.seen(), 1);
    assert_eq!(sibling.payloads(), vec![b"m1".to_vec(), b"m2".to_vec()]);
}

#[tokio::test]
async fn last_listener_cancelling_itself_mid_callback_closes_the_subscription() {
    let (engine, transport) = engine_with(EngineConfig::default());
    let key = SubscriptionKey::core("sensors.temp");

    let cancelling = SelfCancellingListener::new(engine.clone());
    let id = engine.subscribe(key.clone(), cancelling.clone()).await;
    cancelling.arm(id);

    transport.emit("sensors.temp", b"m1").await;
    engine.pump().await;

    assert_eq!(cancelling.seen(), 1);
    assert_eq!(transport.close_count(), 1);
    assert_eq!(transport.live_subscription_count(), 0);
    assert!(engine.stats().await.subscriptions.is_empty());
}

#[tokio::test]
async fn reconnect_reissues_keys_with_their_original_deliver_policy() {
    let (engine, transport) = engine_with(EngineConfig::default());
    let key = SubscriptionKey::jet_stream("orders.events", DeliverPolicy::All);
    let widget = CollectingListener::new();
    engine.subscribe(key.clone(), widget.clone()).await;

    transport.emit("orders.events", b"m1").await;
    engine.pump().await;
    assert_eq!(engine.buffered_entries(&key).await.len(), 1);

    engine
        .handle_connection_event(ConnectionStatus::Disconnected)
        .await;
    assert_eq!(engine.stats().await.subscription_count, 0);
    assert_eq!(transport.close_count(), 0);

    engine
        .handle_connection_event(ConnectionStatus::Connected)
        .await;

    let opened = transport.opened_keys();
    assert_eq!(opened.len(), 2);
    assert_eq!(opened[1], key);
    assert_eq!(opened[1].deliver_policy, DeliverPolicy::All);

    // Replay-from-history policy: the buffer was cleared before the reopen,
    // so the server's replay cannot double-count against stale entries.
    assert!(engine.buffered_entries(&key).await.is_empty());

    let stats = engine.stats().await;
    assert_eq!(stats.subscription_count, 1);
    assert_eq!(stats.subscriptions[0].listener_count, 1);
}

#[tokio::test]
async fn reconnect_keeps_new_policy_buffers_intact() {
    let (engine, transport) = engine_with(EngineConfig::default());
    let key = SubscriptionKey::core("sensors.temp");
    engine.subscribe(key.clone(), CollectingListener::new()).await;

    transport.emit("sensors.temp", b"m1").await;
    engine.pump().await;

    engine
        .handle_connection_event(ConnectionStatus::Reconnecting)
        .await;
    engine
        .handle_connection_event(ConnectionStatus::Connected)
        .await;

    assert_eq!(engine.buffered_entries(&key).await.len(), 1);
    assert_eq!(transport.open_count(&key), 2);
}

#[tokio::test]
async fn repeated_connected_events_never_stack_subscriptions() {
    let (engine, transport) = engine_with(EngineConfig::default());
    let key = SubscriptionKey::jet_stream("orders.events", DeliverPolicy::All);
    let widget = CollectingListener::new();
    engine.subscribe(key.clone(), widget.clone()).await;

    transport.emit("orders.events", b"m1").await;
    engine.pump().await;

    // Connected with no intervening outage, as a status feed produces on
    // connect() over an already-connected link.
    engine
        .handle_connection_event(ConnectionStatus::Connected)
        .await;
    engine
        .handle_connection_event(ConnectionStatus::Connected)
        .await;

    assert_eq!(transport.open_count(&key), 1);
    assert_eq!(transport.live_subscription_count(), 1);
    // The active entry was left untouched: no reopen, no pre-replay wipe.
    assert_eq!(engine.buffered_entries(&key).await.len(), 1);

    transport.emit("orders.events", b"m2").await;
    engine.pump().await;
    assert_eq!(widget.payloads(), vec![b"m1".to_vec(), b"m2".to_vec()]);
}

#[tokio::test]
async fn status_loop_drives_suspend_and_replay() {
    let (engine, transport) = engine_with(EngineConfig::default());
    let key = SubscriptionKey::core("sensors.temp");
    engine.subscribe(key.clone(), CollectingListener::new()).await;

    let loop_handle = spawn_status_loop(engine.clone(), transport.status_events());

    transport.set_status(ConnectionStatus::Disconnected);
    transport.set_status(ConnectionStatus::Connected);

    // The loop runs on its own task; give it a few scheduler turns.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while transport.open_count(&key) < 2 {
        assert!(tokio::time::Instant::now() < deadline, "reopen never observed");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(engine.stats().await.subscription_count, 1);
    loop_handle.abort();
}

#[tokio::test]
async fn denied_subject_surfaces_through_stats_not_errors() {
    let (engine, transport) = engine_with(EngineConfig::default());
    transport.deny_subject("secret.topic");

    engine
        .subscribe(
            SubscriptionKey::core("secret.topic"),
            CollectingListener::new(),
        )
        .await;

    let stats = engine.stats().await;
    assert_eq!(stats.subscription_count, 0);
    assert_eq!(stats.subscription_errors, 1);
    assert_eq!(stats.subscriptions.len(), 1);
    assert!(!stats.subscriptions[0].is_active);
    assert!(stats.subscriptions[0]
        .error
        .as_deref()
        .expect("open failure recorded")
        .contains("permission denied"));
}

/// End-to-end walk of the common dashboard shape: two widgets on one subject,
/// three in-order updates, a bounded history buffer.
#[tokio::test]
async fn two_widgets_share_one_subject_end_to_end() {
    let (engine, transport) = engine_with(EngineConfig::default());
    let key = SubscriptionKey::core("sensors.temp");

    let gauge = CollectingListener::new();
    let sparkline = CollectingListener::new();
    engine.subscribe(key.clone(), gauge.clone()).await;
    engine.subscribe(key.clone(), sparkline.clone()).await;
    engine
        .configure_buffer(&key, 10)
        .await
        .expect("valid buffer size");

    for payload in [b"m1".as_slice(), b"m2", b"m3"] {
        transport.emit("sensors.temp", payload).await;
    }
    engine.pump().await;

    let expected = vec![b"m1".to_vec(), b"m2".to_vec(), b"m3".to_vec()];
    assert_eq!(gauge.payloads(), expected);
    assert_eq!(sparkline.payloads(), expected);
    assert_eq!(transport.open_count(&key), 1);
    assert_eq!(engine.stats().await.messages_received, 3);
}
