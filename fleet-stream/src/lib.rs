/********************************************************************************
 * Copyright (c) 2026 Contributors to the Fleetboard project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! # fleet-stream
//!
//! `fleet-stream` is the subscription multiplexing and buffering engine of the
//! Fleetboard live dashboard: the layer between N independently-configured
//! widgets and one underlying bus connection.
//!
//! Widgets register listeners against structural [`SubscriptionKey`]s;
//! structurally equal keys share one transport subscription. Inbound traffic
//! flows through a bounded ingress queue with drop-oldest backpressure into
//! per-key ring buffers and listener dispatch. Transport outages suspend
//! subscriptions without losing listeners; reconnects re-issue every
//! still-referenced key with its original deliver policy.
//!
//! Typical usage is API-first and remains centered on [`StreamEngine`].
//! Internal modules are organized by domain layer to keep behavior ownership
//! explicit.
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use fleet_stream::{
//!     BusTransport, ConnectionStatus, EngineConfig, InboundSink, ListenerError,
//!     StreamEngine, StreamListener, StreamUpdate, SubscriptionHandle,
//!     SubscriptionKey, TransportError,
//! };
//! # use async_trait::async_trait;
//! #
//! # struct NoopTransport;
//! #
//! # #[async_trait]
//! # impl BusTransport for NoopTransport {
//! #     async fn connect(&self, _urls: &[String]) -> Result<(), TransportError> {
//! #         Ok(())
//! #     }
//! #     async fn disconnect(&self) -> Result<(), TransportError> {
//! #         Ok(())
//! #     }
//! #     fn status(&self) -> ConnectionStatus {
//! #         ConnectionStatus::Connected
//! #     }
//! #     async fn open(
//! #         &self,
//! #         _key: &SubscriptionKey,
//! #         _sink: Arc<dyn InboundSink>,
//! #     ) -> Result<SubscriptionHandle, TransportError> {
//! #         Ok(SubscriptionHandle(0))
//! #     }
//! #     async fn close(&self, _handle: SubscriptionHandle) -> Result<(), TransportError> {
//! #         Ok(())
//! #     }
//! #     async fn publish(&self, _subject: &str, _payload: &[u8]) -> Result<(), TransportError> {
//! #         Ok(())
//! #     }
//! #     async fn request(
//! #         &self,
//! #         _subject: &str,
//! #         _payload: &[u8],
//! #         _timeout: Duration,
//! #     ) -> Result<Vec<u8>, TransportError> {
//! #         Err(TransportError::NotConnected)
//! #     }
//! # }
//! #
//! struct TemperatureWidget;
//!
//! #[async_trait]
//! impl StreamListener for TemperatureWidget {
//!     async fn on_message(&self, update: &StreamUpdate) -> Result<(), ListenerError> {
//!         println!("{}: {:?}", update.subject, update.value);
//!         Ok(())
//!     }
//! }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let transport: Arc<dyn BusTransport> = Arc::new(NoopTransport);
//! let engine = StreamEngine::new("dashboard", transport, EngineConfig::default());
//!
//! let id = engine
//!     .subscribe(SubscriptionKey::core("sensors.temp"), Arc::new(TemperatureWidget))
//!     .await;
//! assert_eq!(engine.stats().await.subscription_count, 1);
//!
//! engine.unsubscribe(&id).await;
//! assert_eq!(engine.stats().await.subscription_count, 0);
//! # });
//! ```
//!
//! ## Internal architecture map
//!
//! - API facade: outward [`StreamEngine`] surface plus config/stats types
//! - Control plane: subscription identity, refcounted registry, reconnect
//!   and replay coordination
//! - Data plane: bounded ingress queue, backpressure policy, listener
//!   dispatch
//! - Buffer: per-key bounded history with byte accounting
//! - Runtime: drain-loop and status-loop spawn boundaries
//!
//! ## Observability model
//!
//! The workspace uses `tracing` for logs/events. Library code emits
//! events/spans and does not unconditionally initialize a global subscriber.
//! Binaries and tests are responsible for one-time `tracing_subscriber`
//! initialization at process boundaries.

mod buffer;
pub use buffer::BufferEntry;

mod config;
pub use config::{
    parse_time_window, validate_buffer_size, ConfigError, WidgetStreamConfig, MAX_BUFFER_SIZE,
    MIN_BUFFER_SIZE,
};

mod control_plane;
pub use control_plane::subscription_key::{
    CanonicalKey, DeliverPolicy, SourceType, SubscriptionKey,
};

mod data_plane;

mod engine;
pub use engine::{EngineConfig, ShutdownMode, StreamEngine};

mod extract;
pub use extract::{extract_value, ExtractedValue};

mod listener;
pub use listener::{ListenerError, ListenerId, StreamListener, StreamUpdate};

#[doc(hidden)]
pub mod observability;

pub mod runtime;

mod stats;
pub use stats::{BufferStats, EngineStats, SubscriptionSnapshot};

mod transport;
pub use transport::{
    BusTransport, ConnectionStatus, InboundMessage, InboundSink, SubscriptionHandle,
    TransportError,
};
