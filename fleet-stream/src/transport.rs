//! Transport seam consumed by the engine.
//!
//! The connection manager behind [`BusTransport`] owns the physical link,
//! including retry/backoff. The engine only observes [`ConnectionStatus`]
//! transitions and never sees connection failures as errors.

use crate::SubscriptionKey;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Connection-level state reported by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Connecting,
    Reconnecting,
    Disconnected,
}

/// One inbound message handed to the engine by the transport.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub subject: String,
    pub payload: Vec<u8>,
    /// Stream sequence or KV revision, when the source carries one.
    pub revision: Option<u64>,
}

/// Opaque token identifying one open transport-level subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// Receiver for inbound messages of one open subscription.
#[async_trait]
pub trait InboundSink: Send + Sync {
    async fn on_inbound(&self, message: InboundMessage);
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("invalid subject: {0}")]
    BadSubject(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("unknown subscription handle")]
    UnknownHandle,
    #[error("transport failure: {0}")]
    Other(String),
}

/// Shared publish/subscribe bus connection.
///
/// `open` interprets the key's source type: an ephemeral subscription for
/// `Core`, a consumer parameterized by deliver policy and time window for
/// `JetStream`, a watch for `Kv`.
#[async_trait]
pub trait BusTransport: Send + Sync {
    async fn connect(&self, urls: &[String]) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;

    fn status(&self) -> ConnectionStatus;

    async fn open(
        &self,
        key: &SubscriptionKey,
        sink: Arc<dyn InboundSink>,
    ) -> Result<SubscriptionHandle, TransportError>;

    async fn close(&self, handle: SubscriptionHandle) -> Result<(), TransportError>;

    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), TransportError>;

    async fn request(
        &self,
        subject: &str,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;
}
