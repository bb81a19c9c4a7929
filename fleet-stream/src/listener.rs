//! Listener contract between the engine and widget-side consumers.

use crate::extract::ExtractedValue;
use async_trait::async_trait;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::time::SystemTime;
use thiserror::Error;
use uuid::Uuid;

/// Identifies one registered listener for later [`crate::StreamEngine::unsubscribe`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for ListenerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message delivered to a listener, with the extraction contract already applied.
#[derive(Clone, Debug)]
pub struct StreamUpdate {
    pub subject: String,
    pub payload: Vec<u8>,
    pub received_at: SystemTime,
    pub revision: Option<u64>,
    /// Result of applying the subscription's JSONPath-style expression.
    pub value: ExtractedValue,
}

/// Failure reported by a listener callback.
///
/// A failing listener is logged and counted, never allowed to stop delivery
/// to the remaining listeners of the same message.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Widget-side message consumer.
#[async_trait]
pub trait StreamListener: Send + Sync {
    async fn on_message(&self, update: &StreamUpdate) -> Result<(), ListenerError>;
}
