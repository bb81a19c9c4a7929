//! Read-only observability snapshots and the counters behind them.
//!
//! Snapshots are deep owned values, never aliases of live engine state; a
//! change-notification layer, if any, belongs to the UI boundary.

use crate::control_plane::subscription_key::SourceType;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::SystemTime;

/// One subscription as reported by [`crate::StreamEngine::stats`].
#[derive(Clone, Debug, Serialize)]
pub struct SubscriptionSnapshot {
    pub key: String,
    pub subject: String,
    pub source: SourceType,
    pub listener_count: usize,
    pub error: Option<String>,
    pub is_active: bool,
    pub created_at: SystemTime,
}

/// Deep snapshot of registry, queue, and counter state.
#[derive(Clone, Debug, Serialize)]
pub struct EngineStats {
    /// Count of currently-active subscriptions.
    pub subscription_count: usize,
    pub queue_size: usize,
    pub max_queue_size: usize,
    pub messages_received: u64,
    pub messages_dropped: u64,
    pub subscription_errors: u64,
    pub last_drop_time: Option<SystemTime>,
    pub subscriptions: Vec<SubscriptionSnapshot>,
}

/// Buffer-store accounting snapshot.
#[derive(Clone, Debug, Serialize)]
pub struct BufferStats {
    pub active_buffer_count: usize,
    /// Sum of entry counts across all buffers.
    pub total_buffered_count: usize,
    pub memory_estimate_bytes: usize,
    pub memory_budget_bytes: usize,
    pub memory_usage_percent: f64,
    /// Set once usage crosses the warning threshold.
    pub memory_warning: Option<String>,
}

pub(crate) const MEMORY_WARNING_THRESHOLD_PERCENT: f64 = 80.0;

/// Monotone event counters shared across the ingress, dispatch, and registry
/// paths.
#[derive(Debug, Default)]
pub(crate) struct EngineTelemetry {
    messages_received: AtomicU64,
    messages_dropped: AtomicU64,
    subscription_errors: AtomicU64,
    last_drop: Mutex<Option<SystemTime>>,
}

impl EngineTelemetry {
    pub(crate) fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drop(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
        *self.last_drop.lock().expect("last_drop lock poisoned") = Some(SystemTime::now());
    }

    pub(crate) fn record_subscription_error(&self) {
        self.subscription_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub(crate) fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn subscription_errors(&self) -> u64 {
        self.subscription_errors.load(Ordering::Relaxed)
    }

    pub(crate) fn last_drop_time(&self) -> Option<SystemTime> {
        *self.last_drop.lock().expect("last_drop lock poisoned")
    }

    /// Full session reset; used only by destroy-mode shutdown.
    pub(crate) fn reset(&self) {
        self.messages_received.store(0, Ordering::Relaxed);
        self.messages_dropped.store(0, Ordering::Relaxed);
        self.subscription_errors.store(0, Ordering::Relaxed);
        *self.last_drop.lock().expect("last_drop lock poisoned") = None;
    }
}
