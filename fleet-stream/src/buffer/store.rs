//! Per-key ring buffers with size and byte accounting.

use crate::control_plane::subscription_key::CanonicalKey;
use crate::observability::events;
use crate::stats::{BufferStats, MEMORY_WARNING_THRESHOLD_PERCENT};
use std::collections::{HashMap, VecDeque};
use std::time::SystemTime;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const COMPONENT: &str = "buffer_store";

/// Fixed per-entry overhead added to the payload/subject bytes when
/// estimating memory use.
const ENTRY_OVERHEAD_BYTES: usize = 64;

/// One buffered message.
#[derive(Clone, Debug)]
pub struct BufferEntry {
    pub subject: String,
    pub payload: Vec<u8>,
    pub received_at: SystemTime,
    pub revision: Option<u64>,
}

impl BufferEntry {
    fn estimated_bytes(&self) -> usize {
        self.subject.len() + self.payload.len() + ENTRY_OVERHEAD_BYTES
    }
}

#[derive(Debug)]
struct RingBuffer {
    max_size: usize,
    entries: VecDeque<BufferEntry>,
    byte_estimate: usize,
}

impl RingBuffer {
    fn new(max_size: usize) -> Self {
        Self {
            max_size,
            entries: VecDeque::with_capacity(max_size.min(64)),
            byte_estimate: 0,
        }
    }

    /// Appends one entry, evicting the oldest when full. The byte estimate is
    /// maintained incrementally; no rescans.
    fn push(&mut self, entry: BufferEntry) {
        if self.entries.len() == self.max_size {
            if let Some(evicted) = self.entries.pop_front() {
                self.byte_estimate -= evicted.estimated_bytes();
            }
        }
        self.byte_estimate += entry.estimated_bytes();
        self.entries.push_back(entry);
    }

    fn resize(&mut self, max_size: usize) {
        self.max_size = max_size;
        while self.entries.len() > self.max_size {
            if let Some(evicted) = self.entries.pop_front() {
                self.byte_estimate -= evicted.estimated_bytes();
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.byte_estimate = 0;
    }
}

/// Bounded history store keyed by canonical subscription key.
pub(crate) struct BufferStore {
    default_max_size: usize,
    memory_budget_bytes: usize,
    buffers: Mutex<HashMap<CanonicalKey, RingBuffer>>,
}

impl BufferStore {
    pub(crate) fn new(default_max_size: usize, memory_budget_bytes: usize) -> Self {
        Self {
            default_max_size,
            memory_budget_bytes,
            buffers: Mutex::new(HashMap::new()),
        }
    }

    /// Creates or resizes the buffer for `key`.
    ///
    /// `max_size` is validated to `[10, 1000]` by the configuration layer
    /// before it reaches this store.
    pub(crate) async fn configure(&self, key: &CanonicalKey, max_size: usize) {
        let mut buffers = self.buffers.lock().await;
        match buffers.get_mut(key) {
            Some(buffer) => buffer.resize(max_size),
            None => {
                buffers.insert(key.clone(), RingBuffer::new(max_size));
            }
        }
    }

    /// Appends one entry, creating a default-sized buffer on first use.
    pub(crate) async fn push(&self, key: &CanonicalKey, entry: BufferEntry) {
        let mut buffers = self.buffers.lock().await;
        buffers
            .entry(key.clone())
            .or_insert_with(|| RingBuffer::new(self.default_max_size))
            .push(entry);
    }

    /// Owned snapshot of one buffer's contents, oldest first.
    pub(crate) async fn entries(&self, key: &CanonicalKey) -> Vec<BufferEntry> {
        let buffers = self.buffers.lock().await;
        buffers
            .get(key)
            .map(|buffer| buffer.entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Wipes one buffer, keeping its configuration.
    pub(crate) async fn clear(&self, key: &CanonicalKey) {
        let mut buffers = self.buffers.lock().await;
        if let Some(buffer) = buffers.get_mut(key) {
            buffer.clear();
        }
    }

    /// Empties every buffer and zeroes the accounting. A data reset only:
    /// subscriptions and listeners are untouched.
    pub(crate) async fn clear_all(&self) {
        let mut buffers = self.buffers.lock().await;
        for buffer in buffers.values_mut() {
            buffer.clear();
        }
        debug!(
            event = events::BUFFERS_CLEARED,
            component = COMPONENT,
            buffer_count = buffers.len(),
            "cleared all buffers"
        );
    }

    /// Drops every buffer entirely; used by destroy-mode shutdown.
    pub(crate) async fn drop_all(&self) {
        self.buffers.lock().await.clear();
    }

    pub(crate) async fn stats(&self) -> BufferStats {
        let buffers = self.buffers.lock().await;
        let total_buffered_count = buffers.values().map(|b| b.entries.len()).sum();
        let memory_estimate_bytes: usize = buffers.values().map(|b| b.byte_estimate).sum();
        let memory_usage_percent = if self.memory_budget_bytes == 0 {
            0.0
        } else {
            memory_estimate_bytes as f64 / self.memory_budget_bytes as f64 * 100.0
        };

        let memory_warning = if memory_usage_percent >= MEMORY_WARNING_THRESHOLD_PERCENT {
            let warning = format!(
                "buffer memory at {memory_usage_percent:.1}% of {} byte budget",
                self.memory_budget_bytes
            );
            warn!(
                event = events::BUFFER_MEMORY_WARNING,
                component = COMPONENT,
                memory_estimate_bytes,
                memory_budget_bytes = self.memory_budget_bytes,
                "{warning}"
            );
            Some(warning)
        } else {
            None
        };

        BufferStats {
            active_buffer_count: buffers.len(),
            total_buffered_count,
            memory_estimate_bytes,
            memory_budget_bytes: self.memory_budget_bytes,
            memory_usage_percent,
            memory_warning,
        }
    }
}
