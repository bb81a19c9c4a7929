//! Refcounted subscription registry: one live subscription per canonical key.

use crate::control_plane::subscription_key::{CanonicalKey, SubscriptionKey};
use crate::listener::{ListenerId, StreamListener};
use crate::stats::SubscriptionSnapshot;
use crate::transport::SubscriptionHandle;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;

/// One deduplicated subscription and its attached listeners.
///
/// The listener vector doubles as the refcount: the transport subscription is
/// torn down exactly when it becomes empty.
pub(crate) struct SubscriptionEntry {
    pub(crate) key: SubscriptionKey,
    pub(crate) handle: Option<SubscriptionHandle>,
    pub(crate) active: bool,
    pub(crate) error: Option<String>,
    pub(crate) listeners: Vec<(ListenerId, Arc<dyn StreamListener>)>,
    pub(crate) created_at: SystemTime,
}

/// Listener set snapshot used for one dispatch pass.
pub(crate) struct DispatchSnapshot {
    pub(crate) listeners: Vec<(ListenerId, Arc<dyn StreamListener>)>,
    pub(crate) json_path: Option<String>,
}

pub(crate) enum AttachOutcome {
    /// Joined an existing entry; no transport work needed.
    Attached,
    /// First listener for this key; the caller must open the subscription.
    Created,
}

pub(crate) enum DetachOutcome {
    Unknown,
    Remaining,
    /// Last listener removed; the caller must close the returned handle.
    Closed { handle: Option<SubscriptionHandle> },
}

struct RegistryState {
    entries: HashMap<CanonicalKey, SubscriptionEntry>,
    listener_index: HashMap<ListenerId, CanonicalKey>,
}

/// Map of canonical key to live subscription, with listener refcounting.
///
/// Both maps live behind one lock so the refcount invariant
/// (`|listeners| == index entries pointing here`) holds at every await point.
pub(crate) struct SubscriptionRegistry {
    state: Mutex<RegistryState>,
}

impl SubscriptionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                entries: HashMap::new(),
                listener_index: HashMap::new(),
            }),
        }
    }

    /// Attaches a listener, creating the entry on first use of its key.
    ///
    /// Created entries start inactive with no handle; the caller opens the
    /// transport subscription outside the registry lock and reports back via
    /// [`record_open_success`](Self::record_open_success) /
    /// [`record_open_failure`](Self::record_open_failure).
    pub(crate) async fn attach(
        &self,
        key: &SubscriptionKey,
        listener: Arc<dyn StreamListener>,
    ) -> (ListenerId, AttachOutcome) {
        let canonical = key.canonical();
        let listener_id = ListenerId::new();
        let mut state = self.state.lock().await;

        let outcome = match state.entries.get_mut(&canonical) {
            Some(entry) => {
                entry.listeners.push((listener_id.clone(), listener));
                AttachOutcome::Attached
            }
            None => {
                state.entries.insert(
                    canonical.clone(),
                    SubscriptionEntry {
                        key: key.clone(),
                        handle: None,
                        active: false,
                        error: None,
                        listeners: vec![(listener_id.clone(), listener)],
                        created_at: SystemTime::now(),
                    },
                );
                AttachOutcome::Created
            }
        };
        state.listener_index.insert(listener_id.clone(), canonical);
        (listener_id, outcome)
    }

    /// Marks an open attempt as succeeded.
    ///
    /// Returns `false` when the entry disappeared while the open was in
    /// flight (every listener detached); the caller must close the handle.
    pub(crate) async fn record_open_success(
        &self,
        canonical: &CanonicalKey,
        handle: SubscriptionHandle,
    ) -> bool {
        let mut state = self.state.lock().await;
        match state.entries.get_mut(canonical) {
            Some(entry) => {
                entry.handle = Some(handle);
                entry.active = true;
                entry.error = None;
                true
            }
            None => false,
        }
    }

    /// Records an open failure on the entry; the subscription stays inactive
    /// and errored but keeps its listeners.
    pub(crate) async fn record_open_failure(&self, canonical: &CanonicalKey, error: String) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.entries.get_mut(canonical) {
            entry.handle = None;
            entry.active = false;
            entry.error = Some(error);
        }
    }

    /// Detaches one listener, removing the entry at refcount zero.
    pub(crate) async fn detach(&self, listener_id: &ListenerId) -> DetachOutcome {
        let mut state = self.state.lock().await;
        let Some(canonical) = state.listener_index.remove(listener_id) else {
            return DetachOutcome::Unknown;
        };

        let Some(entry) = state.entries.get_mut(&canonical) else {
            return DetachOutcome::Unknown;
        };
        entry.listeners.retain(|(id, _)| id != listener_id);

        if entry.listeners.is_empty() {
            let entry = state
                .entries
                .remove(&canonical)
                .expect("entry present under lock");
            DetachOutcome::Closed {
                handle: entry.handle,
            }
        } else {
            DetachOutcome::Remaining
        }
    }

    /// Owned listener snapshot for one dispatch pass.
    ///
    /// Dispatch iterates this snapshot with the lock released, which makes
    /// reentrant `unsubscribe` from inside a callback safe: removal takes
    /// effect after the current pass.
    pub(crate) async fn dispatch_snapshot(
        &self,
        canonical: &CanonicalKey,
    ) -> Option<DispatchSnapshot> {
        let state = self.state.lock().await;
        state.entries.get(canonical).map(|entry| DispatchSnapshot {
            listeners: entry.listeners.clone(),
            json_path: entry.key.json_path.clone(),
        })
    }

    /// Marks every entry inactive, taking the transport handles.
    ///
    /// Listeners stay registered ("keep warm"): brief outages must not empty
    /// the UI. The caller decides whether the returned handles are still
    /// worth closing on the transport.
    pub(crate) async fn suspend_all(&self) -> Vec<SubscriptionHandle> {
        let mut state = self.state.lock().await;
        let mut handles = Vec::new();
        for entry in state.entries.values_mut() {
            entry.active = false;
            if let Some(handle) = entry.handle.take() {
                handles.push(handle);
            }
        }
        handles
    }

    /// Keys still holding listeners but no live handle, each with its
    /// original subscription key (deliver policy included) for re-issue
    /// after reconnect.
    ///
    /// Entries that are already active with a handle are skipped, so a
    /// repeated `Connected` event never stacks a second transport
    /// subscription onto a key.
    pub(crate) async fn reopen_targets(&self) -> Vec<SubscriptionKey> {
        let state = self.state.lock().await;
        state
            .entries
            .values()
            .filter(|entry| !entry.listeners.is_empty() && entry.handle.is_none())
            .map(|entry| entry.key.clone())
            .collect()
    }

    /// Removes every entry and listener, returning all open handles.
    pub(crate) async fn drain_all(&self) -> Vec<SubscriptionHandle> {
        let mut state = self.state.lock().await;
        state.listener_index.clear();
        state
            .entries
            .drain()
            .filter_map(|(_, entry)| entry.handle)
            .collect()
    }

    /// Deep snapshot: active-subscription count plus one record per entry.
    pub(crate) async fn snapshot(&self) -> (usize, Vec<SubscriptionSnapshot>) {
        let state = self.state.lock().await;
        let mut subscriptions: Vec<SubscriptionSnapshot> = state
            .entries
            .iter()
            .map(|(canonical, entry)| SubscriptionSnapshot {
                key: canonical.as_str().to_string(),
                subject: entry.key.subject.clone(),
                source: entry.key.source,
                listener_count: entry.listeners.len(),
                error: entry.error.clone(),
                is_active: entry.active,
                created_at: entry.created_at,
            })
            .collect();
        subscriptions.sort_by(|a, b| a.key.cmp(&b.key));

        let active_count = subscriptions.iter().filter(|s| s.is_active).count();
        (active_count, subscriptions)
    }
}
