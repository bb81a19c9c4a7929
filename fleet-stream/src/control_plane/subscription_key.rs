//! Subscription identity: structural keys and their canonical map form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Which kind of bus source a subscription draws from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Core,
    JetStream,
    Kv,
}

impl Display for SourceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Core => write!(f, "core"),
            SourceType::JetStream => write!(f, "jetstream"),
            SourceType::Kv => write!(f, "kv"),
        }
    }
}

/// Replay strategy determining which historical messages a new stream
/// subscription receives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverPolicy {
    All,
    Last,
    LastPerSubject,
    New,
    ByStartTime,
}

impl DeliverPolicy {
    /// Whether re-issuing a subscription with this policy replays history
    /// the engine may already hold buffered.
    pub(crate) fn replays_history(&self) -> bool {
        !matches!(self, DeliverPolicy::New)
    }
}

impl Display for DeliverPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DeliverPolicy::All => write!(f, "all"),
            DeliverPolicy::Last => write!(f, "last"),
            DeliverPolicy::LastPerSubject => write!(f, "last_per_subject"),
            DeliverPolicy::New => write!(f, "new"),
            DeliverPolicy::ByStartTime => write!(f, "by_start_time"),
        }
    }
}

/// Structural identity of one underlying subscription.
///
/// Two widgets whose configuration produces an equal key share one transport
/// subscription. Compared by value, never by reference; all map lookups go
/// through [`SubscriptionKey::canonical`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub subject: String,
    pub source: SourceType,
    pub deliver_policy: DeliverPolicy,
    pub time_window: Option<Duration>,
    pub json_path: Option<String>,
}

impl SubscriptionKey {
    /// Ephemeral core pub/sub subscription.
    pub fn core(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            source: SourceType::Core,
            deliver_policy: DeliverPolicy::New,
            time_window: None,
            json_path: None,
        }
    }

    /// Persistent-stream consumer with an explicit deliver policy.
    pub fn jet_stream(subject: impl Into<String>, deliver_policy: DeliverPolicy) -> Self {
        Self {
            subject: subject.into(),
            source: SourceType::JetStream,
            deliver_policy,
            time_window: None,
            json_path: None,
        }
    }

    /// Key-value watch on a key or prefix.
    pub fn kv(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            source: SourceType::Kv,
            deliver_policy: DeliverPolicy::LastPerSubject,
            time_window: None,
            json_path: None,
        }
    }

    pub fn with_time_window(mut self, window: Duration) -> Self {
        self.time_window = Some(window);
        self
    }

    pub fn with_json_path(mut self, path: impl Into<String>) -> Self {
        self.json_path = Some(path.into());
        self
    }

    /// Stable canonical form used as the map key for dedup.
    pub fn canonical(&self) -> CanonicalKey {
        let window = match self.time_window {
            Some(window) => format!("{}s", window.as_secs()),
            None => "-".to_string(),
        };
        let path = self.json_path.as_deref().unwrap_or("-");
        CanonicalKey(format!(
            "{}|{}|{}|{}|{}",
            self.source, self.subject, self.deliver_policy, window, path
        ))
    }
}

/// Canonicalized [`SubscriptionKey`], stable and cheap to hash.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CanonicalKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
