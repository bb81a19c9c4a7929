//! Widget configuration ingestion and validation.
//!
//! Per-widget stream configuration arrives as camelCase JSON from the
//! dashboard layer. Configuration is the one place failures are actionable by
//! the caller, so parse/validation errors surface as [`ConfigError`] instead
//! of telemetry.

use crate::control_plane::subscription_key::{DeliverPolicy, SourceType, SubscriptionKey};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const MIN_BUFFER_SIZE: usize = 10;
pub const MAX_BUFFER_SIZE: usize = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("subject must not be empty")]
    EmptySubject,
    #[error("invalid time window literal {literal:?}")]
    InvalidTimeWindow { literal: String },
    #[error("deliver policy by_start_time requires a time window")]
    MissingTimeWindow,
    #[error("buffer size {0} outside allowed range {MIN_BUFFER_SIZE}..={MAX_BUFFER_SIZE}")]
    BufferSizeOutOfRange(usize),
}

/// Stream configuration of one dashboard widget.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetStreamConfig {
    pub subject: String,
    pub source_type: SourceType,
    #[serde(default)]
    pub deliver_policy: Option<DeliverPolicy>,
    /// Duration literal such as "30s", "10m", "1h", "24h".
    #[serde(default)]
    pub time_window: Option<String>,
    #[serde(default)]
    pub json_path: Option<String>,
    #[serde(default)]
    pub buffer_size: Option<usize>,
}

impl WidgetStreamConfig {
    /// Builds the structural subscription key for this widget.
    ///
    /// The deliver policy and time window are normalized so that structurally
    /// equivalent widget configurations share one subscription: core and KV
    /// sources ignore a configured policy (fixed to new-only and
    /// last-per-subject respectively), streams default to new-only, and a
    /// time window only survives into the key for `by_start_time` — the one
    /// policy that consumes it.
    pub fn subscription_key(&self) -> Result<SubscriptionKey, ConfigError> {
        if self.subject.trim().is_empty() {
            return Err(ConfigError::EmptySubject);
        }

        let deliver_policy = match self.source_type {
            SourceType::Core => DeliverPolicy::New,
            SourceType::Kv => DeliverPolicy::LastPerSubject,
            SourceType::JetStream => self.deliver_policy.unwrap_or(DeliverPolicy::New),
        };

        let time_window = match (deliver_policy, &self.time_window) {
            (DeliverPolicy::ByStartTime, Some(literal)) => Some(parse_time_window(literal)?),
            (DeliverPolicy::ByStartTime, None) => return Err(ConfigError::MissingTimeWindow),
            _ => None,
        };

        Ok(SubscriptionKey {
            subject: self.subject.clone(),
            source: self.source_type,
            deliver_policy,
            time_window,
            json_path: self.json_path.clone(),
        })
    }

    /// Buffer size for this widget, validated against the allowed range.
    pub fn validated_buffer_size(&self) -> Result<Option<usize>, ConfigError> {
        self.buffer_size.map(validate_buffer_size).transpose()
    }
}

/// Parses duration literals of the form `<number><unit>` with unit one of
/// `s`, `m`, `h`, `d`.
pub fn parse_time_window(literal: &str) -> Result<Duration, ConfigError> {
    let trimmed = literal.trim();
    let invalid = || ConfigError::InvalidTimeWindow {
        literal: literal.to_string(),
    };

    let unit_at = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (digits, unit) = trimmed.split_at(unit_at);
    let amount: u64 = digits.parse().map_err(|_| invalid())?;
    if amount == 0 {
        return Err(invalid());
    }

    let seconds = match unit {
        "s" => amount,
        "m" => amount * 60,
        "h" => amount * 3600,
        "d" => amount * 86_400,
        _ => return Err(invalid()),
    };
    Ok(Duration::from_secs(seconds))
}

/// Validates a buffer size against the allowed `[10, 1000]` range.
pub fn validate_buffer_size(size: usize) -> Result<usize, ConfigError> {
    if (MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&size) {
        Ok(size)
    } else {
        Err(ConfigError::BufferSizeOutOfRange(size))
    }
}
