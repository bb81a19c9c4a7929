//! Stable event names and field formatting helpers for `tracing` output.
//!
//! Library code emits events/spans and does not unconditionally initialize a
//! global subscriber. Binaries and tests own one-time `tracing_subscriber`
//! initialization at process boundaries.

/// Event name constants used in structured log fields.
pub mod events {
    pub const SUBSCRIBE_ATTACH: &str = "subscribe_attach";
    pub const SUBSCRIBE_OPEN: &str = "subscribe_open";
    pub const SUBSCRIBE_OPEN_FAILED: &str = "subscribe_open_failed";
    pub const UNSUBSCRIBE_DETACH: &str = "unsubscribe_detach";
    pub const UNSUBSCRIBE_CLOSE: &str = "unsubscribe_close";
    pub const UNSUBSCRIBE_UNKNOWN: &str = "unsubscribe_unknown";

    pub const INGRESS_ENQUEUE: &str = "ingress_enqueue";
    pub const INGRESS_DROP_OLDEST: &str = "ingress_drop_oldest";

    pub const DISPATCH_DELIVER: &str = "dispatch_deliver";
    pub const DISPATCH_ORPHANED: &str = "dispatch_orphaned";
    pub const DISPATCH_LISTENER_FAILED: &str = "dispatch_listener_failed";

    pub const RECONNECT_SUSPEND: &str = "reconnect_suspend";
    pub const RECONNECT_REOPEN: &str = "reconnect_reopen";
    pub const RECONNECT_REOPEN_FAILED: &str = "reconnect_reopen_failed";

    pub const BUFFERS_CLEARED: &str = "buffers_cleared";
    pub const BUFFER_MEMORY_WARNING: &str = "buffer_memory_warning";

    pub const ENGINE_SHUTDOWN: &str = "engine_shutdown";
}

/// Formatting helpers for high-cardinality log fields.
pub mod fields {
    /// Bounded, lossy preview of a payload for debug events.
    pub fn format_payload_preview(payload: &[u8]) -> String {
        const PREVIEW_LEN: usize = 32;
        let preview = String::from_utf8_lossy(&payload[..payload.len().min(PREVIEW_LEN)]);
        if payload.len() > PREVIEW_LEN {
            format!("{preview}… ({} bytes)", payload.len())
        } else {
            preview.into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fields::format_payload_preview;

    #[test]
    fn long_payloads_are_truncated_with_length() {
        let preview = format_payload_preview(&[b'x'; 100]);
        assert!(preview.ends_with("(100 bytes)"));
        assert!(preview.len() < 60);
    }

    #[test]
    fn short_payloads_pass_through() {
        assert_eq!(format_payload_preview(b"ok"), "ok");
    }
}
