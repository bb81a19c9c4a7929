//! JSONPath-style value extraction applied at dispatch.
//!
//! Contract: a missing path on a well-formed payload yields no value (the UI
//! renders a placeholder); a payload that is not valid JSON is treated as an
//! opaque string value, never as an error.

use serde_json::Value;

/// Result of applying a subscription's extraction expression to one payload.
#[derive(Clone, Debug, PartialEq)]
pub enum ExtractedValue {
    /// Well-formed JSON, but the path matched nothing.
    Missing,
    /// Payload was not valid JSON; carried through as an opaque string.
    Text(String),
    Json(Value),
}

/// Applies a dotted-path expression (optional leading `$.`, `[n]` index
/// segments) to a raw payload.
pub fn extract_value(payload: &[u8], path: Option<&str>) -> ExtractedValue {
    let Ok(parsed) = serde_json::from_slice::<Value>(payload) else {
        return ExtractedValue::Text(String::from_utf8_lossy(payload).into_owned());
    };

    let Some(path) = path else {
        return ExtractedValue::Json(parsed);
    };

    match walk(&parsed, path) {
        Some(value) => ExtractedValue::Json(value.clone()),
        None => ExtractedValue::Missing,
    }
}

fn walk<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.strip_prefix("$.").or_else(|| path.strip_prefix('$')).unwrap_or(path);
    if path.is_empty() {
        return Some(root);
    }

    let mut current = root;
    for segment in path.split('.') {
        let (name, indexes) = split_indexes(segment)?;
        if !name.is_empty() {
            current = current.get(name)?;
        }
        for index in indexes {
            current = current.get(index)?;
        }
    }
    Some(current)
}

/// Splits `readings[0][1]` into `("readings", [0, 1])`.
fn split_indexes(segment: &str) -> Option<(&str, Vec<usize>)> {
    let Some(bracket) = segment.find('[') else {
        return Some((segment, Vec::new()));
    };

    let (name, mut rest) = segment.split_at(bracket);
    let mut indexes = Vec::new();
    while !rest.is_empty() {
        let inner = rest.strip_prefix('[')?;
        let close = inner.find(']')?;
        indexes.push(inner[..close].parse().ok()?);
        rest = &inner[close + 1..];
    }
    Some((name, indexes))
}

#[cfg(test)]
mod tests {
    use super::{extract_value, ExtractedValue};
    use serde_json::json;

    #[test]
    fn extracts_nested_fields() {
        let payload = br#"{"battery":{"level":87,"charging":false}}"#;

        assert_eq!(
            extract_value(payload, Some("$.battery.level")),
            ExtractedValue::Json(json!(87))
        );
        assert_eq!(
            extract_value(payload, Some("battery.charging")),
            ExtractedValue::Json(json!(false))
        );
    }

    #[test]
    fn extracts_array_indexes() {
        let payload = br#"{"readings":[[1,2],[3,4]]}"#;

        assert_eq!(
            extract_value(payload, Some("readings[1][0]")),
            ExtractedValue::Json(json!(3))
        );
    }

    #[test]
    fn missing_path_yields_no_value_not_an_error() {
        let payload = br#"{"battery":{"level":87}}"#;

        assert_eq!(
            extract_value(payload, Some("$.battery.voltage")),
            ExtractedValue::Missing
        );
        assert_eq!(
            extract_value(payload, Some("$.readings[3]")),
            ExtractedValue::Missing
        );
    }

    #[test]
    fn non_json_payload_is_an_opaque_string() {
        let value = extract_value(b"ONLINE", Some("$.anything"));
        assert_eq!(value, ExtractedValue::Text("ONLINE".to_string()));
    }

    #[test]
    fn no_path_passes_the_whole_document_through() {
        let payload = br#"{"ok":true}"#;
        assert_eq!(
            extract_value(payload, None),
            ExtractedValue::Json(json!({"ok": true}))
        );
    }
}
