use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::event::EventType;

/// Derive a content-addressed event id from (timestamp, type, payload).
///
/// serde_json maps are ordered by key, so `to_string` is a canonical
/// form for equal payloads.
pub fn event_id(created_at: &DateTime<Utc>, event_type: &EventType, data: &Value) -> String {
    let timestamp = created_at.to_rfc3339_opts(SecondsFormat::Nanos, true);
    let payload = data.to_string();

    let mut hasher = Sha256::new();
    hasher.update(timestamp.as_bytes());
    hasher.update(b"|");
    hasher.update(event_type.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(payload.as_bytes());

    let digest = hasher.finalize();
    hex_prefix(&digest, 8)
}

fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    let mut out = String::with_capacity(chars);
    for byte in bytes {
        out.push_str(&format!("{:02x}", byte));
        if out.len() >= chars {
            break;
        }
    }
    out.truncate(chars);
    out
}

/// Strip control characters from free text before it reaches a journal.
/// Newlines and tabs survive; everything else below 0x20 (and DEL) is
/// dropped so records stay one line each.
pub fn sanitize_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_event_id_deterministic() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let data = json!({"text": "hello"});
        let a = event_id(&ts, &EventType::Captured, &data);
        let b = event_id(&ts, &EventType::Captured, &data);
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn test_event_id_varies_by_type() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let data = json!({"text": "hello"});
        let a = event_id(&ts, &EventType::Captured, &data);
        let b = event_id(&ts, &EventType::QuestionRaised, &data);
        assert_ne!(a, b);
    }

    #[test]
    fn test_sanitize_keeps_newline_and_tab() {
        let dirty = "line\u{0000}one\nline\ttwo\u{0007}";
        assert_eq!(sanitize_control_chars(dirty), "lineone\nline\ttwo");
    }
}
