//! Event normalizer - maps raw snapshot rows and stream payloads into [`Ticket`].
//!
//! Both the snapshot endpoint and the event stream deliver the backend's ticket
//! DTO, but optional fields come and go depending on which query produced it.
//! Normalization never fails on a missing optional field; it substitutes the
//! documented default. The only hard requirement is a usable `id`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::models::{DEFAULT_CUSTOMER_NAME, Message, Ticket, TicketCategory};
use crate::{Error, Result};

/// Naive date-time layouts the backend is known to emit (taken as UTC).
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Epoch values above this are milliseconds, below are seconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 100_000_000_000.0;

/// Normalize a raw ticket record, using the current time as the activity fallback.
pub fn normalize(raw: &Value) -> Result<Ticket> {
    normalize_at(raw, Utc::now())
}

/// Normalize a raw ticket record.
///
/// `received_at` is used as `last_activity_at` when the record carries neither
/// `updatedAt` nor `createdAt`.
pub fn normalize_at(raw: &Value, received_at: DateTime<Utc>) -> Result<Ticket> {
    let obj = raw
        .as_object()
        .ok_or_else(|| Error::MalformedRecord("record is not a JSON object".to_string()))?;

    let id = obj
        .get("id")
        .and_then(coerce_id)
        .ok_or_else(|| Error::MalformedRecord("record has no usable id".to_string()))?;

    let messages: Vec<Message> = obj
        .get("messages")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(normalize_message).collect())
        .unwrap_or_default();

    // A zero count defers to the embedded list, matching the dashboard's fallback.
    let message_count = obj
        .get("messageCount")
        .and_then(Value::as_u64)
        .filter(|&n| n > 0)
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
        .unwrap_or_else(|| u32::try_from(messages.len()).unwrap_or(u32::MAX));

    let last_activity_at = obj
        .get("updatedAt")
        .and_then(parse_timestamp)
        .or_else(|| obj.get("createdAt").and_then(parse_timestamp))
        .unwrap_or(received_at);

    let customer_name = string_field(raw, &["customerName"])
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CUSTOMER_NAME.to_string());

    Ok(Ticket {
        id,
        title: string_field(raw, &["title"]).unwrap_or_default(),
        category: string_field(raw, &["category"])
            .map(|c| TicketCategory::parse(&c))
            .unwrap_or_default(),
        last_activity_at,
        customer_name,
        message_count,
        messages,
        status: string_field(raw, &["status"]),
        channel: string_field(raw, &["channel"]),
    })
}

/// Normalize every row of a snapshot.
///
/// Malformed rows are dropped and returned alongside the survivors, which keep
/// their relative order.
pub fn normalize_all(rows: &[Value]) -> (Vec<Ticket>, Vec<Error>) {
    let received_at = Utc::now();
    let mut tickets = Vec::with_capacity(rows.len());
    let mut rejected = Vec::new();

    for row in rows {
        match normalize_at(row, received_at) {
            Ok(ticket) => tickets.push(ticket),
            Err(e) => rejected.push(e),
        }
    }

    (tickets, rejected)
}

/// Coerce a raw id (string or integer) to the canonical string key.
fn coerce_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else {
                n.as_u64().map(|u| u.to_string())
            }
        }
        _ => None,
    }
}

fn normalize_message(raw: &Value) -> Option<Message> {
    match raw {
        Value::Object(_) => Some(Message {
            sender: string_field(raw, &["sender", "user"]).unwrap_or_default(),
            content: string_field(raw, &["content", "text"]).unwrap_or_default(),
            timestamp: ["timestamp", "slackMessageTime", "createdAt"]
                .iter()
                .find_map(|key| raw.get(*key).and_then(parse_timestamp)),
            channel: string_field(raw, &["channel"]).unwrap_or_default(),
            thread_reference: string_field(raw, &["threadReference", "threadTs"]),
        }),
        Value::String(text) => Some(Message {
            sender: String::new(),
            content: text.clone(),
            timestamp: None,
            channel: String::new(),
            thread_reference: None,
        }),
        _ => None,
    }
}

/// First present string among `keys`.
fn string_field(raw: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| raw.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Parse the timestamp shapes the backend may produce.
///
/// Accepts RFC 3339 strings, naive ISO-8601 date-times (taken as UTC), epoch
/// seconds/milliseconds as numbers or numeric strings (chat platform `ts`
/// values look like `"1700000000.123456"`), and Jackson's array form
/// `[year, month, day, hour, minute, second, nanos]`.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s.trim()),
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        Value::Array(parts) => from_parts(parts),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    s.parse::<f64>().ok().and_then(from_epoch)
}

fn from_epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let millis = if value >= EPOCH_MILLIS_THRESHOLD {
        value
    } else {
        value * 1000.0
    };
    Utc.timestamp_millis_opt(millis as i64).single()
}

fn from_parts(parts: &[Value]) -> Option<DateTime<Utc>> {
    let field = |i: usize| parts.get(i).and_then(Value::as_u64).unwrap_or(0) as u32;
    let year = parts.first()?.as_i64()? as i32;
    let date = NaiveDate::from_ymd_opt(year, field(1), field(2))?;
    let time = date.and_hms_nano_opt(field(3), field(4), field(5), field(6))?;
    Some(time.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TITLE_PLACEHOLDER;
    use serde_json::json;

    fn fixed_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-31T22:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_numeric_id_coerced_to_string() {
        let ticket = normalize_at(&json!({"id": 42, "title": "Crash"}), fixed_time()).unwrap();
        assert_eq!(ticket.id, "42");
        assert_eq!(ticket.title, "Crash");
    }

    #[test]
    fn test_string_id_trimmed() {
        let ticket = normalize_at(&json!({"id": "  abc  "}), fixed_time()).unwrap();
        assert_eq!(ticket.id, "abc");
    }

    #[test]
    fn test_missing_id_is_malformed() {
        let err = normalize_at(&json!({"title": "no id"}), fixed_time()).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(_)));
    }

    #[test]
    fn test_unusable_ids_are_malformed() {
        for raw in [
            json!({"id": null}),
            json!({"id": ""}),
            json!({"id": true}),
            json!({"id": {"nested": 1}}),
            json!({"id": 1.5}),
        ] {
            assert!(
                matches!(normalize_at(&raw, fixed_time()), Err(Error::MalformedRecord(_))),
                "expected malformed for {}",
                raw
            );
        }
    }

    #[test]
    fn test_non_object_is_malformed() {
        assert!(normalize_at(&json!([1, 2]), fixed_time()).is_err());
        assert!(normalize_at(&json!("1"), fixed_time()).is_err());
    }

    #[test]
    fn test_defaults_for_missing_optional_fields() {
        let ticket = normalize_at(&json!({"id": 1}), fixed_time()).unwrap();
        assert_eq!(ticket.title, "");
        assert_eq!(ticket.display_title(), TITLE_PLACEHOLDER);
        assert_eq!(ticket.category, TicketCategory::Unknown);
        assert_eq!(ticket.customer_name, DEFAULT_CUSTOMER_NAME);
        assert_eq!(ticket.message_count, 0);
        assert!(ticket.messages.is_empty());
        assert_eq!(ticket.last_activity_at, fixed_time());
        assert_eq!(ticket.status, None);
    }

    #[test]
    fn test_full_record_mapping() {
        let raw = json!({
            "id": 7,
            "title": "Login fails",
            "category": "BUG",
            "status": "OPEN",
            "updatedAt": "2026-02-01T10:15:30",
            "createdAt": "2026-02-01T09:00:00",
            "customerName": "Ada",
            "messageCount": 3,
            "channel": "#support"
        });
        let ticket = normalize_at(&raw, fixed_time()).unwrap();
        assert_eq!(ticket.category, TicketCategory::Bug);
        assert_eq!(ticket.customer_name, "Ada");
        assert_eq!(ticket.message_count, 3);
        assert_eq!(ticket.status.as_deref(), Some("OPEN"));
        assert_eq!(ticket.channel.as_deref(), Some("#support"));
        assert_eq!(
            ticket.last_activity_at.to_rfc3339(),
            "2026-02-01T10:15:30+00:00"
        );
    }

    #[test]
    fn test_created_at_used_when_updated_at_missing() {
        let raw = json!({"id": 1, "createdAt": "2026-02-01T09:00:00Z"});
        let ticket = normalize_at(&raw, fixed_time()).unwrap();
        assert_eq!(ticket.last_activity_at.to_rfc3339(), "2026-02-01T09:00:00+00:00");
    }

    #[test]
    fn test_message_count_derived_from_messages() {
        let raw = json!({
            "id": 1,
            "messages": [{"user": "U1", "text": "hi"}, {"user": "U2", "text": "yo"}]
        });
        let ticket = normalize_at(&raw, fixed_time()).unwrap();
        assert_eq!(ticket.message_count, 2);
    }

    #[test]
    fn test_zero_message_count_defers_to_messages() {
        let raw = json!({
            "id": 1,
            "messageCount": 0,
            "messages": [{"user": "U1", "text": "hi"}]
        });
        let ticket = normalize_at(&raw, fixed_time()).unwrap();
        assert_eq!(ticket.message_count, 1);
    }

    #[test]
    fn test_explicit_message_count_wins() {
        let raw = json!({
            "id": 1,
            "messageCount": 9,
            "messages": [{"user": "U1", "text": "hi"}]
        });
        let ticket = normalize_at(&raw, fixed_time()).unwrap();
        assert_eq!(ticket.message_count, 9);
        assert_eq!(ticket.messages.len(), 1);
    }

    #[test]
    fn test_message_field_aliases() {
        let raw = json!({
            "id": 1,
            "messages": [
                {
                    "user": "U123",
                    "text": "app crashes on login",
                    "channel": "C42",
                    "threadTs": "1700000000.000100",
                    "slackMessageTime": "2026-02-01T10:00:00"
                },
                {
                    "sender": "Ada",
                    "content": "same here",
                    "timestamp": "2026-02-01T10:05:00Z",
                    "threadReference": "T1"
                }
            ]
        });
        let ticket = normalize_at(&raw, fixed_time()).unwrap();
        let first = &ticket.messages[0];
        assert_eq!(first.sender, "U123");
        assert_eq!(first.content, "app crashes on login");
        assert_eq!(first.channel, "C42");
        assert_eq!(first.thread_reference.as_deref(), Some("1700000000.000100"));
        assert!(first.timestamp.is_some());

        let second = &ticket.messages[1];
        assert_eq!(second.sender, "Ada");
        assert_eq!(second.content, "same here");
        assert_eq!(second.thread_reference.as_deref(), Some("T1"));
    }

    #[test]
    fn test_empty_customer_name_defaults() {
        let raw = json!({"id": 1, "customerName": ""});
        let ticket = normalize_at(&raw, fixed_time()).unwrap();
        assert_eq!(ticket.customer_name, DEFAULT_CUSTOMER_NAME);
    }

    #[test]
    fn test_wrong_typed_optional_fields_fall_back() {
        let raw = json!({"id": 1, "title": 5, "messageCount": "lots", "messages": "nope"});
        let ticket = normalize_at(&raw, fixed_time()).unwrap();
        assert_eq!(ticket.title, "");
        assert_eq!(ticket.message_count, 0);
        assert!(ticket.messages.is_empty());
    }

    #[test]
    fn test_parse_timestamp_shapes() {
        let expected = "2026-02-01T10:00:00+00:00";
        for value in [
            json!("2026-02-01T10:00:00Z"),
            json!("2026-02-01T11:00:00+01:00"),
            json!("2026-02-01T10:00:00"),
            json!("2026-02-01T10:00:00.000"),
            json!("2026-02-01 10:00:00"),
            json!([2026, 2, 1, 10, 0, 0]),
            json!(1769940000),
            json!(1769940000000u64),
            json!("1769940000.000000"),
        ] {
            let parsed = parse_timestamp(&value).unwrap_or_else(|| panic!("failed: {}", value));
            assert_eq!(parsed.to_rfc3339(), expected, "for {}", value);
        }
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp(&json!("yesterday")).is_none());
        assert!(parse_timestamp(&json!("")).is_none());
        assert!(parse_timestamp(&json!(null)).is_none());
        assert!(parse_timestamp(&json!(-5)).is_none());
    }

    #[test]
    fn test_normalize_all_drops_malformed_rows_in_order() {
        let rows = vec![
            json!({"id": 3, "title": "c"}),
            json!({"title": "no id"}),
            json!({"id": "1", "title": "a"}),
        ];
        let (tickets, rejected) = normalize_all(&rows);
        let ids: Vec<&str> = tickets.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1"]);
        assert_eq!(rejected.len(), 1);
    }
}
