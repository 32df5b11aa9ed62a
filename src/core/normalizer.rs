// Event normalizer: raw feed payloads -> canonical AlertEvent.
//
// Document feed records carry a `type` discriminator plus optional
// `intensity`/`severity`/`direction`. Message bus payloads are free text and
// always describe a siren. Missing fields come from the per-kind default table.

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::time::Instant;

use super::error::NormalizationError;
use super::model::{AlertEvent, AlertKind, Direction, RawPayload, Severity, SourceTag};

/// Default fields filled in when a payload omits them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefaultFields {
    pub intensity: f32,
    pub direction: Direction,
    pub severity: Severity,
}

impl DefaultFields {
    pub const fn for_kind(kind: AlertKind) -> Self {
        match kind {
            AlertKind::Horn => Self {
                intensity: 8.0,
                direction: Direction::Front,
                severity: Severity::Medium,
            },
            AlertKind::HornLeft => Self {
                intensity: 10.0,
                direction: Direction::Left,
                severity: Severity::High,
            },
            AlertKind::HornRight => Self {
                intensity: 10.0,
                direction: Direction::Right,
                severity: Severity::High,
            },
            AlertKind::SirenDetected => Self {
                intensity: 10.0,
                direction: Direction::None,
                severity: Severity::High,
            },
            AlertKind::None => Self {
                intensity: 0.0,
                direction: Direction::None,
                severity: Severity::None,
            },
        }
    }
}

/// Normalize a payload, stamping it with the current monotonic time.
pub fn normalize(source: SourceTag, payload: &RawPayload) -> Result<AlertEvent, NormalizationError> {
    normalize_at(source, payload, Instant::now())
}

/// Normalize a payload received at `received_at`.
pub fn normalize_at(
    source: SourceTag,
    payload: &RawPayload,
    received_at: Instant,
) -> Result<AlertEvent, NormalizationError> {
    match payload {
        RawPayload::Text(text) => normalize_text(source, text, received_at),
        RawPayload::Document(value) => normalize_value(source, value, received_at),
        RawPayload::Bytes(bytes) => {
            let text = std::str::from_utf8(bytes)
                .map_err(|_| NormalizationError::NotText { len: bytes.len() })?;
            normalize_text(source, text, received_at)
        }
    }
}

fn normalize_text(
    source: SourceTag,
    text: &str,
    received_at: Instant,
) -> Result<AlertEvent, NormalizationError> {
    match source {
        SourceTag::MessageBus => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(AlertEvent::clear(source, text.to_string(), received_at));
            }
            // Structured siren payloads are accepted too
            if trimmed.starts_with('{') {
                if let Ok(Value::Object(record)) = serde_json::from_str::<Value>(trimmed) {
                    return Ok(siren_from_record(source, &record, text.to_string(), received_at));
                }
            }
            Ok(siren_event(source, text.to_string(), None, received_at))
        }
        SourceTag::DocumentFeed => {
            let value: Value = serde_json::from_str(text)
                .map_err(|e| NormalizationError::NotARecord(e.to_string()))?;
            normalize_value(source, &value, received_at)
        }
    }
}

fn normalize_value(
    source: SourceTag,
    value: &Value,
    received_at: Instant,
) -> Result<AlertEvent, NormalizationError> {
    let record = value
        .as_object()
        .ok_or_else(|| NormalizationError::NotARecord(describe(value).to_string()))?;
    let raw = value.to_string();
    Ok(match source {
        SourceTag::DocumentFeed => horn_from_record(source, record, raw, received_at),
        SourceTag::MessageBus => siren_from_record(source, record, raw, received_at),
    })
}

fn horn_from_record(
    source: SourceTag,
    record: &Map<String, Value>,
    raw: String,
    received_at: Instant,
) -> AlertEvent {
    // Unrecognized or missing discriminators clear the alert
    let kind = match record.get("type").and_then(Value::as_str) {
        Some("Horn") => AlertKind::Horn,
        Some("Left") => AlertKind::HornLeft,
        Some("Right") => AlertKind::HornRight,
        _ => return AlertEvent::clear(source, raw, received_at),
    };

    let defaults = DefaultFields::for_kind(kind);
    let direction = match kind {
        AlertKind::Horn => read_direction(record).unwrap_or(defaults.direction),
        _ => defaults.direction,
    };

    AlertEvent {
        kind,
        intensity: read_intensity(record).unwrap_or(defaults.intensity),
        direction,
        severity: read_severity(record).unwrap_or(defaults.severity),
        raw_message: raw,
        source,
        received_at,
        received_wall: Utc::now(),
    }
}

fn siren_from_record(
    source: SourceTag,
    record: &Map<String, Value>,
    raw: String,
    received_at: Instant,
) -> AlertEvent {
    let message = record
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or(raw);
    siren_event(source, message, Some(record), received_at)
}

fn siren_event(
    source: SourceTag,
    message: String,
    record: Option<&Map<String, Value>>,
    received_at: Instant,
) -> AlertEvent {
    let defaults = DefaultFields::for_kind(AlertKind::SirenDetected);
    AlertEvent {
        kind: AlertKind::SirenDetected,
        intensity: record.and_then(read_intensity).unwrap_or(defaults.intensity),
        direction: record.and_then(read_direction).unwrap_or(defaults.direction),
        severity: record.and_then(read_severity).unwrap_or(defaults.severity),
        raw_message: message,
        source,
        received_at,
        received_wall: Utc::now(),
    }
}

/// Zero, negative and non-finite intensities count as missing.
fn read_intensity(record: &Map<String, Value>) -> Option<f32> {
    record
        .get("intensity")
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| v as f32)
}

fn read_severity(record: &Map<String, Value>) -> Option<Severity> {
    record
        .get("severity")
        .and_then(Value::as_str)
        .and_then(Severity::parse)
}

fn read_direction(record: &Map<String, Value>) -> Option<Direction> {
    record
        .get("direction")
        .and_then(Value::as_str)
        .and_then(Direction::parse)
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> AlertEvent {
        normalize(SourceTag::DocumentFeed, &RawPayload::Document(value)).unwrap()
    }

    #[test]
    fn test_left_defaults() {
        let event = doc(json!({"type": "Left"}));
        assert_eq!(event.kind, AlertKind::HornLeft);
        assert_eq!(event.intensity, 10.0);
        assert_eq!(event.direction, Direction::Left);
        assert_eq!(event.severity, Severity::High);
    }

    #[test]
    fn test_horn_defaults() {
        let event = doc(json!({"type": "Horn"}));
        assert_eq!(event.kind, AlertKind::Horn);
        assert_eq!(event.intensity, 8.0);
        assert_eq!(event.direction, Direction::Front);
        assert_eq!(event.severity, Severity::Medium);
    }

    #[test]
    fn test_right_with_supplied_fields() {
        let event = doc(json!({"type": "Right", "intensity": 4, "severity": "Low"}));
        assert_eq!(event.kind, AlertKind::HornRight);
        assert_eq!(event.intensity, 4.0);
        assert_eq!(event.severity, Severity::Low);
        assert_eq!(event.direction, Direction::Right);
    }

    #[test]
    fn test_directional_type_ignores_direction_field() {
        let event = doc(json!({"type": "Left", "direction": "Right"}));
        assert_eq!(event.direction, Direction::Left);

        let event = doc(json!({"type": "Horn", "direction": "right"}));
        assert_eq!(event.direction, Direction::Right);
    }

    #[test]
    fn test_falsy_fields_use_defaults() {
        let event = doc(json!({"type": "Horn", "intensity": 0, "severity": ""}));
        assert_eq!(event.intensity, 8.0);
        assert_eq!(event.severity, Severity::Medium);

        let event = doc(json!({"type": "Left", "intensity": -3, "severity": "extreme"}));
        assert_eq!(event.intensity, 10.0);
        assert_eq!(event.severity, Severity::High);
    }

    #[test]
    fn test_unknown_type_is_clear_signal() {
        let event = doc(json!({"type": "Unknown", "intensity": 9, "severity": "High"}));
        assert_eq!(event.kind, AlertKind::None);
        assert_eq!(event.intensity, 0.0);
        assert_eq!(event.direction, Direction::None);
        assert_eq!(event.severity, Severity::None);

        let event = doc(json!({"intensity": 9}));
        assert!(event.is_clear());
    }

    #[test]
    fn test_document_must_be_record() {
        let err = normalize(SourceTag::DocumentFeed, &RawPayload::Document(json!([1, 2])));
        assert!(matches!(err, Err(NormalizationError::NotARecord(_))));

        let err = normalize(SourceTag::DocumentFeed, &RawPayload::Text("not json".into()));
        assert!(matches!(err, Err(NormalizationError::NotARecord(_))));
    }

    #[test]
    fn test_document_text_is_parsed() {
        let event = normalize(
            SourceTag::DocumentFeed,
            &RawPayload::Text(r#"{"type":"Right"}"#.into()),
        )
        .unwrap();
        assert_eq!(event.kind, AlertKind::HornRight);
    }

    #[test]
    fn test_siren_text() {
        let event = normalize(
            SourceTag::MessageBus,
            &RawPayload::Text("Ambulance approaching".into()),
        )
        .unwrap();
        assert_eq!(event.kind, AlertKind::SirenDetected);
        assert_eq!(event.raw_message, "Ambulance approaching");
        assert_eq!(event.intensity, 10.0);
        assert_eq!(event.severity, Severity::High);
        assert_eq!(event.direction, Direction::None);
    }

    #[test]
    fn test_siren_structured_text() {
        let event = normalize(
            SourceTag::MessageBus,
            &RawPayload::Text(r#"{"message":"Fire truck","intensity":6,"direction":"Left"}"#.into()),
        )
        .unwrap();
        assert_eq!(event.kind, AlertKind::SirenDetected);
        assert_eq!(event.raw_message, "Fire truck");
        assert_eq!(event.intensity, 6.0);
        assert_eq!(event.direction, Direction::Left);
    }

    #[test]
    fn test_empty_siren_text_clears() {
        let event = normalize(SourceTag::MessageBus, &RawPayload::Text("   ".into())).unwrap();
        assert!(event.is_clear());
    }

    #[test]
    fn test_binary_payloads() {
        let event = normalize(SourceTag::MessageBus, &RawPayload::Bytes(b"siren".to_vec())).unwrap();
        assert_eq!(event.kind, AlertKind::SirenDetected);

        let err = normalize(SourceTag::MessageBus, &RawPayload::Bytes(vec![0xff, 0xfe, 0x00]));
        assert_eq!(err, Err(NormalizationError::NotText { len: 3 }));
    }
}
