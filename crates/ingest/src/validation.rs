//! Schema validation of the ingest request body.
//!
//! The body is decoded as a generic JSON object first and every field is
//! checked on its own, so a single response can name all offending fields.
//! Length limits count Unicode scalar values. Unknown fields are ignored.
//! Optional fields accept both omission and `null`.

use serde_json::{Map, Value};

use crate::{ActivityPayload, EventUid, FieldError, IngestError, Severity, Timestamp};

const EVENT_UID_MAX: usize = 255;
const EVENT_TYPE_MAX: usize = 100;
const MESSAGE_MAX: usize = 1000;
const TICKET_ID_MAX: usize = 100;
const TAG_MAX: usize = 50;

/// Parses and validates a raw request body.
///
/// # Errors
///
/// [`IngestError::Validation`] listing every field that failed.
pub fn parse_activity(body: &[u8]) -> Result<ActivityPayload, IngestError> {
    let object = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(object)) => object,
        Ok(_) => return Err(single("body", "expected a JSON object")),
        Err(err) => return Err(single("body", format!("malformed JSON: {err}"))),
    };

    let mut errors = Vec::new();

    let event_uid = required_string(&object, "event_uid", EVENT_UID_MAX, &mut errors)
        .and_then(EventUid::new);
    let event_type = required_string(&object, "event_type", EVENT_TYPE_MAX, &mut errors);
    let severity = severity(&object, &mut errors);
    let message = optional_string(&object, "message", MESSAGE_MAX, &mut errors);
    let details = optional_map(&object, "details", &mut errors);
    let metadata = optional_map(&object, "metadata", &mut errors);
    let ticket_id = optional_string(&object, "ticket_id", TICKET_ID_MAX, &mut errors);
    let tags = tags(&object, &mut errors);
    let occurred_at = occurred_at(&object, &mut errors);

    match (event_uid, event_type, severity, occurred_at) {
        (Some(event_uid), Some(event_type), Some(severity), Some(occurred_at))
            if errors.is_empty() =>
        {
            Ok(ActivityPayload {
                event_uid,
                event_type,
                severity,
                message,
                details,
                metadata,
                ticket_id,
                tags,
                occurred_at,
            })
        },
        _ => Err(IngestError::Validation { details: errors }),
    }
}

fn single(field: &str, message: impl Into<String>) -> IngestError {
    IngestError::Validation {
        details: vec![FieldError::new(field, message)],
    }
}

fn present<'a>(object: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    object.get(field).filter(|v| !v.is_null())
}

fn required_string(
    object: &Map<String, Value>,
    field: &str,
    max: usize,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match present(object, field) {
        None => {
            errors.push(FieldError::new(field, "required"));
            None
        },
        Some(Value::String(s)) if s.is_empty() => {
            errors.push(FieldError::new(field, "must not be empty"));
            None
        },
        Some(Value::String(s)) => bounded(field, s, max, errors),
        Some(_) => {
            errors.push(FieldError::new(field, "expected a string"));
            None
        },
    }
}

fn optional_string(
    object: &Map<String, Value>,
    field: &str,
    max: usize,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match present(object, field)? {
        Value::String(s) => bounded(field, s, max, errors),
        _ => {
            errors.push(FieldError::new(field, "expected a string"));
            None
        },
    }
}

fn bounded(field: &str, s: &str, max: usize, errors: &mut Vec<FieldError>) -> Option<String> {
    if s.chars().count() > max {
        errors.push(FieldError::new(
            field,
            format!("must be at most {max} characters"),
        ));
        None
    } else {
        Some(s.to_owned())
    }
}

fn optional_map(
    object: &Map<String, Value>,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> Option<Map<String, Value>> {
    match present(object, field)? {
        Value::Object(map) => Some(map.clone()),
        _ => {
            errors.push(FieldError::new(field, "expected an object"));
            None
        },
    }
}

fn severity(object: &Map<String, Value>, errors: &mut Vec<FieldError>) -> Option<Severity> {
    let Some(raw) = object.get("severity") else {
        return Some(Severity::default());
    };
    match raw.as_str().and_then(Severity::parse) {
        Some(severity) => Some(severity),
        None => {
            let allowed: Vec<&str> = Severity::ALL.iter().map(|s| s.as_str()).collect();
            errors.push(FieldError::new(
                "severity",
                format!("expected one of {}", allowed.join(", ")),
            ));
            None
        },
    }
}

fn tags(object: &Map<String, Value>, errors: &mut Vec<FieldError>) -> Option<Vec<String>> {
    let items = match present(object, "tags")? {
        Value::Array(items) => items,
        _ => {
            errors.push(FieldError::new("tags", "expected an array of strings"));
            return None;
        },
    };

    let mut tags = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let field = format!("tags[{i}]");
        match item {
            Value::String(tag) => tags.extend(bounded(&field, tag, TAG_MAX, errors)),
            _ => errors.push(FieldError::new(field, "expected a string")),
        }
    }
    Some(tags)
}

fn occurred_at(object: &Map<String, Value>, errors: &mut Vec<FieldError>) -> Option<Timestamp> {
    match present(object, "occurred_at") {
        None => {
            errors.push(FieldError::new("occurred_at", "required"));
            None
        },
        Some(value) => {
            let parsed = value.as_str().and_then(Timestamp::parse_rfc3339);
            if parsed.is_none() {
                errors.push(FieldError::new(
                    "occurred_at",
                    "expected an ISO-8601 date-time with offset",
                ));
            }
            parsed
        },
    }
}
