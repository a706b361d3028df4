//! Payload value codec.
//!
//! Converts between JSON payload values and typed field values according to
//! the snapshot rules: timestamps ISO-8601 with explicit zone, decimals and
//! UUIDs as strings, files as inline base64 objects or URLs.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, FixedOffset, NaiveDate};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use hubsync_core::{SyncError, SyncResult};

use crate::descriptor::FieldKind;

/// A typed field value, decoded from or encodable to a payload entry.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    Decimal(Decimal),
    Uuid(Uuid),
}

impl FieldValue {
    /// Encode for an outbound payload.
    pub fn to_json(&self) -> JsonValue {
        match self {
            FieldValue::Null => JsonValue::Null,
            FieldValue::Bool(b) => JsonValue::Bool(*b),
            FieldValue::Int(i) => JsonValue::from(*i),
            FieldValue::Float(f) => {
                serde_json::Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number)
            }
            FieldValue::Text(s) => JsonValue::String(s.clone()),
            FieldValue::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
            FieldValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            FieldValue::Decimal(d) => JsonValue::String(d.to_string()),
            FieldValue::Uuid(u) => JsonValue::String(u.to_string()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Decode one inbound payload entry according to its declared field kind.
///
/// Relation and file kinds are handled by their own codecs
/// ([`decode_fk_target`], [`FilePayload::from_json`]); passing them here is
/// a caller bug surfaced as a validation error.
pub fn decode_scalar(kind: &FieldKind, field: &str, value: &JsonValue) -> SyncResult<FieldValue> {
    if value.is_null() {
        return Ok(FieldValue::Null);
    }

    match kind {
        FieldKind::Scalar => match value {
            JsonValue::Bool(b) => Ok(FieldValue::Bool(*b)),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(FieldValue::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(FieldValue::Float(f))
                } else {
                    Err(SyncError::validation(format!(
                        "field '{field}': unrepresentable number"
                    )))
                }
            }
            JsonValue::String(s) => Ok(FieldValue::Text(s.clone())),
            _ => Err(SyncError::validation(format!(
                "field '{field}': expected a scalar value"
            ))),
        },
        FieldKind::Date => {
            let s = expect_str(field, value)?;
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| SyncError::validation(format!("field '{field}': {e}")))?;
            Ok(FieldValue::Date(date))
        }
        FieldKind::DateTime => {
            let s = expect_str(field, value)?;
            Ok(FieldValue::DateTime(parse_iso_datetime(field, s)?))
        }
        FieldKind::Decimal => {
            // Accept the canonical string form, plus bare JSON numbers from
            // lenient peers.
            let text = match value {
                JsonValue::String(s) => s.clone(),
                JsonValue::Number(n) => n.to_string(),
                _ => {
                    return Err(SyncError::validation(format!(
                        "field '{field}': expected a decimal string"
                    )));
                }
            };
            let decimal = text
                .parse::<Decimal>()
                .map_err(|e| SyncError::validation(format!("field '{field}': {e}")))?;
            Ok(FieldValue::Decimal(decimal))
        }
        FieldKind::Uuid => {
            let s = expect_str(field, value)?;
            let uuid = s
                .parse::<Uuid>()
                .map_err(|e| SyncError::validation(format!("field '{field}': {e}")))?;
            Ok(FieldValue::Uuid(uuid))
        }
        FieldKind::ForeignKey { .. } | FieldKind::ManyToMany { .. } | FieldKind::File => {
            Err(SyncError::validation(format!(
                "field '{field}': relation/file values have no scalar decoding"
            )))
        }
    }
}

/// Parse an ISO-8601 timestamp, rewriting a trailing `Z` to `+00:00` first.
pub fn parse_iso_datetime(field: &str, raw: &str) -> SyncResult<DateTime<FixedOffset>> {
    let normalized = if let Some(stripped) = raw.strip_suffix('Z') {
        format!("{stripped}+00:00")
    } else {
        raw.to_string()
    };
    DateTime::parse_from_rfc3339(&normalized)
        .map_err(|e| SyncError::validation(format!("field '{field}': {e}")))
}

fn expect_str<'v>(field: &str, value: &'v JsonValue) -> SyncResult<&'v str> {
    value.as_str().ok_or_else(|| {
        SyncError::validation(format!("field '{field}': expected a string value"))
    })
}

/// A file field's payload form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilePayload {
    /// Pushed form: decoded bytes plus the original basename.
    Inline { filename: String, content: Vec<u8> },
    /// Pulled form: absolute URL to the stored blob.
    Url(String),
    /// No file (clear any stored blob).
    Absent,
}

impl FilePayload {
    pub fn from_json(field: &str, value: &JsonValue) -> SyncResult<Self> {
        match value {
            JsonValue::Null => Ok(FilePayload::Absent),
            JsonValue::String(url) => Ok(FilePayload::Url(url.clone())),
            JsonValue::Object(map) => {
                // A file object without both keys means "no file": clear the
                // stored blob.
                let (Some(filename), Some(encoded)) = (
                    map.get("filename").and_then(JsonValue::as_str),
                    map.get("content").and_then(JsonValue::as_str),
                ) else {
                    return Ok(FilePayload::Absent);
                };
                let content = BASE64.decode(encoded).map_err(|e| {
                    SyncError::validation(format!("field '{field}': invalid base64 content: {e}"))
                })?;
                Ok(FilePayload::Inline {
                    filename: filename.to_string(),
                    content,
                })
            }
            _ => Err(SyncError::validation(format!(
                "field '{field}': expected null, URL string, or file object"
            ))),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            FilePayload::Inline { filename, content } => serde_json::json!({
                "filename": filename,
                "content": BASE64.encode(content),
            }),
            FilePayload::Url(url) => JsonValue::String(url.clone()),
            FilePayload::Absent => JsonValue::Null,
        }
    }
}

/// Decode an inbound foreign-key payload value into the target's object id.
///
/// Foreign keys travel as the bare foreign pk (string, integer, or null).
pub fn decode_fk_target(field: &str, value: &JsonValue) -> SyncResult<Option<hubsync_core::ObjectId>> {
    match value {
        JsonValue::Null => Ok(None),
        JsonValue::String(s) => Ok(Some(hubsync_core::ObjectId::from(s.as_str()))),
        JsonValue::Number(n) => n
            .as_i64()
            .map(|i| Some(hubsync_core::ObjectId::from(i)))
            .ok_or_else(|| {
                SyncError::validation(format!("field '{field}': non-integer fk value"))
            }),
        _ => Err(SyncError::validation(format!(
            "field '{field}': expected a foreign pk"
        ))),
    }
}

/// Decode an inbound many-to-many payload value into target object ids.
pub fn decode_m2m_targets(field: &str, value: &JsonValue) -> SyncResult<Vec<hubsync_core::ObjectId>> {
    let items = value.as_array().ok_or_else(|| {
        SyncError::validation(format!("field '{field}': expected a list of pks"))
    })?;
    items
        .iter()
        .map(|item| {
            decode_fk_target(field, item)?.ok_or_else(|| {
                SyncError::validation(format!("field '{field}': null entry in pk list"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_z_is_rewritten_to_utc_offset() {
        let dt = parse_iso_datetime("ts", "2024-03-01T10:30:00Z").unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 0);
        assert_eq!(dt.to_rfc3339(), "2024-03-01T10:30:00+00:00");
    }

    #[test]
    fn explicit_offsets_are_preserved() {
        let dt = parse_iso_datetime("ts", "2024-03-01T10:30:00+03:00").unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 3 * 3600);
    }

    #[test]
    fn decimal_decodes_from_string_and_number() {
        let from_str =
            decode_scalar(&FieldKind::Decimal, "salary", &JsonValue::from("1234.56")).unwrap();
        let from_num =
            decode_scalar(&FieldKind::Decimal, "salary", &serde_json::json!(1234.56)).unwrap();
        assert_eq!(from_str, FieldValue::Decimal("1234.56".parse().unwrap()));
        assert_eq!(from_num, FieldValue::Decimal("1234.56".parse().unwrap()));
    }

    #[test]
    fn decimal_encodes_as_string() {
        let value = FieldValue::Decimal("1234.56".parse().unwrap());
        assert_eq!(value.to_json(), JsonValue::from("1234.56"));
    }

    #[test]
    fn file_payload_round_trips_inline_content() {
        let payload = FilePayload::Inline {
            filename: "photo.jpg".to_string(),
            content: vec![0xde, 0xad, 0xbe, 0xef],
        };
        let json = payload.to_json();
        assert_eq!(FilePayload::from_json("photo", &json).unwrap(), payload);
    }

    #[test]
    fn file_payload_null_means_absent() {
        assert_eq!(
            FilePayload::from_json("photo", &JsonValue::Null).unwrap(),
            FilePayload::Absent
        );
    }

    mod round_trip {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Decimals survive encode → decode exactly, whatever the scale.
            #[test]
            fn decimal_values(mantissa in -1_000_000_000_000i64..1_000_000_000_000i64,
                              scale in 0u32..=6) {
                let decimal = Decimal::new(mantissa, scale);
                let encoded = FieldValue::Decimal(decimal).to_json();
                let decoded = decode_scalar(&FieldKind::Decimal, "amount", &encoded).unwrap();
                prop_assert_eq!(decoded, FieldValue::Decimal(decimal));
            }

            // Timestamps survive encode → decode at any offset; equality is
            // on the instant, not the rendering.
            #[test]
            fn datetime_values(secs in 0i64..4_000_000_000i64,
                               offset_mins in -14 * 60i32..=14 * 60) {
                let offset = FixedOffset::east_opt(offset_mins * 60).unwrap();
                let dt = DateTime::from_timestamp(secs, 0).unwrap().with_timezone(&offset);
                let encoded = FieldValue::DateTime(dt).to_json();
                let decoded = decode_scalar(&FieldKind::DateTime, "ts", &encoded).unwrap();
                prop_assert_eq!(decoded, FieldValue::DateTime(dt));
            }
        }
    }

    #[test]
    fn fk_target_accepts_string_and_integer_pks() {
        assert_eq!(
            decode_fk_target("owner", &serde_json::json!(1)).unwrap(),
            Some(hubsync_core::ObjectId::from(1i64))
        );
        assert_eq!(
            decode_fk_target("owner", &serde_json::json!("1")).unwrap(),
            Some(hubsync_core::ObjectId::from("1"))
        );
        assert_eq!(decode_fk_target("owner", &JsonValue::Null).unwrap(), None);
    }
}
