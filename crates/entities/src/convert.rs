//! Coercions from decoded payload values to typed entity fields.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use hubsync_core::{SyncError, SyncResult};
use hubsync_registry::FieldValue;

pub fn text(field: &str, value: &FieldValue) -> SyncResult<String> {
    match value {
        FieldValue::Text(s) => Ok(s.clone()),
        FieldValue::Int(i) => Ok(i.to_string()),
        other => Err(mismatch(field, "text", other)),
    }
}

pub fn opt_text(field: &str, value: &FieldValue) -> SyncResult<Option<String>> {
    match value {
        FieldValue::Null => Ok(None),
        other => text(field, other).map(Some),
    }
}

pub fn date(field: &str, value: &FieldValue) -> SyncResult<NaiveDate> {
    match value {
        FieldValue::Date(d) => Ok(*d),
        other => Err(mismatch(field, "date", other)),
    }
}

pub fn opt_date(field: &str, value: &FieldValue) -> SyncResult<Option<NaiveDate>> {
    match value {
        FieldValue::Null => Ok(None),
        other => date(field, other).map(Some),
    }
}

pub fn datetime_utc(field: &str, value: &FieldValue) -> SyncResult<DateTime<Utc>> {
    match value {
        FieldValue::DateTime(dt) => Ok(dt.with_timezone(&Utc)),
        other => Err(mismatch(field, "datetime", other)),
    }
}

pub fn opt_datetime_utc(field: &str, value: &FieldValue) -> SyncResult<Option<DateTime<Utc>>> {
    match value {
        FieldValue::Null => Ok(None),
        other => datetime_utc(field, other).map(Some),
    }
}

pub fn decimal(field: &str, value: &FieldValue) -> SyncResult<Decimal> {
    match value {
        FieldValue::Decimal(d) => Ok(*d),
        other => Err(mismatch(field, "decimal", other)),
    }
}

pub fn opt_decimal(field: &str, value: &FieldValue) -> SyncResult<Option<Decimal>> {
    match value {
        FieldValue::Null => Ok(None),
        other => decimal(field, other).map(Some),
    }
}

fn mismatch(field: &str, expected: &str, got: &FieldValue) -> SyncError {
    SyncError::validation(format!("field '{field}': expected {expected}, got {got:?}"))
}
