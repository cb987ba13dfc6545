//! Load-time normalization of stored collections.
//!
//! Older records predate some fields. Every load fills the gaps before the
//! rows are typed, so the rest of the crate only ever sees complete
//! [`LicenseRecord`]s. Present values are never touched.

use crate::error::{StoreError, StoreResult};
use crate::record::{DEFAULT_DURATION_DAYS, LicenseRecord};
use serde_json::{Map, Value};

/// Decodes and normalizes a stored collection.
///
/// The whole collection is rejected if it is not an array or if any row
/// cannot be typed, so a caller never writes back a silently truncated set.
pub fn normalize_collection(value: Value) -> StoreResult<Vec<LicenseRecord>> {
    let Value::Array(rows) = value else {
        return Err(StoreError::Corrupt(format!(
            "expected an array of records, found {}",
            kind(&value)
        )));
    };

    rows.into_iter()
        .enumerate()
        .map(|(idx, row)| normalize_row(row).map_err(|e| StoreError::Corrupt(format!("row {idx}: {e}"))))
        .collect()
}

/// Decodes a collection from raw bytes.
///
/// Empty input is an empty collection.
pub fn normalize_bytes(bytes: &[u8]) -> StoreResult<Vec<LicenseRecord>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_slice(bytes)?;
    normalize_collection(value)
}

/// Encodes a collection in its stored shape.
pub fn to_collection(records: &[LicenseRecord]) -> StoreResult<Value> {
    Ok(serde_json::to_value(records)?)
}

fn normalize_row(row: Value) -> Result<LicenseRecord, String> {
    let Value::Object(mut fields) = row else {
        return Err(format!("expected an object, found {}", kind(&row)));
    };
    fill_defaults(&mut fields);
    serde_json::from_value(Value::Object(fields)).map_err(|e| e.to_string())
}

fn fill_defaults(fields: &mut Map<String, Value>) {
    set_if_absent(fields, "duration_days", Value::from(DEFAULT_DURATION_DAYS), true);
    set_if_absent(fields, "device_hash", Value::String(String::new()), true);
    set_if_absent(fields, "device_name", Value::Null, false);
    set_if_absent(fields, "last_used", Value::Null, false);
    set_if_absent(fields, "activated_on", Value::Null, false);
}

fn set_if_absent(fields: &mut Map<String, Value>, name: &str, default: Value, replace_null: bool) {
    match fields.get(name) {
        None => {
            fields.insert(name.to_string(), default);
        }
        Some(Value::Null) if replace_null => {
            fields.insert(name.to_string(), default);
        }
        Some(_) => {}
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
