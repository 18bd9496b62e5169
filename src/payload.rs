//! Loose payload access.
//!
//! Clients send either the descriptive keys (`date`, `site`, `amount`) or
//! the older short Spanish ones (`fecha`, `sede`, `valor`). Every accessor
//! takes the candidate keys in priority order and skips `null` and blank
//! strings, so `{"date": "", "fecha": "2024-03-01"}` resolves to the
//! legacy value.

use serde_json::Value;

use crate::cell::CellValue;
use crate::error::{CierreError, CierreResult};

pub(crate) fn pick<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|k| payload.get(*k)).find(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    })
}

pub(crate) fn pick_cell(payload: &Value, keys: &[&str]) -> Option<CellValue> {
    pick(payload, keys).map(CellValue::from)
}

pub(crate) fn pick_str(payload: &Value, keys: &[&str]) -> Option<String> {
    pick_cell(payload, keys).map(|c| c.key_string())
}

/// Optional numeric field; present but unparsable is a validation error.
pub(crate) fn pick_number(
    payload: &Value,
    keys: &[&str],
    field: &str,
) -> CierreResult<Option<f64>> {
    pick_cell(payload, keys)
        .map(|cell| to_number(field, &cell))
        .transpose()
}

pub(crate) fn pick_flag(payload: &Value, keys: &[&str]) -> bool {
    match pick(payload, keys) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Some(Value::String(s)) => matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "si" | "sí" | "on"
        ),
        _ => false,
    }
}

pub(crate) fn pick_array<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
    keys.iter()
        .filter_map(|k| payload.get(*k))
        .find_map(Value::as_array)
}

/// Numeric coercion for fields that must be finite numbers.
pub(crate) fn to_number(field: &str, value: &CellValue) -> CierreResult<f64> {
    value
        .as_number()
        .ok_or_else(|| CierreError::invalid_number(field, &value.to_string()))
}

/// Fail with every missing field named when any value is absent or blank.
pub(crate) fn require_fields(fields: &[(&str, Option<&CellValue>)]) -> CierreResult<()> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, v)| v.map(CellValue::is_blank).unwrap_or(true))
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CierreError::missing_field(&missing.join(", ")))
    }
}
