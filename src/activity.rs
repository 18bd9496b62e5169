//! Business event log (`add_expense`, `add_payroll_skipped`, ...).
//!
//! Recording an event must never fail the request that produced it, so
//! [`ActivityLogger::record`] returns nothing and implementations swallow
//! their own errors after logging them.

use rusqlite::params;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::StoreError;
use crate::store::SheetDb;

/// Payload keys whose values are replaced before logging.
const REDACTED_KEYS: &[&str] = &["base64Data", "data", "base64", "contenido"];
const REDACTED: &str = "[redacted]";

pub trait ActivityLogger {
    fn record(&self, event: &str, metadata: &Value, payload: &Value);
}

/// Copy of `payload` with attachment bodies replaced.
pub fn redact_payload(payload: &Value) -> Value {
    match payload {
        Value::Object(map) => {
            let out: Map<String, Value> = map
                .iter()
                .map(|(k, v)| {
                    let value = if REDACTED_KEYS.contains(&k.as_str()) && v.is_string() {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact_payload(v)
                    };
                    (k.clone(), value)
                })
                .collect();
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_payload).collect()),
        other => other.clone(),
    }
}

impl SheetDb {
    fn insert_activity(
        &self,
        event: &str,
        metadata: &Value,
        payload: &Value,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO activity_log (event, metadata, payload) VALUES (?1, ?2, ?3)",
            params![
                event,
                serde_json::to_string(metadata)?,
                serde_json::to_string(&redact_payload(payload))?
            ],
        )?;
        Ok(())
    }

    /// Most recent events first, at most `limit`.
    pub fn recent_activity(&self, limit: usize) -> Result<Vec<(String, Value)>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT event, metadata FROM activity_log ORDER BY id DESC LIMIT ?1")?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let mut out = Vec::with_capacity(rows.len());
        for (event, raw) in rows {
            out.push((event, serde_json::from_str(&raw)?));
        }
        Ok(out)
    }
}

impl ActivityLogger for SheetDb {
    fn record(&self, event: &str, metadata: &Value, payload: &Value) {
        if let Err(e) = self.insert_activity(event, metadata, payload) {
            warn!(event = %event, error = %e, "Failed to record activity, logging only");
            TracingActivityLog.record(event, metadata, payload);
        }
    }
}

/// Logger that only emits tracing events. [`SheetDb`] falls back to it
/// when the activity table cannot be written.
pub struct TracingActivityLog;

impl ActivityLogger for TracingActivityLog {
    fn record(&self, event: &str, metadata: &Value, _payload: &Value) {
        info!(event = %event, metadata = %metadata, "Activity");
    }
}
