//! Error taxonomy for the closure backend.
//!
//! Validation and schema failures surface to the caller through the
//! response envelope. Mirror and blob failures never reach this type:
//! handlers log and swallow them.

use thiserror::Error;

/// Failures raised by the spreadsheet store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cell encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("store lock poisoned: {0}")]
    Lock(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures raised by the mirror database. Always non-fatal for callers.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("mirror request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("mirror rejected insert into {table} ({status}): {body}")]
    Rejected {
        table: String,
        status: u16,
        body: String,
    },
}

#[derive(Debug, Error)]
pub enum CierreError {
    /// A required field is missing/empty, or a numeric field failed to coerce.
    #[error("{message}")]
    Validation { field: String, message: String },

    /// Target sheet absent or its header row is empty.
    #[error("{0}")]
    Schema(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("invalid payload: {0}")]
    Payload(String),
}

impl CierreError {
    pub fn missing_field(field: &str) -> Self {
        CierreError::Validation {
            field: field.to_string(),
            message: format!("required field missing: {field}"),
        }
    }

    pub fn invalid_number(field: &str, raw: &str) -> Self {
        CierreError::Validation {
            field: field.to_string(),
            message: format!("invalid numeric value for {field}: {raw}"),
        }
    }

    /// Stable code used in the `{ok:false, error:{code, message}}` envelope.
    pub fn code(&self) -> &'static str {
        match self {
            CierreError::Validation { .. } => "validation_error",
            CierreError::Schema(_) => "schema_error",
            CierreError::Store(_) => "store_error",
            CierreError::UnsupportedAction(_) => "unsupported_action",
            CierreError::Payload(_) => "invalid_payload",
        }
    }

    /// Offending field for validation failures.
    pub fn field(&self) -> Option<&str> {
        match self {
            CierreError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

pub type CierreResult<T> = Result<T, CierreError>;
