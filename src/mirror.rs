//! Replication of written records to a secondary database.
//!
//! Callers treat every [`MirrorError`] as non-fatal: the sheet row is the
//! record of truth and is already written by the time a mirror insert runs.

use reqwest::blocking::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::SupabaseConfig;
use crate::error::MirrorError;

const MIRROR_TIMEOUT: Duration = Duration::from_secs(20);

pub trait MirrorStore {
    fn insert_many(&self, table: &str, records: &[Value]) -> Result<(), MirrorError>;
}

/// Supabase PostgREST insert (`POST {url}/rest/v1/{table}`).
pub struct SupabaseMirror {
    client: Client,
    base_url: String,
    key: String,
}

impl SupabaseMirror {
    pub fn new(config: &SupabaseConfig) -> Result<Self, MirrorError> {
        let client = Client::builder().timeout(MIRROR_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            key: config.key.clone(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }
}

impl MirrorStore for SupabaseMirror {
    fn insert_many(&self, table: &str, records: &[Value]) -> Result<(), MirrorError> {
        if records.is_empty() {
            return Ok(());
        }
        let resp = self
            .client
            .post(self.table_url(table))
            .header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", self.key))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal")
            .json(records)
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(MirrorError::Rejected {
                table: table.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        info!(table = %table, rows = records.len(), "Mirrored to Supabase");
        Ok(())
    }
}

/// Used when no mirror database is configured.
pub struct DisabledMirror;

impl MirrorStore for DisabledMirror {
    fn insert_many(&self, table: &str, records: &[Value]) -> Result<(), MirrorError> {
        debug!(table = %table, rows = records.len(), "Mirror disabled, skipping");
        Ok(())
    }
}
