//! Cierre de Caja - shift cash-closure backend
//!
//! Records expenses, payroll, reconciliations and supplier invoices into
//! spreadsheet-style sheets, then computes per-shift totals and the final
//! cash balance. Requests come in as JSON objects (see `commands.rs`).

use tracing::{info, warn};

pub mod activity;
pub mod aggregate;
pub mod aliases;
pub mod args;
pub mod blob;
pub mod cell;
pub mod closure;
pub mod commands;
pub mod config;
pub mod error;
pub mod handlers;
pub mod headers;
pub mod logging;
pub mod mirror;
mod payload;
pub mod projector;
pub mod store;
pub mod totals;

use blob::FsBlobStore;
use config::{AppConfig, ConfigLoader, Properties};
use error::CierreResult;
use handlers::Context;
use mirror::{DisabledMirror, MirrorStore, SupabaseMirror};
use store::SheetDb;

/// Header row of the key/value configuration sheet.
const CONFIG_SHEET_HEADERS: &[&str] = &["Clave", "Valor"];

/// Everything a request needs, opened once per process.
pub struct Backend {
    pub config: AppConfig,
    pub db: SheetDb,
    blobs: FsBlobStore,
    mirror: Box<dyn MirrorStore>,
}

impl Backend {
    /// Open the store named by `env`, then load the full layered config
    /// (code defaults, `CONFIG` sheet, environment).
    pub fn open(env: Properties) -> CierreResult<Self> {
        let bootstrap = ConfigLoader::new().layer("env", env.clone()).build()?;
        let db = SheetDb::open(&bootstrap.database_path)?;
        let config = AppConfig::load(env, &db)?;

        let blobs = FsBlobStore::new(config.blob_root.clone(), config.blob_base_url.clone());
        let mirror: Box<dyn MirrorStore> = match &config.supabase {
            Some(supabase) => match SupabaseMirror::new(supabase) {
                Ok(mirror) => Box::new(mirror),
                Err(e) => {
                    warn!(error = %e, "Mirror client unavailable, replication disabled");
                    Box::new(DisabledMirror)
                }
            },
            None => Box::new(DisabledMirror),
        };

        Ok(Backend {
            config,
            db,
            blobs,
            mirror,
        })
    }

    pub fn context(&self) -> Context<'_> {
        Context {
            config: &self.config,
            store: &self.db,
            blobs: &self.blobs,
            mirror: self.mirror.as_ref(),
            activity: &self.db,
        }
    }

    /// Create every configured sheet that is missing, with its canonical
    /// headers. Returns the names created.
    pub fn provision(&self) -> CierreResult<Vec<String>> {
        provision_sheets(&self.db, &self.config)
    }
}

pub fn provision_sheets(db: &SheetDb, config: &AppConfig) -> CierreResult<Vec<String>> {
    let sheets = &config.sheets;
    let mut created = Vec::new();
    for name in [
        &sheets.expenses,
        &sheets.payroll,
        &sheets.pos,
        &sheets.card,
        &sheets.invoices,
    ] {
        let headers = config.aliases.canonical_headers(name);
        if headers.is_empty() {
            warn!(sheet = %name, "No canonical layout for sheet, not provisioned");
            continue;
        }
        let headers: Vec<&str> = headers.iter().map(String::as_str).collect();
        if db.create_sheet(name, &headers)? {
            created.push(name.clone());
        }
    }
    if db.create_sheet(&sheets.config, CONFIG_SHEET_HEADERS)? {
        created.push(sheets.config.clone());
    }
    info!(created = created.len(), "Sheets provisioned");
    Ok(created)
}
