//! Layered configuration, resolved once at startup.
//!
//! Layers, lowest priority first:
//! 1. code defaults (below),
//! 2. the in-store `CONFIG` sheet (column A key, column B value),
//! 3. environment variables prefixed `CIERRE_`.
//!
//! The merged result is an immutable [`AppConfig`] handed to every
//! component by reference.

use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::aggregate::KeyMatch;
use crate::aliases::AliasTable;
use crate::error::{CierreResult, StoreError};
use crate::headers::resolve_headers;
use crate::store::SpreadsheetStore;

pub const ENV_PREFIX: &str = "CIERRE_";

/// Built-in expense sheet, also tried when a custom `SHEET_GASTOS` is absent.
pub const DEFAULT_EXPENSES_SHEET: &str = "GASTOS CAJA";

const DEFAULT_DATABASE_PATH: &str = "data/cierre-caja.db";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_BLOB_ROOT: &str = "data/adjuntos";
const DEFAULT_EXPENSE_SUM_COLUMNS: &[&str] =
    &["Ahorro", "Propina Entregada", "Domicilio", "Otros Gastos"];
const DEFAULT_PAYROLL_SUM_COLUMNS: &[&str] = &["Total Nomina", "Total", "total"];

/// Flat key/value property source.
pub type Properties = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetNames {
    pub expenses: String,
    /// Looked up when neither `expenses` nor the built-in sheet exists.
    pub expenses_legacy: String,
    pub payroll: String,
    pub pos: String,
    pub card: String,
    pub invoices: String,
    pub config: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorTables {
    pub expenses: String,
    pub payroll: String,
    pub pos: String,
    pub card: String,
    pub invoices: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub url: String,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub log_dir: PathBuf,
    pub sheets: SheetNames,
    /// Literal headers summed into the expense total.
    pub expense_sum_columns: Vec<String>,
    /// Literal headers summed into the payroll total.
    pub payroll_sum_columns: Vec<String>,
    pub site_match: KeyMatch,
    pub blob_root: PathBuf,
    pub blob_base_url: Option<String>,
    pub supabase: Option<SupabaseConfig>,
    pub mirror_tables: MirrorTables,
    pub aliases: AliasTable,
}

impl Default for AppConfig {
    fn default() -> Self {
        build_with_aliases(&Properties::new(), AliasTable::builtin())
    }
}

/// Ordered merge of property layers; later layers win.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    layers: Vec<(&'static str, Properties)>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(mut self, source: &'static str, props: Properties) -> Self {
        self.layers.push((source, props));
        self
    }

    pub fn merged(&self) -> Properties {
        let mut out = Properties::new();
        for (source, props) in &self.layers {
            for (k, v) in props {
                debug!(source = *source, key = %k, "Config property");
                out.insert(k.clone(), v.clone());
            }
        }
        out
    }

    pub fn build(&self) -> CierreResult<AppConfig> {
        build(&self.merged())
    }
}

/// Environment variables carrying `CIERRE_`, with the prefix stripped.
pub fn env_properties() -> Properties {
    properties_from_env(std::env::vars())
}

pub fn properties_from_env(vars: impl IntoIterator<Item = (String, String)>) -> Properties {
    vars.into_iter()
        .filter_map(|(k, v)| k.strip_prefix(ENV_PREFIX).map(|k| (k.to_string(), v)))
        .collect()
}

/// Key/value rows of the config sheet. A missing sheet is an empty layer.
pub fn sheet_properties(
    store: &dyn SpreadsheetStore,
    sheet_name: &str,
) -> Result<Properties, StoreError> {
    let Some(sheet) = store.get_sheet(sheet_name)? else {
        return Ok(Properties::new());
    };
    let grid = resolve_headers(sheet.as_ref())?;
    let mut out = Properties::new();
    for row in &grid.rows {
        let key = row.first().map(|c| c.key_string()).unwrap_or_default();
        if key.is_empty() {
            continue;
        }
        let value = row.get(1).map(|c| c.to_string()).unwrap_or_default();
        out.insert(key, value);
    }
    Ok(out)
}

impl AppConfig {
    /// Full startup load: env is read first to locate the store, then the
    /// store's config sheet is layered under the environment.
    pub fn load(env: Properties, store: &dyn SpreadsheetStore) -> CierreResult<Self> {
        let bootstrap = ConfigLoader::new().layer("env", env.clone()).build()?;
        let from_sheet = sheet_properties(store, &bootstrap.sheets.config)?;
        let config = ConfigLoader::new()
            .layer("sheet", from_sheet)
            .layer("env", env)
            .build()?;
        info!(
            expenses = %config.sheets.expenses,
            payroll = %config.sheets.payroll,
            mirror = config.supabase.is_some(),
            "Configuration loaded"
        );
        Ok(config)
    }
}

fn text(props: &Properties, key: &str, default: &str) -> String {
    props
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}

fn optional(props: &Properties, key: &str) -> Option<String> {
    props
        .get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn list(props: &Properties, key: &str, default: &[&str]) -> Vec<String> {
    match optional(props, key) {
        Some(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => default.iter().map(|s| s.to_string()).collect(),
    }
}

fn flag(props: &Properties, key: &str) -> bool {
    optional(props, key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "si" | "sí"))
        .unwrap_or(false)
}

fn build(props: &Properties) -> CierreResult<AppConfig> {
    let aliases = match optional(props, "ALIASES_PATH") {
        Some(path) => AliasTable::from_json_file(&PathBuf::from(path))?,
        None => AliasTable::builtin(),
    };
    Ok(build_with_aliases(props, aliases))
}

fn build_with_aliases(props: &Properties, aliases: AliasTable) -> AppConfig {
    let sheets = SheetNames {
        expenses: text(props, "SHEET_GASTOS", DEFAULT_EXPENSES_SHEET),
        expenses_legacy: text(props, "SHEET_GASTOS_LEGACY", "GASTOS"),
        payroll: text(props, "SHEET_NOMINA", "NOMINA"),
        pos: text(props, "SHEET_MYS", "MYSINVENTARIOS"),
        card: text(props, "SHEET_SIIGO", "SIIGO"),
        invoices: text(props, "SHEET_FACTURAS", "FACTURAS X PAGAR"),
        config: text(props, "SHEET_CONFIG", "CONFIG"),
    };

    let mirror_tables = MirrorTables {
        expenses: text(props, "MIRROR_TABLE_GASTOS", "gastos_caja"),
        payroll: text(props, "MIRROR_TABLE_NOMINA", "nomina"),
        pos: text(props, "MIRROR_TABLE_MYS", "cierres_mys"),
        card: text(props, "MIRROR_TABLE_SIIGO", "cierres_siigo"),
        invoices: text(props, "MIRROR_TABLE_FACTURAS", "facturas_x_pagar"),
    };

    let supabase = match (optional(props, "SUPABASE_URL"), optional(props, "SUPABASE_KEY")) {
        (Some(url), Some(key)) => Some(SupabaseConfig { url, key }),
        _ => None,
    };

    let site_match = if flag(props, "SITE_MATCH_CASE_INSENSITIVE") {
        KeyMatch::CaseInsensitive
    } else {
        KeyMatch::Exact
    };

    AppConfig {
        database_path: PathBuf::from(text(props, "DATABASE_PATH", DEFAULT_DATABASE_PATH)),
        log_dir: PathBuf::from(text(props, "LOG_DIR", DEFAULT_LOG_DIR)),
        sheets,
        expense_sum_columns: list(props, "EXPENSE_SUM_COLUMNS", DEFAULT_EXPENSE_SUM_COLUMNS),
        payroll_sum_columns: list(props, "PAYROLL_SUM_COLUMNS", DEFAULT_PAYROLL_SUM_COLUMNS),
        site_match,
        blob_root: PathBuf::from(text(props, "BLOB_ROOT", DEFAULT_BLOB_ROOT)),
        blob_base_url: optional(props, "BLOB_BASE_URL"),
        supabase,
        mirror_tables,
        aliases,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{test_store, text_row};
    use crate::store::SheetDb;
    use serial_test::serial;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.sheets.expenses, "GASTOS CAJA");
        assert_eq!(config.sheets.expenses_legacy, "GASTOS");
        assert_eq!(config.sheets.payroll, "NOMINA");
        assert_eq!(config.payroll_sum_columns, vec!["Total Nomina", "Total", "total"]);
        assert_eq!(config.expense_sum_columns.len(), 4);
        assert_eq!(config.site_match, KeyMatch::Exact);
        assert!(config.supabase.is_none());
    }

    #[test]
    fn test_later_layers_win() {
        let config = ConfigLoader::new()
            .layer("sheet", props(&[("SHEET_NOMINA", "NOMINA 2025"), ("SHEET_MYS", "MYS")]))
            .layer("env", props(&[("SHEET_NOMINA", "PAGOS")]))
            .build()
            .unwrap();
        assert_eq!(config.sheets.payroll, "PAGOS");
        assert_eq!(config.sheets.pos, "MYS");
    }

    #[test]
    fn test_lists_flags_and_supabase() {
        let config = ConfigLoader::new()
            .layer(
                "env",
                props(&[
                    ("EXPENSE_SUM_COLUMNS", "Otros Gastos, Domicilio,,"),
                    ("SITE_MATCH_CASE_INSENSITIVE", "true"),
                    ("SUPABASE_URL", "https://x.supabase.co"),
                    ("SUPABASE_KEY", "anon"),
                ]),
            )
            .build()
            .unwrap();
        assert_eq!(config.expense_sum_columns, vec!["Otros Gastos", "Domicilio"]);
        assert_eq!(config.site_match, KeyMatch::CaseInsensitive);
        assert_eq!(
            config.supabase,
            Some(SupabaseConfig {
                url: "https://x.supabase.co".into(),
                key: "anon".into()
            })
        );
    }

    #[test]
    fn test_bad_alias_path_fails_startup() {
        let err = ConfigLoader::new()
            .layer("env", props(&[("ALIASES_PATH", "/nonexistent/aliases.json")]))
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "invalid_payload");
    }

    #[test]
    fn test_config_sheet_under_env() {
        let db = test_store("CONFIG", &["Clave", "Valor"]);
        db.get_sheet("CONFIG")
            .unwrap()
            .unwrap()
            .append_rows(
                2,
                &[
                    text_row(&["SHEET_NOMINA", "NOMINA SEDES"]),
                    text_row(&["BLOB_BASE_URL", "https://files.example.co"]),
                    text_row(&["", "ignored"]),
                ],
            )
            .unwrap();

        let config = AppConfig::load(props(&[("BLOB_BASE_URL", "https://cdn.example.co")]), &db)
            .unwrap();
        assert_eq!(config.sheets.payroll, "NOMINA SEDES");
        assert_eq!(config.blob_base_url.as_deref(), Some("https://cdn.example.co"));
    }

    #[test]
    fn test_missing_config_sheet_is_empty_layer() {
        let db = SheetDb::open_in_memory().unwrap();
        assert!(sheet_properties(&db, "CONFIG").unwrap().is_empty());
    }

    #[test]
    #[serial]
    fn test_env_prefix_is_stripped() {
        std::env::set_var("CIERRE_SHEET_SIIGO", "SIIGO NUEVO");
        let env = env_properties();
        std::env::remove_var("CIERRE_SHEET_SIIGO");
        assert_eq!(env.get("SHEET_SIIGO").map(String::as_str), Some("SIIGO NUEVO"));

        let filtered = properties_from_env(vec![
            ("PATH".to_string(), "/bin".to_string()),
            ("CIERRE_LOG_DIR".to_string(), "/var/log".to_string()),
        ]);
        assert_eq!(filtered, props(&[("LOG_DIR", "/var/log")]));
    }
}
