//! Semantic field names and their literal column headers per schema.
//!
//! Handlers build records keyed by stable semantic names (`Fecha`,
//! `PropinaEntregada`, `TotalNomina`, ...). Each schema's alias map says
//! which literal header carries that field today. Fields a schema does not
//! list are dropped when writing to it.
//!
//! The built-in table describes the current canonical layout of every
//! sheet. Deployments can replace it with a JSON file of the shape
//! `{"<schema>": {"<semantic field>": "<header>"}}` (see `config.rs`).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{CierreError, CierreResult};
use crate::headers::normalize_name;

/// Semantic field names shared by handlers, projector and totals.
pub mod field {
    pub const DATE: &str = "Fecha";
    pub const SITE: &str = "Sede";
    pub const SHIFT: &str = "Turno";
    pub const MANAGER: &str = "Encargado";
    pub const NOTES: &str = "Observaciones";

    pub const SAVINGS: &str = "Ahorro";
    pub const TIP_DELIVERED: &str = "PropinaEntregada";
    pub const DELIVERY: &str = "Domicilio";
    pub const OTHER_EXPENSES: &str = "OtrosGastos";
    pub const OTHER_EXPENSES_DETAIL: &str = "DetalleOtrosGastos";

    pub const EMPLOYEE: &str = "Empleado";
    pub const SALARY: &str = "Salario";
    pub const TRANSPORT: &str = "Transporte";
    pub const EXTRAS: &str = "Extras";
    pub const PAYROLL_TOTAL: &str = "TotalNomina";

    pub const NO_CASH: &str = "SinEfectivoSiigo";
    pub const CASH_COLLECTED: &str = "CobroEfectivo";
    pub const REAL_CASH_TOTAL: &str = "TotalEfectivoReal";
    pub const CASH_TO_DELIVER: &str = "EfectivoParaEntregar";
    pub const OVER_SHORT: &str = "SobroOFalto";
    pub const CARD_VOUCHERS: &str = "TarjetasVouchers";
    pub const TERMINAL_CLOSE: &str = "CierreDatafono";
    pub const TERMINAL_DIFF: &str = "DifDatafono";
    pub const TRANSFER: &str = "Transferencia";
    pub const SALES_TOTAL: &str = "TotalVenta";
    pub const POS_CLOSE: &str = "CierreMys";
    pub const BOOKS_CLOSE: &str = "CierreSiigo";
    pub const ATTACHMENTS: &str = "Adjuntos";

    pub const SUPPLIER: &str = "Proveedor";
    pub const INVOICE_NUMBER: &str = "NumFactura";
    pub const INVOICE_AMOUNT: &str = "ValorFactura";
    pub const CATEGORY: &str = "Categoria";
}

use field::*;

const KEY_COLUMNS: &[(&str, &str)] = &[
    (DATE, "Fecha"),
    (SITE, "Sede"),
    (SHIFT, "Turno"),
    (MANAGER, "Encargado"),
    (NOTES, "Observaciones"),
];

const EXPENSE_COLUMNS: &[(&str, &str)] = &[
    (SAVINGS, "Ahorro"),
    (TIP_DELIVERED, "Propina Entregada"),
    (DELIVERY, "Domicilio"),
    (OTHER_EXPENSES, "Otros Gastos"),
    (OTHER_EXPENSES_DETAIL, "Detalle Otros Gastos"),
];

const PAYROLL_COLUMNS: &[(&str, &str)] = &[
    (EMPLOYEE, "Empleado"),
    (SALARY, "Salario"),
    (TRANSPORT, "Transporte"),
    (EXTRAS, "Extras"),
    (PAYROLL_TOTAL, "Total Nomina"),
];

const POS_COLUMNS: &[(&str, &str)] = &[
    (CASH_COLLECTED, "Cobro Efectivo"),
    (REAL_CASH_TOTAL, "Total Efectivo Real"),
    (CASH_TO_DELIVER, "Efectivo Para Entregar"),
    (OVER_SHORT, "Sobro o Falto"),
    (SALES_TOTAL, "Total Venta"),
    (POS_CLOSE, "Cierre MYS"),
    (ATTACHMENTS, "Adjuntos"),
];

const CARD_COLUMNS: &[(&str, &str)] = &[
    (NO_CASH, "Sin Efectivo"),
    (CASH_COLLECTED, "Cobro Efectivo"),
    (REAL_CASH_TOTAL, "Total Efectivo Real"),
    (CASH_TO_DELIVER, "Efectivo Para Entregar"),
    (OVER_SHORT, "Sobro o Falto"),
    (CARD_VOUCHERS, "Tarjetas/Vouchers"),
    (TERMINAL_CLOSE, "Cierre Datafono"),
    (TERMINAL_DIFF, "Dif Datafono"),
    (TRANSFER, "Transferencia"),
    (SALES_TOTAL, "Total Venta"),
    (BOOKS_CLOSE, "Cierre SIIGO"),
    (ATTACHMENTS, "Adjuntos"),
];

const INVOICE_COLUMNS: &[(&str, &str)] = &[
    (SUPPLIER, "Proveedor"),
    (INVOICE_NUMBER, "Num Factura"),
    (INVOICE_AMOUNT, "Valor Factura"),
    (CATEGORY, "Categoria"),
    (ATTACHMENTS, "Adjuntos"),
];

/// Built-in schemas: name and column layout (shared key columns first).
const BUILTIN_SCHEMAS: &[(&str, &[(&str, &str)])] = &[
    ("GASTOS CAJA", EXPENSE_COLUMNS),
    ("GASTOS", EXPENSE_COLUMNS),
    ("NOMINA", PAYROLL_COLUMNS),
    ("MYSINVENTARIOS", POS_COLUMNS),
    ("SIIGO", CARD_COLUMNS),
    ("FACTURAS X PAGAR", INVOICE_COLUMNS),
];

/// Semantic field name to literal header text.
pub type AliasMap = BTreeMap<String, String>;

#[derive(Debug, Clone)]
struct SchemaEntry {
    name: String,
    normalized: String,
    aliases: AliasMap,
    /// Literal headers in canonical column order.
    columns: Vec<String>,
}

/// Immutable per-deployment alias configuration.
#[derive(Debug, Clone)]
pub struct AliasTable {
    entries: Vec<SchemaEntry>,
    empty: AliasMap,
}

impl AliasTable {
    pub fn builtin() -> Self {
        let entries = BUILTIN_SCHEMAS
            .iter()
            .map(|(name, columns)| {
                let pairs: Vec<(String, String)> = KEY_COLUMNS
                    .iter()
                    .chain(columns.iter())
                    .map(|(f, h)| (f.to_string(), h.to_string()))
                    .collect();
                SchemaEntry::new(name, pairs)
            })
            .collect();
        AliasTable {
            entries,
            empty: AliasMap::new(),
        }
    }

    /// Build from `{schema: {field: header}}`. Column order follows the
    /// map's key order, which only matters for sheet provisioning.
    pub fn from_map(map: BTreeMap<String, AliasMap>) -> Self {
        let entries = map
            .into_iter()
            .map(|(name, aliases)| SchemaEntry::new(&name, aliases.into_iter().collect()))
            .collect();
        AliasTable {
            entries,
            empty: AliasMap::new(),
        }
    }

    pub fn from_json_file(path: &Path) -> CierreResult<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            CierreError::Payload(format!("read alias table {}: {e}", path.display()))
        })?;
        let map: BTreeMap<String, AliasMap> = serde_json::from_str(&raw).map_err(|e| {
            CierreError::Payload(format!("parse alias table {}: {e}", path.display()))
        })?;
        Ok(AliasTable::from_map(map))
    }

    fn entry(&self, schema_name: &str) -> Option<&SchemaEntry> {
        if let Some(exact) = self.entries.iter().find(|e| e.name == schema_name) {
            return Some(exact);
        }
        let wanted = normalize_name(schema_name);
        self.entries.iter().find(|e| e.normalized == wanted)
    }

    /// Alias map for `schema_name`: verbatim match first, then the first
    /// schema whose normalized name matches, else an empty map.
    pub fn resolve(&self, schema_name: &str) -> &AliasMap {
        self.entry(schema_name)
            .map(|e| &e.aliases)
            .unwrap_or(&self.empty)
    }

    /// Literal headers used to provision a fresh sheet for `schema_name`.
    pub fn canonical_headers(&self, schema_name: &str) -> Vec<String> {
        self.entry(schema_name)
            .map(|e| e.columns.clone())
            .unwrap_or_default()
    }

    pub fn schema_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        AliasTable::builtin()
    }
}

impl SchemaEntry {
    fn new(name: &str, pairs: Vec<(String, String)>) -> Self {
        let columns = pairs.iter().map(|(_, h)| h.clone()).collect();
        SchemaEntry {
            name: name.to_string(),
            normalized: normalize_name(name),
            aliases: pairs.into_iter().collect(),
            columns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbatim_lookup() {
        let table = AliasTable::builtin();
        let map = table.resolve("NOMINA");
        assert_eq!(map.get(PAYROLL_TOTAL).map(String::as_str), Some("Total Nomina"));
        assert_eq!(map.get(DATE).map(String::as_str), Some("Fecha"));
        assert!(map.get(OTHER_EXPENSES).is_none());
    }

    #[test]
    fn test_normalized_schema_lookup() {
        let table = AliasTable::builtin();
        let map = table.resolve("facturas_x_pagar");
        assert_eq!(map.get(SUPPLIER).map(String::as_str), Some("Proveedor"));
        let map = table.resolve("Gastos Caja");
        assert_eq!(
            map.get(TIP_DELIVERED).map(String::as_str),
            Some("Propina Entregada")
        );
    }

    #[test]
    fn test_unknown_schema_is_empty() {
        let table = AliasTable::builtin();
        assert!(table.resolve("INVENTARIO").is_empty());
        assert!(table.canonical_headers("INVENTARIO").is_empty());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let table = AliasTable::builtin();
        for name in table.schema_names() {
            let first = table.resolve(name).clone();
            let second = table.resolve(name).clone();
            assert_eq!(first, second, "aliases for {name} changed between lookups");
        }
    }

    #[test]
    fn test_canonical_headers_keep_key_columns_first() {
        let table = AliasTable::builtin();
        let headers = table.canonical_headers("SIIGO");
        assert_eq!(&headers[..3], &["Fecha", "Sede", "Turno"]);
        assert_eq!(headers.last().map(String::as_str), Some("Adjuntos"));
    }

    #[test]
    fn test_json_table_replaces_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aliases.json");
        fs::write(
            &path,
            r#"{"NOMINA": {"Fecha": "Dia", "Sede": "Local", "Turno": "Jornada",
                           "TotalNomina": "Pagado"}}"#,
        )
        .unwrap();
        let table = AliasTable::from_json_file(&path).unwrap();
        assert_eq!(
            table.resolve("nomina").get(PAYROLL_TOTAL).map(String::as_str),
            Some("Pagado")
        );
        assert!(table.resolve("GASTOS CAJA").is_empty());
    }
}
