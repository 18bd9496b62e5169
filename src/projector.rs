//! Row projection: semantic records to positional sheet rows.
//!
//! A field lands in the column its alias names when that header exists in
//! the sheet; otherwise in the column whose normalized header equals the
//! normalized field name; otherwise it is dropped. Dropping is how records
//! survive sheets that gained or lost columns, so it never errors.

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::aliases::{AliasMap, AliasTable};
use crate::cell::CellValue;
use crate::error::{CierreError, CierreResult};
use crate::headers::{resolve_headers, HeaderMap};
use crate::store::{Sheet, SpreadsheetStore};

/// Field name to scalar value, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SemanticRecord {
    fields: Vec<(String, CellValue)>,
}

impl SemanticRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `field`, replacing an earlier value for the same name.
    pub fn set(&mut self, field: &str, value: impl Into<CellValue>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| k == field) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((field.to_string(), value)),
        }
    }

    pub fn with(mut self, field: &str, value: impl Into<CellValue>) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&CellValue> {
        self.fields.iter().find(|(k, _)| k == field).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// JSON object keyed by semantic field name (mirror replication).
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
            .collect();
        Value::Object(map)
    }
}

/// Place each field of `record` into its column. Unset cells are empty text.
pub fn project_row(
    record: &SemanticRecord,
    headers: &HeaderMap,
    aliases: &AliasMap,
) -> Vec<CellValue> {
    let mut row = vec![CellValue::empty(); headers.width()];
    for (field, value) in record.iter() {
        let idx = aliases
            .get(field)
            .and_then(|header| headers.literal(header))
            .or_else(|| headers.normalized(field));
        match idx {
            Some(i) => row[i] = value.clone(),
            None => debug!(field = %field, "Field has no column in sheet, dropped"),
        }
    }
    row
}

/// Writes semantic records into named sheets.
pub struct RowProjector<'a> {
    store: &'a dyn SpreadsheetStore,
    aliases: &'a AliasTable,
}

impl<'a> RowProjector<'a> {
    pub fn new(store: &'a dyn SpreadsheetStore, aliases: &'a AliasTable) -> Self {
        Self { store, aliases }
    }

    fn open(&self, schema_name: &str) -> CierreResult<(Box<dyn Sheet + 'a>, HeaderMap)> {
        let sheet = self
            .store
            .get_sheet(schema_name)?
            .ok_or_else(|| CierreError::Schema(format!("sheet not found: {schema_name}")))?;
        let grid = resolve_headers(sheet.as_ref())?;
        if grid.headers.is_empty() {
            return Err(CierreError::Schema(format!(
                "sheet \"{schema_name}\" has no headers defined"
            )));
        }
        Ok((sheet, grid.headers))
    }

    /// Fails with a schema error when `schema_name` cannot take rows.
    pub fn check(&self, schema_name: &str) -> CierreResult<()> {
        self.open(schema_name).map(|_| ())
    }

    /// Positional row for `record` against the sheet's current header layout.
    pub fn project(
        &self,
        record: &SemanticRecord,
        schema_name: &str,
    ) -> CierreResult<Vec<CellValue>> {
        let (_, headers) = self.open(schema_name)?;
        Ok(project_row(record, &headers, self.aliases.resolve(schema_name)))
    }

    /// Append `records` below the last occupied row (never above row 2).
    /// Returns the 1-based row number of the first written row.
    pub fn append_rows(
        &self,
        schema_name: &str,
        records: &[SemanticRecord],
    ) -> CierreResult<usize> {
        if records.is_empty() {
            return Err(CierreError::Validation {
                field: "rows".into(),
                message: "no rows to insert".into(),
            });
        }
        let (sheet, headers) = self.open(schema_name)?;
        let aliases = self.aliases.resolve(schema_name);
        let rows: Vec<Vec<CellValue>> = records
            .iter()
            .map(|r| project_row(r, &headers, aliases))
            .collect();

        let start_row = (sheet.last_occupied_row()? + 1).max(2);
        sheet.append_rows(start_row, &rows)?;
        info!(
            sheet = %schema_name,
            start_row = start_row,
            rows = rows.len(),
            "Rows appended"
        );
        Ok(start_row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aliases::field;
    use crate::store::tests::{bare_store, test_store, text_row};
    use crate::store::SheetDb;

    fn expense_record() -> SemanticRecord {
        SemanticRecord::new()
            .with(field::DATE, "2024-03-01")
            .with(field::SITE, "CERRITOS")
            .with(field::SHIFT, 1.0)
            .with(field::OTHER_EXPENSES, 15000.0)
    }

    #[test]
    fn test_alias_then_normalized_fallback() {
        let headers = HeaderMap::from_header_row(&text_row(&[
            "Fecha",
            "Sede",
            "Turno",
            "otros_gastos",
            "Notas Extra",
        ]));
        let mut aliases = AliasMap::new();
        aliases.insert(field::DATE.into(), "Fecha".into());
        // alias target missing from sheet: fall back to normalized name
        aliases.insert(field::OTHER_EXPENSES.into(), "Otros Gastos".into());

        let record = expense_record().with("notasExtra", "ok");
        let row = project_row(&record, &headers, &aliases);
        assert_eq!(row[0], CellValue::from("2024-03-01"));
        assert_eq!(row[1], CellValue::from("CERRITOS"));
        assert_eq!(row[2], CellValue::Number(1.0));
        assert_eq!(row[3], CellValue::Number(15000.0));
        assert_eq!(row[4], CellValue::from("ok"));
    }

    #[test]
    fn test_unknown_field_is_dropped() {
        let db = test_store(
            "GASTOS CAJA",
            &["Fecha", "Sede", "Turno", "Otros Gastos", "Domicilio"],
        );
        let table = AliasTable::builtin();
        let projector = RowProjector::new(&db, &table);

        let record = expense_record().with("CampoInexistente", "x");
        let row = projector.project(&record, "GASTOS CAJA").unwrap();
        assert_eq!(row.len(), 5);
        assert_eq!(row[3], CellValue::Number(15000.0));
        assert_eq!(row[4], CellValue::empty());
        assert!(!row.contains(&CellValue::from("x")));

        let first = projector.append_rows("GASTOS CAJA", &[record]).unwrap();
        assert_eq!(first, 2);
    }

    #[test]
    fn test_append_position_and_batch() {
        let db = test_store("NOMINA", &["Fecha", "Sede", "Turno", "Empleado"]);
        let table = AliasTable::builtin();
        let projector = RowProjector::new(&db, &table);

        let a = SemanticRecord::new().with(field::EMPLOYEE, "A");
        let b = SemanticRecord::new().with(field::EMPLOYEE, "B");
        assert_eq!(projector.append_rows("NOMINA", &[a.clone()]).unwrap(), 2);
        assert_eq!(projector.append_rows("NOMINA", &[a, b]).unwrap(), 3);

        let sheet = db.get_sheet("NOMINA").unwrap().unwrap();
        assert_eq!(sheet.last_occupied_row().unwrap(), 4);
        let grid = sheet.read_all().unwrap();
        assert_eq!(grid[3][3], CellValue::from("B"));
    }

    #[test]
    fn test_missing_sheet_and_blank_headers_fail_closed() {
        let db = SheetDb::open_in_memory().unwrap();
        db.create_sheet("SIIGO", &["", ""]).unwrap();
        let table = AliasTable::builtin();
        let projector = RowProjector::new(&db, &table);

        let err = projector
            .append_rows("NOMINA", &[expense_record()])
            .unwrap_err();
        assert_eq!(err.code(), "schema_error");

        let err = projector
            .append_rows("SIIGO", &[expense_record()])
            .unwrap_err();
        assert!(err.to_string().contains("no headers defined"));
        let sheet = db.get_sheet("SIIGO").unwrap().unwrap();
        assert_eq!(sheet.last_occupied_row().unwrap(), 1);
    }

    #[test]
    fn test_sheet_without_any_rows_fails_closed() {
        let db = bare_store("GASTOS CAJA");
        let table = AliasTable::builtin();
        let projector = RowProjector::new(&db, &table);

        let err = projector.check("GASTOS CAJA").unwrap_err();
        assert_eq!(err.code(), "schema_error");
        let err = projector
            .append_rows("GASTOS CAJA", &[expense_record()])
            .unwrap_err();
        assert!(err.to_string().contains("no headers defined"));

        let sheet = db.get_sheet("GASTOS CAJA").unwrap().unwrap();
        assert_eq!(sheet.last_occupied_row().unwrap(), 0);
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let db = test_store("NOMINA", &["Fecha"]);
        let table = AliasTable::builtin();
        let err = RowProjector::new(&db, &table)
            .append_rows("NOMINA", &[])
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn test_record_set_replaces() {
        let mut record = SemanticRecord::new().with(field::SITE, "A");
        record.set(field::SITE, "B");
        assert_eq!(record.len(), 1);
        assert_eq!(record.get(field::SITE), Some(&CellValue::from("B")));
        assert_eq!(record.to_json(), serde_json::json!({"Sede": "B"}));
    }
}
