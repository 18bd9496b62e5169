//! Header resolution for sheets whose column layout is not fixed.
//!
//! The first row of a sheet names its columns. Two lookups are built from
//! it: the literal header text, and a normalized form used for fuzzy
//! matching (see [`normalize_name`]).

use std::collections::HashMap;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::cell::CellValue;
use crate::error::StoreError;
use crate::store::Sheet;

/// Decompose, drop combining marks, drop whitespace/`.`/`-`/`_`, lowercase.
///
/// `"Propina Entregada"`, `"propina_entregada"` and `"PropinaEntregada"`
/// all normalize to `"propinaentregada"`; `"Nómina"` to `"nomina"`.
pub fn normalize_name(raw: &str) -> String {
    raw.nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| !(c.is_whitespace() || matches!(c, '.' | '-' | '_')))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Column lookups for one sheet's header row.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    pub headers: Vec<String>,
    /// Literal header text to column index, last duplicate wins.
    pub header_index: HashMap<String, usize>,
    /// Normalized header text to column index, last duplicate wins.
    pub normalized_index: HashMap<String, usize>,
}

impl HeaderMap {
    pub fn from_header_row(row: &[CellValue]) -> Self {
        if row.iter().all(CellValue::is_blank) {
            return HeaderMap::default();
        }
        let headers: Vec<String> = row.iter().map(CellValue::to_string).collect();
        let mut header_index = HashMap::new();
        let mut normalized_index = HashMap::new();
        for (i, header) in headers.iter().enumerate() {
            if header.trim().is_empty() {
                continue;
            }
            header_index.insert(header.clone(), i);
            normalized_index.insert(normalize_name(header), i);
        }
        HeaderMap {
            headers,
            header_index,
            normalized_index,
        }
    }

    /// No usable header row: the schema is uninitialized.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn literal(&self, header: &str) -> Option<usize> {
        self.header_index.get(header).copied()
    }

    pub fn normalized(&self, name: &str) -> Option<usize> {
        self.normalized_index.get(&normalize_name(name)).copied()
    }
}

/// A sheet read in full: resolved headers plus the data rows beneath them.
#[derive(Debug, Clone, Default)]
pub struct SheetGrid {
    pub headers: HeaderMap,
    pub rows: Vec<Vec<CellValue>>,
}

/// Read `sheet` and resolve its header row. An empty sheet or a blank
/// header row yields an empty [`HeaderMap`]; callers decide whether that
/// is an error.
pub fn resolve_headers(sheet: &dyn Sheet) -> Result<SheetGrid, StoreError> {
    let mut values = sheet.read_all()?;
    if values.is_empty() {
        return Ok(SheetGrid::default());
    }
    let header_row = values.remove(0);
    let headers = HeaderMap::from_header_row(&header_row);
    if headers.is_empty() {
        return Ok(SheetGrid::default());
    }
    Ok(SheetGrid {
        headers,
        rows: values,
    })
}
