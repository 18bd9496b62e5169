//! Sum numeric columns over the rows matching a composite key.
//!
//! Key matching compares trimmed string forms, never parsed dates or
//! numbers: `"2024-01-05"` matches `" 2024-01-05 "` but not `"2024-1-5"`.
//! Handlers write keys in the same form the totals read them, so this only
//! breaks when a sheet is edited by hand with a different format.
//!
//! Nothing here errors on schema gaps. A missing key column means no row
//! can match; missing sum columns are skipped; both yield `0`.

use tracing::debug;

use crate::cell::CellValue;
use crate::error::StoreError;
use crate::headers::{resolve_headers, SheetGrid};
use crate::store::Sheet;

/// How a key cell is compared with the wanted value (both trimmed first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyMatch {
    #[default]
    Exact,
    CaseInsensitive,
}

/// One component of a composite key: literal header, wanted value, mode.
#[derive(Debug, Clone)]
pub struct KeyColumn {
    pub header: String,
    pub value: String,
    pub mode: KeyMatch,
}

impl KeyColumn {
    pub fn exact(header: &str, value: &str) -> Self {
        Self {
            header: header.to_string(),
            value: value.to_string(),
            mode: KeyMatch::Exact,
        }
    }

    pub fn with_mode(mut self, mode: KeyMatch) -> Self {
        self.mode = mode;
        self
    }

    fn matches(&self, cell: &CellValue) -> bool {
        let actual = cell.key_string();
        let wanted = self.value.trim();
        match self.mode {
            KeyMatch::Exact => actual == wanted,
            KeyMatch::CaseInsensitive => actual.to_lowercase() == wanted.to_lowercase(),
        }
    }
}

/// Sum `sum_headers` over the data rows of `grid` whose key cells match.
pub fn sum_grid(grid: &SheetGrid, keys: &[KeyColumn], sum_headers: &[String]) -> f64 {
    let mut key_indexes = Vec::with_capacity(keys.len());
    for key in keys {
        match grid.headers.literal(&key.header) {
            Some(idx) => key_indexes.push((idx, key)),
            None => {
                debug!(header = %key.header, "Key column missing, nothing can match");
                return 0.0;
            }
        }
    }

    let mut sum_indexes: Vec<usize> = Vec::new();
    for header in sum_headers {
        if let Some(idx) = grid.headers.literal(header) {
            if !sum_indexes.contains(&idx) {
                sum_indexes.push(idx);
            }
        }
    }
    if sum_indexes.is_empty() {
        return 0.0;
    }

    let mut total = 0.0;
    for row in &grid.rows {
        let matched = key_indexes.iter().all(|(idx, key)| {
            row.get(*idx)
                .map(|cell| key.matches(cell))
                .unwrap_or_else(|| key.value.trim().is_empty())
        });
        if !matched {
            continue;
        }
        for idx in &sum_indexes {
            total += row.get(*idx).and_then(CellValue::as_number).unwrap_or(0.0);
        }
    }
    total
}

/// Read `sheet` and sum the matching rows. An uninitialized sheet sums to 0.
pub fn sum_matching(
    sheet: &dyn Sheet,
    keys: &[KeyColumn],
    sum_headers: &[String],
) -> Result<f64, StoreError> {
    let grid = resolve_headers(sheet)?;
    if grid.headers.is_empty() {
        return Ok(0.0);
    }
    Ok(sum_grid(&grid, keys, sum_headers))
}
