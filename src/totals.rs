//! Per-shift totals: expenses and payroll charged against the cash drawer.
//!
//! Recomputed from the sheets on every call, never cached.

use serde::Serialize;
use tracing::debug;

use crate::aggregate::{sum_matching, KeyColumn};
use crate::aliases::field;
use crate::cell::CellValue;
use crate::config::{AppConfig, DEFAULT_EXPENSES_SHEET};
use crate::error::CierreResult;
use crate::store::{Sheet, SpreadsheetStore};

/// Composite key correlating rows of one operating period.
///
/// Values are opaque tokens compared as trimmed strings; see `aggregate.rs`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShiftKey {
    pub date: String,
    pub site: String,
    pub shift: String,
}

impl ShiftKey {
    pub fn new(date: &str, site: &str, shift: &CellValue) -> Self {
        Self {
            date: date.trim().to_string(),
            site: site.trim().to_string(),
            shift: shift.key_string(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.date.is_empty() && !self.site.is_empty() && !self.shift.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub expense_total: f64,
    pub payroll_total: f64,
    pub combined_total: f64,
}

impl Totals {
    pub fn new(expense_total: f64, payroll_total: f64) -> Self {
        Self {
            expense_total,
            payroll_total,
            combined_total: expense_total + payroll_total,
        }
    }
}

pub struct TotalsService<'a> {
    store: &'a dyn SpreadsheetStore,
    config: &'a AppConfig,
}

impl<'a> TotalsService<'a> {
    pub fn new(store: &'a dyn SpreadsheetStore, config: &'a AppConfig) -> Self {
        Self { store, config }
    }

    /// Expense and payroll totals for `key`. An incomplete key returns zero
    /// totals without reading the store; an absent sheet contributes zero.
    pub fn compute(&self, key: &ShiftKey) -> CierreResult<Totals> {
        if !key.is_complete() {
            return Ok(Totals::default());
        }

        let sheets = &self.config.sheets;
        let mut expense_sheet = None;
        for name in [
            sheets.expenses.as_str(),
            DEFAULT_EXPENSES_SHEET,
            sheets.expenses_legacy.as_str(),
        ] {
            if let Some(sheet) = self.store.get_sheet(name)? {
                expense_sheet = Some(sheet);
                break;
            }
        }
        let expense_total = match expense_sheet {
            Some(sheet) => self.sum(sheet.as_ref(), key, &self.config.expense_sum_columns)?,
            None => 0.0,
        };

        let payroll_total = match self.store.get_sheet(&sheets.payroll)? {
            Some(sheet) => self.sum(sheet.as_ref(), key, &self.config.payroll_sum_columns)?,
            None => 0.0,
        };

        let totals = Totals::new(expense_total, payroll_total);
        debug!(
            date = %key.date,
            site = %key.site,
            shift = %key.shift,
            expense_total = totals.expense_total,
            payroll_total = totals.payroll_total,
            "Shift totals computed"
        );
        Ok(totals)
    }

    /// Key columns come from the alias map of the sheet actually found.
    fn sum(&self, sheet: &dyn Sheet, key: &ShiftKey, sum_columns: &[String]) -> CierreResult<f64> {
        let aliases = self.config.aliases.resolve(sheet.name());
        let header = |semantic: &'static str| -> String {
            aliases
                .get(semantic)
                .cloned()
                .unwrap_or_else(|| semantic.to_string())
        };
        let keys = [
            KeyColumn::exact(&header(field::DATE), &key.date),
            KeyColumn::exact(&header(field::SITE), &key.site).with_mode(self.config.site_match),
            KeyColumn::exact(&header(field::SHIFT), &key.shift),
        ];
        Ok(sum_matching(sheet, &keys, sum_columns)?)
    }
}
