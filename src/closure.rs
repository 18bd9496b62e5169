//! End-of-shift closure: counted cash against the shift's affectations.
//!
//! Pure read. `real_balance = cash_counted - combined_total`.

use serde::Serialize;
use tracing::info;

use crate::cell::CellValue;
use crate::error::CierreResult;
use crate::payload::{require_fields, to_number};
use crate::totals::{ShiftKey, TotalsService};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosureResult {
    pub shift: f64,
    pub site: String,
    pub date: String,
    pub cash_counted: f64,
    pub expense_total: f64,
    pub payroll_total: f64,
    pub real_balance: f64,
    pub combined_total: f64,
}

/// Raw closure inputs as received; any may be missing.
#[derive(Debug, Clone, Default)]
pub struct ClosureRequest {
    pub site: Option<CellValue>,
    pub shift: Option<CellValue>,
    pub cash_counted: Option<CellValue>,
    pub date: Option<CellValue>,
}

pub fn calculate_closure(
    totals: &TotalsService<'_>,
    request: &ClosureRequest,
) -> CierreResult<ClosureResult> {
    require_fields(&[
        ("site", request.site.as_ref()),
        ("shift", request.shift.as_ref()),
        ("cash", request.cash_counted.as_ref()),
        ("date", request.date.as_ref()),
    ])?;
    let empty = CellValue::empty();
    let site = request.site.as_ref().unwrap_or(&empty).key_string();
    let date = request.date.as_ref().unwrap_or(&empty).key_string();
    let cash_counted = to_number("cash", request.cash_counted.as_ref().unwrap_or(&empty))?;
    let shift = to_number("shift", request.shift.as_ref().unwrap_or(&empty))?;

    let key = ShiftKey::new(&date, &site, &CellValue::Number(shift));
    let sums = totals.compute(&key)?;
    let real_balance = cash_counted - sums.combined_total;

    info!(
        site = %site,
        date = %date,
        shift = shift,
        cash_counted = cash_counted,
        real_balance = real_balance,
        "Closure calculated"
    );

    Ok(ClosureResult {
        shift,
        site,
        date,
        cash_counted,
        expense_total: sums.expense_total,
        payroll_total: sums.payroll_total,
        real_balance,
        combined_total: sums.combined_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::store::tests::text_row;
    use crate::store::{SheetDb, SpreadsheetStore};

    fn request(site: &str, shift: &str, cash: &str, date: &str) -> ClosureRequest {
        let cell = |s: &str| (!s.is_empty()).then(|| CellValue::from(s));
        ClosureRequest {
            site: cell(site),
            shift: cell(shift),
            cash_counted: cell(cash),
            date: cell(date),
        }
    }

    fn seeded() -> SheetDb {
        let db = SheetDb::open_in_memory().unwrap();
        db.create_sheet("GASTOS CAJA", &["Fecha", "Sede", "Turno", "Otros Gastos"])
            .unwrap();
        db.create_sheet("NOMINA", &["Fecha", "Sede", "Turno", "Total Nomina"])
            .unwrap();
        db.get_sheet("GASTOS CAJA")
            .unwrap()
            .unwrap()
            .append_rows(2, &[text_row(&["2024-03-01", "CERRITOS", "1", "30000"])])
            .unwrap();
        db.get_sheet("NOMINA")
            .unwrap()
            .unwrap()
            .append_rows(
                2,
                &[
                    text_row(&["2024-03-01", "CERRITOS", "1", "100000"]),
                    text_row(&["2024-03-01", "CERRITOS", "1", "20000"]),
                ],
            )
            .unwrap();
        db
    }

    #[test]
    fn test_real_balance_arithmetic() {
        let db = seeded();
        let config = AppConfig::default();
        let totals = TotalsService::new(&db, &config);

        let result =
            calculate_closure(&totals, &request("CERRITOS", "1", "500000", "2024-03-01")).unwrap();
        assert_eq!(result.expense_total, 30000.0);
        assert_eq!(result.payroll_total, 120000.0);
        assert_eq!(result.combined_total, 150000.0);
        assert_eq!(result.real_balance, 350000.0);
        assert_eq!(result.shift, 1.0);
    }

    #[test]
    fn test_missing_inputs_are_named() {
        let db = seeded();
        let config = AppConfig::default();
        let totals = TotalsService::new(&db, &config);

        let err = calculate_closure(&totals, &request("CERRITOS", "", "", "2024-03-01"))
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
        assert_eq!(err.field(), Some("shift, cash"));
    }

    #[test]
    fn test_non_numeric_cash_and_shift() {
        let db = seeded();
        let config = AppConfig::default();
        let totals = TotalsService::new(&db, &config);

        let err = calculate_closure(&totals, &request("CERRITOS", "1", "mucho", "2024-03-01"))
            .unwrap_err();
        assert_eq!(err.field(), Some("cash"));
        let err = calculate_closure(&totals, &request("CERRITOS", "uno", "100", "2024-03-01"))
            .unwrap_err();
        assert_eq!(err.field(), Some("shift"));
    }

    #[test]
    fn test_shift_number_formatting_matches_stored_key() {
        let db = seeded();
        let config = AppConfig::default();
        let totals = TotalsService::new(&db, &config);

        // "01" coerces to 1 and is looked up as "1"
        let result =
            calculate_closure(&totals, &request("CERRITOS", "01", "150000", "2024-03-01")).unwrap();
        assert_eq!(result.real_balance, 0.0);
    }
}
