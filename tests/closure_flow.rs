//! Full shift flow through the request boundary against an in-memory store.

use serde_json::{json, Value};

use cierre_caja_lib::blob::FsBlobStore;
use cierre_caja_lib::commands::dispatch;
use cierre_caja_lib::config::AppConfig;
use cierre_caja_lib::handlers::Context;
use cierre_caja_lib::mirror::DisabledMirror;
use cierre_caja_lib::provision_sheets;
use cierre_caja_lib::store::{SheetDb, SpreadsheetStore};

struct Harness {
    config: AppConfig,
    db: SheetDb,
    blobs: FsBlobStore,
    _blob_dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        let config = AppConfig::default();
        let db = SheetDb::open_in_memory().unwrap();
        provision_sheets(&db, &config).unwrap();
        let blob_dir = tempfile::tempdir().unwrap();
        Harness {
            config,
            db,
            blobs: FsBlobStore::new(blob_dir.path(), None),
            _blob_dir: blob_dir,
        }
    }

    fn call(&self, request: Value) -> Value {
        let ctx = Context {
            config: &self.config,
            store: &self.db,
            blobs: &self.blobs,
            mirror: &DisabledMirror,
            activity: &self.db,
        };
        dispatch(&ctx, &request)
    }

    fn data_rows(&self, sheet: &str) -> usize {
        let sheet = self.db.get_sheet(sheet).unwrap().unwrap();
        sheet.read_all().unwrap().len().saturating_sub(1)
    }
}

#[test]
fn expense_payroll_then_closure() {
    let h = Harness::new();

    let expense = h.call(json!({
        "action": "add_expense",
        "date": "2024-03-01",
        "site": "CERRITOS",
        "shift": 1,
        "amount": 15000,
    }));
    assert_eq!(expense["ok"], json!(true), "{expense}");
    assert_eq!(expense["totals"]["expenseTotal"], json!(15000.0));

    let payroll = h.call(json!({
        "action": "add_payroll",
        "date": "2024-03-01",
        "site": "CERRITOS",
        "shift": 1,
        "employee": "A",
        "amount": 50000,
    }));
    assert_eq!(payroll["ok"], json!(true), "{payroll}");
    assert_eq!(payroll["totals"]["combinedTotal"], json!(65000.0));

    let closure = h.call(json!({
        "action": "calculate_closure",
        "site": "CERRITOS",
        "shift": 1,
        "date": "2024-03-01",
        "cash": 70000,
    }));
    assert_eq!(closure["ok"], json!(true), "{closure}");
    assert_eq!(closure["expenseTotal"], json!(15000.0));
    assert_eq!(closure["payrollTotal"], json!(50000.0));
    assert_eq!(closure["realBalance"], json!(5000.0));

    // closure is a pure read
    assert_eq!(h.data_rows("GASTOS CAJA"), 1);
    assert_eq!(h.data_rows("NOMINA"), 1);
}

#[test]
fn other_shifts_and_sites_do_not_leak_into_totals() {
    let h = Harness::new();
    let entries = [("CERRITOS", 1, 1000), ("CERRITOS", 2, 2000), ("PINARES", 1, 4000)];
    for (site, shift, amount) in entries {
        let out = h.call(json!({
            "action": "add_expense",
            "fecha": "2024-03-01",
            "sede": site,
            "turno": shift,
            "valor": amount,
        }));
        assert_eq!(out["ok"], json!(true));
    }

    let totals = h.call(json!({
        "action": "compute_totals",
        "date": "2024-03-01",
        "site": "CERRITOS",
        "shift": 2,
    }));
    assert_eq!(totals["totals"]["expenseTotal"], json!(2000.0));
}

#[test]
fn payroll_without_payment_writes_nothing() {
    let h = Harness::new();
    let out = h.call(json!({
        "action": "ADD_PAYROLL",
        "fecha": "2024-03-01",
        "sede": "CERRITOS",
        "turno": 2,
        "sin_pago": true,
    }));
    assert_eq!(out["ok"], json!(true), "{out}");
    assert_eq!(out["skipped"], json!(true));
    assert_eq!(out["totals"]["payrollTotal"], json!(0.0));
    assert_eq!(h.data_rows("NOMINA"), 0);

    let events = h.db.recent_activity(10).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "add_payroll_skipped");
}

#[test]
fn validation_failures_leave_sheets_untouched() {
    let h = Harness::new();
    let out = h.call(json!({
        "action": "invoices_payable",
        "date": "2024-03-01",
        "site": "CERRITOS",
        "shift": 1,
        "entries": [{"supplier": "Lacteos SA", "amount": 1000}, {"amount": 5}],
    }));
    assert_eq!(out["ok"], json!(false));
    assert_eq!(out["error"]["code"], json!("validation_error"));
    assert_eq!(out["error"]["field"], json!("entries[1].supplier"));
    assert_eq!(h.data_rows("FACTURAS X PAGAR"), 0);
    assert!(h.db.recent_activity(10).unwrap().is_empty());
}

#[test]
fn attachments_land_on_disk_and_in_the_row() {
    let h = Harness::new();
    let out = h.call(json!({
        "action": "card_reconciliation",
        "date": "2024-03-01",
        "site": "CERRITOS",
        "shift": 1,
        "cardVouchers": 50000,
        "terminalClose": 50000,
        "attachments": [{"name": "voucher.jpg", "data": "aG9sYQ=="}],
    }));
    assert_eq!(out["ok"], json!(true), "{out}");
    let locations = out["attachments"].as_array().unwrap();
    assert_eq!(locations.len(), 1);
    let location = locations[0].as_str().unwrap();
    assert!(location.starts_with("file://"));
    assert!(location.contains("CERRITOS/siigo/2024-03/"));
    assert_eq!(out["reconciliation"]["fields"]["DifDatafono"], json!(0.0));
}
