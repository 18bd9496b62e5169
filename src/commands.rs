//! Request boundary: action dispatch and the `{ok, ...}` response envelope.
//!
//! Every request is a JSON object carrying an `action` plus its fields.
//! Whatever happens inside, the caller gets an object back: the handler
//! result merged under `ok: true`, or `{ok: false, error: {code, message}}`.

use serde_json::{json, Map, Value};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::cell::CellValue;
use crate::closure::{calculate_closure, ClosureRequest};
use crate::error::{CierreError, CierreResult};
use crate::handlers::{self, Context};
use crate::payload::{pick_cell, pick_str};
use crate::totals::ShiftKey;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const BUILD_TIMESTAMP: &str = env!("BUILD_TIMESTAMP");
pub const GIT_SHA: &str = env!("BUILD_GIT_SHA");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    AddExpense,
    AddPayroll,
    PosReconciliation,
    CardReconciliation,
    InvoicesPayable,
    CalculateClosure,
    ComputeTotals,
    TestConnection,
    Ping,
}

impl FromStr for Action {
    type Err = CierreError;

    /// Case-insensitive after trimming: `ADD_EXPENSE` and `add_expense` agree.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let action = match raw.trim().to_lowercase().as_str() {
            "add_expense" => Action::AddExpense,
            "add_payroll" => Action::AddPayroll,
            "pos_reconciliation" => Action::PosReconciliation,
            "card_reconciliation" => Action::CardReconciliation,
            "invoices_payable" => Action::InvoicesPayable,
            "calculate_closure" => Action::CalculateClosure,
            "compute_totals" => Action::ComputeTotals,
            "test_connection" => Action::TestConnection,
            "ping" => Action::Ping,
            _ => return Err(CierreError::UnsupportedAction(raw.trim().to_string())),
        };
        Ok(action)
    }
}

/// Handle one request object and wrap the outcome in the envelope.
pub fn dispatch(ctx: &Context<'_>, request: &Value) -> Value {
    match handle(ctx, request) {
        Ok(result) => ok_envelope(result),
        Err(e) => {
            warn!(code = e.code(), error = %e, "Request failed");
            error_envelope(&e)
        }
    }
}

/// Same as [`dispatch`] for a raw JSON line.
pub fn dispatch_str(ctx: &Context<'_>, raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(request) => dispatch(ctx, &request),
        Err(e) => error_envelope(&CierreError::Payload(format!("invalid JSON: {e}"))),
    }
}

fn handle(ctx: &Context<'_>, request: &Value) -> CierreResult<Value> {
    if !request.is_object() {
        return Err(CierreError::Payload("request must be a JSON object".into()));
    }
    let action: Action = request
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .parse()?;
    debug!(action = ?action, "Dispatching");

    match action {
        Action::AddExpense => handlers::add_expense(ctx, request),
        Action::AddPayroll => handlers::add_payroll(ctx, request),
        Action::PosReconciliation => handlers::pos_reconciliation(ctx, request),
        Action::CardReconciliation => handlers::card_reconciliation(ctx, request),
        Action::InvoicesPayable => handlers::invoices_payable(ctx, request),
        Action::CalculateClosure => closure(ctx, request),
        Action::ComputeTotals => compute_totals(ctx, request),
        Action::TestConnection => test_connection(ctx),
        Action::Ping => Ok(ping()),
    }
}

fn closure(ctx: &Context<'_>, request: &Value) -> CierreResult<Value> {
    let closure_request = ClosureRequest {
        site: pick_cell(request, &["site", "sede"]),
        shift: pick_cell(request, &["shift", "turno"]),
        cash_counted: pick_cell(request, &["cash", "efectivo"]),
        date: pick_cell(request, &["date", "fecha"]),
    };
    let result = calculate_closure(&ctx.totals(), &closure_request)?;
    Ok(json!(result))
}

/// Totals for a key as given. An incomplete key yields zeros.
fn compute_totals(ctx: &Context<'_>, request: &Value) -> CierreResult<Value> {
    let date = pick_str(request, &["date", "fecha"]).unwrap_or_default();
    let site = pick_str(request, &["site", "sede"]).unwrap_or_default();
    let shift = pick_cell(request, &["shift", "turno"]).unwrap_or_else(CellValue::empty);
    let key = ShiftKey::new(&date, &site, &shift);
    let totals = ctx.totals().compute(&key)?;
    Ok(json!({
        "date": key.date,
        "site": key.site,
        "shift": key.shift,
        "totals": totals,
    }))
}

fn test_connection(ctx: &Context<'_>) -> CierreResult<Value> {
    let sheets = &ctx.config.sheets;
    let mut found = Map::new();
    for (role, name) in [
        ("expenses", &sheets.expenses),
        ("expensesLegacy", &sheets.expenses_legacy),
        ("payroll", &sheets.payroll),
        ("pos", &sheets.pos),
        ("card", &sheets.card),
        ("invoices", &sheets.invoices),
        ("config", &sheets.config),
    ] {
        let exists = ctx.store.get_sheet(name)?.is_some();
        found.insert(role.to_string(), json!({ "name": name, "found": exists }));
    }
    Ok(json!({ "message": "ok", "sheets": found }))
}

fn ping() -> Value {
    json!({
        "message": "pong",
        "version": VERSION,
        "buildTimestamp": BUILD_TIMESTAMP,
        "gitSha": GIT_SHA,
    })
}

fn ok_envelope(result: Value) -> Value {
    let mut out = Map::new();
    out.insert("ok".into(), Value::Bool(true));
    match result {
        Value::Object(fields) => out.extend(fields),
        other => {
            out.insert("result".into(), other);
        }
    }
    Value::Object(out)
}

fn error_envelope(err: &CierreError) -> Value {
    let mut error = json!({ "code": err.code(), "message": err.to_string() });
    if let Some(field) = err.field() {
        error["field"] = json!(field);
    }
    json!({ "ok": false, "error": error })
}
