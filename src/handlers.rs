//! Submission handlers, one per record type.
//!
//! Every handler runs the same sequence: read and validate the whole
//! payload, check the target sheet, store attachments, append rows,
//! recompute the shift totals, mirror the rows, record the activity event.
//! Nothing is written before validation passes and the sheet resolves.
//! Mirror and attachment failures are logged and swallowed; the sheet row
//! is the record of truth.
//!
//! Handlers with a "no activity" flag skip the write entirely, still return
//! the shift totals and record a single `<event>_skipped` activity.

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::activity::ActivityLogger;
use crate::aliases::field;
use crate::blob::{attachments_from, BlobStore, PathHints, LOCATION_SEPARATOR};
use crate::cell::CellValue;
use crate::config::AppConfig;
use crate::error::{CierreError, CierreResult};
use crate::mirror::MirrorStore;
use crate::payload::{
    pick_array, pick_cell, pick_flag, pick_number, pick_str, require_fields, to_number,
};
use crate::projector::{RowProjector, SemanticRecord};
use crate::store::SpreadsheetStore;
use crate::totals::{ShiftKey, Totals, TotalsService};

// ---- payload keys: descriptive first, legacy second

const DATE: &[&str] = &["date", "fecha"];
const SITE: &[&str] = &["site", "sede"];
const SHIFT: &[&str] = &["shift", "turno"];
const MANAGER: &[&str] = &["by", "manager", "responsable", "encargado"];
const NOTES: &[&str] = &["notes", "note", "observaciones", "observacion"];
const AMOUNT: &[&str] = &["amount", "valor"];

const SKIP: &[&str] = &["noActivity", "skip", "sin_movimiento"];
const SKIP_PAYROLL: &[&str] = &["noPayment", "noActivity", "skip", "sin_pago", "sin_movimiento"];

/// Collaborators shared by every handler, constructed once by the caller.
pub struct Context<'a> {
    pub config: &'a AppConfig,
    pub store: &'a dyn SpreadsheetStore,
    pub blobs: &'a dyn BlobStore,
    pub mirror: &'a dyn MirrorStore,
    pub activity: &'a dyn ActivityLogger,
}

impl<'a> Context<'a> {
    pub fn totals(&self) -> TotalsService<'a> {
        let config: &'a AppConfig = self.config;
        TotalsService::new(self.store, config)
    }

    fn projector(&self) -> RowProjector<'a> {
        let config: &'a AppConfig = self.config;
        RowProjector::new(self.store, &config.aliases)
    }
}

// ---- shared shift header

/// Key fields every submission carries, validated and coerced.
struct ShiftHeader {
    date: String,
    site: String,
    shift: f64,
    manager: String,
    notes: String,
}

impl ShiftHeader {
    /// Read date/site/shift plus any handler-specific `extra` required
    /// fields, reporting every missing one together.
    fn read(payload: &Value, extra: &[(&str, Option<&CellValue>)]) -> CierreResult<Self> {
        let date = pick_cell(payload, DATE);
        let site = pick_cell(payload, SITE);
        let shift = pick_cell(payload, SHIFT);

        let mut required = vec![
            ("date", date.as_ref()),
            ("site", site.as_ref()),
            ("shift", shift.as_ref()),
        ];
        required.extend_from_slice(extra);
        require_fields(&required)?;

        let shift = match shift.as_ref() {
            Some(cell) => to_number("shift", cell)?,
            None => return Err(CierreError::missing_field("shift")),
        };
        Ok(ShiftHeader {
            date: date.map(|c| c.key_string()).unwrap_or_default(),
            site: site.map(|c| c.key_string()).unwrap_or_default(),
            shift,
            manager: pick_str(payload, MANAGER).unwrap_or_default(),
            notes: pick_str(payload, NOTES).unwrap_or_default(),
        })
    }

    fn key(&self) -> ShiftKey {
        ShiftKey::new(&self.date, &self.site, &CellValue::Number(self.shift))
    }

    fn record(&self) -> SemanticRecord {
        SemanticRecord::new()
            .with(field::DATE, self.date.as_str())
            .with(field::SITE, self.site.as_str())
            .with(field::SHIFT, self.shift)
            .with(field::MANAGER, self.manager.as_str())
            .with(field::NOTES, self.notes.as_str())
    }

    fn metadata(&self) -> Value {
        json!({ "date": self.date, "site": self.site, "shift": self.shift })
    }

    fn path_hints(&self, kind: &str) -> PathHints {
        PathHints::new(&self.site, kind, &self.date)
    }
}

// ---- shared write path

/// Stores attachments only once `sheet` is known to accept rows.
fn store_attachments(
    ctx: &Context<'_>,
    sheet: &str,
    header: &ShiftHeader,
    kind: &str,
    payload: &Value,
) -> CierreResult<Vec<String>> {
    ctx.projector().check(sheet)?;
    let files = attachments_from(payload);
    if files.is_empty() {
        return Ok(Vec::new());
    }
    Ok(ctx.blobs.store(&header.path_hints(kind), &files))
}

fn with_attachments(mut record: SemanticRecord, locations: &[String]) -> SemanticRecord {
    if !locations.is_empty() {
        record.set(field::ATTACHMENTS, locations.join(LOCATION_SEPARATOR));
    }
    record
}

struct Written {
    row_index: usize,
    totals: Totals,
}

/// Append, recompute totals, mirror, record activity.
fn submit(
    ctx: &Context<'_>,
    event: &str,
    sheet: &str,
    mirror_table: &str,
    header: &ShiftHeader,
    records: &[SemanticRecord],
    payload: &Value,
) -> CierreResult<Written> {
    let row_index = ctx.projector().append_rows(sheet, records)?;
    let totals = ctx.totals().compute(&header.key())?;

    let mirrored: Vec<Value> = records.iter().map(SemanticRecord::to_json).collect();
    if let Err(e) = ctx.mirror.insert_many(mirror_table, &mirrored) {
        warn!(table = %mirror_table, error = %e, "Mirror insert failed, continuing");
    }

    let mut metadata = header.metadata();
    metadata["sheet"] = json!(sheet);
    metadata["rowIndex"] = json!(row_index);
    metadata["rows"] = json!(records.len());
    ctx.activity.record(event, &metadata, payload);

    info!(
        event = %event,
        sheet = %sheet,
        row_index = row_index,
        rows = records.len(),
        "Submission stored"
    );
    Ok(Written { row_index, totals })
}

/// No-activity path: zero writes, one skip event, current totals.
fn skip(
    ctx: &Context<'_>,
    event: &str,
    sheet: &str,
    header: &ShiftHeader,
    payload: &Value,
) -> CierreResult<Value> {
    let totals = ctx.totals().compute(&header.key())?;
    let skip_event = format!("{event}_skipped");
    ctx.activity.record(&skip_event, &header.metadata(), payload);
    info!(event = %skip_event, site = %header.site, shift = header.shift, "Submission skipped");
    Ok(json!({
        "sheet": sheet,
        "skipped": true,
        "rowIndex": Value::Null,
        "totals": totals,
    }))
}

fn optional_amount(payload: &Value, keys: &[&str], name: &str) -> CierreResult<f64> {
    Ok(pick_number(payload, keys, name)?.unwrap_or(0.0))
}

// ---- expenses

/// Cash expense paid out of the drawer. Lands in `Otros Gastos`.
pub fn add_expense(ctx: &Context<'_>, payload: &Value) -> CierreResult<Value> {
    let amount = pick_cell(payload, AMOUNT);
    let header = ShiftHeader::read(payload, &[("amount", amount.as_ref())])?;
    let amount = match amount.as_ref() {
        Some(cell) => to_number("amount", cell)?,
        None => return Err(CierreError::missing_field("amount")),
    };
    let savings = optional_amount(payload, &["savings", "ahorro"], "savings")?;
    let tip = optional_amount(payload, &["tipDelivered", "propina_entregada"], "tipDelivered")?;
    let delivery = optional_amount(payload, &["delivery", "domicilio"], "delivery")?;

    let category = pick_str(payload, &["category", "categoria"]);
    let description = pick_str(payload, &["description", "descripcion"]);
    let detail = match (&category, &description) {
        (Some(c), Some(d)) => format!("{c} - {d}"),
        (None, Some(d)) => d.clone(),
        (Some(c), None) => c.clone(),
        (None, None) => String::new(),
    };

    let sheet = ctx.config.sheets.expenses.as_str();
    let locations = store_attachments(ctx, sheet, &header, "gastos", payload)?;

    let mut record = header
        .record()
        .with(field::SAVINGS, savings)
        .with(field::TIP_DELIVERED, tip)
        .with(field::DELIVERY, delivery)
        .with(field::OTHER_EXPENSES, amount)
        .with(field::OTHER_EXPENSES_DETAIL, detail);
    if header.notes.is_empty() {
        record.set(field::NOTES, description.clone().unwrap_or_default());
    }
    let record = with_attachments(record, &locations);

    let written = submit(
        ctx,
        "add_expense",
        sheet,
        &ctx.config.mirror_tables.expenses,
        &header,
        &[record],
        payload,
    )?;

    Ok(json!({
        "sheet": sheet,
        "rowIndex": written.row_index,
        "totals": written.totals,
        "attachments": locations,
        "expense": {
            "date": header.date,
            "site": header.site,
            "shift": header.shift,
            "amount": amount,
            "manager": header.manager,
        },
    }))
}

// ---- payroll

struct PayrollLine {
    employee: String,
    salary: f64,
    transport: f64,
    extras: f64,
    notes: Option<String>,
}

impl PayrollLine {
    fn total(&self) -> f64 {
        self.salary + self.transport + self.extras
    }

    /// `prefix` qualifies field names in errors, e.g. `entries[1].`.
    fn read(entry: &Value, prefix: &str) -> CierreResult<Self> {
        let employee = pick_cell(entry, &["employee", "empleado"]);
        let amount = pick_cell(entry, &["amount", "salary", "valor", "salario"]);
        let employee_field = format!("{prefix}employee");
        let amount_field = format!("{prefix}amount");
        require_fields(&[
            (employee_field.as_str(), employee.as_ref()),
            (amount_field.as_str(), amount.as_ref()),
        ])?;

        let salary = match amount.as_ref() {
            Some(cell) => to_number(&amount_field, cell)?,
            None => return Err(CierreError::missing_field(&amount_field)),
        };
        Ok(PayrollLine {
            employee: employee.map(|c| c.key_string()).unwrap_or_default(),
            salary,
            transport: optional_amount(
                entry,
                &["transport", "transporte"],
                &format!("{prefix}transport"),
            )?,
            extras: optional_amount(entry, &["extras"], &format!("{prefix}extras"))?,
            notes: pick_str(entry, &["note", "notes", "concept", "observacion", "concepto"]),
        })
    }
}

/// Payroll paid from the drawer: one employee, or an `entries` list.
pub fn add_payroll(ctx: &Context<'_>, payload: &Value) -> CierreResult<Value> {
    let sheet = ctx.config.sheets.payroll.as_str();

    if pick_flag(payload, SKIP_PAYROLL) {
        let header = ShiftHeader::read(payload, &[])?;
        return skip(ctx, "add_payroll", sheet, &header, payload);
    }

    let entries = pick_array(payload, &["entries", "empleados"]).filter(|e| !e.is_empty());
    let (header, lines) = match entries {
        Some(entries) => {
            let header = ShiftHeader::read(payload, &[])?;
            let lines = entries
                .iter()
                .enumerate()
                .map(|(i, entry)| PayrollLine::read(entry, &format!("entries[{i}].")))
                .collect::<CierreResult<Vec<_>>>()?;
            (header, lines)
        }
        None => {
            let employee = pick_cell(payload, &["employee", "empleado"]);
            let amount = pick_cell(payload, &["amount", "salary", "valor", "salario"]);
            let header = ShiftHeader::read(
                payload,
                &[("employee", employee.as_ref()), ("amount", amount.as_ref())],
            )?;
            (header, vec![PayrollLine::read(payload, "")?])
        }
    };

    let locations = store_attachments(ctx, sheet, &header, "nomina", payload)?;
    let concept = pick_str(payload, &["concept", "concepto"]);
    let records: Vec<SemanticRecord> = lines
        .iter()
        .map(|line| {
            let notes = line
                .notes
                .clone()
                .or_else(|| (!header.notes.is_empty()).then(|| header.notes.clone()))
                .or_else(|| concept.clone())
                .unwrap_or_default();
            let record = header
                .record()
                .with(field::NOTES, notes)
                .with(field::EMPLOYEE, line.employee.as_str())
                .with(field::SALARY, line.salary)
                .with(field::TRANSPORT, line.transport)
                .with(field::EXTRAS, line.extras)
                .with(field::PAYROLL_TOTAL, line.total());
            with_attachments(record, &locations)
        })
        .collect();

    let written = submit(
        ctx,
        "add_payroll",
        sheet,
        &ctx.config.mirror_tables.payroll,
        &header,
        &records,
        payload,
    )?;

    let payroll: Vec<Value> = lines
        .iter()
        .map(|line| {
            json!({
                "employee": line.employee,
                "amount": line.salary,
                "total": line.total(),
            })
        })
        .collect();
    Ok(json!({
        "sheet": sheet,
        "rowIndex": written.row_index,
        "rows": records.len(),
        "totals": written.totals,
        "attachments": locations,
        "payroll": payroll,
    }))
}

// ---- reconciliations

/// Optional amount that stays unset when absent.
fn set_amount(
    payload: &Value,
    keys: &[&str],
    name: &str,
    record: &mut SemanticRecord,
    semantic: &str,
) -> CierreResult<Option<f64>> {
    let value = pick_number(payload, keys, name)?;
    if let Some(v) = value {
        record.set(semantic, v);
    }
    Ok(value)
}

/// Cash block shared by both reconciliations. Derives `Sobro o Falto`
/// from real cash minus cash to deliver when not supplied.
fn cash_fields(payload: &Value, record: &mut SemanticRecord) -> CierreResult<()> {
    set_amount(
        payload,
        &["cashCollected", "cobro_efectivo"],
        "cashCollected",
        record,
        field::CASH_COLLECTED,
    )?;
    let real = set_amount(
        payload,
        &["realCashTotal", "total_efectivo_real"],
        "realCashTotal",
        record,
        field::REAL_CASH_TOTAL,
    )?;
    let deliver = set_amount(
        payload,
        &["cashToDeliver", "efectivo_para_entregar"],
        "cashToDeliver",
        record,
        field::CASH_TO_DELIVER,
    )?;
    let over_short = set_amount(
        payload,
        &["overShort", "sobro_o_falto"],
        "overShort",
        record,
        field::OVER_SHORT,
    )?;
    if over_short.is_none() {
        if let (Some(real), Some(deliver)) = (real, deliver) {
            record.set(field::OVER_SHORT, real - deliver);
        }
    }
    Ok(())
}

fn reconciliation_echo(record: &SemanticRecord, header: &ShiftHeader) -> Value {
    let mut echo = record.to_json();
    if let Some(obj) = echo.as_object_mut() {
        for key in [field::DATE, field::SITE, field::SHIFT, field::MANAGER, field::NOTES] {
            obj.remove(key);
        }
    }
    json!({
        "date": header.date,
        "site": header.site,
        "shift": header.shift,
        "fields": echo,
    })
}

/// Cash reconciliation against the point-of-sale close (MYS).
pub fn pos_reconciliation(ctx: &Context<'_>, payload: &Value) -> CierreResult<Value> {
    let sheet = ctx.config.sheets.pos.as_str();

    if pick_flag(payload, SKIP) {
        let header = ShiftHeader::read(payload, &[])?;
        return skip(ctx, "pos_reconciliation", sheet, &header, payload);
    }

    let cash_collected = pick_cell(payload, &["cashCollected", "cobro_efectivo"]);
    let header = ShiftHeader::read(payload, &[("cashCollected", cash_collected.as_ref())])?;

    let mut record = header.record();
    cash_fields(payload, &mut record)?;
    set_amount(
        payload,
        &["salesTotal", "total_venta"],
        "salesTotal",
        &mut record,
        field::SALES_TOTAL,
    )?;
    set_amount(
        payload,
        &["posClose", "cierre_mys"],
        "posClose",
        &mut record,
        field::POS_CLOSE,
    )?;

    let locations = store_attachments(ctx, sheet, &header, "mys", payload)?;
    let record = with_attachments(record, &locations);

    let written = submit(
        ctx,
        "pos_reconciliation",
        sheet,
        &ctx.config.mirror_tables.pos,
        &header,
        std::slice::from_ref(&record),
        payload,
    )?;

    Ok(json!({
        "sheet": sheet,
        "rowIndex": written.row_index,
        "totals": written.totals,
        "attachments": locations,
        "reconciliation": reconciliation_echo(&record, &header),
    }))
}

/// Card terminal and bookkeeping (SIIGO) reconciliation.
pub fn card_reconciliation(ctx: &Context<'_>, payload: &Value) -> CierreResult<Value> {
    let sheet = ctx.config.sheets.card.as_str();
    let header = ShiftHeader::read(payload, &[])?;

    if pick_flag(payload, SKIP) {
        return skip(ctx, "card_reconciliation", sheet, &header, payload);
    }

    let no_cash = pick_flag(payload, &["noCash", "sin_efectivo"]);
    let mut record = header.record().with(field::NO_CASH, no_cash);
    if no_cash {
        for semantic in [
            field::CASH_COLLECTED,
            field::REAL_CASH_TOTAL,
            field::CASH_TO_DELIVER,
            field::OVER_SHORT,
        ] {
            record.set(semantic, 0.0);
        }
    } else {
        cash_fields(payload, &mut record)?;
    }

    let vouchers = set_amount(
        payload,
        &["cardVouchers", "tarjetas_vouchers"],
        "cardVouchers",
        &mut record,
        field::CARD_VOUCHERS,
    )?;
    let terminal = set_amount(
        payload,
        &["terminalClose", "cierre_datafono"],
        "terminalClose",
        &mut record,
        field::TERMINAL_CLOSE,
    )?;
    let diff = set_amount(
        payload,
        &["terminalDiff", "dif_datafono"],
        "terminalDiff",
        &mut record,
        field::TERMINAL_DIFF,
    )?;
    if diff.is_none() {
        if let (Some(vouchers), Some(terminal)) = (vouchers, terminal) {
            record.set(field::TERMINAL_DIFF, vouchers - terminal);
        }
    }
    set_amount(
        payload,
        &["transfer", "transferencia"],
        "transfer",
        &mut record,
        field::TRANSFER,
    )?;
    set_amount(
        payload,
        &["salesTotal", "total_venta"],
        "salesTotal",
        &mut record,
        field::SALES_TOTAL,
    )?;
    set_amount(
        payload,
        &["booksClose", "cierre_siigo"],
        "booksClose",
        &mut record,
        field::BOOKS_CLOSE,
    )?;

    let locations = store_attachments(ctx, sheet, &header, "siigo", payload)?;
    let record = with_attachments(record, &locations);

    let written = submit(
        ctx,
        "card_reconciliation",
        sheet,
        &ctx.config.mirror_tables.card,
        &header,
        std::slice::from_ref(&record),
        payload,
    )?;

    Ok(json!({
        "sheet": sheet,
        "rowIndex": written.row_index,
        "totals": written.totals,
        "attachments": locations,
        "reconciliation": reconciliation_echo(&record, &header),
    }))
}

// ---- invoices payable

struct InvoiceLine {
    supplier: String,
    amount: f64,
    number: String,
    category: String,
}

impl InvoiceLine {
    fn read(entry: &Value, index: usize) -> CierreResult<Self> {
        let supplier = pick_cell(entry, &["supplier", "proveedor"]);
        let amount = pick_cell(entry, &["amount", "valor"]);
        let supplier_field = format!("entries[{index}].supplier");
        let amount_field = format!("entries[{index}].amount");
        require_fields(&[
            (supplier_field.as_str(), supplier.as_ref()),
            (amount_field.as_str(), amount.as_ref()),
        ])?;
        let amount = match amount.as_ref() {
            Some(cell) => to_number(&amount_field, cell)?,
            None => return Err(CierreError::missing_field(&amount_field)),
        };
        Ok(InvoiceLine {
            supplier: supplier.map(|c| c.key_string()).unwrap_or_default(),
            amount,
            number: pick_str(entry, &["invoiceNumber", "number", "num_factura", "numero"])
                .unwrap_or_default(),
            category: pick_str(entry, &["category", "categoria"]).unwrap_or_default(),
        })
    }
}

/// Supplier invoices received during the shift, one row per invoice.
pub fn invoices_payable(ctx: &Context<'_>, payload: &Value) -> CierreResult<Value> {
    let sheet = ctx.config.sheets.invoices.as_str();

    if pick_flag(payload, SKIP) {
        let header = ShiftHeader::read(payload, &[])?;
        return skip(ctx, "invoices_payable", sheet, &header, payload);
    }

    let entries = pick_array(payload, &["entries", "facturas"]).filter(|e| !e.is_empty());
    let header = ShiftHeader::read(payload, &[])?;
    let Some(entries) = entries else {
        return Err(CierreError::missing_field("entries"));
    };
    let lines = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| InvoiceLine::read(entry, i))
        .collect::<CierreResult<Vec<_>>>()?;

    let locations = store_attachments(ctx, sheet, &header, "facturas", payload)?;
    let records: Vec<SemanticRecord> = lines
        .iter()
        .map(|line| {
            let record = header
                .record()
                .with(field::SUPPLIER, line.supplier.as_str())
                .with(field::INVOICE_NUMBER, line.number.as_str())
                .with(field::INVOICE_AMOUNT, line.amount)
                .with(field::CATEGORY, line.category.as_str());
            with_attachments(record, &locations)
        })
        .collect();

    let written = submit(
        ctx,
        "invoices_payable",
        sheet,
        &ctx.config.mirror_tables.invoices,
        &header,
        &records,
        payload,
    )?;

    let invoices: Vec<Value> = lines
        .iter()
        .map(|line| {
            json!({
                "supplier": line.supplier,
                "invoiceNumber": line.number,
                "amount": line.amount,
            })
        })
        .collect();
    Ok(json!({
        "sheet": sheet,
        "rowIndex": written.row_index,
        "rows": records.len(),
        "totals": written.totals,
        "attachments": locations,
        "invoices": invoices,
    }))
}
