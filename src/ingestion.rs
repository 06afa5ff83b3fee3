//! Loading of the five spreadsheet sources.
//!
//! Sheet names, header offsets and column headers are contract, not style:
//! they come from the operation's existing workbooks. Loaders scan the first
//! few rows for the header row instead of hard-coding an offset, which
//! absorbs the 4-vs-5 row drift seen across file versions.
//!
//! A missing required column is fatal for that source and reports both the
//! missing and the found column names. Row-level parse failures drop the row
//! and count it in [`Diagnostics`]; they never abort the load.

use crate::directory::{PromoterCode, PromoterDirectory, RosterRow};
use crate::error::{DashboardError, Result};
use crate::numeric::parse_amount;
use crate::reconcile::Reconciler;
use crate::schema::{
    DepositRecord, DisbursementRecord, DiscountRecord, Diagnostics, ExpectedBalanceRecord, Loaded,
    TargetRecord,
};
use crate::week::{day_index, WeekBucket};
use calamine::{Data, Range, Reader, Xlsx};
use chrono::NaiveDate;
use log::{info, warn};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;

pub const ROSTER_SHEET: &str = "Control";
pub const COLLECTION_SHEET: &str = "Recuperaciones";
pub const DISBURSEMENT_SHEET: &str = "Colocación";

const ROSTER_COLUMNS: [&str; 3] = ["N", "Nombre", "Antigüedad (meses)"];
const COLLECTION_COLUMNS: [&str; 6] = [
    "Nombre Promotor",
    "Fecha transacción",
    "Depósito",
    "Estado",
    "Municipio",
    "Contrato",
];
const DISBURSEMENT_COLUMNS: [&str; 7] = [
    "Nombre promotor",
    "Fecha desembolso",
    "Monto desembolsado",
    "Nombre del cliente",
    "Contrato",
    "Cuota total",
    "Fecha primer pago",
];
const DISCOUNT_COLUMNS: [&str; 3] = ["Promotor", "Fecha Ministración", "Descuento Renovación"];
const EXPECTED_COLUMNS: [&str; 2] = ["PROMOTOR", "SALDO"];

/// How many leading rows are searched for the header row.
const HEADER_SCAN_LIMIT: usize = 10;

type Workbook<'a> = Xlsx<Cursor<&'a [u8]>>;

/// The roster source: promoter directory plus the per-promoter weekly
/// target sheets.
#[derive(Debug, Clone)]
pub struct RosterData {
    pub directory: PromoterDirectory,
    pub targets: Vec<TargetRecord>,
    pub diagnostics: Diagnostics,
}

/// Reads a source workbook from disk. Loaders themselves take `&[u8]` so
/// callers holding uploaded bytes never touch the filesystem.
pub fn read_source(path: impl AsRef<std::path::Path>) -> Result<Vec<u8>> {
    Ok(std::fs::read(path)?)
}

fn open_workbook(bytes: &[u8]) -> Result<Workbook<'_>> {
    Ok(Xlsx::new(Cursor::new(bytes))?)
}

fn sheet_range(workbook: &mut Workbook<'_>, name: &str) -> Result<Range<Data>> {
    let actual = workbook
        .sheet_names()
        .iter()
        .find(|s| s.trim().eq_ignore_ascii_case(name))
        .cloned()
        .ok_or_else(|| DashboardError::MissingSheet(name.to_string()))?;
    Ok(workbook.worksheet_range(&actual)?)
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Data::Int(i) => Some(i.to_string()),
        // Contract ids come through as floats when the column is numeric;
        // "1001.0" must compare equal to "1001" on the deposit side.
        Data::Float(f) if f.fract() == 0.0 => Some(format!("{}", *f as i64)),
        Data::Float(f) => Some(f.to_string()),
        _ => None,
    }
}

fn cell_str(row: &[Data], col: usize) -> Option<String> {
    row.get(col).and_then(cell_text)
}

fn cell_amount(row: &[Data], col: usize) -> Option<f64> {
    match row.get(col)? {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => parse_amount(s),
        _ => None,
    }
}

/// Excel serial dates count days from 1899-12-30.
fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(chrono::Duration::days(serial.floor() as i64))
}

fn parse_date_text(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    for format in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date);
        }
    }
    // ISO datetime strings: take the date prefix.
    s.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

fn cell_date(row: &[Data], col: usize) -> Option<NaiveDate> {
    match row.get(col)? {
        Data::DateTime(dt) => serial_to_date(dt.as_f64()),
        Data::Float(f) => serial_to_date(*f),
        Data::Int(i) => serial_to_date(*i as f64),
        Data::String(s) => parse_date_text(s),
        Data::DateTimeIso(s) => parse_date_text(s),
        _ => None,
    }
}

fn is_blank(row: &[Data]) -> bool {
    row.iter().all(|cell| matches!(cell, Data::Empty))
}

/// Finds the header row within the first [`HEADER_SCAN_LIMIT`] rows and maps
/// every header to its column index. The row matching the most required
/// headers wins; if even that row lacks some, the load fails with the
/// missing-vs-found detail the user needs to fix the sheet.
fn locate_columns(
    rows: &[&[Data]],
    required: &[&str],
    source_name: &str,
) -> Result<(usize, HashMap<String, usize>)> {
    let mut best: Option<(usize, Vec<String>, usize)> = None;

    for (idx, row) in rows.iter().enumerate().take(HEADER_SCAN_LIMIT) {
        let headers: Vec<String> = row
            .iter()
            .map(|cell| cell_text(cell).unwrap_or_default())
            .collect();
        let matched = required
            .iter()
            .filter(|name| headers.iter().any(|h| h == *name))
            .count();

        if matched == required.len() {
            let map = headers
                .into_iter()
                .enumerate()
                .filter(|(_, h)| !h.is_empty())
                .map(|(col, h)| (h, col))
                .collect();
            return Ok((idx, map));
        }

        if best.as_ref().map_or(true, |(_, _, n)| matched > *n) {
            best = Some((idx, headers, matched));
        }
    }

    let found: Vec<String> = best
        .map(|(_, headers, _)| headers.into_iter().filter(|h| !h.is_empty()).collect())
        .unwrap_or_default();
    let missing = required
        .iter()
        .filter(|name| !found.iter().any(|h| h == *name))
        .map(|name| name.to_string())
        .collect();

    Err(DashboardError::Schema {
        source_name: source_name.to_string(),
        missing,
        found,
    })
}

/// Loads the roster workbook: the "Control" sheet plus one target sheet per
/// promoter code. Fatal when the Control sheet or its required columns are
/// absent, since nothing downstream can reconcile without a directory.
pub fn load_roster(bytes: &[u8]) -> Result<RosterData> {
    let mut workbook = open_workbook(bytes)?;
    let range = sheet_range(&mut workbook, ROSTER_SHEET)?;
    let rows: Vec<&[Data]> = range.rows().collect();

    let (header_idx, columns) = locate_columns(&rows, &ROSTER_COLUMNS, "roster (sheet Control)")?;
    let col_code = columns["N"];
    let col_name = columns["Nombre"];
    let col_tenure = columns["Antigüedad (meses)"];

    let mut diagnostics = Diagnostics::default();
    let mut roster_rows = Vec::new();
    for row in rows.iter().skip(header_idx + 1) {
        if is_blank(row) {
            continue;
        }
        diagnostics.rows_read += 1;
        match (cell_str(row, col_code), cell_str(row, col_name)) {
            (Some(code), Some(name)) => roster_rows.push(RosterRow {
                code,
                name,
                tenure_months: cell_amount(row, col_tenure),
            }),
            _ => diagnostics.rows_dropped += 1,
        }
    }

    let directory = PromoterDirectory::from_roster(roster_rows);
    if directory.is_empty() {
        return Err(DashboardError::EmptyRoster);
    }
    info!("loaded {} promoters from roster", directory.len());

    let mut targets = Vec::new();
    let mut seen: HashSet<(PromoterCode, WeekBucket)> = HashSet::new();
    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    for sheet in sheet_names {
        if sheet.trim().eq_ignore_ascii_case(ROSTER_SHEET) {
            continue;
        }
        let range = workbook.worksheet_range(&sheet)?;
        if range.width() < 3 {
            warn!("target sheet '{}' has fewer than 3 columns, skipping", sheet);
            continue;
        }
        let code = PromoterCode::new(&sheet);

        // Target sheets carry a title row, then headers, then (date, amount)
        // in the second and third columns.
        for row in range.rows().skip(2) {
            if is_blank(row) {
                continue;
            }
            diagnostics.rows_read += 1;
            match (cell_date(row, 1), cell_amount(row, 2)) {
                (Some(date), Some(target_amount)) => {
                    let week = WeekBucket::containing(date);
                    // First value wins on duplicated promoter-weeks.
                    if seen.insert((code.clone(), week)) {
                        targets.push(TargetRecord {
                            promoter_code: code.clone(),
                            week,
                            target_amount,
                        });
                    }
                }
                _ => diagnostics.rows_dropped += 1,
            }
        }
    }
    info!("loaded {} weekly targets", targets.len());

    Ok(RosterData {
        directory,
        targets,
        diagnostics,
    })
}

/// Loads the daily collection transactions ("Recuperaciones") and reconciles
/// promoter names against the directory.
pub fn load_collections(
    bytes: &[u8],
    directory: &PromoterDirectory,
) -> Result<Loaded<DepositRecord>> {
    let mut workbook = open_workbook(bytes)?;
    let range = sheet_range(&mut workbook, COLLECTION_SHEET)?;
    let rows: Vec<&[Data]> = range.rows().collect();

    let (header_idx, columns) =
        locate_columns(&rows, &COLLECTION_COLUMNS, "collections (sheet Recuperaciones)")?;
    let col_name = columns["Nombre Promotor"];
    let col_date = columns["Fecha transacción"];
    let col_amount = columns["Depósito"];
    let col_state = columns["Estado"];
    let col_municipality = columns["Municipio"];
    let col_contract = columns["Contrato"];

    let mut diagnostics = Diagnostics::default();
    let mut parsed = Vec::new();
    for row in rows.iter().skip(header_idx + 1) {
        if is_blank(row) {
            continue;
        }
        diagnostics.rows_read += 1;
        let name = cell_str(row, col_name);
        let date = cell_date(row, col_date);
        let amount = cell_amount(row, col_amount);
        let (Some(name), Some(date), Some(amount)) = (name, date, amount) else {
            diagnostics.rows_dropped += 1;
            continue;
        };
        parsed.push(DepositRecord {
            promoter_code: None,
            raw_promoter_name: name,
            contract_id: cell_str(row, col_contract),
            transaction_date: date,
            amount,
            state: cell_str(row, col_state),
            municipality: cell_str(row, col_municipality),
            day_index: day_index(date),
        });
    }

    attach_codes(&mut parsed, directory, &mut diagnostics, |r| r.raw_promoter_name.as_str(), |r, c| {
        r.promoter_code = c;
    });
    info!(
        "loaded {} deposits ({} dropped, {} unmatched names)",
        parsed.len(),
        diagnostics.rows_dropped,
        diagnostics.unmatched.unmatched_rows
    );

    Ok(Loaded {
        rows: parsed,
        diagnostics,
    })
}

/// Loads loan placements ("Colocación"). Missing dates and unparseable
/// amounts are kept (zeroed or `None`) so the installment engine can apply
/// its own skip policy; only rows with no promoter name are dropped.
pub fn load_disbursements(
    bytes: &[u8],
    directory: &PromoterDirectory,
) -> Result<Loaded<DisbursementRecord>> {
    let mut workbook = open_workbook(bytes)?;
    let range = sheet_range(&mut workbook, DISBURSEMENT_SHEET)?;
    let rows: Vec<&[Data]> = range.rows().collect();

    let (header_idx, columns) =
        locate_columns(&rows, &DISBURSEMENT_COLUMNS, "disbursements (sheet Colocación)")?;
    let col_name = columns["Nombre promotor"];
    let col_date = columns["Fecha desembolso"];
    let col_amount = columns["Monto desembolsado"];
    let col_client = columns["Nombre del cliente"];
    let col_contract = columns["Contrato"];
    let col_installment = columns["Cuota total"];
    let col_first_payment = columns["Fecha primer pago"];

    let mut diagnostics = Diagnostics::default();
    let mut parsed = Vec::new();
    for row in rows.iter().skip(header_idx + 1) {
        if is_blank(row) {
            continue;
        }
        diagnostics.rows_read += 1;
        let Some(name) = cell_str(row, col_name) else {
            diagnostics.rows_dropped += 1;
            continue;
        };
        parsed.push(DisbursementRecord {
            promoter_code: None,
            raw_promoter_name: name,
            contract_id: cell_str(row, col_contract),
            client_name: cell_str(row, col_client).unwrap_or_default(),
            disbursement_date: cell_date(row, col_date),
            amount: cell_amount(row, col_amount).unwrap_or(0.0),
            installment_size: cell_amount(row, col_installment).unwrap_or(0.0),
            first_payment_date: cell_date(row, col_first_payment),
        });
    }

    attach_codes(&mut parsed, directory, &mut diagnostics, |r| r.raw_promoter_name.as_str(), |r, c| {
        r.promoter_code = c;
    });
    info!(
        "loaded {} disbursements ({} unmatched names)",
        parsed.len(),
        diagnostics.unmatched.unmatched_rows
    );

    Ok(Loaded {
        rows: parsed,
        diagnostics,
    })
}

/// Loads renewal discounts. Non-positive discounts are excluded by business
/// rule; unparseable amounts or dates drop the row.
pub fn load_discounts(
    bytes: &[u8],
    directory: &PromoterDirectory,
) -> Result<Loaded<DiscountRecord>> {
    let mut workbook = open_workbook(bytes)?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| DashboardError::MissingSheet("(first sheet)".to_string()))?;
    let range = workbook.worksheet_range(&sheet)?;
    let rows: Vec<&[Data]> = range.rows().collect();

    let (header_idx, columns) = locate_columns(&rows, &DISCOUNT_COLUMNS, "renewal discounts")?;
    let col_name = columns["Promotor"];
    let col_date = columns["Fecha Ministración"];
    let col_amount = columns["Descuento Renovación"];

    let mut diagnostics = Diagnostics::default();
    let mut parsed = Vec::new();
    for row in rows.iter().skip(header_idx + 1) {
        if is_blank(row) {
            continue;
        }
        diagnostics.rows_read += 1;
        let name = cell_str(row, col_name);
        let date = cell_date(row, col_date);
        let amount = cell_amount(row, col_amount);
        let (Some(name), Some(date), Some(amount)) = (name, date, amount) else {
            diagnostics.rows_dropped += 1;
            continue;
        };
        if amount <= 0.0 {
            continue;
        }
        parsed.push(DiscountRecord {
            promoter_code: None,
            raw_promoter_name: name,
            week: WeekBucket::containing(date),
            discount_amount: amount,
        });
    }

    attach_codes(&mut parsed, directory, &mut diagnostics, |r| r.raw_promoter_name.as_str(), |r, c| {
        r.promoter_code = c;
    });

    Ok(Loaded {
        rows: parsed,
        diagnostics,
    })
}

/// Loads the expected-payments sheet. `PS*`, `MULTAS` and `VENCI*` are
/// optional in the wild; absent columns default to zero / no due date.
pub fn load_expected_balances(
    bytes: &[u8],
    directory: &PromoterDirectory,
) -> Result<Loaded<ExpectedBalanceRecord>> {
    let mut workbook = open_workbook(bytes)?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| DashboardError::MissingSheet("(first sheet)".to_string()))?;
    let range = workbook.worksheet_range(&sheet)?;
    let rows: Vec<&[Data]> = range.rows().collect();

    let (header_idx, columns) = locate_columns(&rows, &EXPECTED_COLUMNS, "expected payments")?;
    let col_name = columns["PROMOTOR"];
    let col_balance = columns["SALDO"];
    let col_installment = columns.get("PS*").copied();
    let col_overdue = columns.get("MULTAS").copied();
    let col_due = columns.get("VENCI*").copied();

    let mut diagnostics = Diagnostics::default();
    let mut parsed = Vec::new();
    for row in rows.iter().skip(header_idx + 1) {
        if is_blank(row) {
            continue;
        }
        diagnostics.rows_read += 1;
        let name = cell_str(row, col_name);
        let balance = cell_amount(row, col_balance);
        let (Some(name), Some(balance)) = (name, balance) else {
            diagnostics.rows_dropped += 1;
            continue;
        };
        parsed.push(ExpectedBalanceRecord {
            promoter_code: None,
            raw_promoter_name: name,
            outstanding_balance: balance,
            installment_size: col_installment
                .and_then(|c| cell_amount(row, c))
                .unwrap_or(0.0),
            overdue_amount: col_overdue.and_then(|c| cell_amount(row, c)).unwrap_or(0.0),
            due_date: col_due.and_then(|c| cell_date(row, c)),
        });
    }

    attach_codes(&mut parsed, directory, &mut diagnostics, |r| r.raw_promoter_name.as_str(), |r, c| {
        r.promoter_code = c;
    });

    Ok(Loaded {
        rows: parsed,
        diagnostics,
    })
}

/// Runs the reconciler over each record's raw name and writes the resolved
/// code back, collecting the unmatched report into the diagnostics.
fn attach_codes<T>(
    records: &mut [T],
    directory: &PromoterDirectory,
    diagnostics: &mut Diagnostics,
    raw_name: impl Fn(&T) -> &str,
    set_code: impl Fn(&mut T, Option<PromoterCode>),
) {
    let reconciler = Reconciler::new(directory);
    let names: Vec<String> = records.iter().map(|r| raw_name(r).to_string()).collect();
    let (resolutions, report) = reconciler.resolve_all(&names);
    for (record, resolution) in records.iter_mut().zip(resolutions) {
        set_code(record, resolution.code);
    }
    diagnostics.unmatched = report;
}
