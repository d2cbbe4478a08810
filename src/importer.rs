use std::path::Path;

use calamine::{Data, Reader};
use rusqlite::Connection;

use crate::db;
use crate::error::{ImportError, Result};
use crate::models::{
    Category, DuplicateTransaction, ImportRecord, ImportReport, ParsedBatch, ParsedTransaction,
};
use crate::parsers::ImporterKind;

// ---------------------------------------------------------------------------
// File reading
// ---------------------------------------------------------------------------

/// Read a source file into a raw cell grid. Spreadsheet workbooks are read
/// from their first sheet only; delimited text is accepted for the manual
/// template alone.
pub fn read_grid(kind: ImporterKind, file_path: &Path) -> Result<Vec<Vec<Data>>> {
    let extension = file_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    match extension.as_str() {
        "xlsx" | "xls" | "ods" => read_workbook_grid(file_path),
        _ if kind.accepts_delimited() => read_delimited_grid(file_path),
        _ => Err(ImportError::UnsupportedFormat {
            layout: kind.key(),
            extension,
        }),
    }
}

fn read_workbook_grid(file_path: &Path) -> Result<Vec<Vec<Data>>> {
    let mut workbook = calamine::open_workbook_auto(file_path)
        .map_err(|e| ImportError::Workbook(format!("failed to open workbook: {e}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ImportError::Workbook("workbook has no sheets".to_string()))?
        .map_err(|e| ImportError::Workbook(e.to_string()))?;
    Ok(range.rows().map(|r| r.to_vec()).collect())
}

// The manual template carries decimal-comma amounts, so the field delimiter
// is the semicolon.
fn read_delimited_grid(file_path: &Path) -> Result<Vec<Vec<Data>>> {
    let file = std::fs::File::open(file_path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(b';')
        .from_reader(std::io::BufReader::new(file));
    let mut grid = Vec::new();
    for result in rdr.records() {
        let record = result?;
        grid.push(
            record
                .iter()
                .map(|field| {
                    let t = field.trim();
                    if t.is_empty() {
                        Data::Empty
                    } else {
                        Data::String(t.to_string())
                    }
                })
                .collect(),
        );
    }
    Ok(grid)
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Validate the layout fingerprint and parse the grid into a batch.
pub fn parse_grid(
    kind: ImporterKind,
    grid: &[Vec<Data>],
    categories: &[Category],
    progress: Option<&mut dyn FnMut(u8)>,
) -> Result<ParsedBatch> {
    if !kind.matches_layout(grid) {
        return Err(ImportError::LayoutMismatch(kind.key()));
    }
    kind.parse(grid, categories, progress)
}

/// Import an already-loaded grid into the destination account.
pub fn import_grid(
    conn: &Connection,
    grid: &[Vec<Data>],
    account_id: i64,
    kind: ImporterKind,
    categories: &[Category],
    progress: Option<&mut dyn FnMut(u8)>,
) -> Result<ImportReport> {
    let batch = parse_grid(kind, grid, categories, progress)?;
    insert_batch(conn, account_id, &batch)
}

/// Import a source file into the destination account and log the run.
pub fn import_file(
    conn: &Connection,
    file_path: &Path,
    account_id: i64,
    kind: ImporterKind,
    categories: &[Category],
    progress: Option<&mut dyn FnMut(u8)>,
) -> Result<ImportReport> {
    let grid = read_grid(kind, file_path)?;
    let batch = parse_grid(kind, &grid, categories, progress)?;
    let report = insert_batch(conn, account_id, &batch)?;

    let dates: Vec<String> = batch
        .rows
        .iter()
        .map(|tx| tx.fecha.format("%Y-%m-%d").to_string())
        .collect();
    let record = ImportRecord {
        id: None,
        filename: file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string(),
        account_id,
        inserted: report.inserted as i64,
        duplicates: report.duplicates.len() as i64,
        skipped: report.skipped_rows.len() as i64,
        date_range_start: dates.iter().min().cloned(),
        date_range_end: dates.iter().max().cloned(),
        checksum: db::compute_checksum(file_path)?,
    };
    db::record_import(conn, &record)?;

    Ok(report)
}

// ---------------------------------------------------------------------------
// Two-phase insert
// ---------------------------------------------------------------------------

/// Insert a parsed batch under the two-phase protocol.
///
/// The bulk phase is the fast path: one transaction, all rows. When it fails
/// on the dedupe index, the isolation phase re-inserts the rows one at a
/// time, in original order, so every conflict is attributed to its exact row
/// and explained via a store lookup. Only dedupe conflicts are recovered;
/// any other store failure aborts the run.
pub fn insert_batch(
    conn: &Connection,
    account_id: i64,
    batch: &ParsedBatch,
) -> Result<ImportReport> {
    let mut report = ImportReport {
        inserted: 0,
        duplicates: Vec::new(),
        skipped_rows: batch.skipped_rows.clone(),
    };
    if batch.rows.is_empty() {
        return Ok(report);
    }

    match bulk_insert(conn, account_id, batch) {
        Ok(()) => {
            report.inserted = batch.rows.len();
            tracing::info!(inserted = report.inserted, "bulk insert succeeded");
            return Ok(report);
        }
        Err(err) if db::is_unique_violation(&err) => {
            tracing::debug!("bulk insert hit the dedupe index, isolating conflicts row by row");
        }
        Err(err) => return Err(err.into()),
    }

    // Strictly sequential: each row either lands or is proven to conflict
    // before the next one is attempted.
    for (index, tx) in batch.rows.iter().enumerate() {
        match db::insert_transaction(conn, account_id, tx) {
            Ok(()) => report.inserted += 1,
            Err(err) if db::is_unique_violation(&err) => {
                let conflict_reason = conflict_reason(conn, account_id, tx)?;
                tracing::debug!(index, "duplicate row: {conflict_reason}");
                report.duplicates.push(DuplicateTransaction {
                    transaction: tx.clone(),
                    original_index: index,
                    conflict_reason,
                });
            }
            Err(err) => return Err(err.into()),
        }
    }

    tracing::info!(
        inserted = report.inserted,
        duplicates = report.duplicates.len(),
        "isolation phase finished"
    );
    Ok(report)
}

fn bulk_insert(
    conn: &Connection,
    account_id: i64,
    batch: &ParsedBatch,
) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    for row in &batch.rows {
        db::insert_transaction(&tx, account_id, row)?;
    }
    tx.commit()
}

fn conflict_reason(conn: &Connection, account_id: i64, tx: &ParsedTransaction) -> Result<String> {
    if db::find_by_dedupe_tuple(conn, account_id, tx)?.is_some() {
        return Ok(
            "Ya existe un movimiento idéntico (misma fecha, concepto, importe y descripción)."
                .to_string(),
        );
    }
    if let Some(existing) = db::find_by_key_fields(conn, account_id, tx)? {
        let stored = existing.descripcion.unwrap_or_default();
        return Ok(format!(
            "Ya existe un movimiento con la misma fecha, concepto e importe; \
             la descripción almacenada difiere: \"{stored}\"."
        ));
    }
    // The row that beat us is gone already; the index still vouches for it.
    Ok("El almacén rechazó el movimiento como duplicado.".to_string())
}
