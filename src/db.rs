use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::models::{ImportRecord, ParsedTransaction, StoredTransaction};

// The dedupe index over (account, date, amount, concept, description) is the
// store's definition of "the same transaction". The importer never relaxes
// it; force inserts escape it by perturbing the description.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    account_id INTEGER NOT NULL,
    fecha TEXT NOT NULL,
    concepto TEXT NOT NULL,
    importe REAL NOT NULL,
    descripcion TEXT,
    contraparte TEXT,
    categoria_id INTEGER,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_dedupe
    ON transactions (account_id, fecha, importe, concepto, COALESCE(descripcion, ''));

CREATE TABLE IF NOT EXISTS imports (
    id INTEGER PRIMARY KEY,
    filename TEXT NOT NULL,
    account_id INTEGER NOT NULL,
    import_date TEXT DEFAULT (datetime('now')),
    inserted INTEGER NOT NULL,
    duplicates INTEGER NOT NULL,
    skipped INTEGER NOT NULL,
    date_range_start TEXT,
    date_range_end TEXT,
    checksum TEXT
);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Whether a store failure is the dedupe index rejecting a row — the one
/// error class the import protocol recovers from.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// Insert a single parsed transaction. Returns the raw rusqlite error so the
/// caller can classify constraint violations before converting.
pub fn insert_transaction(
    conn: &Connection,
    account_id: i64,
    tx: &ParsedTransaction,
) -> rusqlite::Result<()> {
    conn.prepare_cached(
        "INSERT INTO transactions (account_id, fecha, concepto, importe, descripcion, contraparte, categoria_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?
    .execute(rusqlite::params![
        account_id,
        tx.fecha.format("%Y-%m-%d").to_string(),
        tx.concepto,
        tx.importe,
        tx.descripcion,
        tx.contraparte,
        tx.categoria_id,
    ])?;
    Ok(())
}

fn stored_from_row(row: &rusqlite::Row) -> rusqlite::Result<StoredTransaction> {
    Ok(StoredTransaction {
        id: row.get(0)?,
        account_id: row.get(1)?,
        fecha: row.get(2)?,
        concepto: row.get(3)?,
        importe: row.get(4)?,
        descripcion: row.get(5)?,
    })
}

/// Point lookup by the full dedupe tuple.
pub fn find_by_dedupe_tuple(
    conn: &Connection,
    account_id: i64,
    tx: &ParsedTransaction,
) -> rusqlite::Result<Option<StoredTransaction>> {
    conn.prepare_cached(
        "SELECT id, account_id, fecha, concepto, importe, descripcion FROM transactions \
         WHERE account_id = ?1 AND fecha = ?2 AND importe = ?3 AND concepto = ?4 \
           AND COALESCE(descripcion, '') = COALESCE(?5, '')",
    )?
    .query_row(
        rusqlite::params![
            account_id,
            tx.fecha.format("%Y-%m-%d").to_string(),
            tx.importe,
            tx.concepto,
            tx.descripcion,
        ],
        stored_from_row,
    )
    .optional()
}

/// Lookup by the tuple minus the description, for conflict explanations when
/// the stored record's description differs from the candidate's.
pub fn find_by_key_fields(
    conn: &Connection,
    account_id: i64,
    tx: &ParsedTransaction,
) -> rusqlite::Result<Option<StoredTransaction>> {
    conn.prepare_cached(
        "SELECT id, account_id, fecha, concepto, importe, descripcion FROM transactions \
         WHERE account_id = ?1 AND fecha = ?2 AND importe = ?3 AND concepto = ?4 \
         LIMIT 1",
    )?
    .query_row(
        rusqlite::params![
            account_id,
            tx.fecha.format("%Y-%m-%d").to_string(),
            tx.importe,
            tx.concepto,
        ],
        stored_from_row,
    )
    .optional()
}

pub fn compute_checksum(file_path: &Path) -> Result<String> {
    let data = std::fs::read(file_path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

/// Append a completed run to the `imports` audit log. The checksum is audit
/// data only: re-imports are never short-circuited on it, the dedupe index
/// is the sole duplicate authority.
pub fn record_import(conn: &Connection, record: &ImportRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO imports (filename, account_id, inserted, duplicates, skipped, date_range_start, date_range_end, checksum) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            record.filename,
            record.account_id,
            record.inserted,
            record.duplicates,
            record.skipped,
            record.date_range_start,
            record.date_range_end,
            record.checksum,
        ],
    )?;
    tracing::debug!(filename = %record.filename, inserted = record.inserted, "import run logged");
    Ok(())
}
