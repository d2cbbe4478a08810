use chrono::NaiveDate;
use serde::Serialize;

/// A category of the active organization. Supplied read-only by the caller,
/// already scoped to the organization the import runs under.
#[derive(Debug, Clone)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub delegation_id: Option<i64>,
}

/// One normalized transaction produced by a row parser. Ephemeral: it exists
/// only for the duration of an import run and is never mutated after
/// construction (the forced-insert payload is a copy).
#[derive(Debug, Clone, Serialize)]
pub struct ParsedTransaction {
    pub fecha: NaiveDate,
    pub concepto: String,
    /// Signed amount: positive = inflow, negative = outflow.
    pub importe: f64,
    pub descripcion: Option<String>,
    pub contraparte: Option<String>,
    pub categoria_id: Option<i64>,
}

/// A parsed transaction the store rejected under the dedupe constraint.
/// Being of this type is what the original's `isDuplicate` flag encoded.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateTransaction {
    #[serde(flatten)]
    pub transaction: ParsedTransaction,
    /// Position of the row in the parsed batch.
    pub original_index: usize,
    /// Human-readable explanation of the conflict, in the product language.
    pub conflict_reason: String,
}

/// Output of a row parser: the batch plus the 1-based source row numbers the
/// manual layout skipped over sparse data. Bank layouts never skip-and-tally;
/// they fail fast instead.
#[derive(Debug, Clone, Default)]
pub struct ParsedBatch {
    pub rows: Vec<ParsedTransaction>,
    pub skipped_rows: Vec<usize>,
}

/// A persisted row read back from the store, used only to build
/// conflict explanations.
#[derive(Debug, Clone)]
pub struct StoredTransaction {
    pub id: i64,
    pub account_id: i64,
    pub fecha: String,
    pub concepto: String,
    pub importe: f64,
    pub descripcion: Option<String>,
}

/// What an import run hands back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub inserted: usize,
    pub duplicates: Vec<DuplicateTransaction>,
    pub skipped_rows: Vec<usize>,
}

impl ImportReport {
    /// Drop a resolved duplicate from the pending set (after a successful
    /// force insert).
    pub fn remove_duplicate(&mut self, original_index: usize) {
        self.duplicates.retain(|d| d.original_index != original_index);
    }
}

/// Row of the `imports` audit log.
#[derive(Debug, Clone)]
pub struct ImportRecord {
    pub id: Option<i64>,
    pub filename: String,
    pub account_id: i64,
    pub inserted: i64,
    pub duplicates: i64,
    pub skipped: i64,
    pub date_range_start: Option<String>,
    pub date_range_end: Option<String>,
    pub checksum: String,
}
