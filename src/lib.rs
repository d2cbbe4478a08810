//! Bank-statement import & reconciliation engine.
//!
//! Ingests a user-authored manual template or one of two fixed bank export
//! layouts (Santander, BBVA), normalizes regionally ambiguous numbers and
//! dates into canonical transaction records, resolves category names against
//! the caller's list, and reconciles the batch against the store's dedupe
//! index with a two-phase insert: a bulk fast path, then a sequential
//! row-by-row fallback that pinpoints and explains every conflict. Flagged
//! duplicates can later be force-inserted with an audit marker.
//!
//! This crate is the import core only; accounts, categories and the rest of
//! the surrounding application live elsewhere and talk to it through
//! [`importer::import_file`] / [`importer::import_grid`].

pub mod categorizer;
pub mod db;
pub mod duplicates;
pub mod error;
pub mod fmt;
pub mod importer;
pub mod models;
pub mod normalize;
pub mod parsers;

pub use duplicates::force_insert;
pub use error::{ImportError, ParseErrorCode, Result};
pub use importer::{import_file, import_grid, insert_batch, parse_grid, read_grid};
pub use models::{
    Category, DuplicateTransaction, ImportRecord, ImportReport, ParsedBatch, ParsedTransaction,
};
pub use parsers::{get_by_key, ImporterKind};
