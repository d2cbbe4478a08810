use calamine::Data;
use regex::Regex;

use crate::categorizer::{annotate_unmatched, resolve_category};
use crate::error::{ImportError, ParseErrorCode, Result};
use crate::fmt::format_concept;
use crate::models::{Category, ParsedBatch, ParsedTransaction};
use crate::normalize::{parse_amount, parse_date};

/// Placeholder concept for manual rows that omit one.
pub const SIN_NOMBRE: &str = "SIN NOMBRE";

// Fixed positional column maps. None of the supported layouts carry
// header-name metadata worth trusting; offsets are part of the layout.
const MANUAL_SKIP: usize = 1;
const MANUAL_FECHA: usize = 0;
const MANUAL_CONCEPTO: usize = 1;
const MANUAL_IMPORTE: usize = 2;
const MANUAL_DESCRIPCION: usize = 3;
const MANUAL_CATEGORIA: usize = 4;
const MANUAL_CONTRAPARTE: usize = 5;

const SANTANDER_SKIP: usize = 9;
const SANTANDER_FECHA: usize = 0;
const SANTANDER_CONCEPTO: usize = 2;
const SANTANDER_IMPORTE: usize = 3;

const BBVA_SKIP: usize = 3;
const BBVA_FECHA: usize = 0;
const BBVA_CONCEPTO: usize = 1;
const BBVA_IMPORTE: usize = 2;
const BBVA_EXTRAS: [usize; 2] = [3, 4];

// ---------------------------------------------------------------------------
// Importer kinds — enum dispatch instead of trait objects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImporterKind {
    Manual,
    Santander,
    Bbva,
}

const ALL_IMPORTERS: &[ImporterKind] = &[
    ImporterKind::Manual,
    ImporterKind::Santander,
    ImporterKind::Bbva,
];

pub fn get_by_key(key: &str) -> Option<ImporterKind> {
    ALL_IMPORTERS.iter().find(|i| i.key() == key).copied()
}

impl ImporterKind {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Santander => "santander",
            Self::Bbva => "bbva",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Manual => "Plantilla manual",
            Self::Santander => "Santander",
            Self::Bbva => "BBVA",
        }
    }

    /// Rows of preamble before the first data row.
    pub fn header_offset(&self) -> usize {
        match self {
            Self::Manual => MANUAL_SKIP,
            Self::Santander => SANTANDER_SKIP,
            Self::Bbva => BBVA_SKIP,
        }
    }

    /// Only the manual template may arrive as delimited text; bank exports
    /// are always spreadsheet workbooks.
    pub fn accepts_delimited(&self) -> bool {
        matches!(self, Self::Manual)
    }

    /// Header fingerprint check: before trusting fixed column offsets, the
    /// bank layouts require their known header label in the date column of
    /// the last preamble row. The manual template is user-authored and is
    /// not validated.
    pub fn matches_layout(&self, grid: &[Vec<Data>]) -> bool {
        match self {
            Self::Manual => true,
            Self::Santander => header_contains(grid, SANTANDER_SKIP - 1, SANTANDER_FECHA, "fecha"),
            Self::Bbva => header_contains(grid, BBVA_SKIP - 1, BBVA_FECHA, "fecha"),
        }
    }

    /// Parse a raw cell grid into an ordered batch of transactions.
    ///
    /// `categories` is consulted by the manual layout only. `progress`, when
    /// given, receives a 0-100 percentage after each data row is prepared.
    pub fn parse(
        &self,
        grid: &[Vec<Data>],
        categories: &[Category],
        progress: Option<&mut dyn FnMut(u8)>,
    ) -> Result<ParsedBatch> {
        match self {
            Self::Manual => parse_manual(grid, categories, progress),
            Self::Santander => parse_santander(grid, progress),
            Self::Bbva => parse_bbva(grid, progress),
        }
    }
}

fn header_contains(grid: &[Vec<Data>], row: usize, col: usize, needle: &str) -> bool {
    match grid.get(row).map(|r| cell(r, col)) {
        Some(Data::String(s)) => s.to_lowercase().contains(needle),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Cell access
// ---------------------------------------------------------------------------

static EMPTY_CELL: Data = Data::Empty;

fn cell(row: &[Data], idx: usize) -> &Data {
    row.get(idx).unwrap_or(&EMPTY_CELL)
}

fn cell_text(row: &[Data], idx: usize) -> Option<String> {
    match row.get(idx) {
        Some(Data::String(s)) => {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        }
        Some(Data::Float(f)) => Some(format!("{f}")),
        Some(Data::Int(i)) => Some(i.to_string()),
        _ => None,
    }
}

fn is_blank(row: &[Data], idx: usize) -> bool {
    match row.get(idx) {
        None | Some(Data::Empty) => true,
        Some(Data::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

struct Progress<'a> {
    cb: Option<&'a mut dyn FnMut(u8)>,
    total: usize,
    done: usize,
}

impl<'a> Progress<'a> {
    fn new(cb: Option<&'a mut dyn FnMut(u8)>, total: usize) -> Self {
        Self { cb, total, done: 0 }
    }

    fn tick(&mut self) {
        self.done += 1;
        if let Some(cb) = self.cb.as_mut() {
            cb(((self.done * 100) / self.total.max(1)).min(100) as u8);
        }
    }
}

// ---------------------------------------------------------------------------
// Manual template
// ---------------------------------------------------------------------------

fn parse_manual(
    grid: &[Vec<Data>],
    categories: &[Category],
    progress: Option<&mut dyn FnMut(u8)>,
) -> Result<ParsedBatch> {
    let mut batch = ParsedBatch::default();
    let mut progress = Progress::new(progress, grid.len().saturating_sub(MANUAL_SKIP));

    for (i, row) in grid.iter().enumerate().skip(MANUAL_SKIP) {
        let source_row = i + 1;

        // Entirely blank in the required columns: not data, not an error.
        if is_blank(row, MANUAL_FECHA) && is_blank(row, MANUAL_IMPORTE) {
            progress.tick();
            continue;
        }

        // The manual template tolerates sparse data: a row that fails on
        // date or amount is tallied and skipped, never fatal.
        let fecha = parse_date(cell(row, MANUAL_FECHA));
        let importe = parse_amount(cell(row, MANUAL_IMPORTE));
        let (Some(fecha), Some(importe)) = (fecha, importe) else {
            tracing::debug!(row = source_row, "manual row skipped: unparseable date or amount");
            batch.skipped_rows.push(source_row);
            progress.tick();
            continue;
        };

        let concepto = match cell_text(row, MANUAL_CONCEPTO) {
            Some(t) => format_concept(&t),
            None => SIN_NOMBRE.to_string(),
        };

        let mut descripcion = cell_text(row, MANUAL_DESCRIPCION);
        let mut categoria_id = None;
        if let Some(raw) = cell_text(row, MANUAL_CATEGORIA) {
            match resolve_category(&raw, categories) {
                Some(id) => categoria_id = Some(id),
                None => descripcion = annotate_unmatched(descripcion, &raw),
            }
        }

        batch.rows.push(ParsedTransaction {
            fecha,
            concepto,
            importe,
            descripcion,
            contraparte: cell_text(row, MANUAL_CONTRAPARTE),
            categoria_id,
        });
        progress.tick();
    }

    Ok(batch)
}

// ---------------------------------------------------------------------------
// Santander export
// ---------------------------------------------------------------------------

fn parse_santander(
    grid: &[Vec<Data>],
    progress: Option<&mut dyn FnMut(u8)>,
) -> Result<ParsedBatch> {
    let mut batch = ParsedBatch::default();
    let mut progress = Progress::new(progress, grid.len().saturating_sub(SANTANDER_SKIP));

    for (i, row) in grid.iter().enumerate().skip(SANTANDER_SKIP) {
        let source_row = i + 1;

        if is_blank(row, SANTANDER_FECHA)
            && is_blank(row, SANTANDER_CONCEPTO)
            && is_blank(row, SANTANDER_IMPORTE)
        {
            progress.tick();
            continue;
        }
        // A populated row without a concept cannot satisfy the non-empty
        // concept guarantee; treated as blank rather than invented.
        let Some(concepto) = cell_text(row, SANTANDER_CONCEPTO) else {
            progress.tick();
            continue;
        };

        let fecha = parse_date(cell(row, SANTANDER_FECHA)).ok_or(ImportError::Parse {
            layout: "santander",
            row: source_row,
            code: ParseErrorCode::InvalidDate,
        })?;
        let importe = parse_amount(cell(row, SANTANDER_IMPORTE)).ok_or(ImportError::Parse {
            layout: "santander",
            row: source_row,
            code: ParseErrorCode::InvalidAmount,
        })?;

        batch.rows.push(ParsedTransaction {
            fecha,
            concepto: format_concept(&concepto),
            importe,
            descripcion: None,
            contraparte: None,
            categoria_id: None,
        });
        progress.tick();
    }

    Ok(batch)
}

// ---------------------------------------------------------------------------
// BBVA export
// ---------------------------------------------------------------------------

fn parse_bbva(grid: &[Vec<Data>], progress: Option<&mut dyn FnMut(u8)>) -> Result<ParsedBatch> {
    let mut batch = ParsedBatch::default();
    let mut progress = Progress::new(progress, grid.len().saturating_sub(BBVA_SKIP));

    for (i, row) in grid.iter().enumerate().skip(BBVA_SKIP) {
        let source_row = i + 1;

        if is_blank(row, BBVA_FECHA) && is_blank(row, BBVA_CONCEPTO) && is_blank(row, BBVA_IMPORTE)
        {
            progress.tick();
            continue;
        }
        let Some(concepto) = cell_text(row, BBVA_CONCEPTO) else {
            progress.tick();
            continue;
        };

        let fecha = parse_date(cell(row, BBVA_FECHA)).ok_or(ImportError::Parse {
            layout: "bbva",
            row: source_row,
            code: ParseErrorCode::InvalidDate,
        })?;
        let importe = parse_amount(cell(row, BBVA_IMPORTE)).ok_or(ImportError::Parse {
            layout: "bbva",
            row: source_row,
            code: ParseErrorCode::InvalidAmount,
        })?;

        let extras: Vec<String> = BBVA_EXTRAS
            .iter()
            .filter(|&&idx| !is_reference_noise(cell(row, idx)))
            .filter_map(|&idx| cell_text(row, idx))
            .collect();
        let descripcion = if extras.is_empty() {
            None
        } else {
            Some(extras.join(", "))
        };

        batch.rows.push(ParsedTransaction {
            fecha,
            concepto: format_concept(&concepto),
            importe,
            descripcion,
            contraparte: None,
            categoria_id: None,
        });
        progress.tick();
    }

    Ok(batch)
}

/// Bare reference numbers in the extra columns carry no meaning for the
/// user and are dropped instead of folded into the description.
fn is_reference_noise(value: &Data) -> bool {
    match value {
        Data::Float(_) | Data::Int(_) => true,
        Data::String(s) => Regex::new(r"^\d+$")
            .map(|re| re.is_match(s.trim()))
            .unwrap_or(false),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn s(v: &str) -> Data {
        Data::String(v.to_string())
    }

    fn n(v: f64) -> Data {
        Data::Float(v)
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn categories() -> Vec<Category> {
        vec![
            Category { id: 10, name: "Alimentación".to_string(), delegation_id: None },
            Category { id: 11, name: "Ocio".to_string(), delegation_id: None },
        ]
    }

    fn manual_header() -> Vec<Data> {
        ["Fecha", "Concepto", "Importe", "Descripción", "Categoría", "Contraparte"]
            .into_iter()
            .map(s)
            .collect()
    }

    // Preamble the Santander export carries before its data rows: eight
    // banner rows plus the column-header row the fingerprint check reads.
    fn santander_preamble() -> Vec<Vec<Data>> {
        let mut rows: Vec<Vec<Data>> = (0..8).map(|_| vec![Data::Empty]).collect();
        rows.push(vec![s("Fecha Operación"), s("Fecha Valor"), s("Concepto"), s("Importe"), s("Saldo")]);
        rows
    }

    fn bbva_preamble() -> Vec<Vec<Data>> {
        vec![
            vec![s("Movimientos de la cuenta")],
            vec![Data::Empty],
            vec![s("Fecha"), s("Concepto"), s("Importe"), s("Movimiento"), s("Observaciones")],
        ]
    }

    #[test]
    fn test_get_by_key() {
        assert_eq!(get_by_key("santander"), Some(ImporterKind::Santander));
        assert_eq!(get_by_key("manual"), Some(ImporterKind::Manual));
        assert_eq!(get_by_key("ing"), None);
    }

    #[test]
    fn test_kind_metadata() {
        assert_eq!(ImporterKind::Santander.header_offset(), 9);
        assert_eq!(ImporterKind::Bbva.header_offset(), 3);
        assert_eq!(ImporterKind::Manual.name(), "Plantilla manual");
        assert!(ImporterKind::Manual.accepts_delimited());
        assert!(!ImporterKind::Bbva.accepts_delimited());
    }

    #[test]
    fn test_manual_parses_full_row() {
        let grid = vec![
            manual_header(),
            vec![s("15/01/2025"), s("COMPRA EN MERCADO"), s("-270,41"), s("semanal"), s("alimentación"), s("Mercado Central")],
        ];
        let batch = ImporterKind::Manual.parse(&grid, &categories(), None).unwrap();
        assert_eq!(batch.rows.len(), 1);
        assert!(batch.skipped_rows.is_empty());
        let tx = &batch.rows[0];
        assert_eq!(tx.fecha, ymd(2025, 1, 15));
        assert_eq!(tx.concepto, "Compra en Mercado");
        assert_eq!(tx.importe, -270.41);
        assert_eq!(tx.descripcion.as_deref(), Some("semanal"));
        assert_eq!(tx.contraparte.as_deref(), Some("Mercado Central"));
        assert_eq!(tx.categoria_id, Some(10));
    }

    #[test]
    fn test_manual_concept_placeholder() {
        let grid = vec![
            manual_header(),
            vec![s("15/01/2025"), Data::Empty, s("12,00")],
        ];
        let batch = ImporterKind::Manual.parse(&grid, &[], None).unwrap();
        assert_eq!(batch.rows[0].concepto, SIN_NOMBRE);
    }

    #[test]
    fn test_manual_unmatched_category_is_annotated() {
        let grid = vec![
            manual_header(),
            vec![s("15/01/2025"), s("CINE"), s("-9,50"), Data::Empty, s("Entretenimiento")],
        ];
        let batch = ImporterKind::Manual.parse(&grid, &categories(), None).unwrap();
        let tx = &batch.rows[0];
        assert_eq!(tx.categoria_id, None);
        assert_eq!(tx.descripcion.as_deref(), Some("Categoría original: Entretenimiento"));
    }

    #[test]
    fn test_manual_tallies_unparseable_rows() {
        let grid = vec![
            manual_header(),
            vec![s("15/01/2025"), s("OK"), s("10,00")],
            vec![Data::Empty, s("SIN FECHA"), s("20,00")],
            vec![s("no es fecha"), s("FECHA ROTA"), s("30,00")],
            vec![s("16/01/2025"), s("OK TAMBIEN"), s("40,00")],
        ];
        let batch = ImporterKind::Manual.parse(&grid, &[], None).unwrap();
        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.skipped_rows, vec![3, 4]);
    }

    #[test]
    fn test_manual_blank_rows_are_silent() {
        let grid = vec![
            manual_header(),
            vec![Data::Empty, Data::Empty, Data::Empty],
            vec![s(""), s(""), s("")],
            vec![s("15/01/2025"), s("REAL"), s("10,00")],
        ];
        let batch = ImporterKind::Manual.parse(&grid, &[], None).unwrap();
        assert_eq!(batch.rows.len(), 1);
        assert!(batch.skipped_rows.is_empty());
    }

    #[test]
    fn test_santander_parses_rows() {
        let mut grid = santander_preamble();
        grid.push(vec![n(45667.0), Data::Empty, s("NOMINA ENERO"), n(1500.0)]);
        grid.push(vec![s("15/01/2025"), Data::Empty, s("RECIBO LUZ"), s("-80,25")]);
        let batch = ImporterKind::Santander.parse(&grid, &[], None).unwrap();
        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.rows[0].fecha, ymd(2025, 1, 10));
        assert_eq!(batch.rows[0].concepto, "Nomina Enero");
        assert_eq!(batch.rows[0].importe, 1500.0);
        assert_eq!(batch.rows[1].importe, -80.25);
        assert!(batch.rows[1].descripcion.is_none());
    }

    #[test]
    fn test_santander_invalid_amount_is_fatal_with_row_number() {
        let mut grid = santander_preamble();
        grid.push(vec![s("15/01/2025"), Data::Empty, s("BUENA"), s("10,00")]);
        grid.push(vec![s("16/01/2025"), Data::Empty, s("ROTA"), s("doce euros")]);
        let err = ImporterKind::Santander.parse(&grid, &[], None).unwrap_err();
        match err {
            ImportError::Parse { layout, row, code } => {
                assert_eq!(layout, "santander");
                assert_eq!(row, 11);
                assert_eq!(code, ParseErrorCode::InvalidAmount);
            }
            other => panic!("expected Parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_santander_invalid_date_is_fatal() {
        let mut grid = santander_preamble();
        grid.push(vec![s("ayer"), Data::Empty, s("CONCEPTO"), s("10,00")]);
        let err = ImporterKind::Santander.parse(&grid, &[], None).unwrap_err();
        match err {
            ImportError::Parse { row, code, .. } => {
                assert_eq!(row, 10);
                assert_eq!(code, ParseErrorCode::InvalidDate);
            }
            other => panic!("expected Parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_santander_skips_trailing_blank_rows() {
        let mut grid = santander_preamble();
        grid.push(vec![s("15/01/2025"), Data::Empty, s("UNICA"), s("10,00")]);
        grid.push(vec![Data::Empty, Data::Empty, Data::Empty, Data::Empty]);
        let batch = ImporterKind::Santander.parse(&grid, &[], None).unwrap();
        assert_eq!(batch.rows.len(), 1);
    }

    #[test]
    fn test_bbva_folds_extras_into_description() {
        let mut grid = bbva_preamble();
        grid.push(vec![
            s("15/01/2025"),
            s("TRANSFERENCIA RECIBIDA"),
            s("250,00"),
            s("Alquiler enero"),
            s("piso compartido"),
        ]);
        let batch = ImporterKind::Bbva.parse(&grid, &[], None).unwrap();
        assert_eq!(
            batch.rows[0].descripcion.as_deref(),
            Some("Alquiler enero, piso compartido")
        );
    }

    #[test]
    fn test_bbva_discards_numeric_reference_extras() {
        let mut grid = bbva_preamble();
        grid.push(vec![
            s("15/01/2025"),
            s("RECIBO"),
            s("-30,00"),
            s("0012345678"),
            s("cuota mensual"),
        ]);
        grid.push(vec![s("16/01/2025"), s("OTRO RECIBO"), s("-40,00"), n(998877.0)]);
        let batch = ImporterKind::Bbva.parse(&grid, &[], None).unwrap();
        assert_eq!(batch.rows[0].descripcion.as_deref(), Some("cuota mensual"));
        assert!(batch.rows[1].descripcion.is_none());
    }

    #[test]
    fn test_bbva_invalid_date_carries_layout() {
        let mut grid = bbva_preamble();
        grid.push(vec![s("????"), s("CONCEPTO"), s("1,00")]);
        let err = ImporterKind::Bbva.parse(&grid, &[], None).unwrap_err();
        match err {
            ImportError::Parse { layout, row, code } => {
                assert_eq!(layout, "bbva");
                assert_eq!(row, 4);
                assert_eq!(code, ParseErrorCode::InvalidDate);
            }
            other => panic!("expected Parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_layout_fingerprints() {
        assert!(ImporterKind::Santander.matches_layout(&santander_preamble()));
        assert!(ImporterKind::Bbva.matches_layout(&bbva_preamble()));
        // BBVA's three-row preamble does not satisfy Santander's fingerprint.
        assert!(!ImporterKind::Santander.matches_layout(&bbva_preamble()));
        let empty: Vec<Vec<Data>> = Vec::new();
        assert!(!ImporterKind::Bbva.matches_layout(&empty));
        assert!(ImporterKind::Manual.matches_layout(&empty));
    }

    #[test]
    fn test_progress_reaches_one_hundred() {
        let mut grid = vec![manual_header()];
        for i in 0..4 {
            grid.push(vec![s("15/01/2025"), s("FILA"), s(&format!("{i},00"))]);
        }
        let mut seen: Vec<u8> = Vec::new();
        let mut cb = |pct: u8| seen.push(pct);
        ImporterKind::Manual.parse(&grid, &[], Some(&mut cb)).unwrap();
        assert_eq!(seen, vec![25, 50, 75, 100]);
    }
}
