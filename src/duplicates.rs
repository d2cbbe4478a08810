use chrono::Utc;
use rusqlite::Connection;

use crate::db;
use crate::error::Result;
use crate::models::{DuplicateTransaction, ParsedTransaction};

/// Build the forced-insert payload: the same record with a timestamped audit
/// marker appended to the description, which makes the dedupe tuple distinct
/// while leaving the already-stored row untouched.
pub fn forced_payload(dup: &DuplicateTransaction) -> ParsedTransaction {
    let marker = format!(
        "[Duplicado importado manualmente el {}]",
        Utc::now().format("%Y-%m-%d %H:%M:%S")
    );
    let mut tx = dup.transaction.clone();
    tx.descripcion = Some(match tx.descripcion.take() {
        Some(d) if !d.is_empty() => format!("{d}\n{marker}"),
        _ => marker,
    });
    tx
}

/// Insert a flagged duplicate past the dedupe constraint.
///
/// On success the caller removes the row from its pending set (see
/// `ImportReport::remove_duplicate`); on failure the error is surfaced and
/// the row stays pending for retry.
pub fn force_insert(
    conn: &Connection,
    account_id: i64,
    dup: &DuplicateTransaction,
) -> Result<ParsedTransaction> {
    let payload = forced_payload(dup);
    db::insert_transaction(conn, account_id, &payload)?;
    tracing::info!(original_index = dup.original_index, "forced duplicate insert");
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{find_by_dedupe_tuple, get_connection, init_db, insert_transaction};
    use chrono::NaiveDate;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn sample_tx(descripcion: Option<&str>) -> ParsedTransaction {
        ParsedTransaction {
            fecha: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            concepto: "Recibo Luz".to_string(),
            importe: -80.25,
            descripcion: descripcion.map(|d| d.to_string()),
            contraparte: None,
            categoria_id: None,
        }
    }

    fn as_duplicate(tx: ParsedTransaction) -> DuplicateTransaction {
        DuplicateTransaction {
            transaction: tx,
            original_index: 0,
            conflict_reason: "Ya existe un movimiento idéntico.".to_string(),
        }
    }

    #[test]
    fn test_forced_payload_appends_marker_to_description() {
        let payload = forced_payload(&as_duplicate(sample_tx(Some("enero"))));
        let desc = payload.descripcion.unwrap();
        assert!(desc.starts_with("enero\n[Duplicado importado manualmente el "), "{desc}");
        assert!(desc.ends_with(']'), "{desc}");
    }

    #[test]
    fn test_forced_payload_without_description() {
        let payload = forced_payload(&as_duplicate(sample_tx(None)));
        let desc = payload.descripcion.unwrap();
        assert!(desc.starts_with("[Duplicado importado manualmente el "), "{desc}");
    }

    #[test]
    fn test_forced_payload_leaves_other_fields_alone() {
        let payload = forced_payload(&as_duplicate(sample_tx(Some("enero"))));
        assert_eq!(payload.fecha, NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        assert_eq!(payload.concepto, "Recibo Luz");
        assert_eq!(payload.importe, -80.25);
    }

    #[test]
    fn test_force_insert_adds_a_distinct_row() {
        let (_dir, conn) = test_db();
        insert_transaction(&conn, 1, &sample_tx(Some("enero"))).unwrap();

        let payload = force_insert(&conn, 1, &as_duplicate(sample_tx(Some("enero")))).unwrap();

        // Both the original tuple and the perturbed one are now stored.
        assert!(find_by_dedupe_tuple(&conn, 1, &sample_tx(Some("enero"))).unwrap().is_some());
        assert!(find_by_dedupe_tuple(&conn, 1, &payload).unwrap().is_some());
        let count: i64 = conn
            .query_row("SELECT count(*) FROM transactions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_pending_set_shrinks_after_resolution() {
        let mut report = crate::models::ImportReport {
            inserted: 0,
            duplicates: vec![
                as_duplicate(sample_tx(Some("enero"))),
                DuplicateTransaction {
                    original_index: 3,
                    ..as_duplicate(sample_tx(Some("febrero")))
                },
            ],
            skipped_rows: Vec::new(),
        };
        report.remove_duplicate(0);
        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(report.duplicates[0].original_index, 3);
    }
}
