// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transaction rows and forward-only status changes.

use paydesk_core::{
    MinimalTransaction, PaydeskError, Transaction, TransactionStatus, timestamp_now,
};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, conversion_err, map_tr_err};
use crate::queries::parse_column;

const COLUMNS: &str = "id, connection_id, destination_id, sender_name, amount, bank_name, \
                       counterpart_phone, receipt_url, protocol_message_id, idempotency_key, \
                       status, details, created_at, updated_at";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transaction> {
    let details: Option<String> = row.get(11)?;
    let details = details
        .map(|raw| serde_json::from_str(&raw).map_err(|e| conversion_err(11, e)))
        .transpose()?;
    Ok(Transaction {
        id: row.get(0)?,
        connection_id: row.get(1)?,
        destination_id: row.get(2)?,
        sender_name: row.get(3)?,
        amount: row.get(4)?,
        bank_name: row.get(5)?,
        counterpart_phone: row.get(6)?,
        receipt_url: row.get(7)?,
        protocol_message_id: row.get(8)?,
        idempotency_key: row.get(9)?,
        status: parse_column(row, 10)?,
        details,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn select_by_id(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<Transaction>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM transactions WHERE id = ?1"),
        params![id],
        from_row,
    )
    .optional()
}

/// Insert the full record. Fails on an idempotency-key collision.
pub async fn insert_transaction(db: &Database, tx: &Transaction) -> Result<(), PaydeskError> {
    let t = tx.clone();
    let details = t
        .details
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| PaydeskError::Storage {
            source: Box::new(e),
        })?;
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO transactions ({COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ),
                params![
                    t.id,
                    t.connection_id,
                    t.destination_id,
                    t.sender_name,
                    t.amount,
                    t.bank_name,
                    t.counterpart_phone,
                    t.receipt_url,
                    t.protocol_message_id,
                    t.idempotency_key,
                    t.status.to_string(),
                    details,
                    t.created_at,
                    t.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Insert only the fields needed to find the proof again.
pub async fn insert_minimal_transaction(
    db: &Database,
    tx: &MinimalTransaction,
) -> Result<(), PaydeskError> {
    let t = tx.clone();
    let now = timestamp_now();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO transactions (id, connection_id, counterpart_phone, amount, status, \
                 idempotency_key, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    t.id,
                    t.connection_id,
                    t.counterpart_phone,
                    t.amount,
                    t.status.to_string(),
                    t.idempotency_key,
                    now,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_transaction(db: &Database, id: &str) -> Result<Option<Transaction>, PaydeskError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| select_by_id(conn, &id))
        .await
        .map_err(map_tr_err)
}

/// Newest first, optionally filtered by status.
pub async fn list_transactions(
    db: &Database,
    status: Option<TransactionStatus>,
) -> Result<Vec<Transaction>, PaydeskError> {
    let status = status.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM transactions \
                 WHERE (?1 IS NULL OR status = ?1) \
                 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt.query_map(params![status], from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Move a transaction forward in one SQLite transaction.
///
/// The first move into a counted status adds the amount to the allocated
/// destination and bumps its usage counter. Rejecting an approved proof
/// takes both back out.
pub async fn advance_transaction(
    db: &Database,
    id: &str,
    next: TransactionStatus,
) -> Result<Transaction, PaydeskError> {
    let id = id.to_string();
    db.connection()
        .call(
            move |conn| -> Result<Result<Transaction, PaydeskError>, rusqlite::Error> {
                let sql_tx = conn.transaction()?;
                let Some(current) = select_by_id(&sql_tx, &id)? else {
                    return Ok(Err(PaydeskError::NotFound {
                        entity: "transaction",
                        id,
                    }));
                };
                if !current.status.can_transition_to(next) {
                    return Ok(Err(PaydeskError::InvalidTransition {
                        from: current.status,
                        to: next,
                    }));
                }

                sql_tx.execute(
                    "UPDATE transactions SET status = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, next.to_string(), timestamp_now()],
                )?;

                let delta = match (current.status.counts_toward_total(), next.counts_toward_total()) {
                    (false, true) => 1.0,
                    (true, false) => -1.0,
                    _ => 0.0,
                };
                if delta != 0.0
                    && let Some(destination_id) = &current.destination_id
                {
                    sql_tx.execute(
                        "UPDATE payment_destinations \
                         SET running_total = MAX(running_total + ?2, 0), \
                             usage_count = MAX(usage_count + ?3, 0) \
                         WHERE id = ?1",
                        params![destination_id, delta * current.amount, delta as i64],
                    )?;
                }

                let updated = select_by_id(&sql_tx, &id)?;
                sql_tx.commit()?;
                Ok(updated.ok_or(PaydeskError::NotFound {
                    entity: "transaction",
                    id,
                }))
            },
        )
        .await
        .map_err(map_tr_err)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::destinations;
    use paydesk_core::{PaymentDestination, new_id};

    async fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        let db = Database::open(path.to_str().unwrap(), true).await.unwrap();
        (dir, db)
    }

    fn transaction(key: &str, destination: Option<&str>, amount: f64) -> Transaction {
        let now = timestamp_now();
        Transaction {
            id: new_id(),
            connection_id: "c1".into(),
            destination_id: destination.map(String::from),
            sender_name: Some("Mehmet Yılmaz".into()),
            amount,
            bank_name: Some("Ziraat".into()),
            counterpart_phone: "905551234567".into(),
            receipt_url: Some("file:///tmp/r.jpg".into()),
            protocol_message_id: Some("WAMID-1".into()),
            idempotency_key: key.into(),
            status: TransactionStatus::Pending,
            details: Some(serde_json::json!({"transactionId": "REF123"})),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    fn destination() -> PaymentDestination {
        PaymentDestination {
            id: new_id(),
            bank_name: "Ziraat".into(),
            account_holder: "Acme Ltd".into(),
            account_number: "TR12 0001 0000 0000 0000 0000 01".into(),
            limit: 10_000.0,
            running_total: 0.0,
            priority: 5,
            usage_count: 0,
            is_active: true,
            created_at: timestamp_now(),
        }
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_is_rejected() {
        let (_dir, db) = open().await;
        insert_transaction(&db, &transaction("k1", None, 100.0)).await.unwrap();
        assert!(insert_transaction(&db, &transaction("k1", None, 100.0)).await.is_err());
    }

    #[tokio::test]
    async fn negative_amount_is_rejected_by_schema() {
        let (_dir, db) = open().await;
        assert!(insert_transaction(&db, &transaction("k1", None, -5.0)).await.is_err());
    }

    #[tokio::test]
    async fn minimal_record_round_trips() {
        let (_dir, db) = open().await;
        let minimal = MinimalTransaction {
            id: new_id(),
            connection_id: "c1".into(),
            counterpart_phone: "905551234567".into(),
            amount: 250.0,
            status: TransactionStatus::Pending,
            idempotency_key: "min_1".into(),
        };
        insert_minimal_transaction(&db, &minimal).await.unwrap();
        let row = get_transaction(&db, &minimal.id).await.unwrap().unwrap();
        assert_eq!(row.amount, 250.0);
        assert_eq!(row.status, TransactionStatus::Pending);
        assert!(row.sender_name.is_none());
        assert!(row.details.is_none());
    }

    #[tokio::test]
    async fn approval_counts_amount_once() {
        let (_dir, db) = open().await;
        let d = destination();
        destinations::save_destination(&db, &d).await.unwrap();
        let t = transaction("k1", Some(&d.id), 1_500.0);
        insert_transaction(&db, &t).await.unwrap();

        let approved = advance_transaction(&db, &t.id, TransactionStatus::Approved)
            .await
            .unwrap();
        assert_eq!(approved.status, TransactionStatus::Approved);
        advance_transaction(&db, &t.id, TransactionStatus::Credited)
            .await
            .unwrap();

        let stored = destinations::list_destinations(&db).await.unwrap();
        assert_eq!(stored[0].running_total, 1_500.0);
        assert_eq!(stored[0].usage_count, 1);
    }

    #[tokio::test]
    async fn rejecting_an_approved_proof_reverses_the_total() {
        let (_dir, db) = open().await;
        let d = destination();
        destinations::save_destination(&db, &d).await.unwrap();
        let t = transaction("k1", Some(&d.id), 400.0);
        insert_transaction(&db, &t).await.unwrap();
        advance_transaction(&db, &t.id, TransactionStatus::Approved)
            .await
            .unwrap();
        advance_transaction(&db, &t.id, TransactionStatus::Rejected)
            .await
            .unwrap();

        let stored = destinations::list_destinations(&db).await.unwrap();
        assert_eq!(stored[0].running_total, 0.0);
        assert_eq!(stored[0].usage_count, 0);
    }

    #[tokio::test]
    async fn backwards_transition_is_refused() {
        let (_dir, db) = open().await;
        let t = transaction("k1", None, 10.0);
        insert_transaction(&db, &t).await.unwrap();
        advance_transaction(&db, &t.id, TransactionStatus::Rejected)
            .await
            .unwrap();

        let err = advance_transaction(&db, &t.id, TransactionStatus::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, PaydeskError::InvalidTransition { .. }));
        let row = get_transaction(&db, &t.id).await.unwrap().unwrap();
        assert_eq!(row.status, TransactionStatus::Rejected);
    }

    #[tokio::test]
    async fn advancing_unknown_transaction_is_not_found() {
        let (_dir, db) = open().await;
        let err = advance_transaction(&db, "missing", TransactionStatus::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, PaydeskError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let (_dir, db) = open().await;
        let a = transaction("k1", None, 1.0);
        let b = transaction("k2", None, 2.0);
        insert_transaction(&db, &a).await.unwrap();
        insert_transaction(&db, &b).await.unwrap();
        advance_transaction(&db, &a.id, TransactionStatus::Approved)
            .await
            .unwrap();

        let pending = list_transactions(&db, Some(TransactionStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);
        assert_eq!(list_transactions(&db, None).await.unwrap().len(), 2);
    }
}
