// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payment destination rows.

use paydesk_core::{PaydeskError, PaymentDestination};
use rusqlite::params;

use crate::database::{Database, map_tr_err};

const COLUMNS: &str = "id, bank_name, account_holder, account_number, limit_amount, \
                       running_total, priority, usage_count, is_active, created_at";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PaymentDestination> {
    let priority: i64 = row.get(6)?;
    let usage_count: i64 = row.get(7)?;
    Ok(PaymentDestination {
        id: row.get(0)?,
        bank_name: row.get(1)?,
        account_holder: row.get(2)?,
        account_number: row.get(3)?,
        limit: row.get(4)?,
        running_total: row.get(5)?,
        priority: PaymentDestination::clamp_priority(priority),
        usage_count: usage_count.max(0) as u64,
        is_active: row.get(8)?,
        created_at: row.get(9)?,
    })
}

/// All destinations in insertion order.
pub async fn list_destinations(db: &Database) -> Result<Vec<PaymentDestination>, PaydeskError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM payment_destinations ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt.query_map([], from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or replace a destination. Priority is clamped into range.
pub async fn save_destination(
    db: &Database,
    destination: &PaymentDestination,
) -> Result<(), PaydeskError> {
    let d = destination.clone();
    let priority = PaymentDestination::clamp_priority(i64::from(d.priority));
    let usage_count = i64::try_from(d.usage_count).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO payment_destinations ({COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
                     ON CONFLICT(id) DO UPDATE SET \
                       bank_name = excluded.bank_name, \
                       account_holder = excluded.account_holder, \
                       account_number = excluded.account_number, \
                       limit_amount = excluded.limit_amount, \
                       running_total = excluded.running_total, \
                       priority = excluded.priority, \
                       usage_count = excluded.usage_count, \
                       is_active = excluded.is_active"
                ),
                params![
                    d.id,
                    d.bank_name,
                    d.account_holder,
                    d.account_number,
                    d.limit,
                    d.running_total,
                    priority,
                    usage_count,
                    d.is_active,
                    d.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use paydesk_core::{new_id, timestamp_now};

    #[tokio::test]
    async fn save_upserts_and_clamps_priority() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("d.db").to_str().unwrap(), true)
            .await
            .unwrap();

        let mut d = PaymentDestination {
            id: new_id(),
            bank_name: "Garanti".into(),
            account_holder: "Acme Ltd".into(),
            account_number: "TR33 0006 2000 0000 0000 0000 01".into(),
            limit: 5_000.0,
            running_total: 0.0,
            priority: 12,
            usage_count: 0,
            is_active: true,
            created_at: timestamp_now(),
        };
        save_destination(&db, &d).await.unwrap();
        d.is_active = false;
        d.priority = 3;
        save_destination(&db, &d).await.unwrap();

        let all = list_destinations(&db).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(!all[0].is_active);
        assert_eq!(all[0].priority, 3);
    }
}
