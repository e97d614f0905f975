// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted sticky allocations.

use paydesk_core::{PaydeskError, timestamp_now};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};

pub async fn get_sticky_allocation(
    db: &Database,
    customer: &str,
) -> Result<Option<String>, PaydeskError> {
    let customer = customer.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT destination_id FROM sticky_allocations WHERE customer_key = ?1",
                params![customer],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_sticky_allocation(
    db: &Database,
    customer: &str,
    destination_id: &str,
) -> Result<(), PaydeskError> {
    let customer = customer.to_string();
    let destination_id = destination_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO sticky_allocations (customer_key, destination_id, updated_at) \
                 VALUES (?1, ?2, ?3) \
                 ON CONFLICT(customer_key) DO UPDATE SET \
                   destination_id = excluded.destination_id, updated_at = excluded.updated_at",
                params![customer, destination_id, timestamp_now()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn latest_allocation_wins() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("k.db").to_str().unwrap(), true)
            .await
            .unwrap();
        assert!(get_sticky_allocation(&db, "905551234567").await.unwrap().is_none());
        set_sticky_allocation(&db, "905551234567", "a").await.unwrap();
        set_sticky_allocation(&db, "905551234567", "b").await.unwrap();
        assert_eq!(
            get_sticky_allocation(&db, "905551234567").await.unwrap().as_deref(),
            Some("b")
        );
    }
}
