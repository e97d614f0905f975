// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel connection rows.

use paydesk_core::{ChannelConnection, ConnectionUpdate, PaydeskError};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::queries::parse_column;

const COLUMNS: &str = "id, name, representative_name, phone_number, status, qr_code, \
                       pairing_code, battery_level, signal, last_seen, created_at";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChannelConnection> {
    Ok(ChannelConnection {
        id: row.get(0)?,
        name: row.get(1)?,
        representative_name: row.get(2)?,
        phone_number: row.get(3)?,
        status: parse_column(row, 4)?,
        qr_code: row.get(5)?,
        pairing_code: row.get(6)?,
        battery_level: row.get(7)?,
        signal: row.get(8)?,
        last_seen: row.get(9)?,
        created_at: row.get(10)?,
    })
}

pub async fn create_connection(
    db: &Database,
    connection: &ChannelConnection,
) -> Result<(), PaydeskError> {
    let c = connection.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO connections ({COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    c.id,
                    c.name,
                    c.representative_name,
                    c.phone_number,
                    c.status.to_string(),
                    c.qr_code,
                    c.pairing_code,
                    c.battery_level,
                    c.signal,
                    c.last_seen,
                    c.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_connection(
    db: &Database,
    id: &str,
) -> Result<Option<ChannelConnection>, PaydeskError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM connections WHERE id = ?1"),
                params![id],
                from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_connections(db: &Database) -> Result<Vec<ChannelConnection>, PaydeskError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM connections ORDER BY created_at ASC, id ASC"
            ))?;
            let rows = stmt.query_map([], from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Returns whether a row was removed.
pub async fn delete_connection(db: &Database, id: &str) -> Result<bool, PaydeskError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute("DELETE FROM connections WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Write a lifecycle transition. QR and pairing code are always overwritten.
pub async fn update_connection_state(
    db: &Database,
    id: &str,
    update: &ConnectionUpdate,
) -> Result<bool, PaydeskError> {
    let id = id.to_string();
    let u = update.clone();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE connections SET status = ?2, qr_code = ?3, pairing_code = ?4, \
                 phone_number = COALESCE(?5, phone_number), \
                 last_seen = COALESCE(?6, last_seen) \
                 WHERE id = ?1",
                params![
                    id,
                    u.status.to_string(),
                    u.qr_code,
                    u.pairing_code,
                    u.phone_number,
                    u.last_seen,
                ],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}
