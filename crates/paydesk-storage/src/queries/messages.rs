// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message rows, deduplicated on the protocol-native id.

use paydesk_core::{Message, PaydeskError};
use rusqlite::params;

use crate::database::{Database, map_tr_err};

const COLUMNS: &str = "id, connection_id, counterpart_phone, text, media_url, from_self, \
                       is_media, protocol_message_id, outgoing_pending, created_at";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        connection_id: row.get(1)?,
        counterpart_phone: row.get(2)?,
        text: row.get(3)?,
        media_url: row.get(4)?,
        from_self: row.get(5)?,
        is_media: row.get(6)?,
        protocol_message_id: row.get(7)?,
        outgoing_pending: row.get(8)?,
        created_at: row.get(9)?,
    })
}

/// Insert a message. Returns `false` if its protocol id already exists.
pub async fn insert_message(db: &Database, message: &Message) -> Result<bool, PaydeskError> {
    let m = message.clone();
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO messages ({COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    m.id,
                    m.connection_id,
                    m.counterpart_phone,
                    m.text,
                    m.media_url,
                    m.from_self,
                    m.is_media,
                    m.protocol_message_id,
                    m.outgoing_pending,
                    m.created_at,
                ],
            )?;
            Ok(inserted > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// The latest `limit` messages of a connection, optionally for one counterpart,
/// returned oldest first.
pub async fn list_messages(
    db: &Database,
    connection_id: &str,
    counterpart_phone: Option<&str>,
    limit: i64,
) -> Result<Vec<Message>, PaydeskError> {
    let connection_id = connection_id.to_string();
    let counterpart = counterpart_phone.map(str::to_string);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM messages \
                 WHERE connection_id = ?1 AND (?2 IS NULL OR counterpart_phone = ?2) \
                 ORDER BY created_at DESC, rowid DESC LIMIT ?3"
            ))?;
            let rows = stmt.query_map(params![connection_id, counterpart, limit], from_row)?;
            let mut messages = rows.collect::<Result<Vec<_>, _>>()?;
            messages.reverse();
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

/// One message by its row id.
pub async fn get_message(db: &Database, id: &str) -> Result<Option<Message>, PaydeskError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {COLUMNS} FROM messages WHERE id = ?1"))?;
            let mut rows = stmt.query_map(params![id], from_row)?;
            rows.next().transpose()
        })
        .await
        .map_err(map_tr_err)
}

/// Operator-composed messages waiting for the relay, oldest first.
pub async fn list_pending_outbound(db: &Database) -> Result<Vec<Message>, PaydeskError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM messages \
                 WHERE outgoing_pending = 1 AND from_self = 1 \
                 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt.query_map([], from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Flip a pending message to delivered, recording the protocol id if known.
pub async fn mark_delivered(
    db: &Database,
    id: &str,
    protocol_message_id: Option<&str>,
) -> Result<bool, PaydeskError> {
    let id = id.to_string();
    let protocol_id = protocol_message_id.map(str::to_string);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE messages SET outgoing_pending = 0, \
                 protocol_message_id = COALESCE(protocol_message_id, ?2) \
                 WHERE id = ?1 AND outgoing_pending = 1",
                params![id, protocol_id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}
