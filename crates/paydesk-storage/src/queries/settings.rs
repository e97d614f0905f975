// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The singleton engine settings row.

use paydesk_core::{EngineSettings, PaydeskError, timestamp_now};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::queries::parse_column;

/// Stored settings, or defaults when the row was never written.
pub async fn get_settings(db: &Database) -> Result<EngineSettings, PaydeskError> {
    let stored = db
        .connection()
        .call(|conn| {
            conn.query_row(
                "SELECT tone, reply_delay_secs, humanize, system_instruction, operator_password \
                 FROM engine_settings WHERE id = 1",
                [],
                |row| {
                    let delay: i64 = row.get(1)?;
                    Ok(EngineSettings {
                        tone: parse_column(row, 0)?,
                        reply_delay_secs: delay.max(0) as u64,
                        humanize: row.get(2)?,
                        system_instruction: row.get(3)?,
                        operator_password: row.get(4)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;
    Ok(stored.unwrap_or_default())
}

pub async fn save_settings(db: &Database, settings: &EngineSettings) -> Result<(), PaydeskError> {
    let s = settings.clone();
    let delay = i64::try_from(s.reply_delay_secs).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO engine_settings \
                 (id, tone, reply_delay_secs, humanize, system_instruction, operator_password, updated_at) \
                 VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(id) DO UPDATE SET tone = excluded.tone, \
                   reply_delay_secs = excluded.reply_delay_secs, humanize = excluded.humanize, \
                   system_instruction = excluded.system_instruction, \
                   operator_password = excluded.operator_password, updated_at = excluded.updated_at",
                params![
                    s.tone.to_string(),
                    delay,
                    s.humanize,
                    s.system_instruction,
                    s.operator_password,
                    timestamp_now(),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
