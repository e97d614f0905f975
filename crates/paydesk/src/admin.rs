// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator commands that work directly against the database.
//!
//! A running worker picks up rows written here on its next reconcile tick.

use std::io::IsTerminal;

use colored::Colorize;
use paydesk_config::model::PaydeskConfig;
use paydesk_core::{
    ChannelConnection, ConnectionStatus, PaydeskError, PaymentDestination, StorageAdapter,
    Transaction, TransactionStatus, new_id, timestamp_now,
};
use paydesk_storage::SqliteStorage;
use qrcode::QrCode;
use qrcode::render::unicode;

pub async fn open_storage(config: &PaydeskConfig) -> Result<SqliteStorage, PaydeskError> {
    SqliteStorage::open(config.storage.clone()).await
}

fn use_color() -> bool {
    std::io::stdout().is_terminal()
}

pub async fn connection_add(
    storage: &SqliteStorage,
    name: &str,
    representative: &str,
    phone: Option<String>,
) -> Result<(), PaydeskError> {
    let connection = ChannelConnection::new(name, representative, phone);
    storage.create_connection(&connection).await?;
    println!("created connection {} ({})", connection.id, connection.name);
    Ok(())
}

pub async fn connection_list(storage: &SqliteStorage) -> Result<(), PaydeskError> {
    let connections = storage.list_connections().await?;
    print!("{}", render_connections(&connections, use_color()));
    Ok(())
}

pub async fn connection_remove(storage: &SqliteStorage, id: &str) -> Result<(), PaydeskError> {
    if !storage.delete_connection(id).await? {
        return Err(PaydeskError::NotFound {
            entity: "connection",
            id: id.to_string(),
        });
    }
    println!("removed connection {id}");
    Ok(())
}

pub async fn connection_qr(storage: &SqliteStorage, id: &str) -> Result<(), PaydeskError> {
    let connection = storage
        .get_connection(id)
        .await?
        .ok_or_else(|| PaydeskError::NotFound {
            entity: "connection",
            id: id.to_string(),
        })?;

    if let Some(code) = &connection.pairing_code {
        println!("pairing code: {code}");
        return Ok(());
    }
    let Some(payload) = &connection.qr_code else {
        println!(
            "connection {id} has no QR code (status {})",
            connection.status
        );
        return Ok(());
    };
    println!("{}", render_qr(payload)?);
    Ok(())
}

/// Renders a QR payload as terminal block characters.
pub fn render_qr(payload: &str) -> Result<String, PaydeskError> {
    let code = QrCode::new(payload.as_bytes())
        .map_err(|e| PaydeskError::Internal(format!("cannot encode QR payload: {e}")))?;
    Ok(code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build())
}

pub async fn destination_add(
    storage: &SqliteStorage,
    bank: String,
    holder: String,
    account: String,
    limit: f64,
    priority: i64,
) -> Result<(), PaydeskError> {
    if !limit.is_finite() || limit < 0.0 {
        return Err(PaydeskError::Config(format!(
            "limit must be zero or a positive number, got {limit}"
        )));
    }
    let destination = PaymentDestination {
        id: new_id(),
        bank_name: bank,
        account_holder: holder,
        account_number: account,
        limit,
        running_total: 0.0,
        priority: PaymentDestination::clamp_priority(priority),
        usage_count: 0,
        is_active: true,
        created_at: timestamp_now(),
    };
    storage.save_destination(&destination).await?;
    println!(
        "added destination {} ({}, priority {})",
        destination.id, destination.bank_name, destination.priority
    );
    Ok(())
}

pub async fn destination_list(storage: &SqliteStorage) -> Result<(), PaydeskError> {
    let destinations = storage.list_destinations().await?;
    print!("{}", render_destinations(&destinations));
    Ok(())
}

pub async fn transaction_advance(
    storage: &SqliteStorage,
    id: &str,
    status: TransactionStatus,
) -> Result<(), PaydeskError> {
    let updated = storage.advance_transaction(id, status).await?;
    println!("transaction {} is now {}", updated.id, updated.status);
    Ok(())
}

pub async fn transaction_list(
    storage: &SqliteStorage,
    status: Option<TransactionStatus>,
) -> Result<(), PaydeskError> {
    let transactions = storage.list_transactions(status).await?;
    print!("{}", render_transactions(&transactions));
    Ok(())
}

fn paint_status(status: ConnectionStatus, color: bool) -> String {
    let label = status.to_string();
    if !color {
        return label;
    }
    match status {
        ConnectionStatus::Connected => label.green().to_string(),
        ConnectionStatus::QrReady | ConnectionStatus::PairingReady => label.yellow().to_string(),
        ConnectionStatus::Error | ConnectionStatus::Disconnected => label.red().to_string(),
        ConnectionStatus::Initializing | ConnectionStatus::Reconnecting => label,
    }
}

pub fn render_connections(connections: &[ChannelConnection], color: bool) -> String {
    if connections.is_empty() {
        return "no connections\n".to_string();
    }
    let mut out = String::new();
    for c in connections {
        out.push_str(&format!(
            "{}  {:<20} {:<14} {:<16} {}\n",
            c.id,
            c.name,
            paint_status(c.status, color),
            c.phone_number.as_deref().unwrap_or("-"),
            c.last_seen.as_deref().unwrap_or("-"),
        ));
    }
    out
}

pub fn render_destinations(destinations: &[PaymentDestination]) -> String {
    if destinations.is_empty() {
        return "no destinations\n".to_string();
    }
    let mut out = String::new();
    for d in destinations {
        let limit = if d.limit > 0.0 {
            format!("{:.2}", d.limit)
        } else {
            "unlimited".to_string()
        };
        out.push_str(&format!(
            "{}  {:<16} {:<28} p{:<2} {:>10.2} / {:<10} {:>5.1}%{}\n",
            d.id,
            d.bank_name,
            d.account_number,
            d.priority,
            d.running_total,
            limit,
            d.utilization() * 100.0,
            if d.is_active { "" } else { "  inactive" },
        ));
    }
    out
}

pub fn render_transactions(transactions: &[Transaction]) -> String {
    if transactions.is_empty() {
        return "no transactions\n".to_string();
    }
    let mut out = String::new();
    for t in transactions {
        out.push_str(&format!(
            "{}  {:<9} {:>10.2}  {:<16} {:<20} {}\n",
            t.id,
            t.status,
            t.amount,
            t.counterpart_phone,
            t.sender_name.as_deref().unwrap_or("-"),
            t.created_at,
        ));
    }
    out
}
