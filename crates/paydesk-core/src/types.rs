// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain records and common types shared across the Paydesk workspace.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Formats the current UTC time the way every persisted timestamp is stored.
pub fn timestamp_now() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Protocol,
    Inference,
    Storage,
    ObjectStore,
}

/// Connection lifecycle status persisted on every session transition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Initializing,
    QrReady,
    PairingReady,
    Connected,
    Reconnecting,
    Disconnected,
    Error,
}

/// Reply style selected by the operator.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    /// Warm, familiar, first-name basis.
    #[default]
    Informal,
    Professional,
    /// Energetic and persuasive.
    AssertiveSales,
    /// Formal corporate register.
    FormalCorporate,
}

/// Payment-proof review status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Rejected,
    Credited,
}

impl TransactionStatus {
    /// REJECTED and CREDITED accept no further changes.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Credited)
    }

    /// Status only moves forward.
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Approved | Rejected | Credited) | (Approved, Credited | Rejected)
        )
    }

    /// Whether a transaction in this status has been counted against its destination.
    pub fn counts_toward_total(self) -> bool {
        matches!(self, Self::Approved | Self::Credited)
    }
}

/// One bound messaging identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConnection {
    pub id: String,
    pub name: String,
    pub representative_name: String,
    pub phone_number: Option<String>,
    pub status: ConnectionStatus,
    pub qr_code: Option<String>,
    pub pairing_code: Option<String>,
    pub battery_level: Option<i64>,
    pub signal: Option<String>,
    pub last_seen: Option<String>,
    pub created_at: String,
}

impl ChannelConnection {
    /// A freshly created connection, before any session has touched it.
    pub fn new(
        name: impl Into<String>,
        representative_name: impl Into<String>,
        phone_number: Option<String>,
    ) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            representative_name: representative_name.into(),
            phone_number,
            status: ConnectionStatus::Initializing,
            qr_code: None,
            pairing_code: None,
            battery_level: None,
            signal: None,
            last_seen: None,
            created_at: timestamp_now(),
        }
    }
}

/// State written by a channel session on a lifecycle transition.
///
/// `qr_code` and `pairing_code` are always written, so `None` clears them.
/// `phone_number` and `last_seen` are only written when present.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionUpdate {
    pub status: ConnectionStatus,
    pub qr_code: Option<String>,
    pub pairing_code: Option<String>,
    pub phone_number: Option<String>,
    pub last_seen: Option<String>,
}

impl ConnectionUpdate {
    /// A bare status change that clears the transient fields.
    pub fn status(status: ConnectionStatus) -> Self {
        Self {
            status,
            qr_code: None,
            pairing_code: None,
            phone_number: None,
            last_seen: None,
        }
    }
}

/// A durable record of one message, inbound or outbound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub connection_id: String,
    pub counterpart_phone: String,
    pub text: Option<String>,
    pub media_url: Option<String>,
    pub from_self: bool,
    pub is_media: bool,
    /// Protocol-native id; unique when present.
    pub protocol_message_id: Option<String>,
    /// Set by operators on messages the relay should deliver.
    pub outgoing_pending: bool,
    pub created_at: String,
}

impl Message {
    /// An inbound message from a counterpart.
    pub fn inbound(
        connection_id: &str,
        counterpart_phone: &str,
        text: Option<String>,
        is_media: bool,
        protocol_message_id: &str,
    ) -> Self {
        Self {
            id: new_id(),
            connection_id: connection_id.to_string(),
            counterpart_phone: counterpart_phone.to_string(),
            text,
            media_url: None,
            from_self: false,
            is_media,
            protocol_message_id: Some(protocol_message_id.to_string()),
            outgoing_pending: false,
            created_at: timestamp_now(),
        }
    }

    /// A message this worker has just sent.
    pub fn sent(
        connection_id: &str,
        counterpart_phone: &str,
        text: &str,
        protocol_message_id: Option<String>,
    ) -> Self {
        Self {
            id: new_id(),
            connection_id: connection_id.to_string(),
            counterpart_phone: counterpart_phone.to_string(),
            text: Some(text.to_string()),
            media_url: None,
            from_self: true,
            is_media: false,
            protocol_message_id,
            outgoing_pending: false,
            created_at: timestamp_now(),
        }
    }

    /// An operator-composed message waiting for the outbound relay.
    pub fn operator_pending(connection_id: &str, counterpart_phone: &str, text: &str) -> Self {
        Self {
            outgoing_pending: true,
            ..Self::sent(connection_id, counterpart_phone, text, None)
        }
    }

    /// Whether the outbound relay should pick this message up.
    pub fn awaits_relay(&self) -> bool {
        self.from_self && self.outgoing_pending
    }
}

/// A payment-proof record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub connection_id: String,
    pub destination_id: Option<String>,
    pub sender_name: Option<String>,
    pub amount: f64,
    pub bank_name: Option<String>,
    pub counterpart_phone: String,
    pub receipt_url: Option<String>,
    pub protocol_message_id: Option<String>,
    pub idempotency_key: String,
    pub status: TransactionStatus,
    /// Extra extraction fields kept for operator review.
    pub details: Option<serde_json::Value>,
    pub created_at: String,
    pub updated_at: String,
}

/// The last-resort transaction record: only the fields needed to find it again.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimalTransaction {
    pub id: String,
    pub connection_id: String,
    pub counterpart_phone: String,
    pub amount: f64,
    pub status: TransactionStatus,
    pub idempotency_key: String,
}

/// A bank account that can be disclosed to customers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDestination {
    pub id: String,
    pub bank_name: String,
    pub account_holder: String,
    pub account_number: String,
    /// Zero or negative means unlimited.
    pub limit: f64,
    pub running_total: f64,
    pub priority: u8,
    pub usage_count: u64,
    pub is_active: bool,
    pub created_at: String,
}

impl PaymentDestination {
    pub const MIN_PRIORITY: u8 = 1;
    pub const MAX_PRIORITY: u8 = 10;
    pub const DEFAULT_PRIORITY: u8 = 5;

    /// Clamp an operator-supplied priority into the accepted range.
    pub fn clamp_priority(priority: i64) -> u8 {
        priority.clamp(Self::MIN_PRIORITY as i64, Self::MAX_PRIORITY as i64) as u8
    }

    /// Share of the limit already used. Unlimited destinations report zero.
    pub fn utilization(&self) -> f64 {
        if self.limit > 0.0 {
            self.running_total / self.limit
        } else {
            0.0
        }
    }

    /// Active and still under its limit.
    pub fn is_eligible(&self) -> bool {
        self.is_active && (self.limit <= 0.0 || self.running_total < self.limit)
    }
}

/// Operator settings read by every conversation turn.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub tone: Tone,
    pub reply_delay_secs: u64,
    pub humanize: bool,
    pub system_instruction: String,
    pub operator_password: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tone: Tone::Informal,
            reply_delay_secs: 2,
            humanize: false,
            system_instruction: String::new(),
            operator_password: None,
        }
    }
}

impl std::fmt::Debug for EngineSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSettings")
            .field("tone", &self.tone)
            .field("reply_delay_secs", &self.reply_delay_secs)
            .field("humanize", &self.humanize)
            .field("system_instruction", &self.system_instruction)
            .field(
                "operator_password",
                &self.operator_password.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Row-level notifications published by the storage backend.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    ConnectionCreated(ChannelConnection),
    ConnectionDeleted { id: String },
    ConnectionStatusChanged { id: String, status: ConnectionStatus },
    MessageInserted(Message),
}

/// Generates a new random record id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
