// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery of operator-composed messages through the owning session.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use paydesk_core::{Message, PaydeskError, ProtocolHandle, StorageAdapter};
use tracing::{debug, info, warn};

use crate::registry::SessionRegistry;

/// Fewest digits a relay target may have.
pub const MIN_TARGET_DIGITS: usize = 10;

/// Result of one relay attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered,
    InvalidTarget,
    NoSession,
    SendFailed,
    /// Another task is already delivering this message.
    InFlight,
    /// The message is not flagged for relay.
    Skipped,
}

pub fn valid_target(phone: &str) -> bool {
    phone.chars().filter(char::is_ascii_digit).count() >= MIN_TARGET_DIGITS
}

pub struct OutboundRelay {
    storage: Arc<dyn StorageAdapter>,
    registry: Arc<SessionRegistry>,
    typing_delay: Duration,
    in_flight: DashSet<String>,
}

impl OutboundRelay {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        registry: Arc<SessionRegistry>,
        typing_delay: Duration,
    ) -> Self {
        Self {
            storage,
            registry,
            typing_delay,
            in_flight: DashSet::new(),
        }
    }

    /// Relays one message. Failures leave the row pending.
    pub async fn relay(&self, message: &Message) -> RelayOutcome {
        if !message.awaits_relay() {
            return RelayOutcome::Skipped;
        }
        if !valid_target(&message.counterpart_phone) {
            warn!(
                message_id = %message.id,
                target = %message.counterpart_phone,
                "relay target has too few digits"
            );
            return RelayOutcome::InvalidTarget;
        }
        let Some(handle) = self.registry.handle(&message.connection_id) else {
            info!(
                message_id = %message.id,
                connection_id = %message.connection_id,
                "no live session for relay, leaving message pending"
            );
            return RelayOutcome::NoSession;
        };
        if !self.in_flight.insert(message.id.clone()) {
            return RelayOutcome::InFlight;
        }

        let outcome = match self.still_pending(message).await {
            Some(current) => self.send(handle.as_ref(), &current).await,
            None => RelayOutcome::Skipped,
        };
        self.in_flight.remove(&message.id);
        outcome
    }

    /// The stored row, if it still awaits relay. `message` may be a stale
    /// snapshot from an earlier rescan.
    async fn still_pending(&self, message: &Message) -> Option<Message> {
        match self.storage.get_message(&message.id).await {
            Ok(Some(current)) if current.awaits_relay() => Some(current),
            Ok(_) => {
                debug!(message_id = %message.id, "message no longer pending, skipping relay");
                None
            }
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "cannot re-read message before relay");
                None
            }
        }
    }

    async fn send(
        &self,
        handle: &dyn ProtocolHandle,
        message: &Message,
    ) -> RelayOutcome {
        let phone = message.counterpart_phone.as_str();
        let text = message.text.as_deref().unwrap_or_default();

        if let Err(e) = handle.send_composing(phone).await {
            debug!(phone, error = %e, "composing indicator failed");
        }
        tokio::time::sleep(self.typing_delay).await;

        let protocol_id = match handle.send_text(phone, text).await {
            Ok(id) => id,
            Err(e) => {
                warn!(message_id = %message.id, phone, error = %e, "relay send failed");
                return RelayOutcome::SendFailed;
            }
        };

        if let Err(e) = self
            .storage
            .mark_delivered(&message.id, protocol_id.as_deref())
            .await
        {
            // The text went out; a rescan would send it twice.
            warn!(message_id = %message.id, error = %e, "failed to flag relayed message as delivered");
        }
        info!(message_id = %message.id, connection_id = %message.connection_id, phone, "operator message relayed");
        RelayOutcome::Delivered
    }

    /// Rescans storage for pending messages and relays each one.
    pub async fn process_pending(&self) -> Result<usize, PaydeskError> {
        let pending = self.storage.list_pending_outbound().await?;
        let mut delivered = 0;
        for message in &pending {
            if self.relay(message).await == RelayOutcome::Delivered {
                delivered += 1;
            }
        }
        if !pending.is_empty() {
            debug!(pending = pending.len(), delivered, "relay rescan finished");
        }
        Ok(delivered)
    }
}
