// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-channel session state machine.
//!
//! States: Initializing -> {QrReady | PairingReady} -> Connected ->
//! {Reconnecting -> Connected | Disconnected}, and any state -> Error when
//! a pairing-code request fails. Every transition is written to the
//! connection row, which publishes it on the change feed.
//!
//! Inbound messages are recorded, then handed to the conversation engine
//! or the receipt pipeline in their own tracked task so a slow reply never
//! blocks lifecycle events.

use std::sync::Arc;
use std::time::Duration;

use paydesk_core::traits::protocol::is_logout_status;
use paydesk_core::{
    ChannelConnection, ConnectionStatus, ConnectionUpdate, EstablishRequest, Established,
    InboundEvent, Message, PaydeskError, ProtocolConnector, ProtocolEvent, ProtocolHandle,
    StorageAdapter, timestamp_now,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::auth::AuthStore;
use crate::conversation::{ConversationEngine, Turn};
use crate::receipt::{ReceiptInput, ReceiptPipeline};
use crate::registry::{SessionLease, SessionRegistry};
use crate::router::{RouteDecision, classify, normalize_phone, recorded_text};

/// Fewest digits a connection phone needs for the pairing-code flow.
pub const MIN_PAIRING_DIGITS: usize = 10;

/// Timers that drive the state machine.
#[derive(Debug, Clone, Copy)]
pub struct SessionTiming {
    pub reconnect_backoff: Duration,
    pub pairing_delay: Duration,
}

/// Everything a session shares with its siblings.
pub struct SessionContext {
    pub storage: Arc<dyn StorageAdapter>,
    pub connector: Arc<dyn ProtocolConnector>,
    pub registry: Arc<SessionRegistry>,
    pub auth: AuthStore,
    pub conversation: Arc<ConversationEngine>,
    pub receipts: Arc<ReceiptPipeline>,
    pub timing: SessionTiming,
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// The account logged out; credentials were wiped.
    LoggedOut,
    /// Cancelled by shutdown or by operator deletion.
    Cancelled,
    /// The connection row no longer exists.
    Removed,
}

/// How one protocol attempt ended.
enum AttemptEnd {
    Cancelled,
    LoggedOut,
    Removed,
    /// Transient close or the event stream ended.
    Dropped,
}

/// `ABCD1234` becomes `ABCD-1234`.
pub fn format_pairing_code(code: &str) -> String {
    let chars: Vec<char> = code.trim().chars().collect();
    chars
        .chunks(4)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}

/// Phone digits eligible for the pairing-code flow.
pub fn pairing_phone(phone_number: Option<&str>) -> Option<String> {
    let digits: String = phone_number?.chars().filter(char::is_ascii_digit).collect();
    (digits.len() >= MIN_PAIRING_DIGITS).then_some(digits)
}

pub struct ChannelSession {
    ctx: Arc<SessionContext>,
    lease: SessionLease,
    channel_id: String,
    representative_name: String,
    tracker: TaskTracker,
    /// One-shot guard: at most one pairing-code request per attempt.
    pairing_requested: bool,
}

impl ChannelSession {
    pub fn new(ctx: Arc<SessionContext>, lease: SessionLease, connection: &ChannelConnection) -> Self {
        Self {
            ctx,
            channel_id: lease.channel_id().to_string(),
            lease,
            representative_name: connection.representative_name.clone(),
            tracker: TaskTracker::new(),
            pairing_requested: false,
        }
    }

    /// Drives the session until logout, cancellation or row removal, then
    /// waits for in-flight message tasks and frees the registry slot.
    pub async fn run(mut self) -> SessionExit {
        let exit = self.drive().await;

        let purge = match exit {
            SessionExit::LoggedOut | SessionExit::Removed => true,
            SessionExit::Cancelled => self.lease.purge_requested(),
        };
        if purge && let Err(e) = self.ctx.auth.purge(&self.channel_id).await {
            warn!(channel_id = %self.channel_id, error = %e, "failed to purge authentication state");
        }

        self.tracker.close();
        self.tracker.wait().await;
        self.ctx.registry.release(&self.channel_id);
        info!(channel_id = %self.channel_id, ?exit, "channel session stopped");
        exit
    }

    async fn drive(&mut self) -> SessionExit {
        let cancel = self.lease.cancel_token();
        loop {
            if cancel.is_cancelled() {
                return SessionExit::Cancelled;
            }

            let connection = match self.ctx.storage.get_connection(&self.channel_id).await {
                Ok(Some(connection)) => connection,
                Ok(None) => return SessionExit::Removed,
                Err(e) => {
                    warn!(channel_id = %self.channel_id, error = %e, "failed to load connection row");
                    if !self.backoff(&cancel).await {
                        return SessionExit::Cancelled;
                    }
                    continue;
                }
            };
            self.representative_name = connection.representative_name.clone();

            if !self.persist(ConnectionUpdate::status(ConnectionStatus::Initializing)).await {
                return SessionExit::Removed;
            }

            let auth_dir = match self.ctx.auth.ensure(&self.channel_id).await {
                Ok(dir) => dir,
                Err(e) => {
                    error!(channel_id = %self.channel_id, error = %e, "cannot create authentication state");
                    if !self.persist(ConnectionUpdate::status(ConnectionStatus::Error)).await {
                        return SessionExit::Removed;
                    }
                    if !self.backoff(&cancel).await {
                        return SessionExit::Cancelled;
                    }
                    continue;
                }
            };

            let pairing = match pairing_phone(connection.phone_number.as_deref()) {
                Some(phone) if !self.ctx.auth.is_registered(&self.channel_id).await => Some(phone),
                _ => None,
            };

            let request = EstablishRequest {
                channel_id: self.channel_id.clone(),
                auth_dir,
                pairing_phone: pairing.clone(),
            };
            let established = tokio::select! {
                _ = cancel.cancelled() => return SessionExit::Cancelled,
                result = self.ctx.connector.establish(request) => result,
            };

            let end = match established {
                Ok(Established { handle, mut events }) => {
                    info!(
                        channel_id = %self.channel_id,
                        pairing = pairing.is_some(),
                        "protocol session established"
                    );
                    self.pairing_requested = false;
                    let end = self
                        .attempt(&handle, &mut events, &cancel, pairing.as_deref())
                        .await;
                    self.lease.set_handle(None);
                    self.close_attempt(handle.as_ref(), &end).await;
                    end
                }
                Err(e) => {
                    warn!(channel_id = %self.channel_id, error = %e, "failed to establish protocol session");
                    AttemptEnd::Dropped
                }
            };

            match end {
                AttemptEnd::Cancelled => return SessionExit::Cancelled,
                AttemptEnd::LoggedOut => return SessionExit::LoggedOut,
                AttemptEnd::Removed => return SessionExit::Removed,
                AttemptEnd::Dropped => {
                    if !self.persist(ConnectionUpdate::status(ConnectionStatus::Reconnecting)).await {
                        return SessionExit::Removed;
                    }
                    if !self.backoff(&cancel).await {
                        return SessionExit::Cancelled;
                    }
                }
            }
        }
    }

    /// Processes events from one established protocol session.
    async fn attempt(
        &mut self,
        handle: &Arc<dyn ProtocolHandle>,
        events: &mut mpsc::Receiver<ProtocolEvent>,
        cancel: &CancellationToken,
        pairing: Option<&str>,
    ) -> AttemptEnd {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return AttemptEnd::Cancelled,
                event = events.recv() => event,
            };
            let Some(event) = event else {
                info!(channel_id = %self.channel_id, "protocol event stream ended");
                return AttemptEnd::Dropped;
            };

            match event {
                ProtocolEvent::Connecting => {
                    debug!(channel_id = %self.channel_id, "protocol handshake in progress");
                    if let Some(phone) = pairing
                        && let Some(end) = self.request_pairing(handle.as_ref(), phone, cancel).await
                    {
                        return end;
                    }
                }
                ProtocolEvent::Qr { payload } => {
                    if let Some(phone) = pairing {
                        if let Some(end) = self.request_pairing(handle.as_ref(), phone, cancel).await {
                            return end;
                        }
                        continue;
                    }
                    info!(channel_id = %self.channel_id, "pairing token ready");
                    let update = ConnectionUpdate {
                        qr_code: Some(payload),
                        ..ConnectionUpdate::status(ConnectionStatus::QrReady)
                    };
                    if !self.persist(update).await {
                        return AttemptEnd::Removed;
                    }
                }
                ProtocolEvent::Open { own_id } => {
                    let phone = normalize_phone(&own_id);
                    info!(channel_id = %self.channel_id, phone = %phone, "channel connected");
                    let update = ConnectionUpdate {
                        phone_number: (!phone.is_empty()).then_some(phone),
                        last_seen: Some(timestamp_now()),
                        ..ConnectionUpdate::status(ConnectionStatus::Connected)
                    };
                    if !self.persist(update).await {
                        return AttemptEnd::Removed;
                    }
                    self.lease.set_handle(Some(Arc::clone(handle)));
                }
                ProtocolEvent::Close { status_code } => {
                    self.lease.set_handle(None);
                    if is_logout_status(status_code) {
                        info!(channel_id = %self.channel_id, ?status_code, "account logged out");
                        if !self
                            .persist(ConnectionUpdate::status(ConnectionStatus::Disconnected))
                            .await
                        {
                            return AttemptEnd::Removed;
                        }
                        return AttemptEnd::LoggedOut;
                    }
                    info!(channel_id = %self.channel_id, ?status_code, "connection closed, will reconnect");
                    return AttemptEnd::Dropped;
                }
                ProtocolEvent::Message(event) => self.on_message(handle, event).await,
            }
        }
    }

    /// Requests a pairing code once per attempt. Returns early exits only.
    async fn request_pairing(
        &mut self,
        handle: &dyn ProtocolHandle,
        phone: &str,
        cancel: &CancellationToken,
    ) -> Option<AttemptEnd> {
        if self.pairing_requested {
            return None;
        }
        self.pairing_requested = true;

        tokio::select! {
            _ = cancel.cancelled() => return Some(AttemptEnd::Cancelled),
            _ = tokio::time::sleep(self.ctx.timing.pairing_delay) => {}
        }

        let update = match handle.request_pairing_code(phone).await {
            Ok(code) => {
                let code = format_pairing_code(&code);
                info!(channel_id = %self.channel_id, "pairing code ready");
                ConnectionUpdate {
                    pairing_code: Some(code),
                    ..ConnectionUpdate::status(ConnectionStatus::PairingReady)
                }
            }
            Err(e) => {
                warn!(channel_id = %self.channel_id, error = %e, "pairing code request failed");
                self.pairing_requested = false;
                ConnectionUpdate::status(ConnectionStatus::Error)
            }
        };
        if !self.persist(update).await {
            return Some(AttemptEnd::Removed);
        }
        None
    }

    /// Records an inbound message and dispatches it to its handler.
    async fn on_message(&self, handle: &Arc<dyn ProtocolHandle>, event: InboundEvent) {
        let decision = classify(&event);
        let phone = match decision.phone() {
            Some(phone) => phone.to_string(),
            None => {
                debug!(channel_id = %self.channel_id, message_id = %event.message_id, ?decision, "inbound event dropped");
                return;
            }
        };

        let is_media = matches!(decision, RouteDecision::Media { .. });
        let record = Message::inbound(
            &self.channel_id,
            &phone,
            recorded_text(&event),
            is_media,
            &event.message_id,
        );
        match self.ctx.storage.insert_message(&record).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(channel_id = %self.channel_id, message_id = %event.message_id, "re-delivered message ignored");
                return;
            }
            Err(e) => {
                warn!(channel_id = %self.channel_id, message_id = %event.message_id, error = %e, "failed to record inbound message");
            }
        }

        let ctx = Arc::clone(&self.ctx);
        let handle = Arc::clone(handle);
        let channel_id = self.channel_id.clone();
        let representative_name = self.representative_name.clone();

        self.tracker.spawn(async move {
            let result = match decision {
                RouteDecision::Text { phone, text } => {
                    let turn = Turn {
                        connection_id: &channel_id,
                        representative_name: &representative_name,
                        phone: &phone,
                        text: &text,
                    };
                    ctx.conversation
                        .handle_text(handle.as_ref(), &turn)
                        .await
                        .map(|_| ())
                }
                RouteDecision::Media { phone, attachment, .. } => {
                    let input = ReceiptInput {
                        connection_id: &channel_id,
                        phone: &phone,
                        event: &event,
                        attachment: &attachment,
                    };
                    ctx.receipts
                        .process(handle.as_ref(), &input)
                        .await
                        .map(|_| ())
                }
                RouteDecision::Drop(_) => Ok(()),
            };
            if let Err(e) = result {
                warn!(channel_id = %channel_id, error = %e, "inbound message handling failed");
            }
        });
    }

    /// Shuts down the protocol side of an attempt.
    async fn close_attempt(&self, handle: &dyn ProtocolHandle, end: &AttemptEnd) {
        let logout = match end {
            AttemptEnd::Cancelled => self.lease.purge_requested(),
            AttemptEnd::Removed => true,
            AttemptEnd::LoggedOut | AttemptEnd::Dropped => false,
        };
        if logout && let Err(e) = handle.logout().await {
            debug!(channel_id = %self.channel_id, error = %e, "logout failed");
        }
        handle.close().await;
    }

    /// Waits out the reconnect backoff. Returns `false` when cancelled.
    async fn backoff(&mut self, cancel: &CancellationToken) -> bool {
        self.pairing_requested = false;
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.ctx.timing.reconnect_backoff) => true,
        }
    }

    /// Writes a transition. Returns `false` only when the row is gone.
    async fn persist(&self, update: ConnectionUpdate) -> bool {
        let status = update.status;
        match self
            .ctx
            .storage
            .update_connection_state(&self.channel_id, &update)
            .await
        {
            Ok(()) => {
                debug!(channel_id = %self.channel_id, %status, "connection state persisted");
                true
            }
            Err(PaydeskError::NotFound { .. }) => {
                info!(channel_id = %self.channel_id, "connection row removed, stopping session");
                false
            }
            Err(e) => {
                warn!(channel_id = %self.channel_id, %status, error = %e, "failed to persist connection state");
                true
            }
        }
    }
}
