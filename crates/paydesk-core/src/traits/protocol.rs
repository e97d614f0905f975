// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat-network protocol capability.
//!
//! A [`ProtocolConnector`] establishes one session per channel and hands back
//! a [`ProtocolHandle`] for outbound calls plus a receiver of
//! [`ProtocolEvent`]s. The channel session drives its state machine from
//! that receiver.

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::PaydeskError;
use crate::traits::adapter::PluginAdapter;

/// Close status the network uses for an explicit logout.
pub const LOGGED_OUT_STATUS: u16 = 401;

/// Whether a close status ends the session for good.
pub fn is_logout_status(status_code: Option<u16>) -> bool {
    status_code == Some(LOGGED_OUT_STATUS)
}

/// Kind of attachment carried by an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Document,
}

/// Attachment metadata. Bytes are fetched separately through the handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

/// An inbound message event as delivered by the protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub message_id: String,
    /// Raw network address, e.g. `905551234567:12@s.whatsapp.net`.
    pub remote_address: String,
    #[serde(default)]
    pub from_self: bool,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub extended_text: Option<String>,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    /// Opaque payload the protocol needs to fetch attachment bytes.
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Events emitted by an established protocol session.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    /// Handshake in progress.
    Connecting,
    /// A scannable pairing token.
    Qr { payload: String },
    /// The session is open; `own_id` is our own network address.
    Open { own_id: String },
    /// The session closed.
    Close { status_code: Option<u16> },
    /// An inbound message.
    Message(InboundEvent),
}

/// Everything the protocol needs to bring a session up.
#[derive(Debug, Clone)]
pub struct EstablishRequest {
    pub channel_id: String,
    pub auth_dir: PathBuf,
    /// Set when the session should use the pairing-code flow.
    pub pairing_phone: Option<String>,
}

/// A running protocol session.
pub struct Established {
    pub handle: Arc<dyn ProtocolHandle>,
    pub events: mpsc::Receiver<ProtocolEvent>,
}

/// Attachment bytes delivered in chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, PaydeskError>> + Send>>;

/// Opens protocol sessions.
#[async_trait]
pub trait ProtocolConnector: PluginAdapter {
    /// Starts a session using the given authentication state.
    async fn establish(&self, request: EstablishRequest) -> Result<Established, PaydeskError>;
}

/// Outbound operations on one live session. Addresses are bare phone digits.
#[async_trait]
pub trait ProtocolHandle: Send + Sync + 'static {
    /// Sends a text message and returns the protocol-native id, if any.
    async fn send_text(&self, phone: &str, text: &str) -> Result<Option<String>, PaydeskError>;

    /// Shows the composing indicator to the counterpart.
    async fn send_composing(&self, phone: &str) -> Result<(), PaydeskError>;

    /// Downloads attachment bytes in one response.
    async fn download_buffered(&self, event: &InboundEvent) -> Result<Vec<u8>, PaydeskError>;

    /// Downloads attachment bytes as a chunk stream.
    async fn download_streamed(&self, event: &InboundEvent) -> Result<ByteStream, PaydeskError>;

    /// Requests a numeric pairing code for the given phone digits.
    async fn request_pairing_code(&self, phone: &str) -> Result<String, PaydeskError>;

    /// Logs the account out of the network.
    async fn logout(&self) -> Result<(), PaydeskError>;

    /// Closes the session without logging out.
    async fn close(&self);
}
