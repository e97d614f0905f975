// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON frames exchanged with the protocol sidecar.
//!
//! Every frame is a JSON object tagged by `type`. Commands flow from the
//! worker to the sidecar; events and results flow back on the same socket.

use std::path::PathBuf;

use base64::Engine;
use paydesk_core::{InboundEvent, PaydeskError, ProtocolEvent};
use serde::{Deserialize, Serialize};

/// Worker -> sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Opens the channel's network session from its auth directory.
    Start {
        channel_id: String,
        auth_dir: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pairing_phone: Option<String>,
    },
    SendText {
        request_id: String,
        to: String,
        text: String,
    },
    Composing {
        request_id: String,
        to: String,
    },
    Download {
        request_id: String,
        mode: DownloadMode,
        message: serde_json::Value,
    },
    RequestPairingCode {
        request_id: String,
        phone: String,
    },
    Logout {
        request_id: String,
    },
    /// Ends the session without logging out.
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadMode {
    /// Whole payload in one `result` frame.
    Buffered,
    /// `media_chunk` frames followed by `media_end`.
    Streamed,
}

/// Sidecar -> worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Connecting,
    Qr {
        payload: String,
    },
    Open {
        own_id: String,
    },
    Close {
        #[serde(default)]
        status_code: Option<u16>,
    },
    Message {
        event: InboundEvent,
    },
    Result(RequestResult),
    MediaChunk {
        request_id: String,
        data: String,
    },
    MediaEnd {
        request_id: String,
    },
}

impl Frame {
    /// Lifecycle and message frames map onto protocol events.
    pub fn into_event(self) -> Option<ProtocolEvent> {
        match self {
            Frame::Connecting => Some(ProtocolEvent::Connecting),
            Frame::Qr { payload } => Some(ProtocolEvent::Qr { payload }),
            Frame::Open { own_id } => Some(ProtocolEvent::Open { own_id }),
            Frame::Close { status_code } => Some(ProtocolEvent::Close { status_code }),
            Frame::Message { event } => Some(ProtocolEvent::Message(event)),
            Frame::Result(_) | Frame::MediaChunk { .. } | Frame::MediaEnd { .. } => None,
        }
    }
}

/// Reply to a command carrying a `request_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestResult {
    pub request_id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairing_code: Option<String>,
    /// Base64 payload for buffered downloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RequestResult {
    /// Turns a failed result into a protocol error.
    pub fn into_ok(self) -> Result<Self, PaydeskError> {
        if self.ok {
            Ok(self)
        } else {
            Err(PaydeskError::protocol(
                self.error
                    .unwrap_or_else(|| "sidecar request failed".to_string()),
            ))
        }
    }
}

pub fn decode_base64(data: &str) -> Result<Vec<u8>, PaydeskError> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| PaydeskError::Protocol {
            message: format!("invalid base64 payload: {e}"),
            source: Some(Box::new(e)),
        })
}
