// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp protocol adapter for Paydesk.
//!
//! The network session itself runs in a sidecar process. This crate speaks
//! to it over one WebSocket per channel using JSON frames (see [`frames`])
//! and exposes the session through [`ProtocolConnector`] and
//! [`ProtocolHandle`](paydesk_core::ProtocolHandle).

pub mod bridge;
pub mod frames;

use std::time::Duration;

use async_trait::async_trait;
use paydesk_config::model::BridgeConfig;
use paydesk_core::{
    AdapterType, EstablishRequest, Established, HealthStatus, PaydeskError, PluginAdapter,
    ProtocolConnector,
};
use tracing::{debug, info};

use crate::bridge::{SidecarHandle, connect_with_retry};
use crate::frames::Command;

/// Opens channel sessions through the protocol sidecar.
pub struct SidecarConnector {
    config: BridgeConfig,
}

impl SidecarConnector {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PluginAdapter for SidecarConnector {
    fn name(&self) -> &str {
        "whatsapp-sidecar"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Protocol
    }

    async fn health_check(&self) -> Result<HealthStatus, PaydeskError> {
        match connect_with_retry(&self.config.url, 1).await {
            Ok(mut socket) => {
                let _ = socket.close(None).await;
                Ok(HealthStatus::Healthy)
            }
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), PaydeskError> {
        debug!("sidecar connector shutting down");
        Ok(())
    }
}

#[async_trait]
impl ProtocolConnector for SidecarConnector {
    async fn establish(&self, request: EstablishRequest) -> Result<Established, PaydeskError> {
        let socket = connect_with_retry(&self.config.url, self.config.connect_retries).await?;
        let (handle, events) = SidecarHandle::spawn(
            request.channel_id.clone(),
            socket,
            Duration::from_secs(self.config.request_timeout_secs),
        );

        handle.send_command(&Command::Start {
            channel_id: request.channel_id.clone(),
            auth_dir: request.auth_dir,
            pairing_phone: request.pairing_phone,
        })?;

        info!(channel_id = %request.channel_id, "protocol session started");
        Ok(Established { handle, events })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::Frame;
    use futures::{SinkExt, StreamExt};
    use paydesk_core::{InboundEvent, ProtocolEvent};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    /// Spawns a scripted sidecar that answers commands the way the real one does.
    async fn fake_sidecar() -> (String, tokio::sync::mpsc::UnboundedReceiver<Command>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, seen_rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                let WsMessage::Text(text) = msg else { continue };
                let cmd: Command = serde_json::from_str(text.as_str()).unwrap();
                let _ = seen_tx.send(cmd.clone());
                let replies: Vec<serde_json::Value> = match cmd {
                    Command::Start { .. } => vec![
                        serde_json::json!({"type": "connecting"}),
                        serde_json::json!({"type": "qr", "payload": "2@abc"}),
                    ],
                    Command::SendText { request_id, .. } => vec![serde_json::json!({
                        "type": "result", "request_id": request_id, "ok": true, "message_id": "WAID1"
                    })],
                    Command::RequestPairingCode { request_id, .. } => vec![serde_json::json!({
                        "type": "result", "request_id": request_id, "ok": true, "pairing_code": "ABCD1234"
                    })],
                    Command::Download { request_id, mode: frames::DownloadMode::Buffered, .. } => {
                        vec![serde_json::json!({
                            "type": "result", "request_id": request_id, "ok": true, "data": "aGVsbG8="
                        })]
                    }
                    Command::Download { request_id, .. } => vec![
                        serde_json::json!({"type": "media_chunk", "request_id": request_id, "data": "aGVs"}),
                        serde_json::json!({"type": "media_chunk", "request_id": request_id, "data": "bG8="}),
                        serde_json::json!({"type": "media_end", "request_id": request_id}),
                    ],
                    Command::Logout { request_id } => vec![
                        serde_json::json!({"type": "result", "request_id": request_id, "ok": true}),
                        serde_json::json!({"type": "close", "status_code": 401}),
                    ],
                    Command::Composing { request_id, .. } => vec![serde_json::json!({
                        "type": "result", "request_id": request_id, "ok": false, "error": "offline"
                    })],
                    Command::Close => break,
                };
                for reply in replies {
                    ws.send(WsMessage::Text(reply.to_string().into())).await.unwrap();
                }
            }
        });

        (format!("ws://{addr}"), seen_rx)
    }

    fn connector(url: String) -> SidecarConnector {
        SidecarConnector::new(BridgeConfig {
            url,
            connect_retries: 3,
            request_timeout_secs: 5,
        })
    }

    fn request() -> EstablishRequest {
        EstablishRequest {
            channel_id: "chan-1".into(),
            auth_dir: "/tmp/paydesk-auth/chan-1".into(),
            pairing_phone: None,
        }
    }

    fn media_event() -> InboundEvent {
        InboundEvent {
            message_id: "M1".into(),
            remote_address: "905551112233@s.whatsapp.net".into(),
            from_self: false,
            text: None,
            extended_text: None,
            attachment: None,
            raw: serde_json::json!({"key": "M1"}),
        }
    }

    #[tokio::test]
    async fn establish_sends_start_and_forwards_lifecycle() {
        let (url, mut seen) = fake_sidecar().await;
        let Established { handle: _handle, mut events } =
            connector(url).establish(request()).await.unwrap();

        assert!(matches!(seen.recv().await, Some(Command::Start { .. })));
        assert_eq!(events.recv().await, Some(ProtocolEvent::Connecting));
        assert_eq!(
            events.recv().await,
            Some(ProtocolEvent::Qr { payload: "2@abc".into() })
        );
    }

    #[tokio::test]
    async fn request_response_round_trip() {
        let (url, _seen) = fake_sidecar().await;
        let est = connector(url).establish(request()).await.unwrap();

        let id = est.handle.send_text("905551112233", "merhaba").await.unwrap();
        assert_eq!(id.as_deref(), Some("WAID1"));

        let code = est.handle.request_pairing_code("905551112233").await.unwrap();
        assert_eq!(code, "ABCD1234");

        let err = est.handle.send_composing("905551112233").await.unwrap_err();
        assert!(err.to_string().contains("offline"));
    }

    #[tokio::test]
    async fn downloads_buffered_and_streamed() {
        let (url, _seen) = fake_sidecar().await;
        let est = connector(url).establish(request()).await.unwrap();

        let bytes = est.handle.download_buffered(&media_event()).await.unwrap();
        assert_eq!(bytes, b"hello");

        let mut stream = est.handle.download_streamed(&media_event()).await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend(chunk.unwrap());
        }
        assert_eq!(collected, b"hello");
    }

    #[tokio::test]
    async fn logout_surfaces_logged_out_close() {
        let (url, _seen) = fake_sidecar().await;
        let Established { handle, mut events } =
            connector(url).establish(request()).await.unwrap();

        handle.logout().await.unwrap();
        loop {
            match events.recv().await {
                Some(ProtocolEvent::Close { status_code }) => {
                    assert_eq!(status_code, Some(401));
                    break;
                }
                Some(_) => continue,
                None => panic!("event stream ended without close"),
            }
        }
    }

    #[tokio::test]
    async fn unreachable_sidecar_is_protocol_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = SidecarConnector::new(BridgeConfig {
            url: format!("ws://{addr}"),
            connect_retries: 1,
            request_timeout_secs: 1,
        })
        .establish(request())
        .await
        .err()
        .unwrap();
        assert!(matches!(err, PaydeskError::Protocol { .. }));
    }

    #[test]
    fn frame_enum_is_exhaustive_for_events() {
        assert!(Frame::MediaEnd { request_id: "x".into() }.into_event().is_none());
    }
}
