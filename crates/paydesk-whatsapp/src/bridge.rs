// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket plumbing for one sidecar session.
//!
//! A session owns one socket. A writer task drains outbound command frames;
//! a reader task routes results to waiting requests, media chunks to open
//! download streams, and everything else to the session's event channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use paydesk_core::{ByteStream, InboundEvent, PaydeskError, ProtocolEvent, ProtocolHandle};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::frames::{Command, DownloadMode, Frame, RequestResult, decode_base64};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Buffer for protocol events not yet consumed by the session.
const EVENT_BUFFER: usize = 64;
/// Buffer for media chunks per streamed download.
const CHUNK_BUFFER: usize = 16;
/// Delay between sidecar connection attempts.
const RETRY_DELAY: Duration = Duration::from_millis(500);

type PendingMap = Arc<DashMap<String, oneshot::Sender<RequestResult>>>;
type StreamMap = Arc<DashMap<String, mpsc::Sender<Result<Vec<u8>, PaydeskError>>>>;

/// Connects to the sidecar, retrying while it starts up.
pub async fn connect_with_retry(url: &str, attempts: u32) -> Result<WsStream, PaydeskError> {
    let attempts = attempts.max(1);
    let mut last_error = None;
    for attempt in 1..=attempts {
        match connect_async(url).await {
            Ok((stream, _response)) => {
                debug!(url, attempt, "connected to protocol sidecar");
                return Ok(stream);
            }
            Err(e) => {
                debug!(url, attempt, error = %e, "sidecar connection attempt failed");
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }
    Err(PaydeskError::Protocol {
        message: format!("could not reach protocol sidecar at {url} after {attempts} attempts"),
        source: last_error.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
    })
}

/// Handle to a live sidecar session.
pub struct SidecarHandle {
    channel_id: String,
    outbound: mpsc::UnboundedSender<String>,
    pending: PendingMap,
    streams: StreamMap,
    request_timeout: Duration,
    cancel: CancellationToken,
}

impl SidecarHandle {
    /// Splits the socket into reader and writer tasks.
    pub fn spawn(
        channel_id: String,
        socket: WsStream,
        request_timeout: Duration,
    ) -> (Arc<Self>, mpsc::Receiver<ProtocolEvent>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let pending: PendingMap = Arc::new(DashMap::new());
        let streams: StreamMap = Arc::new(DashMap::new());
        let cancel = CancellationToken::new();

        let (sink, reader) = socket.split();
        tokio::spawn(write_loop(sink, outbound_rx, cancel.clone()));
        tokio::spawn(read_loop(
            channel_id.clone(),
            reader,
            events_tx,
            Arc::clone(&pending),
            Arc::clone(&streams),
            cancel.clone(),
        ));

        let handle = Arc::new(Self {
            channel_id,
            outbound,
            pending,
            streams,
            request_timeout,
            cancel,
        });
        (handle, events_rx)
    }

    /// Queues a command frame for the writer task.
    pub fn send_command(&self, command: &Command) -> Result<(), PaydeskError> {
        let json = serde_json::to_string(command).map_err(|e| PaydeskError::Protocol {
            message: format!("failed to encode sidecar command: {e}"),
            source: Some(Box::new(e)),
        })?;
        self.outbound
            .send(json)
            .map_err(|_| PaydeskError::protocol("sidecar connection closed"))
    }

    /// Sends a command and waits for its `result` frame.
    async fn request(
        &self,
        build: impl FnOnce(String) -> Command,
    ) -> Result<RequestResult, PaydeskError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id.clone(), tx);

        if let Err(e) = self.send_command(&build(request_id.clone())) {
            self.pending.remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result.into_ok(),
            Ok(Err(_)) => Err(PaydeskError::protocol("sidecar connection closed")),
            Err(_) => {
                self.pending.remove(&request_id);
                Err(PaydeskError::Timeout {
                    duration: self.request_timeout,
                })
            }
        }
    }
}

#[async_trait]
impl ProtocolHandle for SidecarHandle {
    async fn send_text(&self, phone: &str, text: &str) -> Result<Option<String>, PaydeskError> {
        let result = self
            .request(|request_id| Command::SendText {
                request_id,
                to: phone.to_string(),
                text: text.to_string(),
            })
            .await?;
        Ok(result.message_id)
    }

    async fn send_composing(&self, phone: &str) -> Result<(), PaydeskError> {
        self.request(|request_id| Command::Composing {
            request_id,
            to: phone.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn download_buffered(&self, event: &InboundEvent) -> Result<Vec<u8>, PaydeskError> {
        let result = self
            .request(|request_id| Command::Download {
                request_id,
                mode: DownloadMode::Buffered,
                message: event.raw.clone(),
            })
            .await?;
        match result.data {
            Some(data) => decode_base64(&data),
            None => Ok(Vec::new()),
        }
    }

    async fn download_streamed(&self, event: &InboundEvent) -> Result<ByteStream, PaydeskError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(CHUNK_BUFFER);
        self.streams.insert(request_id.clone(), tx);

        let command = Command::Download {
            request_id: request_id.clone(),
            mode: DownloadMode::Streamed,
            message: event.raw.clone(),
        };
        if let Err(e) = self.send_command(&command) {
            self.streams.remove(&request_id);
            return Err(e);
        }

        Ok(chunk_stream(
            rx,
            self.request_timeout,
            Arc::clone(&self.streams),
            request_id,
        ))
    }

    async fn request_pairing_code(&self, phone: &str) -> Result<String, PaydeskError> {
        let result = self
            .request(|request_id| Command::RequestPairingCode {
                request_id,
                phone: phone.to_string(),
            })
            .await?;
        result
            .pairing_code
            .filter(|code| !code.is_empty())
            .ok_or_else(|| PaydeskError::protocol("sidecar returned no pairing code"))
    }

    async fn logout(&self) -> Result<(), PaydeskError> {
        info!(channel_id = %self.channel_id, "logging out protocol session");
        self.request(|request_id| Command::Logout { request_id }).await?;
        Ok(())
    }

    async fn close(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        // The writer flushes queued frames before it stops.
        let _ = self.send_command(&Command::Close);
        self.cancel.cancel();
        debug!(channel_id = %self.channel_id, "sidecar session closed");
    }
}

/// Media chunks for one download. A stalled download yields one timeout
/// error, ends, and gives up its routing entry.
fn chunk_stream(
    rx: mpsc::Receiver<Result<Vec<u8>, PaydeskError>>,
    timeout: Duration,
    streams: StreamMap,
    request_id: String,
) -> ByteStream {
    let stream = futures::stream::unfold(Some(rx), move |state| {
        let streams = Arc::clone(&streams);
        let request_id = request_id.clone();
        async move {
            let mut rx = state?;
            match tokio::time::timeout(timeout, rx.recv()).await {
                Ok(Some(item)) => Some((item, Some(rx))),
                Ok(None) => None,
                Err(_) => {
                    streams.remove(&request_id);
                    warn!(request_id = %request_id, "media download timed out");
                    Some((Err(PaydeskError::Timeout { duration: timeout }), None))
                }
            }
        }
    });
    Box::pin(stream)
}

impl Drop for SidecarHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn write_loop(
    mut sink: futures::stream::SplitSink<WsStream, WsMessage>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                while let Ok(frame) = outbound.try_recv() {
                    if sink.send(WsMessage::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                break;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = sink.send(WsMessage::Text(frame.into())).await {
                    warn!(error = %e, "failed to write sidecar frame");
                    break;
                }
            }
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(
    channel_id: String,
    mut reader: futures::stream::SplitStream<WsStream>,
    events: mpsc::Sender<ProtocolEvent>,
    pending: PendingMap,
    streams: StreamMap,
    cancel: CancellationToken,
) {
    let mut saw_close = false;
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = reader.next() => message,
        };
        let text = match message {
            Some(Ok(WsMessage::Text(text))) => text.to_string(),
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!(channel_id = %channel_id, error = %e, "sidecar socket error");
                break;
            }
        };

        let frame = match serde_json::from_str::<Frame>(&text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(channel_id = %channel_id, error = %e, "unparseable sidecar frame");
                continue;
            }
        };

        match frame {
            Frame::Result(result) => route_result(result, &pending, &streams).await,
            Frame::MediaChunk { request_id, data } => {
                if let Some(tx) = streams.get(&request_id).map(|entry| entry.value().clone()) {
                    let _ = tx.send(decode_base64(&data)).await;
                }
            }
            Frame::MediaEnd { request_id } => {
                streams.remove(&request_id);
            }
            other => {
                if matches!(other, Frame::Close { .. }) {
                    saw_close = true;
                }
                if let Some(event) = other.into_event()
                    && events.send(event).await.is_err()
                {
                    break;
                }
                if saw_close {
                    break;
                }
            }
        }
    }

    // Waiting requests observe a closed channel; open downloads end.
    pending.clear();
    streams.clear();
    if !saw_close && !cancel.is_cancelled() {
        let _ = events.send(ProtocolEvent::Close { status_code: None }).await;
    }
    debug!(channel_id = %channel_id, "sidecar reader finished");
}

async fn route_result(result: RequestResult, pending: &PendingMap, streams: &StreamMap) {
    if let Some((_, tx)) = pending.remove(&result.request_id) {
        let _ = tx.send(result);
        return;
    }
    // A result for a streamed download only arrives on failure.
    if let Some((_, tx)) = streams.remove(&result.request_id)
        && let Err(e) = result.into_ok()
    {
        let _ = tx.send(Err(e)).await;
    }
}
