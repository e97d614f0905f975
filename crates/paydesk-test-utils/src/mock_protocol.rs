// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock protocol connector.
//!
//! Every `establish` call creates a [`MockSession`]: the test holds the event
//! sender and drives the session's lifecycle, while the [`MockHandle`]
//! records outbound calls.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use paydesk_core::{
    AdapterType, ByteStream, EstablishRequest, Established, HealthStatus, InboundEvent,
    PaydeskError, PluginAdapter, ProtocolConnector, ProtocolEvent, ProtocolHandle,
};
use tokio::sync::{Mutex, mpsc};

/// How a fresh handle responds to outbound calls.
#[derive(Debug, Clone)]
pub struct HandleBehavior {
    /// `None` makes buffered downloads fail.
    pub buffered: Option<Vec<u8>>,
    /// `None` makes streamed downloads fail.
    pub streamed: Option<Vec<Vec<u8>>>,
    /// `None` makes pairing-code requests fail.
    pub pairing_code: Option<String>,
    pub fail_send: bool,
}

impl Default for HandleBehavior {
    fn default() -> Self {
        Self {
            buffered: Some(b"receipt-bytes".to_vec()),
            streamed: Some(vec![b"receipt-".to_vec(), b"bytes".to_vec()]),
            pairing_code: Some("ABCD1234".to_string()),
            fail_send: false,
        }
    }
}

/// Test-side view of one established session.
#[derive(Clone)]
pub struct MockSession {
    pub request: EstablishRequest,
    pub events: mpsc::Sender<ProtocolEvent>,
    pub handle: Arc<MockHandle>,
}

impl MockSession {
    /// Pushes a protocol event into the session.
    pub async fn emit(&self, event: ProtocolEvent) {
        let _ = self.events.send(event).await;
    }
}

/// A [`ProtocolConnector`] that hands every session to the test.
pub struct MockConnector {
    behavior: std::sync::Mutex<HandleBehavior>,
    sessions: Mutex<Vec<MockSession>>,
    established: mpsc::UnboundedSender<MockSession>,
    established_rx: Mutex<mpsc::UnboundedReceiver<MockSession>>,
    failures_remaining: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Self {
        let (established, established_rx) = mpsc::unbounded_channel();
        Self {
            behavior: std::sync::Mutex::new(HandleBehavior::default()),
            sessions: Mutex::new(Vec::new()),
            established,
            established_rx: Mutex::new(established_rx),
            failures_remaining: AtomicUsize::new(0),
        }
    }

    /// Behavior applied to handles created from now on.
    pub fn set_behavior(&self, behavior: HandleBehavior) {
        if let Ok(mut current) = self.behavior.lock() {
            *current = behavior;
        }
    }

    /// Makes the next `n` establish calls fail.
    pub fn fail_next_establish(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Waits for the next established session (up to 5 seconds).
    pub async fn next_session(&self) -> Option<MockSession> {
        let mut rx = self.established_rx.lock().await;
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// All sessions established so far.
    pub async fn sessions(&self) -> Vec<MockSession> {
        self.sessions.lock().await.clone()
    }

    pub async fn establish_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockConnector {
    fn name(&self) -> &str {
        "mock-protocol"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Protocol
    }

    async fn health_check(&self) -> Result<HealthStatus, PaydeskError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PaydeskError> {
        Ok(())
    }
}

#[async_trait]
impl ProtocolConnector for MockConnector {
    async fn establish(&self, request: EstablishRequest) -> Result<Established, PaydeskError> {
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PaydeskError::protocol("mock establish failure"));
        }

        let behavior = self
            .behavior
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default();
        let (events, events_rx) = mpsc::channel(64);
        let handle = Arc::new(MockHandle::new(behavior));
        let session = MockSession {
            request,
            events,
            handle: Arc::clone(&handle),
        };
        self.sessions.lock().await.push(session.clone());
        let _ = self.established.send(session);

        Ok(Established {
            handle,
            events: events_rx,
        })
    }
}

/// Recording [`ProtocolHandle`].
pub struct MockHandle {
    behavior: HandleBehavior,
    sent: Mutex<Vec<(String, String)>>,
    composing: Mutex<Vec<String>>,
    pairing_requests: Mutex<Vec<String>>,
    logouts: AtomicUsize,
    closed: AtomicBool,
    next_id: AtomicUsize,
    send_failures: Mutex<VecDeque<()>>,
}

impl MockHandle {
    pub fn new(behavior: HandleBehavior) -> Self {
        Self {
            behavior,
            sent: Mutex::new(Vec::new()),
            composing: Mutex::new(Vec::new()),
            pairing_requests: Mutex::new(Vec::new()),
            logouts: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            next_id: AtomicUsize::new(1),
            send_failures: Mutex::new(VecDeque::new()),
        }
    }

    /// `(phone, text)` pairs passed to `send_text`.
    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().await.iter().map(|(_, t)| t.clone()).collect()
    }

    pub async fn composing_calls(&self) -> Vec<String> {
        self.composing.lock().await.clone()
    }

    pub async fn pairing_requests(&self) -> Vec<String> {
        self.pairing_requests.lock().await.clone()
    }

    pub fn logout_count(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Makes the next `send_text` call fail once.
    pub async fn fail_next_send(&self) {
        self.send_failures.lock().await.push_back(());
    }
}

#[async_trait]
impl ProtocolHandle for MockHandle {
    async fn send_text(&self, phone: &str, text: &str) -> Result<Option<String>, PaydeskError> {
        if self.behavior.fail_send || self.send_failures.lock().await.pop_front().is_some() {
            return Err(PaydeskError::protocol("mock send failure"));
        }
        self.sent
            .lock()
            .await
            .push((phone.to_string(), text.to_string()));
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(Some(format!("MOCK{n}")))
    }

    async fn send_composing(&self, phone: &str) -> Result<(), PaydeskError> {
        self.composing.lock().await.push(phone.to_string());
        Ok(())
    }

    async fn download_buffered(&self, _event: &InboundEvent) -> Result<Vec<u8>, PaydeskError> {
        self.behavior
            .buffered
            .clone()
            .ok_or_else(|| PaydeskError::protocol("mock buffered download failure"))
    }

    async fn download_streamed(&self, _event: &InboundEvent) -> Result<ByteStream, PaydeskError> {
        let chunks = self
            .behavior
            .streamed
            .clone()
            .ok_or_else(|| PaydeskError::protocol("mock streamed download failure"))?;
        Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))))
    }

    async fn request_pairing_code(&self, phone: &str) -> Result<String, PaydeskError> {
        self.pairing_requests.lock().await.push(phone.to_string());
        self.behavior
            .pairing_code
            .clone()
            .ok_or_else(|| PaydeskError::protocol("mock pairing failure"))
    }

    async fn logout(&self) -> Result<(), PaydeskError> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
