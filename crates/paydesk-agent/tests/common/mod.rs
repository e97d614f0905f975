// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared setup for worker-level tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use paydesk_agent::{Backends, Worker};
use paydesk_core::{
    Attachment, AttachmentKind, ChannelConnection, InboundEvent, PaydeskError, ProtocolConnector,
    StorageAdapter,
};
use paydesk_test_utils::TestHarness;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const CUSTOMER: &str = "905551234567";

/// A worker running in the background against a harness.
pub struct RunningWorker {
    pub worker: Arc<Worker>,
    pub cancel: CancellationToken,
    pub task: JoinHandle<Result<(), PaydeskError>>,
}

impl RunningWorker {
    pub fn start(h: &TestHarness) -> Self {
        let backends = Backends {
            storage: h.storage_dyn(),
            connector: Arc::clone(&h.connector) as Arc<dyn ProtocolConnector>,
            inference: Arc::new(h.inference.clone()),
            objects: Arc::new(h.objects.clone()),
        };
        let worker = Arc::new(Worker::new(h.config.clone(), backends));
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let worker = Arc::clone(&worker);
            let cancel = cancel.clone();
            async move { worker.run(cancel).await }
        });
        Self {
            worker,
            cancel,
            task,
        }
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        self.task.await.unwrap().unwrap();
    }
}

/// Polls `check` until it holds, failing the test after five seconds.
pub async fn wait_for<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

pub async fn connection(h: &TestHarness, id: &str) -> ChannelConnection {
    h.storage.get_connection(id).await.unwrap().unwrap()
}

pub fn text_event(id: &str, from: &str, text: &str) -> InboundEvent {
    InboundEvent {
        message_id: id.to_string(),
        remote_address: format!("{from}@s.whatsapp.net"),
        from_self: false,
        text: Some(text.to_string()),
        extended_text: None,
        attachment: None,
        raw: serde_json::Value::Null,
    }
}

pub fn image_event(id: &str, from: &str) -> InboundEvent {
    InboundEvent {
        message_id: id.to_string(),
        remote_address: format!("{from}@s.whatsapp.net"),
        from_self: false,
        text: None,
        extended_text: None,
        attachment: Some(Attachment {
            kind: AttachmentKind::Image,
            mime_type: Some("image/jpeg".into()),
            file_name: None,
            caption: Some("dekont".into()),
        }),
        raw: serde_json::Value::Null,
    }
}
