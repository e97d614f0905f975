// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the assembled worker.
//!
//! Each test runs a worker over temp SQLite and the filesystem object store,
//! with the protocol and inference sides mocked. Tests are independent.

use std::sync::Arc;
use std::time::Duration;

use paydesk_agent::{Backends, Worker};
use paydesk_core::{
    Attachment, AttachmentKind, ConnectionStatus, InboundEvent, PaydeskError, ProtocolConnector,
    ProtocolEvent, ReceiptExtraction, StorageAdapter, TransactionStatus,
};
use paydesk_storage::FsObjectStore;
use paydesk_test_utils::{MockSession, TestHarness};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const FIRST: &str = "905551234567";
const SECOND: &str = "905559876543";

fn start(h: &TestHarness) -> (CancellationToken, JoinHandle<Result<(), PaydeskError>>) {
    let backends = Backends {
        storage: h.storage_dyn(),
        connector: Arc::clone(&h.connector) as Arc<dyn ProtocolConnector>,
        inference: Arc::new(h.inference.clone()),
        objects: Arc::new(FsObjectStore::new(&h.config.media)),
    };
    let worker = Worker::new(h.config.clone(), backends);
    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let cancel = cancel.clone();
        async move { worker.run(cancel).await }
    });
    (cancel, task)
}

async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..250 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

fn text(id: &str, from: &str, body: &str) -> InboundEvent {
    InboundEvent {
        message_id: id.to_string(),
        remote_address: format!("{from}@s.whatsapp.net"),
        from_self: false,
        text: Some(body.to_string()),
        extended_text: None,
        attachment: None,
        raw: serde_json::Value::Null,
    }
}

fn receipt_image(id: &str, from: &str) -> InboundEvent {
    InboundEvent {
        message_id: id.to_string(),
        remote_address: format!("{from}@s.whatsapp.net"),
        from_self: false,
        text: None,
        extended_text: None,
        attachment: Some(Attachment {
            kind: AttachmentKind::Image,
            mime_type: Some("image/png".into()),
            file_name: None,
            caption: None,
        }),
        raw: serde_json::Value::Null,
    }
}

async fn open_session(h: &TestHarness, connection_id: &str) -> MockSession {
    let session = h.connector.next_session().await.unwrap();
    session
        .emit(ProtocolEvent::Open {
            own_id: "905550000000:1@s.whatsapp.net".into(),
        })
        .await;
    let storage = &h.storage;
    eventually("connected", || async move {
        storage
            .get_connection(connection_id)
            .await
            .unwrap()
            .is_some_and(|c| c.status == ConnectionStatus::Connected)
    })
    .await;
    session
}

async fn wait_for_transaction(h: &TestHarness) {
    let storage = &h.storage;
    eventually("transaction", || async move {
        !storage.list_transactions(None).await.unwrap().is_empty()
    })
    .await;
}

#[tokio::test]
async fn approved_receipt_moves_next_customer_to_another_destination() {
    let h = TestHarness::new().await.unwrap();
    let full = h.add_destination("Ziraat", 2500.0, 9).await.unwrap();
    let spare = h.add_destination("Garanti", 100_000.0, 1).await.unwrap();
    let conn = h.add_connection("Desk", None).await.unwrap();
    h.inference
        .add_extraction(ReceiptExtraction {
            is_receipt: true,
            amount: 2500.0,
            sender_name: Some("Ayşe Demir".into()),
            bank_name: Some("Ziraat".into()),
            details: None,
        })
        .await;

    let (cancel, task) = start(&h);
    let session = open_session(&h, &conn.id).await;

    session
        .emit(ProtocolEvent::Message(receipt_image("WA-R1", FIRST)))
        .await;
    wait_for_transaction(&h).await;

    let tx = h.storage.list_transactions(None).await.unwrap().remove(0);
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(tx.destination_id.as_deref(), Some(full.id.as_str()));
    let url = tx.receipt_url.clone().unwrap();
    let path = url.strip_prefix("file://").unwrap();
    assert_eq!(std::fs::read(path).unwrap(), b"receipt-bytes");

    let approved = h
        .storage
        .advance_transaction(&tx.id, TransactionStatus::Approved)
        .await
        .unwrap();
    assert_eq!(approved.status, TransactionStatus::Approved);

    session
        .emit(ProtocolEvent::Message(text(
            "WA-T1",
            SECOND,
            "para yatırmak istiyorum",
        )))
        .await;
    let s = &session;
    eventually("deposit reply", || async move {
        s.handle.sent().await.iter().any(|(to, _)| to == SECOND)
    })
    .await;
    let (_, reply) = session
        .handle
        .sent()
        .await
        .into_iter()
        .find(|(to, _)| to == SECOND)
        .unwrap();
    assert!(reply.contains(&spare.account_number));
    assert!(!reply.contains(&full.account_number));

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn crediting_an_approved_transaction_counts_it_once() {
    let h = TestHarness::new().await.unwrap();
    let destination = h.add_destination("Akbank", 0.0, 5).await.unwrap();
    let conn = h.add_connection("Desk", None).await.unwrap();
    h.inference
        .add_extraction(ReceiptExtraction {
            is_receipt: true,
            amount: 750.0,
            sender_name: None,
            bank_name: None,
            details: None,
        })
        .await;

    let (cancel, task) = start(&h);
    let session = open_session(&h, &conn.id).await;
    session
        .emit(ProtocolEvent::Message(receipt_image("WA-R2", FIRST)))
        .await;
    wait_for_transaction(&h).await;
    cancel.cancel();
    task.await.unwrap().unwrap();

    let tx = h.storage.list_transactions(None).await.unwrap().remove(0);
    h.storage
        .advance_transaction(&tx.id, TransactionStatus::Approved)
        .await
        .unwrap();
    h.storage
        .advance_transaction(&tx.id, TransactionStatus::Credited)
        .await
        .unwrap();

    let stored = h
        .storage
        .list_destinations()
        .await
        .unwrap()
        .into_iter()
        .find(|d| d.id == destination.id)
        .unwrap();
    assert_eq!(stored.running_total, 750.0);
    assert_eq!(stored.usage_count, 1);

    let err = h
        .storage
        .advance_transaction(&tx.id, TransactionStatus::Rejected)
        .await
        .unwrap_err();
    assert!(matches!(err, PaydeskError::InvalidTransition { .. }));
}

#[tokio::test]
async fn removed_connection_stops_its_session() {
    let h = TestHarness::new().await.unwrap();
    let conn = h.add_connection("Desk", None).await.unwrap();
    let (cancel, task) = start(&h);
    let session = open_session(&h, &conn.id).await;

    assert!(h.storage.delete_connection(&conn.id).await.unwrap());
    let s = &session;
    eventually("handle closed", || async move { s.handle.is_closed() }).await;
    assert_eq!(session.handle.logout_count(), 1);

    cancel.cancel();
    task.await.unwrap().unwrap();
}
