// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound routing, replies, receipts and operator relay through a live worker.

mod common;

use std::time::Duration;

use common::{CUSTOMER, RunningWorker, connection, image_event, text_event, wait_for};
use paydesk_agent::relay::RelayOutcome;
use paydesk_core::{
    ChannelConnection, ConnectionStatus, Message, ProtocolEvent, ReceiptExtraction,
    StorageAdapter,
};
use paydesk_test_utils::{MockSession, TestHarness};

/// Starts a worker with one connected channel.
async fn connected(h: &TestHarness) -> (RunningWorker, ChannelConnection, MockSession) {
    let conn = h.add_connection("Line 1", None).await.unwrap();
    let running = RunningWorker::start(h);
    let session = h.connector.next_session().await.unwrap();
    session
        .emit(ProtocolEvent::Open {
            own_id: "905550000000:3@s.whatsapp.net".into(),
        })
        .await;
    let id = conn.id.as_str();
    wait_for("CONNECTED", || async move {
        connection(h, id).await.status == ConnectionStatus::Connected
    })
    .await;
    (running, conn, session)
}

async fn sent_count(session: &MockSession) -> usize {
    session.handle.sent().await.len()
}

#[tokio::test]
async fn deposit_intent_discloses_allocated_account_once() {
    let h = TestHarness::builder()
        .with_replies(vec!["Tabii, hemen yardımcı olayım.".into()])
        .with_config(|c| c.allocation.persist_sticky = true)
        .build()
        .await
        .unwrap();
    let destination = h.add_destination("Ziraat", 10_000.0, 5).await.unwrap();
    let (running, conn, session) = connected(&h).await;

    session
        .emit(ProtocolEvent::Message(text_event(
            "WA-D1",
            CUSTOMER,
            "Merhaba, para yatırmak istiyorum",
        )))
        .await;
    let s = &session;
    wait_for("reply", || async move { sent_count(s).await == 1 }).await;

    let sent = session.handle.sent().await;
    assert_eq!(sent[0].0, CUSTOMER);
    assert!(sent[0].1.starts_with("Tabii, hemen yardımcı olayım"));
    assert!(sent[0].1.contains(&destination.account_number));

    let messages = h
        .storage
        .list_messages(&conn.id, Some(CUSTOMER), 50)
        .await
        .unwrap();
    let outbound: Vec<&Message> = messages.iter().filter(|m| m.from_self).collect();
    assert_eq!(outbound.len(), 1);
    assert!(
        outbound[0]
            .text
            .as_deref()
            .unwrap()
            .contains(&destination.account_number)
    );
    assert_eq!(outbound[0].protocol_message_id.as_deref(), Some("MOCK1"));

    assert_eq!(
        h.storage.get_sticky_allocation(CUSTOMER).await.unwrap(),
        Some(destination.id.clone())
    );
    let prompt = &h.inference.prompts().await[0];
    assert!(prompt.contains("Deniz"));
    assert!(prompt.contains(&destination.account_number));

    running.stop().await;
}

#[tokio::test]
async fn redelivered_message_is_recorded_and_answered_once() {
    let h = TestHarness::new().await.unwrap();
    let (running, conn, session) = connected(&h).await;

    let event = text_event("WA-DUP", CUSTOMER, "Merhaba");
    session.emit(ProtocolEvent::Message(event.clone())).await;
    session.emit(ProtocolEvent::Message(event)).await;

    let s = &session;
    wait_for("reply", || async move { sent_count(s).await == 1 }).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(sent_count(&session).await, 1);
    assert_eq!(h.inference.prompts().await.len(), 1);
    let inbound: Vec<Message> = h
        .storage
        .list_messages(&conn.id, Some(CUSTOMER), 50)
        .await
        .unwrap()
        .into_iter()
        .filter(|m| !m.from_self)
        .collect();
    assert_eq!(inbound.len(), 1);
    assert_eq!(inbound[0].text.as_deref(), Some("Merhaba"));

    running.stop().await;
}

#[tokio::test]
async fn group_broadcast_and_echo_events_are_ignored() {
    let h = TestHarness::new().await.unwrap();
    let (running, conn, session) = connected(&h).await;

    let mut group = text_event("WA-G", CUSTOMER, "selam");
    group.remote_address = "120363025@g.us".into();
    let mut broadcast = text_event("WA-B", CUSTOMER, "selam");
    broadcast.remote_address = "status@broadcast".into();
    let mut echo = text_event("WA-E", CUSTOMER, "selam");
    echo.from_self = true;
    let short = text_event("WA-S", "12345", "selam");

    for event in [group, broadcast, echo, short] {
        session.emit(ProtocolEvent::Message(event)).await;
    }
    session
        .emit(ProtocolEvent::Message(text_event("WA-OK", CUSTOMER, "selam")))
        .await;

    let s = &session;
    wait_for("reply", || async move { sent_count(s).await == 1 }).await;
    let all = h.storage.list_messages(&conn.id, None, 50).await.unwrap();
    let inbound: Vec<&Message> = all.iter().filter(|m| !m.from_self).collect();
    assert_eq!(inbound.len(), 1);
    assert_eq!(inbound[0].protocol_message_id.as_deref(), Some("WA-OK"));

    running.stop().await;
}

#[tokio::test]
async fn media_message_becomes_pending_transaction() {
    let h = TestHarness::new().await.unwrap();
    h.inference
        .add_extraction(ReceiptExtraction {
            is_receipt: true,
            amount: 2500.0,
            sender_name: Some("Mehmet Kaya".into()),
            bank_name: Some("Akbank".into()),
            details: None,
        })
        .await;
    let (running, conn, session) = connected(&h).await;

    session
        .emit(ProtocolEvent::Message(image_event("WA-IMG", CUSTOMER)))
        .await;
    let s = &session;
    wait_for("receipt ack", || async move { sent_count(s).await == 1 }).await;

    assert!(session.handle.sent_texts().await[0].contains("2.500,00"));
    let txs = h.storage.list_transactions(None).await.unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].connection_id, conn.id);
    assert_eq!(txs[0].amount, 2500.0);

    let inbound = h
        .storage
        .list_messages(&conn.id, Some(CUSTOMER), 10)
        .await
        .unwrap();
    assert!(inbound.iter().any(|m| m.is_media && m.text.as_deref() == Some("dekont")));
    assert_eq!(h.objects.keys().await.len(), 1);

    running.stop().await;
}

#[tokio::test]
async fn operator_message_is_relayed_and_marked_delivered() {
    let h = TestHarness::new().await.unwrap();
    let (running, conn, session) = connected(&h).await;

    let pending = Message::operator_pending(&conn.id, CUSTOMER, "Ödemeniz onaylandı.");
    h.storage.insert_message(&pending).await.unwrap();

    let s = &session;
    wait_for("relay", || async move { sent_count(s).await == 1 }).await;
    assert_eq!(
        session.handle.sent().await,
        vec![(CUSTOMER.to_string(), "Ödemeniz onaylandı.".to_string())]
    );
    assert_eq!(session.handle.composing_calls().await, vec![CUSTOMER]);

    let hr = &h;
    wait_for("delivered flag", || async move {
        hr.storage.list_pending_outbound().await.unwrap().is_empty()
    })
    .await;

    running.stop().await;
}

#[tokio::test]
async fn stale_pending_snapshot_is_not_sent_twice() {
    let h = TestHarness::new().await.unwrap();
    let (running, conn, session) = connected(&h).await;

    let pending = Message::operator_pending(&conn.id, CUSTOMER, "Hesabınıza yansıdı.");
    h.storage.insert_message(&pending).await.unwrap();
    let snapshot = h.storage.list_pending_outbound().await.unwrap();
    assert_eq!(snapshot.len(), 1);

    let hr = &h;
    wait_for("delivered flag", || async move {
        hr.storage.list_pending_outbound().await.unwrap().is_empty()
    })
    .await;

    let outcome = running.worker.relay().relay(&snapshot[0]).await;
    assert_eq!(outcome, RelayOutcome::Skipped);
    assert_eq!(running.worker.relay().process_pending().await.unwrap(), 0);
    assert_eq!(sent_count(&session).await, 1);

    running.stop().await;
}

#[tokio::test]
async fn relay_leaves_invalid_targets_pending() {
    let h = TestHarness::new().await.unwrap();
    let (running, conn, session) = connected(&h).await;

    let pending = Message::operator_pending(&conn.id, "5551234", "hi");
    h.storage.insert_message(&pending).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(sent_count(&session).await, 0);
    let still = h.storage.list_pending_outbound().await.unwrap();
    assert_eq!(still.len(), 1);
    assert_eq!(still[0].id, pending.id);

    running.stop().await;
}

#[tokio::test]
async fn relay_waits_for_a_live_session() {
    let h = TestHarness::new().await.unwrap();
    let conn = h.add_connection("Line 1", None).await.unwrap();
    let running = RunningWorker::start(&h);
    let session = h.connector.next_session().await.unwrap();

    let pending = Message::operator_pending(&conn.id, CUSTOMER, "Merhaba");
    h.storage.insert_message(&pending).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.storage.list_pending_outbound().await.unwrap().len(), 1);

    session
        .emit(ProtocolEvent::Open {
            own_id: "905550000000@s.whatsapp.net".into(),
        })
        .await;
    // Picked up by the next reconcile rescan.
    let s = &session;
    wait_for("relay after connect", || async move { sent_count(s).await == 1 }).await;

    running.stop().await;
}

#[tokio::test]
async fn failed_generation_falls_back_to_greeting() {
    let h = TestHarness::new().await.unwrap();
    h.inference.add_reply_error("quota exceeded").await;
    let (running, _conn, session) = connected(&h).await;

    session
        .emit(ProtocolEvent::Message(text_event("WA-F", CUSTOMER, "naber")))
        .await;
    let s = &session;
    wait_for("reply", || async move { sent_count(s).await == 1 }).await;
    assert_eq!(
        session.handle.sent_texts().await,
        vec![h.config.conversation.greeting.clone()]
    );

    running.stop().await;
}
