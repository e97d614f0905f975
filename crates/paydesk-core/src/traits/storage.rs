// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for the relational backend and its change feed.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::PaydeskError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    ChangeEvent, ChannelConnection, ConnectionUpdate, EngineSettings, Message,
    MinimalTransaction, PaymentDestination, Transaction, TransactionStatus,
};

/// Adapter for storage and persistence backends.
///
/// Every write that other components react to is also published on the
/// change feed returned by [`StorageAdapter::subscribe`].
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, pragmas).
    async fn initialize(&self) -> Result<(), PaydeskError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), PaydeskError>;

    /// Subscribes to row-level change notifications.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;

    // --- Connections ---

    async fn create_connection(&self, connection: &ChannelConnection)
    -> Result<(), PaydeskError>;

    async fn get_connection(&self, id: &str) -> Result<Option<ChannelConnection>, PaydeskError>;

    async fn list_connections(&self) -> Result<Vec<ChannelConnection>, PaydeskError>;

    /// Deletes the row. Returns `false` if it did not exist.
    async fn delete_connection(&self, id: &str) -> Result<bool, PaydeskError>;

    /// Persists a lifecycle transition.
    async fn update_connection_state(
        &self,
        id: &str,
        update: &ConnectionUpdate,
    ) -> Result<(), PaydeskError>;

    // --- Messages ---

    /// Inserts a message. Returns `false` when the protocol id was already recorded.
    async fn insert_message(&self, message: &Message) -> Result<bool, PaydeskError>;

    /// Most recent messages for a connection, oldest first.
    async fn list_messages(
        &self,
        connection_id: &str,
        counterpart_phone: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Message>, PaydeskError>;

    async fn get_message(&self, id: &str) -> Result<Option<Message>, PaydeskError>;

    /// Operator-composed messages still waiting for delivery.
    async fn list_pending_outbound(&self) -> Result<Vec<Message>, PaydeskError>;

    /// Flips an operator-composed message to delivered.
    async fn mark_delivered(
        &self,
        id: &str,
        protocol_message_id: Option<&str>,
    ) -> Result<(), PaydeskError>;

    // --- Transactions ---

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<(), PaydeskError>;

    async fn insert_minimal_transaction(
        &self,
        transaction: &MinimalTransaction,
    ) -> Result<(), PaydeskError>;

    async fn get_transaction(&self, id: &str) -> Result<Option<Transaction>, PaydeskError>;

    async fn list_transactions(
        &self,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<Transaction>, PaydeskError>;

    /// Moves a transaction forward and returns the updated record.
    ///
    /// Entering APPROVED or CREDITED from PENDING adds the amount to the
    /// allocated destination's running total and bumps its usage counter.
    /// Rejecting an approved transaction reverses both.
    async fn advance_transaction(
        &self,
        id: &str,
        next: TransactionStatus,
    ) -> Result<Transaction, PaydeskError>;

    // --- Payment destinations ---

    async fn list_destinations(&self) -> Result<Vec<PaymentDestination>, PaydeskError>;

    async fn save_destination(&self, destination: &PaymentDestination)
    -> Result<(), PaydeskError>;

    // --- Engine settings ---

    /// Returns the stored settings, or defaults when none were saved.
    async fn get_settings(&self) -> Result<EngineSettings, PaydeskError>;

    async fn save_settings(&self, settings: &EngineSettings) -> Result<(), PaydeskError>;

    // --- Sticky allocations ---

    async fn get_sticky_allocation(&self, customer: &str)
    -> Result<Option<String>, PaydeskError>;

    async fn set_sticky_allocation(
        &self,
        customer: &str,
        destination_id: &str,
    ) -> Result<(), PaydeskError>;
}
