// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of [`StorageAdapter`] with an in-process change feed.

use async_trait::async_trait;
use tokio::sync::{OnceCell, broadcast};
use tracing::debug;

use paydesk_config::model::StorageConfig;
use paydesk_core::{
    AdapterType, ChangeEvent, ChannelConnection, ConnectionUpdate, EngineSettings, HealthStatus,
    Message, MinimalTransaction, PaydeskError, PaymentDestination, PluginAdapter,
    StorageAdapter, Transaction, TransactionStatus,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// Buffered change events per subscriber before it starts lagging.
const CHANGE_FEED_CAPACITY: usize = 256;

/// SQLite-backed storage adapter.
///
/// The database is opened by [`StorageAdapter::initialize`]. Writes other
/// components react to are published on a broadcast channel.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl SqliteStorage {
    pub fn new(config: StorageConfig) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            config,
            db: OnceCell::new(),
            changes,
        }
    }

    /// Create and initialize in one step.
    pub async fn open(config: StorageConfig) -> Result<Self, PaydeskError> {
        let storage = Self::new(config);
        storage.initialize().await?;
        Ok(storage)
    }

    /// The underlying database, or an error before `initialize`.
    pub fn database(&self) -> Result<&Database, PaydeskError> {
        self.db.get().ok_or_else(|| PaydeskError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    fn publish(&self, event: ChangeEvent) {
        // No subscribers is fine.
        let _ = self.changes.send(event);
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, PaydeskError> {
        let Ok(db) = self.database() else {
            return Ok(HealthStatus::Unhealthy("not initialized".into()));
        };
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PaydeskError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), PaydeskError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| PaydeskError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), PaydeskError> {
        self.database()?.checkpoint().await
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    // --- Connections ---

    async fn create_connection(&self, connection: &ChannelConnection) -> Result<(), PaydeskError> {
        queries::connections::create_connection(self.database()?, connection).await?;
        self.publish(ChangeEvent::ConnectionCreated(connection.clone()));
        Ok(())
    }

    async fn get_connection(&self, id: &str) -> Result<Option<ChannelConnection>, PaydeskError> {
        queries::connections::get_connection(self.database()?, id).await
    }

    async fn list_connections(&self) -> Result<Vec<ChannelConnection>, PaydeskError> {
        queries::connections::list_connections(self.database()?).await
    }

    async fn delete_connection(&self, id: &str) -> Result<bool, PaydeskError> {
        let deleted = queries::connections::delete_connection(self.database()?, id).await?;
        if deleted {
            self.publish(ChangeEvent::ConnectionDeleted { id: id.to_string() });
        }
        Ok(deleted)
    }

    async fn update_connection_state(
        &self,
        id: &str,
        update: &ConnectionUpdate,
    ) -> Result<(), PaydeskError> {
        let found =
            queries::connections::update_connection_state(self.database()?, id, update).await?;
        if !found {
            return Err(PaydeskError::NotFound {
                entity: "connection",
                id: id.to_string(),
            });
        }
        self.publish(ChangeEvent::ConnectionStatusChanged {
            id: id.to_string(),
            status: update.status,
        });
        Ok(())
    }

    // --- Messages ---

    async fn insert_message(&self, message: &Message) -> Result<bool, PaydeskError> {
        let inserted = queries::messages::insert_message(self.database()?, message).await?;
        if inserted {
            self.publish(ChangeEvent::MessageInserted(message.clone()));
        }
        Ok(inserted)
    }

    async fn list_messages(
        &self,
        connection_id: &str,
        counterpart_phone: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Message>, PaydeskError> {
        queries::messages::list_messages(self.database()?, connection_id, counterpart_phone, limit)
            .await
    }

    async fn get_message(&self, id: &str) -> Result<Option<Message>, PaydeskError> {
        queries::messages::get_message(self.database()?, id).await
    }

    async fn list_pending_outbound(&self) -> Result<Vec<Message>, PaydeskError> {
        queries::messages::list_pending_outbound(self.database()?).await
    }

    async fn mark_delivered(
        &self,
        id: &str,
        protocol_message_id: Option<&str>,
    ) -> Result<(), PaydeskError> {
        queries::messages::mark_delivered(self.database()?, id, protocol_message_id).await?;
        Ok(())
    }

    // --- Transactions ---

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<(), PaydeskError> {
        queries::transactions::insert_transaction(self.database()?, transaction).await
    }

    async fn insert_minimal_transaction(
        &self,
        transaction: &MinimalTransaction,
    ) -> Result<(), PaydeskError> {
        queries::transactions::insert_minimal_transaction(self.database()?, transaction).await
    }

    async fn get_transaction(&self, id: &str) -> Result<Option<Transaction>, PaydeskError> {
        queries::transactions::get_transaction(self.database()?, id).await
    }

    async fn list_transactions(
        &self,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<Transaction>, PaydeskError> {
        queries::transactions::list_transactions(self.database()?, status).await
    }

    async fn advance_transaction(
        &self,
        id: &str,
        next: TransactionStatus,
    ) -> Result<Transaction, PaydeskError> {
        queries::transactions::advance_transaction(self.database()?, id, next).await
    }

    // --- Payment destinations ---

    async fn list_destinations(&self) -> Result<Vec<PaymentDestination>, PaydeskError> {
        queries::destinations::list_destinations(self.database()?).await
    }

    async fn save_destination(&self, destination: &PaymentDestination) -> Result<(), PaydeskError> {
        queries::destinations::save_destination(self.database()?, destination).await
    }

    // --- Engine settings ---

    async fn get_settings(&self) -> Result<EngineSettings, PaydeskError> {
        queries::settings::get_settings(self.database()?).await
    }

    async fn save_settings(&self, settings: &EngineSettings) -> Result<(), PaydeskError> {
        queries::settings::save_settings(self.database()?, settings).await
    }

    // --- Sticky allocations ---

    async fn get_sticky_allocation(&self, customer: &str) -> Result<Option<String>, PaydeskError> {
        queries::sticky::get_sticky_allocation(self.database()?, customer).await
    }

    async fn set_sticky_allocation(
        &self,
        customer: &str,
        destination_id: &str,
    ) -> Result<(), PaydeskError> {
        queries::sticky::set_sticky_allocation(self.database()?, customer, destination_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paydesk_core::ConnectionStatus;

    async fn storage(dir: &tempfile::TempDir) -> SqliteStorage {
        SqliteStorage::open(StorageConfig {
            database_path: dir.path().join("a.db").to_string_lossy().into_owned(),
            wal_mode: true,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn uninitialized_storage_reports_unhealthy() {
        let s = SqliteStorage::new(StorageConfig::default());
        assert!(matches!(
            s.health_check().await.unwrap(),
            HealthStatus::Unhealthy(_)
        ));
        assert!(s.list_connections().await.is_err());
    }

    #[tokio::test]
    async fn double_initialize_fails() {
        let dir = tempfile::tempdir().unwrap();
        let s = storage(&dir).await;
        assert!(s.initialize().await.is_err());
        assert_eq!(s.health_check().await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn change_feed_publishes_connection_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let s = storage(&dir).await;
        let mut feed = s.subscribe();

        let c = ChannelConnection::new("Line 1", "Ayşe", None);
        s.create_connection(&c).await.unwrap();
        s.update_connection_state(&c.id, &ConnectionUpdate::status(ConnectionStatus::Connected))
            .await
            .unwrap();
        s.delete_connection(&c.id).await.unwrap();

        assert!(matches!(feed.recv().await.unwrap(), ChangeEvent::ConnectionCreated(x) if x.id == c.id));
        assert!(matches!(
            feed.recv().await.unwrap(),
            ChangeEvent::ConnectionStatusChanged { status: ConnectionStatus::Connected, .. }
        ));
        assert!(matches!(feed.recv().await.unwrap(), ChangeEvent::ConnectionDeleted { id } if id == c.id));
    }

    #[tokio::test]
    async fn duplicate_message_is_not_published() {
        let dir = tempfile::tempdir().unwrap();
        let s = storage(&dir).await;
        let mut feed = s.subscribe();

        let m = Message::inbound("c1", "905551234567", Some("hi".into()), false, "WAMID-1");
        assert!(s.insert_message(&m).await.unwrap());
        let dup = Message::inbound("c1", "905551234567", Some("hi".into()), false, "WAMID-1");
        assert!(!s.insert_message(&dup).await.unwrap());

        assert!(matches!(feed.recv().await.unwrap(), ChangeEvent::MessageInserted(x) if x.id == m.id));
        assert!(feed.try_recv().is_err());
    }

    #[tokio::test]
    async fn updating_missing_connection_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let s = storage(&dir).await;
        let err = s
            .update_connection_state("nope", &ConnectionUpdate::status(ConnectionStatus::Error))
            .await
            .unwrap_err();
        assert!(matches!(err, PaydeskError::NotFound { .. }));
    }
}
