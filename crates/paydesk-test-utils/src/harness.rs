// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for integration tests.
//!
//! `TestHarness` assembles a temp SQLite database, a config pointing every
//! path into a temp directory, and the mock adapters. Engines under test are
//! built from its parts.

use std::path::PathBuf;
use std::sync::Arc;

use paydesk_config::PaydeskConfig;
use paydesk_core::{
    ChannelConnection, EngineSettings, PaydeskError, PaymentDestination, StorageAdapter, new_id,
    timestamp_now,
};
use paydesk_storage::SqliteStorage;

use crate::mock_inference::MockInference;
use crate::mock_objects::MemoryObjectStore;
use crate::mock_protocol::MockConnector;

/// Builder for creating test environments.
pub struct TestHarnessBuilder {
    replies: Vec<String>,
    media_bucket_exists: bool,
    configure: Option<Box<dyn FnOnce(&mut PaydeskConfig) + Send>>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            replies: Vec::new(),
            media_bucket_exists: true,
            configure: None,
        }
    }

    /// Queue generation replies on the mock inference adapter.
    pub fn with_replies(mut self, replies: Vec<String>) -> Self {
        self.replies = replies;
        self
    }

    /// Start the object store without the media bucket.
    pub fn without_media_bucket(mut self) -> Self {
        self.media_bucket_exists = false;
        self
    }

    /// Adjust the generated config before anything is built.
    pub fn with_config(mut self, f: impl FnOnce(&mut PaydeskConfig) + Send + 'static) -> Self {
        self.configure = Some(Box::new(f));
        self
    }

    pub async fn build(self) -> Result<TestHarness, PaydeskError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| PaydeskError::Storage { source: e.into() })?;
        let root = temp_dir.path().to_path_buf();

        let mut config = PaydeskConfig::default();
        config.storage.database_path = root.join("test.db").to_string_lossy().to_string();
        config.worker.auth_dir = root.join("auth").to_string_lossy().to_string();
        config.media.root_dir = root.join("media").to_string_lossy().to_string();
        // Keep timing-driven paths fast.
        config.worker.reconnect_backoff_secs = 1;
        config.worker.pairing_delay_ms = 10;
        config.worker.relay_typing_ms = 10;
        config.worker.reconcile_interval_secs = 1;
        config.worker.drain_timeout_secs = 5;
        if let Some(configure) = self.configure {
            configure(&mut config);
        }

        let storage = Arc::new(SqliteStorage::open(config.storage.clone()).await?);
        // Replies go out without the typing delay.
        storage
            .save_settings(&EngineSettings {
                reply_delay_secs: 0,
                ..EngineSettings::default()
            })
            .await?;

        let objects = if self.media_bucket_exists {
            MemoryObjectStore::with_bucket(&config.media.bucket).await
        } else {
            MemoryObjectStore::new()
        };

        Ok(TestHarness {
            config,
            storage,
            connector: Arc::new(MockConnector::new()),
            inference: MockInference::with_replies(self.replies),
            objects,
            temp_dir,
        })
    }
}

/// A self-contained test environment.
pub struct TestHarness {
    pub config: PaydeskConfig,
    pub storage: Arc<SqliteStorage>,
    pub connector: Arc<MockConnector>,
    pub inference: MockInference,
    pub objects: MemoryObjectStore,
    temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A harness with default settings.
    pub async fn new() -> Result<Self, PaydeskError> {
        Self::builder().build().await
    }

    pub fn root(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    /// The storage as a trait object.
    pub fn storage_dyn(&self) -> Arc<dyn StorageAdapter> {
        Arc::clone(&self.storage) as Arc<dyn StorageAdapter>
    }

    /// Inserts a connection row.
    pub async fn add_connection(
        &self,
        name: &str,
        phone: Option<&str>,
    ) -> Result<ChannelConnection, PaydeskError> {
        let connection = ChannelConnection::new(name, "Deniz", phone.map(str::to_string));
        self.storage.create_connection(&connection).await?;
        Ok(connection)
    }

    /// Inserts an active destination with no running total.
    pub async fn add_destination(
        &self,
        bank: &str,
        limit: f64,
        priority: u8,
    ) -> Result<PaymentDestination, PaydeskError> {
        let destination = PaymentDestination {
            id: new_id(),
            bank_name: bank.to_string(),
            account_holder: format!("{bank} Holder"),
            account_number: format!("TR00 {bank}"),
            limit,
            running_total: 0.0,
            priority,
            usage_count: 0,
            is_active: true,
            created_at: timestamp_now(),
        };
        self.storage.save_destination(&destination).await?;
        Ok(destination)
    }
}
