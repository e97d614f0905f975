// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `paydesk serve` implementation.
//!
//! Wires storage, object store, inference and the protocol connector into
//! a [`Worker`] and runs it until a shutdown signal arrives.

use std::sync::Arc;

use paydesk_agent::shutdown::install_signal_handler;
use paydesk_agent::{Backends, Worker};
use paydesk_config::model::PaydeskConfig;
use paydesk_core::{HealthStatus, PaydeskError, PluginAdapter, StorageAdapter};
use paydesk_gemini::GeminiAdapter;
use paydesk_storage::{FsObjectStore, SqliteStorage};
use paydesk_whatsapp::SidecarConnector;
use tracing::{error, info, warn};

pub async fn run_serve(config: PaydeskConfig) -> Result<(), PaydeskError> {
    init_tracing(&config.worker.log_level);

    info!(name = %config.worker.name, "starting paydesk serve");

    let storage = Arc::new(SqliteStorage::open(config.storage.clone()).await?);
    info!(path = %config.storage.database_path, "storage initialized");

    let objects = Arc::new(FsObjectStore::new(&config.media));
    let inference = Arc::new(GeminiAdapter::new(&config)?);
    let connector = Arc::new(SidecarConnector::new(config.bridge.clone()));

    report_health("inference", inference.as_ref()).await;
    report_health("objects", objects.as_ref()).await;
    report_health("connector", connector.as_ref()).await;

    let worker = Worker::new(
        config,
        Backends {
            storage: storage.clone(),
            connector,
            inference,
            objects,
        },
    );

    let cancel = install_signal_handler();
    let result = worker.run(cancel).await;
    if let Err(e) = &result {
        error!(error = %e, "worker stopped with an error");
    }

    if let Err(e) = storage.close().await {
        warn!(error = %e, "failed to close storage cleanly");
    }
    info!("paydesk stopped");
    result
}

async fn report_health(component: &str, adapter: &dyn PluginAdapter) {
    match adapter.health_check().await {
        Ok(HealthStatus::Healthy) => info!(component, adapter = adapter.name(), "adapter ready"),
        Ok(status) => warn!(component, adapter = adapter.name(), ?status, "adapter not healthy"),
        Err(e) => warn!(component, adapter = adapter.name(), error = %e, "health check failed"),
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("paydesk={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
