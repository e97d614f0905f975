// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel sessions and the worker supervisor for Paydesk.
//!
//! The [`Worker`] is the central coordinator that:
//! - starts one channel session per connection row
//! - follows the storage change feed to start and tear down sessions
//! - relays operator-composed messages through live sessions
//! - reconciles periodically with rows written by other processes
//! - drains sessions on shutdown

pub mod allocation;
pub mod auth;
pub mod conversation;
pub mod receipt;
pub mod registry;
pub mod relay;
pub mod router;
pub mod session;
pub mod shutdown;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use paydesk_config::model::PaydeskConfig;
use paydesk_core::{
    ChangeEvent, ChannelConnection, ConnectionStatus, InferenceAdapter, ObjectStore, PaydeskError,
    ProtocolConnector, StorageAdapter,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::allocation::{
    AllocationEngine, AllocationStateStore, MemoryAllocationState, StorageAllocationState,
};
use crate::auth::AuthStore;
use crate::conversation::ConversationEngine;
use crate::receipt::ReceiptPipeline;
use crate::registry::SessionRegistry;
use crate::relay::OutboundRelay;
use crate::session::{ChannelSession, SessionContext, SessionTiming};

/// The backends a worker runs against.
pub struct Backends {
    pub storage: Arc<dyn StorageAdapter>,
    pub connector: Arc<dyn ProtocolConnector>,
    pub inference: Arc<dyn InferenceAdapter>,
    pub objects: Arc<dyn ObjectStore>,
}

/// Supervises every channel session in the process.
pub struct Worker {
    config: PaydeskConfig,
    storage: Arc<dyn StorageAdapter>,
    ctx: Arc<SessionContext>,
    relay: Arc<OutboundRelay>,
    /// One task per channel session.
    sessions: TaskTracker,
    /// Relay deliveries and rescans.
    background: TaskTracker,
}

impl Worker {
    pub fn new(config: PaydeskConfig, backends: Backends) -> Self {
        let Backends {
            storage,
            connector,
            inference,
            objects,
        } = backends;

        let registry = Arc::new(SessionRegistry::new(config.worker.max_channels));
        let sticky: Arc<dyn AllocationStateStore> = if config.allocation.persist_sticky {
            Arc::new(StorageAllocationState::new(Arc::clone(&storage)))
        } else {
            Arc::new(MemoryAllocationState::new())
        };
        let allocation = Arc::new(AllocationEngine::new(
            Arc::clone(&storage),
            sticky,
            config.allocation.utilization_gap,
        ));
        let conversation = Arc::new(ConversationEngine::new(
            config.conversation.clone(),
            Arc::clone(&storage),
            Arc::clone(&inference),
            allocation,
        ));
        let receipts = Arc::new(ReceiptPipeline::new(
            config.media.clone(),
            Arc::clone(&storage),
            objects,
            inference,
            Arc::clone(&conversation),
        ));
        let relay = Arc::new(OutboundRelay::new(
            Arc::clone(&storage),
            Arc::clone(&registry),
            Duration::from_millis(config.worker.relay_typing_ms),
        ));

        let ctx = Arc::new(SessionContext {
            storage: Arc::clone(&storage),
            connector,
            registry,
            auth: AuthStore::new(&config.worker.auth_dir),
            conversation,
            receipts,
            timing: SessionTiming {
                reconnect_backoff: Duration::from_secs(config.worker.reconnect_backoff_secs),
                pairing_delay: Duration::from_millis(config.worker.pairing_delay_ms),
            },
        });

        info!(
            worker = config.worker.name.as_str(),
            max_channels = config.worker.max_channels,
            persist_sticky = config.allocation.persist_sticky,
            "worker initialized"
        );

        Self {
            config,
            storage,
            ctx,
            relay,
            sessions: TaskTracker::new(),
            background: TaskTracker::new(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.ctx.registry
    }

    pub fn relay(&self) -> &Arc<OutboundRelay> {
        &self.relay
    }

    /// Runs until `cancel` fires, then drains every session. Storage stays
    /// open; the caller owns it.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), PaydeskError> {
        // Subscribe first so rows created during bootstrap are not missed.
        let mut changes = self.storage.subscribe();
        self.bootstrap().await?;

        let mut tick =
            tokio::time::interval(Duration::from_secs(self.config.worker.reconcile_interval_secs));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tick.tick().await;

        info!("worker running");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutdown signal received, stopping worker");
                    break;
                }
                change = changes.recv() => match change {
                    Ok(event) => self.on_change(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "change feed lagged, reconciling");
                        self.reconcile().await;
                    }
                    Err(RecvError::Closed) => {
                        warn!("change feed closed, stopping worker");
                        break;
                    }
                },
                _ = tick.tick() => self.reconcile().await,
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Starts a session for every existing connection row.
    async fn bootstrap(&self) -> Result<(), PaydeskError> {
        let connections = self.storage.list_connections().await?;
        info!(count = connections.len(), "starting existing connections");
        for connection in connections {
            self.spawn_session(connection);
        }
        self.spawn_relay_rescan();
        Ok(())
    }

    fn on_change(&self, event: ChangeEvent) {
        match event {
            ChangeEvent::ConnectionCreated(connection) => {
                info!(channel_id = %connection.id, name = %connection.name, "new connection");
                self.spawn_session(connection);
            }
            ChangeEvent::ConnectionDeleted { id } => {
                info!(channel_id = %id, "connection deleted");
                self.ctx.registry.teardown(&id);
            }
            ChangeEvent::MessageInserted(message) if message.awaits_relay() => {
                let relay = Arc::clone(&self.relay);
                self.background.spawn(async move {
                    relay.relay(&message).await;
                });
            }
            ChangeEvent::MessageInserted(_) | ChangeEvent::ConnectionStatusChanged { .. } => {}
        }
    }

    /// Aligns live sessions with the connection table and rescans the relay.
    ///
    /// Rows left DISCONNECTED by a logout are not restarted here; they come
    /// back on the next process start.
    pub async fn reconcile(&self) {
        let connections = match self.storage.list_connections().await {
            Ok(connections) => connections,
            Err(e) => {
                warn!(error = %e, "reconcile could not list connections");
                return;
            }
        };

        let known: HashSet<&str> = connections.iter().map(|c| c.id.as_str()).collect();
        for id in self.ctx.registry.channel_ids() {
            if !known.contains(id.as_str()) {
                info!(channel_id = %id, "connection row gone, tearing down session");
                self.ctx.registry.teardown(&id);
            }
        }

        for connection in connections {
            if connection.status != ConnectionStatus::Disconnected
                && !self.ctx.registry.contains(&connection.id)
            {
                self.spawn_session(connection);
            }
        }

        self.spawn_relay_rescan();
    }

    fn spawn_session(&self, connection: ChannelConnection) {
        let lease = match self.ctx.registry.acquire(&connection.id) {
            Ok(lease) => lease,
            Err(PaydeskError::SessionAlreadyActive { .. }) => {
                debug!(channel_id = %connection.id, "session already running");
                return;
            }
            Err(e) => {
                warn!(channel_id = %connection.id, error = %e, "cannot start session");
                return;
            }
        };
        info!(channel_id = %connection.id, "starting channel session");
        let session = ChannelSession::new(Arc::clone(&self.ctx), lease, &connection);
        self.sessions.spawn(session.run());
    }

    fn spawn_relay_rescan(&self) {
        let relay = Arc::clone(&self.relay);
        self.background.spawn(async move {
            if let Err(e) = relay.process_pending().await {
                warn!(error = %e, "relay rescan failed");
            }
        });
    }

    async fn shutdown(&self) {
        self.ctx.registry.cancel_all();
        let timeout = Duration::from_secs(self.config.worker.drain_timeout_secs);
        shutdown::drain_sessions(&self.sessions, timeout).await;

        self.background.close();
        if tokio::time::timeout(timeout, self.background.wait())
            .await
            .is_err()
        {
            warn!("background tasks still running at shutdown");
        }

        info!("worker stopped");
    }
}
