// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live session bookkeeping.
//!
//! At most one session per channel id, and at most `max_channels` overall.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use dashmap::DashMap;
use paydesk_core::{PaydeskError, ProtocolHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Shared state between the registry and one running session.
struct Slot {
    cancel: CancellationToken,
    purge: AtomicBool,
    handle: RwLock<Option<Arc<dyn ProtocolHandle>>>,
}

/// A session's claim on its channel id. Dropping it does not release the
/// slot; the session calls [`SessionRegistry::release`] on exit.
#[derive(Clone)]
pub struct SessionLease {
    channel_id: String,
    slot: Arc<Slot>,
}

impl SessionLease {
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.slot.cancel.clone()
    }

    /// Whether teardown asked for logout and credential purge.
    pub fn purge_requested(&self) -> bool {
        self.slot.purge.load(Ordering::SeqCst)
    }

    /// Publishes (or clears) the protocol handle for the outbound relay.
    pub fn set_handle(&self, handle: Option<Arc<dyn ProtocolHandle>>) {
        if let Ok(mut slot) = self.slot.handle.write() {
            *slot = handle;
        }
    }

    pub fn handle(&self) -> Option<Arc<dyn ProtocolHandle>> {
        self.slot.handle.read().ok().and_then(|h| h.clone())
    }
}

pub struct SessionRegistry {
    max_channels: usize,
    sessions: DashMap<String, Arc<Slot>>,
    // Serializes the capacity check with the insert.
    admission: Mutex<()>,
}

impl SessionRegistry {
    pub fn new(max_channels: usize) -> Self {
        Self {
            max_channels,
            sessions: DashMap::new(),
            admission: Mutex::new(()),
        }
    }

    /// Claims the channel id for a new session.
    pub fn acquire(&self, channel_id: &str) -> Result<SessionLease, PaydeskError> {
        let _admission = self
            .admission
            .lock()
            .map_err(|_| PaydeskError::Internal("session registry lock poisoned".into()))?;

        if self.sessions.contains_key(channel_id) {
            return Err(PaydeskError::SessionAlreadyActive {
                channel_id: channel_id.to_string(),
            });
        }
        if self.sessions.len() >= self.max_channels {
            return Err(PaydeskError::CapacityReached {
                max: self.max_channels,
            });
        }

        let slot = Arc::new(Slot {
            cancel: CancellationToken::new(),
            purge: AtomicBool::new(false),
            handle: RwLock::new(None),
        });
        self.sessions
            .insert(channel_id.to_string(), Arc::clone(&slot));
        debug!(channel_id, live = self.sessions.len(), "session slot acquired");

        Ok(SessionLease {
            channel_id: channel_id.to_string(),
            slot,
        })
    }

    /// Frees the channel id.
    pub fn release(&self, channel_id: &str) {
        if self.sessions.remove(channel_id).is_some() {
            debug!(channel_id, live = self.sessions.len(), "session slot released");
        }
    }

    /// The live protocol handle for a channel, if its session is connected.
    pub fn handle(&self, channel_id: &str) -> Option<Arc<dyn ProtocolHandle>> {
        let slot = self.sessions.get(channel_id)?;
        slot.handle.read().ok().and_then(|h| h.clone())
    }

    /// Cancels the session and marks its credentials for purge.
    pub fn teardown(&self, channel_id: &str) -> bool {
        match self.sessions.get(channel_id) {
            Some(slot) => {
                slot.purge.store(true, Ordering::SeqCst);
                slot.cancel.cancel();
                info!(channel_id, "session teardown requested");
                true
            }
            None => false,
        }
    }

    /// Cancels every session, keeping credentials.
    pub fn cancel_all(&self) {
        for slot in self.sessions.iter() {
            slot.cancel.cancel();
        }
    }

    pub fn contains(&self, channel_id: &str) -> bool {
        self.sessions.contains_key(channel_id)
    }

    pub fn channel_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_session_per_channel() {
        let registry = SessionRegistry::new(5);
        let _lease = registry.acquire("c1").unwrap();
        assert!(matches!(
            registry.acquire("c1"),
            Err(PaydeskError::SessionAlreadyActive { .. })
        ));
        registry.release("c1");
        assert!(registry.acquire("c1").is_ok());
    }

    #[test]
    fn capacity_is_enforced() {
        let registry = SessionRegistry::new(2);
        registry.acquire("a").unwrap();
        registry.acquire("b").unwrap();
        assert!(matches!(
            registry.acquire("c"),
            Err(PaydeskError::CapacityReached { max: 2 })
        ));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn teardown_cancels_and_marks_purge() {
        let registry = SessionRegistry::new(5);
        let lease = registry.acquire("c1").unwrap();
        assert!(!lease.purge_requested());
        assert!(registry.teardown("c1"));
        assert!(lease.cancel_token().is_cancelled());
        assert!(lease.purge_requested());
        assert!(!registry.teardown("unknown"));
    }

    #[test]
    fn cancel_all_keeps_credentials() {
        let registry = SessionRegistry::new(5);
        let lease = registry.acquire("c1").unwrap();
        registry.cancel_all();
        assert!(lease.cancel_token().is_cancelled());
        assert!(!lease.purge_requested());
    }

    #[test]
    fn handle_absent_until_published() {
        let registry = SessionRegistry::new(5);
        let lease = registry.acquire("c1").unwrap();
        assert!(registry.handle("c1").is_none());
        assert!(lease.handle().is_none());
        assert!(registry.handle("other").is_none());
    }
}
