// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-channel authentication-state directories.
//!
//! The protocol keeps its credentials under `<auth_dir>/<channel id>`.
//! The worker only creates, inspects and purges these directories.

use std::path::{Path, PathBuf};

use paydesk_core::PaydeskError;
use serde::Deserialize;
use tracing::{debug, info};

/// Credentials file the protocol writes as soon as a handshake starts.
const CREDENTIALS_FILE: &str = "creds.json";

/// The one field of the credentials file the worker reads.
#[derive(Deserialize)]
struct Credentials {
    #[serde(default)]
    registered: bool,
}

#[derive(Debug, Clone)]
pub struct AuthStore {
    root: PathBuf,
}

impl AuthStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir_for(&self, channel_id: &str) -> PathBuf {
        self.root.join(channel_id)
    }

    /// Loads or creates the channel's state directory.
    pub async fn ensure(&self, channel_id: &str) -> Result<PathBuf, PaydeskError> {
        let dir = self.dir_for(channel_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| PaydeskError::Storage { source: e.into() })?;
        Ok(dir)
    }

    /// Whether the stored credentials belong to a linked account.
    ///
    /// A missing or unreadable credentials file counts as unlinked.
    pub async fn is_registered(&self, channel_id: &str) -> bool {
        let path = self.dir_for(channel_id).join(CREDENTIALS_FILE);
        let Ok(raw) = tokio::fs::read(&path).await else {
            return false;
        };
        match serde_json::from_slice::<Credentials>(&raw) {
            Ok(creds) => creds.registered,
            Err(e) => {
                debug!(channel_id, error = %e, "unreadable credentials file");
                false
            }
        }
    }

    /// Removes the channel's credentials. Missing directories are fine.
    pub async fn purge(&self, channel_id: &str) -> Result<(), PaydeskError> {
        let dir = self.dir_for(channel_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!(channel_id, "authentication state purged");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(channel_id, "no authentication state to purge");
                Ok(())
            }
            Err(e) => Err(PaydeskError::Storage { source: e.into() }),
        }
    }
}
