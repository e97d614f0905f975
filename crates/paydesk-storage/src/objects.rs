// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filesystem-backed [`ObjectStore`].
//!
//! Buckets are directories under a root. A bucket must exist before
//! uploads succeed, so callers see the same "bucket not found" failure a
//! hosted object store would report.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use paydesk_config::model::MediaConfig;
use paydesk_core::{AdapterType, HealthStatus, ObjectStore, PaydeskError, PluginAdapter};

pub struct FsObjectStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl FsObjectStore {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            root: PathBuf::from(&config.root_dir),
            public_base_url: config
                .public_base_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, PaydeskError> {
        let dir = self.root.join(checked_relative(bucket)?);
        Ok(dir)
    }

    fn public_url(&self, bucket: &str, path: &str, file: &Path) -> String {
        match &self.public_base_url {
            Some(base) => format!("{base}/{bucket}/{path}"),
            None => {
                let absolute = std::path::absolute(file).unwrap_or_else(|_| file.to_path_buf());
                format!("file://{}", absolute.display())
            }
        }
    }
}

/// Reject absolute paths and `..` so objects stay inside their bucket.
fn checked_relative(path: &str) -> Result<&Path, PaydeskError> {
    let p = Path::new(path);
    let clean = !path.is_empty()
        && p.components()
            .all(|c| matches!(c, Component::Normal(_)));
    if clean {
        Ok(p)
    } else {
        Err(PaydeskError::ObjectStore {
            message: format!("invalid object path `{path}`"),
            source: None,
        })
    }
}

fn io_err(message: &str, e: std::io::Error) -> PaydeskError {
    PaydeskError::ObjectStore {
        message: message.to_string(),
        source: Some(Box::new(e)),
    }
}

#[async_trait]
impl PluginAdapter for FsObjectStore {
    fn name(&self) -> &str {
        "fs-object-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::ObjectStore
    }

    async fn health_check(&self) -> Result<HealthStatus, PaydeskError> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(HealthStatus::Healthy),
            Ok(_) => Ok(HealthStatus::Unhealthy(format!(
                "{} is not a directory",
                self.root.display()
            ))),
            Err(_) => Ok(HealthStatus::Degraded(format!(
                "{} does not exist yet",
                self.root.display()
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), PaydeskError> {
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, PaydeskError> {
        let bucket_dir = self.bucket_dir(bucket)?;
        if !tokio::fs::try_exists(&bucket_dir).await.unwrap_or(false) {
            return Err(PaydeskError::BucketNotFound {
                bucket: bucket.to_string(),
            });
        }

        let file = bucket_dir.join(checked_relative(path)?);
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err("failed to create object directory", e))?;
        }
        tokio::fs::write(&file, bytes)
            .await
            .map_err(|e| io_err("failed to write object", e))?;

        debug!(bucket, path, content_type, size = bytes.len(), "object stored");
        Ok(self.public_url(bucket, path, &file))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), PaydeskError> {
        let dir = self.bucket_dir(bucket)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_err("failed to create bucket", e))?;
        info!(bucket, "bucket created");
        Ok(())
    }
}
