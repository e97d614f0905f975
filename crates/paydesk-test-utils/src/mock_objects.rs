// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory object store with injectable failures.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use paydesk_core::{AdapterType, HealthStatus, ObjectStore, PaydeskError, PluginAdapter};
use tokio::sync::Mutex;

/// A mock [`ObjectStore`].
///
/// Starts with no buckets. Uploads to a missing bucket fail with
/// `BucketNotFound`, like the filesystem store.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    buckets: Arc<Mutex<HashSet<String>>>,
    objects: Arc<Mutex<HashMap<String, (Vec<u8>, String)>>>,
    upload_failures: Arc<AtomicUsize>,
    fail_create: Arc<AtomicBool>,
    upload_attempts: Arc<AtomicUsize>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already has `bucket`.
    pub async fn with_bucket(bucket: &str) -> Self {
        let store = Self::new();
        store.buckets.lock().await.insert(bucket.to_string());
        store
    }

    /// Makes the next `n` uploads fail with a generic error.
    pub fn fail_uploads(&self, n: usize) {
        self.upload_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_create_bucket(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn upload_attempts(&self) -> usize {
        self.upload_attempts.load(Ordering::SeqCst)
    }

    pub async fn has_bucket(&self, bucket: &str) -> bool {
        self.buckets.lock().await.contains(bucket)
    }

    /// Stored keys, as `bucket/path`.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Bytes and content type of a stored object.
    pub async fn get(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.objects.lock().await.get(key).cloned()
    }
}

#[async_trait]
impl PluginAdapter for MemoryObjectStore {
    fn name(&self) -> &str {
        "memory-objects"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::ObjectStore
    }

    async fn health_check(&self) -> Result<HealthStatus, PaydeskError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PaydeskError> {
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, PaydeskError> {
        self.upload_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .upload_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PaydeskError::ObjectStore {
                message: "mock upload failure".into(),
                source: None,
            });
        }
        if !self.buckets.lock().await.contains(bucket) {
            return Err(PaydeskError::BucketNotFound {
                bucket: bucket.to_string(),
            });
        }
        let key = format!("{bucket}/{path}");
        self.objects
            .lock()
            .await
            .insert(key.clone(), (bytes.to_vec(), content_type.to_string()));
        Ok(format!("memory://{key}"))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), PaydeskError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(PaydeskError::ObjectStore {
                message: "mock create bucket failure".into(),
                source: None,
            });
        }
        self.buckets.lock().await.insert(bucket.to_string());
        Ok(())
    }
}
