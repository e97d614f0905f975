// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Object storage adapter for receipt artifacts.

use async_trait::async_trait;

use crate::error::PaydeskError;
use crate::traits::adapter::PluginAdapter;

/// Stores uploaded bytes and returns a URL operators can open.
#[async_trait]
pub trait ObjectStore: PluginAdapter {
    /// Uploads `bytes` under `path` and returns the public URL.
    ///
    /// Fails with [`PaydeskError::BucketNotFound`] when the bucket is missing.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, PaydeskError>;

    /// Creates a publicly readable bucket. Succeeds if it already exists.
    async fn create_bucket(&self, bucket: &str) -> Result<(), PaydeskError>;
}
