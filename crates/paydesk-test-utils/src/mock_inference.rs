// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock inference adapter with queued results.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use paydesk_core::{
    AdapterType, HealthStatus, InferenceAdapter, PaydeskError, PluginAdapter, ReceiptExtraction,
};
use tokio::sync::Mutex;

/// A mock [`InferenceAdapter`].
///
/// Generation and extraction each pop from their own queue. An empty
/// generation queue yields `"mock reply"`; an empty extraction queue yields
/// an error, which exercises the manual-review path.
#[derive(Clone, Default)]
pub struct MockInference {
    replies: Arc<Mutex<VecDeque<Result<String, String>>>>,
    extractions: Arc<Mutex<VecDeque<Result<ReceiptExtraction, String>>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    extraction_inputs: Arc<Mutex<Vec<(usize, String)>>>,
}

impl MockInference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: Vec<String>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().map(Ok).collect())),
            ..Self::default()
        }
    }

    pub async fn add_reply(&self, reply: impl Into<String>) {
        self.replies.lock().await.push_back(Ok(reply.into()));
    }

    pub async fn add_reply_error(&self, message: impl Into<String>) {
        self.replies.lock().await.push_back(Err(message.into()));
    }

    pub async fn add_extraction(&self, extraction: ReceiptExtraction) {
        self.extractions.lock().await.push_back(Ok(extraction));
    }

    pub async fn add_extraction_error(&self, message: impl Into<String>) {
        self.extractions.lock().await.push_back(Err(message.into()));
    }

    /// Prompts passed to `generate_text`, in order.
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }

    /// `(byte length, mime type)` of each extraction call.
    pub async fn extraction_inputs(&self) -> Vec<(usize, String)> {
        self.extraction_inputs.lock().await.clone()
    }
}

#[async_trait]
impl PluginAdapter for MockInference {
    fn name(&self) -> &str {
        "mock-inference"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Inference
    }

    async fn health_check(&self) -> Result<HealthStatus, PaydeskError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PaydeskError> {
        Ok(())
    }
}

#[async_trait]
impl InferenceAdapter for MockInference {
    async fn generate_text(&self, prompt: &str) -> Result<String, PaydeskError> {
        self.prompts.lock().await.push(prompt.to_string());
        match self.replies.lock().await.pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(PaydeskError::inference(message)),
            None => Ok("mock reply".to_string()),
        }
    }

    async fn extract_receipt(
        &self,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<ReceiptExtraction, PaydeskError> {
        self.extraction_inputs
            .lock()
            .await
            .push((bytes.len(), mime_type.to_string()));
        match self.extractions.lock().await.pop_front() {
            Some(Ok(extraction)) => Ok(extraction),
            Some(Err(message)) => Err(PaydeskError::inference(message)),
            None => Err(PaydeskError::inference("no mock extraction queued")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replies_in_order_then_default() {
        let mock = MockInference::with_replies(vec!["a".into(), "b".into()]);
        assert_eq!(mock.generate_text("p1").await.unwrap(), "a");
        assert_eq!(mock.generate_text("p2").await.unwrap(), "b");
        assert_eq!(mock.generate_text("p3").await.unwrap(), "mock reply");
        assert_eq!(mock.prompts().await, vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn empty_extraction_queue_is_error() {
        let mock = MockInference::new();
        assert!(mock.extract_receipt(b"x", "image/png").await.is_err());
        assert_eq!(mock.extraction_inputs().await, vec![(1, "image/png".to_string())]);
    }
}
