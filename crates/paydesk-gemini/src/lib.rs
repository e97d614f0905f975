// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Google Gemini inference adapter.
//!
//! Implements [`InferenceAdapter`] over the `generateContent` endpoint:
//! free-text replies for the conversation engine and structured receipt
//! extraction for the receipt pipeline.

pub mod client;
pub mod extraction;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use paydesk_config::PaydeskConfig;
use paydesk_core::{
    AdapterType, HealthStatus, InferenceAdapter, PaydeskError, PluginAdapter, ReceiptExtraction,
};
use tracing::{debug, info};

use crate::client::GeminiClient;
use crate::types::{GenerateContentRequest, GenerationConfig, Part};

/// Sampling temperature for conversational replies.
const CHAT_TEMPERATURE: f32 = 0.8;

/// Gemini-backed inference adapter.
///
/// API key resolution order: config -> `GEMINI_API_KEY` env var -> error.
pub struct GeminiAdapter {
    client: GeminiClient,
}

impl GeminiAdapter {
    pub fn new(config: &PaydeskConfig) -> Result<Self, PaydeskError> {
        let api_key = resolve_api_key(&config.gemini.api_key)?;
        let client = GeminiClient::new(
            &api_key,
            config.gemini.model.clone(),
            config.gemini.base_url.clone(),
            Duration::from_secs(config.gemini.timeout_secs),
        )?;

        info!(model = config.gemini.model, "Gemini adapter initialized");
        Ok(Self { client })
    }

    /// Creates an adapter with an existing client (for testing).
    #[cfg(test)]
    fn with_client(client: GeminiClient) -> Self {
        Self { client }
    }
}

fn resolve_api_key(config_key: &Option<String>) -> Result<String, PaydeskError> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Ok(key.clone());
    }

    std::env::var("GEMINI_API_KEY").map_err(|_| {
        PaydeskError::Config(
            "Gemini API key not found. Set gemini.api_key in config or GEMINI_API_KEY environment variable.".into(),
        )
    })
}

#[async_trait]
impl PluginAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        "gemini"
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
        debug!("Gemini adapter shutting down");
        Ok(())
    }
}

#[async_trait]
impl InferenceAdapter for GeminiAdapter {
    async fn generate_text(&self, prompt: &str) -> Result<String, PaydeskError> {
        let request = GenerateContentRequest::user(vec![Part::text(prompt)]).with_config(
            GenerationConfig {
                temperature: Some(CHAT_TEMPERATURE),
                ..GenerationConfig::default()
            },
        );
        let text = self.client.generate(&request).await?.text();
        let text = text.trim();
        if text.is_empty() {
            return Err(PaydeskError::inference("empty generation response"));
        }
        Ok(text.to_string())
    }

    async fn extract_receipt(
        &self,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<ReceiptExtraction, PaydeskError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        debug!(mime_type, size = bytes.len(), "submitting receipt for extraction");

        let request = GenerateContentRequest::user(vec![
            Part::inline(mime_type, encoded),
            Part::text(extraction::extraction_prompt(mime_type)),
        ])
        .with_config(GenerationConfig {
            temperature: Some(0.0),
            response_mime_type: Some("application/json".into()),
            response_schema: Some(extraction::response_schema()),
        });

        let text = self.client.generate(&request).await?.text();
        if text.trim().is_empty() {
            return Err(PaydeskError::inference("empty extraction response"));
        }
        let result = extraction::parse_extraction(&text);
        info!(
            is_receipt = result.is_receipt,
            amount = result.amount,
            "receipt extraction complete"
        );
        Ok(result)
    }
}
