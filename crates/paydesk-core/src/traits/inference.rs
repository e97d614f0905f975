// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AI inference adapter: free-text generation and receipt extraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PaydeskError;
use crate::traits::adapter::PluginAdapter;

/// Sender name recorded when extraction could not run.
pub const MANUAL_REVIEW_SENDER: &str = "Manual Review";

/// Typed result of a receipt extraction call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptExtraction {
    pub is_receipt: bool,
    pub amount: f64,
    pub sender_name: Option<String>,
    pub bank_name: Option<String>,
    /// Optional extra fields (receiver, date, reference, confidence).
    pub details: Option<serde_json::Value>,
}

impl ReceiptExtraction {
    /// Placeholder recorded when extraction fails, so an operator still sees the proof.
    pub fn manual_review() -> Self {
        Self {
            is_receipt: true,
            amount: 0.0,
            sender_name: Some(MANUAL_REVIEW_SENDER.to_string()),
            bank_name: None,
            details: None,
        }
    }

    /// An explicit "this is not a receipt" result.
    pub fn not_a_receipt() -> Self {
        Self {
            is_receipt: false,
            amount: 0.0,
            sender_name: None,
            bank_name: None,
            details: None,
        }
    }

    /// Amount with negative and non-finite values replaced by zero.
    pub fn sanitized_amount(&self) -> f64 {
        if self.amount.is_finite() && self.amount > 0.0 {
            self.amount
        } else {
            0.0
        }
    }
}

/// Adapter for the generative AI service.
#[async_trait]
pub trait InferenceAdapter: PluginAdapter {
    /// Generates a reply for the prompt. Single attempt.
    async fn generate_text(&self, prompt: &str) -> Result<String, PaydeskError>;

    /// Classifies an image or document as a payment receipt. Single attempt.
    async fn extract_receipt(
        &self,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<ReceiptExtraction, PaydeskError>;
}
