// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Receipt extraction prompt, response schema and response parsing.

use std::sync::LazyLock;

use paydesk_core::ReceiptExtraction;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

/// First `{` to last `}` in a model response, tolerant of code fences.
static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[\s\S]*\}").expect("static regex"));

/// A lira amount in free text, used when the response is not valid JSON.
static LIRA_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d[\d.,]*)\s*(?:TL|tl|₺)").expect("static regex"));

/// Instruction sent alongside the receipt bytes.
pub fn extraction_prompt(mime_type: &str) -> String {
    let subject = if mime_type == "application/pdf" {
        "PDF document"
    } else {
        "image"
    };
    format!(
        "Analyze this {subject}.\n\
         TASK: decide whether it is a bank transfer (EFT/wire) receipt.\n\
         If it IS a receipt, extract: sender (account holder) name, transfer amount \
         as a plain number in Turkish lira, bank name, receiver name, transaction date \
         and reference number.\n\
         If it is NOT a receipt, return isReceipt: false.\n\
         Give a confidence score between 0 and 100.\n\
         Respond with a single JSON object only."
    )
}

/// JSON schema constraining the extraction response.
pub fn response_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "isReceipt": {"type": "BOOLEAN"},
            "amount": {"type": "NUMBER"},
            "senderName": {"type": "STRING"},
            "bankName": {"type": "STRING"},
            "receiverName": {"type": "STRING"},
            "date": {"type": "STRING"},
            "transactionId": {"type": "STRING"},
            "confidenceScore": {"type": "NUMBER"},
            "reasoning": {"type": "STRING"}
        },
        "required": ["isReceipt"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExtraction {
    #[serde(default)]
    is_receipt: bool,
    #[serde(default)]
    amount: Option<serde_json::Value>,
    #[serde(default)]
    sender_name: Option<String>,
    #[serde(default, alias = "senderBankName")]
    bank_name: Option<String>,
    #[serde(default)]
    receiver_name: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    confidence_score: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
}

impl RawExtraction {
    fn into_extraction(self) -> ReceiptExtraction {
        let amount = match &self.amount {
            Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(serde_json::Value::String(s)) => parse_amount(s).unwrap_or(0.0),
            _ => 0.0,
        };

        let mut details = serde_json::Map::new();
        let extras = [
            ("receiverName", self.receiver_name.map(serde_json::Value::from)),
            ("date", self.date.map(serde_json::Value::from)),
            ("transactionId", self.transaction_id.map(serde_json::Value::from)),
            ("confidenceScore", self.confidence_score.map(serde_json::Value::from)),
            ("reasoning", self.reasoning.map(serde_json::Value::from)),
        ];
        for (key, value) in extras {
            if let Some(value) = value {
                details.insert(key.to_string(), value);
            }
        }

        let extraction = ReceiptExtraction {
            is_receipt: self.is_receipt,
            amount,
            sender_name: non_blank(self.sender_name),
            bank_name: non_blank(self.bank_name),
            details: (!details.is_empty()).then_some(serde_json::Value::Object(details)),
        };
        ReceiptExtraction {
            amount: extraction.sanitized_amount(),
            ..extraction
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parses the model's text into a typed extraction.
///
/// Valid JSON wins. Otherwise a lira amount in the text marks it as a
/// receipt. Anything else is "not a receipt".
pub fn parse_extraction(text: &str) -> ReceiptExtraction {
    if let Some(m) = JSON_OBJECT.find(text) {
        match serde_json::from_str::<RawExtraction>(m.as_str()) {
            Ok(raw) => return raw.into_extraction(),
            Err(e) => debug!(error = %e, "extraction response is not valid JSON"),
        }
    }

    if let Some(caps) = LIRA_AMOUNT.captures(text)
        && let Some(amount) = parse_amount(&caps[1])
    {
        return ReceiptExtraction {
            is_receipt: true,
            amount,
            ..ReceiptExtraction::not_a_receipt()
        };
    }

    ReceiptExtraction::not_a_receipt()
}

/// Parses an amount written with either Turkish (`1.250,50`) or plain
/// (`1250.50`) separators.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        // Both present: the later one is the decimal separator.
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(comma), None) => {
            if cleaned.len() - comma - 1 == 3 && comma > 0 {
                // "1,250" style thousands grouping
                cleaned.replace(',', "")
            } else {
                cleaned.replace(',', ".")
            }
        }
        (None, Some(dot)) => {
            if cleaned.len() - dot - 1 == 3 || cleaned.matches('.').count() > 1 {
                cleaned.replace('.', "")
            } else {
                cleaned
            }
        }
        (None, None) => cleaned,
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}
