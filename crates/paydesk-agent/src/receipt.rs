// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Receipt pipeline: download, store, extract, record, acknowledge.
//!
//! Every fallible step runs an ordered chain of strategies. Only a failed
//! download stops the pipeline; every later failure degrades so the
//! payment proof is still recorded and the customer still gets a reply.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use futures::StreamExt;
use paydesk_config::model::MediaConfig;
use paydesk_core::{
    Attachment, InboundEvent, InferenceAdapter, MinimalTransaction, ObjectStore, PaydeskError,
    ProtocolHandle, ReceiptExtraction, StorageAdapter, Transaction, TransactionStatus, new_id,
    timestamp_now,
};
use tracing::{debug, error, info, warn};

use crate::conversation::ConversationEngine;

/// Placeholder for sender and bank when extraction found none.
pub const NOT_SPECIFIED: &str = "Not specified";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStrategy {
    Buffered,
    Streamed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStrategy {
    Upload,
    /// Only runs after the first upload reported a missing bucket.
    CreateBucketAndRetry,
    InlineDataUrl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertStrategy {
    Full,
    FreshKey,
    Minimal,
}

pub const DOWNLOAD_CHAIN: [DownloadStrategy; 2] =
    [DownloadStrategy::Buffered, DownloadStrategy::Streamed];

pub const UPLOAD_CHAIN: [UploadStrategy; 3] = [
    UploadStrategy::Upload,
    UploadStrategy::CreateBucketAndRetry,
    UploadStrategy::InlineDataUrl,
];

pub const INSERT_CHAIN: [InsertStrategy; 3] = [
    InsertStrategy::Full,
    InsertStrategy::FreshKey,
    InsertStrategy::Minimal,
];

/// Canonical MIME type and file extension for a declared attachment type.
pub fn resolve_mime(declared: Option<&str>) -> (&'static str, &'static str) {
    let declared = declared.unwrap_or_default().to_ascii_lowercase();
    if declared.contains("pdf") {
        ("application/pdf", "pdf")
    } else if declared.contains("png") {
        ("image/png", "png")
    } else {
        ("image/jpeg", "jpg")
    }
}

/// Object path for a stored receipt.
pub fn receipt_path(phone: &str, millis: u128, suffix: &str, ext: &str) -> String {
    format!("receipts/{phone}_{millis}_{suffix}.{ext}")
}

/// A `data:` URL for the bytes, cut to `max_bytes` with a `...` marker.
pub fn inline_data_url(mime: &str, bytes: &[u8], max_bytes: usize) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    let url = format!("data:{mime};base64,{encoded}");
    if url.len() > max_bytes {
        // base64 output is ASCII, so any byte index is a char boundary.
        format!("{}...", &url[..max_bytes])
    } else {
        url
    }
}

/// Idempotency key for an insert attempt.
pub fn idempotency_key(
    strategy: InsertStrategy,
    protocol_id: &str,
    millis: u128,
    suffix: &str,
) -> String {
    match strategy {
        InsertStrategy::Full => format!("{protocol_id}_{millis}_{suffix}"),
        InsertStrategy::FreshKey => format!("retry_{millis}_{suffix}"),
        InsertStrategy::Minimal => format!("min_{millis}_{suffix}"),
    }
}

/// Formats an amount the Turkish way: `1.250,50`.
pub fn format_lira(amount: f64) -> String {
    let cents = (amount.max(0.0) * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    format!("{grouped},{:02}", cents % 100)
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

fn random_suffix() -> String {
    format!("{:08x}", rand::random::<u32>())
}

/// One media message to process.
pub struct ReceiptInput<'a> {
    pub connection_id: &'a str,
    pub phone: &'a str,
    pub event: &'a InboundEvent,
    pub attachment: &'a Attachment,
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiptOutcome {
    /// No bytes could be fetched; the customer was asked to resend.
    DownloadFailed,
    Recorded {
        /// `None` when every insert strategy failed.
        transaction_id: Option<String>,
        strategy: Option<InsertStrategy>,
        extraction: ReceiptExtraction,
        receipt_url: String,
    },
}

pub struct ReceiptPipeline {
    media: MediaConfig,
    storage: Arc<dyn StorageAdapter>,
    objects: Arc<dyn ObjectStore>,
    inference: Arc<dyn InferenceAdapter>,
    conversation: Arc<ConversationEngine>,
}

impl ReceiptPipeline {
    pub fn new(
        media: MediaConfig,
        storage: Arc<dyn StorageAdapter>,
        objects: Arc<dyn ObjectStore>,
        inference: Arc<dyn InferenceAdapter>,
        conversation: Arc<ConversationEngine>,
    ) -> Self {
        Self {
            media,
            storage,
            objects,
            inference,
            conversation,
        }
    }

    /// Runs the whole pipeline for one media message.
    pub async fn process(
        &self,
        handle: &dyn ProtocolHandle,
        input: &ReceiptInput<'_>,
    ) -> Result<ReceiptOutcome, PaydeskError> {
        let settings = self.conversation.settings().await;
        let (mime, ext) = resolve_mime(input.attachment.mime_type.as_deref());

        let Some(bytes) = self.download(handle, input).await else {
            warn!(
                connection_id = input.connection_id,
                phone = input.phone,
                "attachment download failed, asking for a resend"
            );
            let reply = &self.conversation.config().download_failed_reply;
            self.conversation
                .deliver(handle, input.connection_id, input.phone, reply, &settings)
                .await?;
            return Ok(ReceiptOutcome::DownloadFailed);
        };

        let path = receipt_path(input.phone, unix_millis(), &random_suffix(), ext);
        let receipt_url = self.store(&path, &bytes, mime).await;

        let extraction = match self.inference.extract_receipt(&bytes, mime).await {
            Ok(extraction) => extraction,
            Err(e) => {
                warn!(phone = input.phone, error = %e, "extraction failed, recording for manual review");
                ReceiptExtraction::manual_review()
            }
        };

        let (transaction_id, strategy) = self.record(input, &extraction, &receipt_url).await;

        let ack = self.acknowledgement(&extraction);
        self.conversation
            .deliver(handle, input.connection_id, input.phone, &ack, &settings)
            .await?;

        Ok(ReceiptOutcome::Recorded {
            transaction_id,
            strategy,
            extraction,
            receipt_url,
        })
    }

    async fn download(
        &self,
        handle: &dyn ProtocolHandle,
        input: &ReceiptInput<'_>,
    ) -> Option<Vec<u8>> {
        for strategy in DOWNLOAD_CHAIN {
            let result = match strategy {
                DownloadStrategy::Buffered => handle.download_buffered(input.event).await,
                DownloadStrategy::Streamed => collect_stream(handle, input.event).await,
            };
            match result {
                Ok(bytes) if !bytes.is_empty() => {
                    debug!(?strategy, size = bytes.len(), "attachment downloaded");
                    return Some(bytes);
                }
                Ok(_) => warn!(?strategy, "attachment download returned no bytes"),
                Err(e) => warn!(?strategy, error = %e, "attachment download failed"),
            }
        }
        None
    }

    /// Stores the bytes and returns a URL. Never fails.
    async fn store(&self, path: &str, bytes: &[u8], mime: &str) -> String {
        let bucket = self.media.bucket.as_str();
        let mut bucket_missing = false;

        for strategy in UPLOAD_CHAIN {
            let result = match strategy {
                UploadStrategy::Upload => self.objects.upload(bucket, path, bytes, mime).await,
                UploadStrategy::CreateBucketAndRetry if bucket_missing => {
                    match self.objects.create_bucket(bucket).await {
                        Ok(()) => self.objects.upload(bucket, path, bytes, mime).await,
                        Err(e) => Err(e),
                    }
                }
                UploadStrategy::CreateBucketAndRetry => continue,
                UploadStrategy::InlineDataUrl => {
                    warn!(path, "object storage unavailable, keeping receipt inline");
                    return inline_data_url(mime, bytes, self.media.max_inline_bytes);
                }
            };
            match result {
                Ok(url) => {
                    debug!(?strategy, url = %url, "receipt stored");
                    return url;
                }
                Err(PaydeskError::BucketNotFound { bucket }) => {
                    info!(bucket = %bucket, "media bucket missing");
                    bucket_missing = true;
                }
                Err(e) => warn!(?strategy, error = %e, "receipt upload failed"),
            }
        }
        inline_data_url(mime, bytes, self.media.max_inline_bytes)
    }

    /// Writes the transaction through the insert cascade.
    async fn record(
        &self,
        input: &ReceiptInput<'_>,
        extraction: &ReceiptExtraction,
        receipt_url: &str,
    ) -> (Option<String>, Option<InsertStrategy>) {
        let amount = extraction.sanitized_amount();
        let destination_id = match self.conversation.allocation().peek(input.phone).await {
            Ok(destination) => destination.map(|d| d.id),
            Err(e) => {
                warn!(phone = input.phone, error = %e, "destination lookup failed");
                None
            }
        };

        for strategy in INSERT_CHAIN {
            let id = new_id();
            let key = idempotency_key(
                strategy,
                &input.event.message_id,
                unix_millis(),
                &random_suffix(),
            );
            let result = match strategy {
                InsertStrategy::Full | InsertStrategy::FreshKey => {
                    let now = timestamp_now();
                    let transaction = Transaction {
                        id: id.clone(),
                        connection_id: input.connection_id.to_string(),
                        destination_id: destination_id.clone(),
                        sender_name: Some(
                            extraction
                                .sender_name
                                .clone()
                                .unwrap_or_else(|| NOT_SPECIFIED.to_string()),
                        ),
                        amount,
                        bank_name: Some(
                            extraction
                                .bank_name
                                .clone()
                                .unwrap_or_else(|| NOT_SPECIFIED.to_string()),
                        ),
                        counterpart_phone: input.phone.to_string(),
                        receipt_url: Some(receipt_url.to_string()),
                        protocol_message_id: Some(input.event.message_id.clone()),
                        idempotency_key: key,
                        status: TransactionStatus::Pending,
                        details: extraction.details.clone(),
                        created_at: now.clone(),
                        updated_at: now,
                    };
                    self.storage.insert_transaction(&transaction).await
                }
                InsertStrategy::Minimal => {
                    warn!(
                        connection_id = input.connection_id,
                        phone = input.phone,
                        amount,
                        dropped = "destination_id,sender_name,bank_name,receipt_url,protocol_message_id,details",
                        "falling back to minimal transaction record"
                    );
                    let minimal = MinimalTransaction {
                        id: id.clone(),
                        connection_id: input.connection_id.to_string(),
                        counterpart_phone: input.phone.to_string(),
                        amount,
                        status: TransactionStatus::Pending,
                        idempotency_key: key,
                    };
                    self.storage.insert_minimal_transaction(&minimal).await
                }
            };

            match result {
                Ok(()) => {
                    info!(
                        transaction_id = %id,
                        ?strategy,
                        amount,
                        is_receipt = extraction.is_receipt,
                        "transaction recorded"
                    );
                    return (Some(id), Some(strategy));
                }
                Err(e) => warn!(?strategy, error = %e, "transaction insert failed"),
            }
        }

        error!(
            critical = true,
            connection_id = input.connection_id,
            phone = input.phone,
            amount,
            message_id = %input.event.message_id,
            "payment proof could not be recorded"
        );
        (None, None)
    }

    fn acknowledgement(&self, extraction: &ReceiptExtraction) -> String {
        let config = self.conversation.config();
        let amount = extraction.sanitized_amount();
        if extraction.is_receipt && amount > 0.0 {
            match self.conversation.choose(&config.receipt_ack_templates) {
                Some(template) => template.replace("{amount}", &format_lira(amount)),
                None => config.receipt_ack_generic.clone(),
            }
        } else if extraction.is_receipt {
            config.receipt_ack_generic.clone()
        } else {
            config.receipt_resend.clone()
        }
    }
}

async fn collect_stream(
    handle: &dyn ProtocolHandle,
    event: &InboundEvent,
) -> Result<Vec<u8>, PaydeskError> {
    let mut stream = handle.download_streamed(event).await?;
    let mut bytes = Vec::new();
    while let Some(chunk) = stream.next().await {
        bytes.extend_from_slice(&chunk?);
    }
    Ok(bytes)
}
