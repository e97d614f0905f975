// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.
//!
//! All problems are collected before returning.

use crate::diagnostic::ConfigError;
use crate::model::PaydeskConfig;

/// Hard ceiling on concurrent channel sessions.
pub const MAX_CHANNELS_CEILING: usize = 5;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
pub fn validate_config(config: &PaydeskConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let worker = &config.worker;
    if !LOG_LEVELS.contains(&worker.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ConfigError::invalid(
            "worker.log_level",
            format!("`{}` is not one of {}", worker.log_level, LOG_LEVELS.join(", ")),
        ));
    }
    if worker.max_channels == 0 || worker.max_channels > MAX_CHANNELS_CEILING {
        errors.push(ConfigError::invalid(
            "worker.max_channels",
            format!("must be between 1 and {MAX_CHANNELS_CEILING}, got {}", worker.max_channels),
        ));
    }
    if worker.auth_dir.trim().is_empty() {
        errors.push(ConfigError::invalid("worker.auth_dir", "must not be empty"));
    }
    if worker.reconnect_backoff_secs == 0 {
        errors.push(ConfigError::invalid(
            "worker.reconnect_backoff_secs",
            "must be at least 1 second",
        ));
    }
    if worker.reconcile_interval_secs == 0 {
        errors.push(ConfigError::invalid(
            "worker.reconcile_interval_secs",
            "must be at least 1 second",
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::invalid("storage.database_path", "must not be empty"));
    }

    if config.media.root_dir.trim().is_empty() {
        errors.push(ConfigError::invalid("media.root_dir", "must not be empty"));
    }
    if !is_valid_bucket_name(&config.media.bucket) {
        errors.push(ConfigError::invalid(
            "media.bucket",
            format!(
                "`{}` must be lowercase letters, digits, `-` or `_`",
                config.media.bucket
            ),
        ));
    }

    let url = config.bridge.url.trim();
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        errors.push(ConfigError::invalid(
            "bridge.url",
            format!("`{url}` must start with ws:// or wss://"),
        ));
    }

    let conversation = &config.conversation;
    if conversation.intent_keywords.iter().all(|k| k.trim().is_empty()) {
        errors.push(ConfigError::invalid(
            "conversation.intent_keywords",
            "must contain at least one keyword",
        ));
    }
    if conversation.receipt_ack_templates.is_empty() {
        errors.push(ConfigError::invalid(
            "conversation.receipt_ack_templates",
            "must contain at least one template",
        ));
    }
    if !conversation.disclosure_template.contains("{account}") {
        errors.push(ConfigError::invalid(
            "conversation.disclosure_template",
            "must contain the `{account}` placeholder",
        ));
    }
    for (key, p) in [
        ("conversation.humanize.lowercase_first", conversation.humanize.lowercase_first),
        ("conversation.humanize.strip_punctuation", conversation.humanize.strip_punctuation),
        (
            "conversation.humanize.simplify_diacritics",
            conversation.humanize.simplify_diacritics,
        ),
    ] {
        if !(0.0..=1.0).contains(&p) {
            errors.push(ConfigError::invalid(key, format!("probability {p} is outside [0, 1]")));
        }
    }

    let gap = config.allocation.utilization_gap;
    if !(0.0..1.0).contains(&gap) {
        errors.push(ConfigError::invalid(
            "allocation.utilization_gap",
            format!("must be in [0, 1), got {gap}"),
        ));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn is_valid_bucket_name(bucket: &str) -> bool {
    !bucket.is_empty()
        && bucket
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}
