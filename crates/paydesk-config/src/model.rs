// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Paydesk worker.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use paydesk_core::Tone;
use serde::{Deserialize, Serialize};

/// Top-level Paydesk configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PaydeskConfig {
    /// Worker process and session lifecycle settings.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Receipt artifact storage settings.
    #[serde(default)]
    pub media: MediaConfig,

    /// Gemini inference API settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Protocol sidecar bridge settings.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Prompt templates, deny-list and canned replies.
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Payment destination rotation settings.
    #[serde(default)]
    pub allocation: AllocationConfig,
}

/// Worker process configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Instance name, used in logs.
    #[serde(default = "default_worker_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Maximum number of live channel sessions.
    #[serde(default = "default_max_channels")]
    pub max_channels: usize,

    /// Directory holding one authentication-state directory per channel.
    #[serde(default = "default_auth_dir")]
    pub auth_dir: String,

    /// Delay before a new attempt after a non-terminal disconnect.
    #[serde(default = "default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: u64,

    /// Wait before requesting a pairing code on a fresh handshake.
    #[serde(default = "default_pairing_delay_ms")]
    pub pairing_delay_ms: u64,

    /// Interval of the reconcile pass that picks up rows written by other processes.
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,

    /// Composing indicator duration before relaying an operator message.
    #[serde(default = "default_relay_typing_ms")]
    pub relay_typing_ms: u64,

    /// How long shutdown waits for sessions to finish in-flight work.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: default_worker_name(),
            log_level: default_log_level(),
            max_channels: default_max_channels(),
            auth_dir: default_auth_dir(),
            reconnect_backoff_secs: default_reconnect_backoff_secs(),
            pairing_delay_ms: default_pairing_delay_ms(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            relay_typing_ms: default_relay_typing_ms(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

fn default_worker_name() -> String {
    "paydesk".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_channels() -> usize {
    5
}

fn default_auth_dir() -> String {
    data_path("auth_sessions")
}

fn default_reconnect_backoff_secs() -> u64 {
    3
}

fn default_pairing_delay_ms() -> u64 {
    2000
}

fn default_reconcile_interval_secs() -> u64 {
    5
}

fn default_relay_typing_ms() -> u64 {
    1500
}

fn default_drain_timeout_secs() -> u64 {
    30
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    data_path("paydesk.db")
}

fn default_wal_mode() -> bool {
    true
}

/// Receipt artifact storage.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MediaConfig {
    /// Root directory of the filesystem object store.
    #[serde(default = "default_media_root")]
    pub root_dir: String,

    /// Bucket receipts are uploaded to.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Base URL objects are served from. `None` yields `file://` URLs.
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// Upper bound on an inline `data:` URL used when uploads fail.
    #[serde(default = "default_max_inline_bytes")]
    pub max_inline_bytes: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            root_dir: default_media_root(),
            bucket: default_bucket(),
            public_base_url: None,
            max_inline_bytes: default_max_inline_bytes(),
        }
    }
}

fn default_media_root() -> String {
    data_path("media")
}

fn default_bucket() -> String {
    "media".to_string()
}

fn default_max_inline_bytes() -> usize {
    512 * 1024
}

/// Gemini inference API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GeminiConfig {
    /// API key. `None` requires the `GEMINI_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model used for both generation and extraction.
    #[serde(default = "default_gemini_model")]
    pub model: String,

    /// API base URL.
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,

    /// Request timeout.
    #[serde(default = "default_gemini_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_gemini_model(),
            base_url: default_gemini_base_url(),
            timeout_secs: default_gemini_timeout_secs(),
        }
    }
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_gemini_timeout_secs() -> u64 {
    60
}

/// Protocol sidecar bridge configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// WebSocket URL of the protocol sidecar.
    #[serde(default = "default_bridge_url")]
    pub url: String,

    /// Connection attempts before giving up on one establish call.
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    /// Timeout for a single request/response exchange with the sidecar.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: default_bridge_url(),
            connect_retries: default_connect_retries(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_bridge_url() -> String {
    "ws://127.0.0.1:3010".to_string()
}

fn default_connect_retries() -> u32 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Prompt building blocks and canned replies.
///
/// Placeholders: `{name}` (representative), `{amount}`, `{bank}`, `{holder}`,
/// `{account}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConversationConfig {
    /// Hard rules placed at the top of every prompt.
    #[serde(default = "default_persona_rules")]
    pub persona_rules: String,

    /// Style block per tone.
    #[serde(default)]
    pub tones: ToneTemplates,

    /// Case-insensitive substrings that mark a payment-intent message.
    #[serde(default = "default_intent_keywords")]
    pub intent_keywords: Vec<String>,

    /// Case-insensitive substrings that must never reach a customer.
    #[serde(default = "default_deny_list")]
    pub deny_list: Vec<String>,

    #[serde(default = "default_greeting")]
    pub greeting: String,

    /// Replaces a reply that hit the deny-list.
    #[serde(default = "default_safe_reply")]
    pub safe_reply: String,

    /// Sent with a payment-intent reply when no destination is eligible.
    #[serde(default = "default_unavailable_reply")]
    pub unavailable_reply: String,

    #[serde(default = "default_disclosure_template")]
    pub disclosure_template: String,

    #[serde(default = "default_download_failed_reply")]
    pub download_failed_reply: String,

    /// One is picked at random when an amount was recognized.
    #[serde(default = "default_receipt_ack_templates")]
    pub receipt_ack_templates: Vec<String>,

    #[serde(default = "default_receipt_ack_generic")]
    pub receipt_ack_generic: String,

    #[serde(default = "default_receipt_resend")]
    pub receipt_resend: String,

    #[serde(default)]
    pub humanize: HumanizeConfig,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            persona_rules: default_persona_rules(),
            tones: ToneTemplates::default(),
            intent_keywords: default_intent_keywords(),
            deny_list: default_deny_list(),
            greeting: default_greeting(),
            safe_reply: default_safe_reply(),
            unavailable_reply: default_unavailable_reply(),
            disclosure_template: default_disclosure_template(),
            download_failed_reply: default_download_failed_reply(),
            receipt_ack_templates: default_receipt_ack_templates(),
            receipt_ack_generic: default_receipt_ack_generic(),
            receipt_resend: default_receipt_resend(),
            humanize: HumanizeConfig::default(),
        }
    }
}

fn default_persona_rules() -> String {
    "You are {name}, a customer representative answering on a messaging app.\n\
     Rules:\n\
     - Never say or imply that you are an AI, a bot, an assistant or a language model.\n\
     - Reply in the customer's language, in one to three short sentences.\n\
     - Do not invent account details; only repeat the payment details given below.\n\
     - If payment details are given below, include them exactly as written."
        .to_string()
}

fn default_intent_keywords() -> Vec<String> {
    // Stems, so every inflection of the verb matches.
    [
        "yatır",
        "yatir",
        "iban",
        "hesap",
        "havale",
        "eft",
        "ödeme",
        "gönder",
        "para atmak",
        "deposit",
        "transfer",
        "account",
        "payment",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_deny_list() -> Vec<String> {
    [
        "yapay zeka",
        "ai olarak",
        "bot olarak",
        "bir ai",
        "language model",
        "asistan olarak",
        "bir yapay",
        "dil modeli",
        "büyük dil",
        "llm",
        "chatbot",
        "programlandım",
        "eğitildim",
        "as an ai",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_greeting() -> String {
    "Merhaba, size nasıl yardımcı olabilirim?".to_string()
}

fn default_safe_reply() -> String {
    "Merhaba! Size nasıl yardımcı olabilirim?".to_string()
}

fn default_unavailable_reply() -> String {
    "Şu anda aktif hesabımız bulunmuyor, lütfen kısa bir süre sonra tekrar yazın.".to_string()
}

fn default_disclosure_template() -> String {
    "Banka: {bank}\nAlıcı: {holder}\nIBAN: {account}\n\nÖdemeyi yaptıktan sonra dekontu buradan gönderebilirsiniz."
        .to_string()
}

fn default_download_failed_reply() -> String {
    "Dosyanızı alamadık, lütfen tekrar gönderir misiniz?".to_string()
}

fn default_receipt_ack_templates() -> Vec<String> {
    [
        "Dekontunuz alındı, {amount} TL tutarındaki ödemeniz kontrol ediliyor.",
        "Teşekkürler! {amount} TL için gönderdiğiniz dekont incelemeye alındı.",
        "{amount} TL tutarındaki dekontunuz elimize ulaştı, onaylanınca bilgi vereceğiz.",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_receipt_ack_generic() -> String {
    "Dekontunuz alındı, kontrol edilip size dönüş yapılacak.".to_string()
}

fn default_receipt_resend() -> String {
    "Gönderdiğiniz dosyayı dekont olarak okuyamadık, lütfen ödeme dekontunu net bir şekilde tekrar gönderin."
        .to_string()
}

/// Style instructions per tone.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ToneTemplates {
    #[serde(default = "default_tone_informal")]
    pub informal: String,
    #[serde(default = "default_tone_professional")]
    pub professional: String,
    #[serde(default = "default_tone_assertive_sales")]
    pub assertive_sales: String,
    #[serde(default = "default_tone_formal_corporate")]
    pub formal_corporate: String,
}

impl ToneTemplates {
    /// Style block for a tone.
    pub fn for_tone(&self, tone: Tone) -> &str {
        match tone {
            Tone::Informal => &self.informal,
            Tone::Professional => &self.professional,
            Tone::AssertiveSales => &self.assertive_sales,
            Tone::FormalCorporate => &self.formal_corporate,
        }
    }
}

impl Default for ToneTemplates {
    fn default() -> Self {
        Self {
            informal: default_tone_informal(),
            professional: default_tone_professional(),
            assertive_sales: default_tone_assertive_sales(),
            formal_corporate: default_tone_formal_corporate(),
        }
    }
}

fn default_tone_informal() -> String {
    "Style: warm and friendly, like texting a regular customer. Casual wording, an occasional emoji."
        .to_string()
}

fn default_tone_professional() -> String {
    "Style: polite and professional. Clear, complete sentences, no slang, no emoji.".to_string()
}

fn default_tone_assertive_sales() -> String {
    "Style: energetic and persuasive. Encourage the customer to complete the payment now."
        .to_string()
}

fn default_tone_formal_corporate() -> String {
    "Style: formal corporate register. Address the customer formally and keep a neutral tone."
        .to_string()
}

/// Probabilities for the humanizing transform, each in `[0, 1]`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HumanizeConfig {
    #[serde(default = "default_lowercase_first")]
    pub lowercase_first: f64,
    #[serde(default = "default_strip_punctuation")]
    pub strip_punctuation: f64,
    #[serde(default = "default_simplify_diacritics")]
    pub simplify_diacritics: f64,
}

impl Default for HumanizeConfig {
    fn default() -> Self {
        Self {
            lowercase_first: default_lowercase_first(),
            strip_punctuation: default_strip_punctuation(),
            simplify_diacritics: default_simplify_diacritics(),
        }
    }
}

fn default_lowercase_first() -> f64 {
    0.3
}

fn default_strip_punctuation() -> f64 {
    0.4
}

fn default_simplify_diacritics() -> f64 {
    0.15
}

/// Payment destination rotation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AllocationConfig {
    /// Utilization difference above which the less-used destination wins over priority.
    #[serde(default = "default_utilization_gap")]
    pub utilization_gap: f64,

    /// Keep sticky allocations in SQLite so they survive restarts.
    #[serde(default)]
    pub persist_sticky: bool,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            utilization_gap: default_utilization_gap(),
            persist_sticky: false,
        }
    }
}

fn default_utilization_gap() -> f64 {
    0.05
}

fn data_path(leaf: &str) -> String {
    dirs::data_dir()
        .map(|p| p.join("paydesk").join(leaf))
        .unwrap_or_else(|| std::path::PathBuf::from(leaf))
        .to_string_lossy()
        .into_owned()
}
