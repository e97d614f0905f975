// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reply generation and delivery.
//!
//! A counterpart's text becomes one generation request. The reply is
//! filtered against the deny-list, guaranteed to carry the payment details
//! when the customer asked for them, then paced and sent.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use paydesk_config::model::{ConversationConfig, HumanizeConfig};
use paydesk_core::{
    EngineSettings, InferenceAdapter, Message, PaydeskError, PaymentDestination, ProtocolHandle,
    StorageAdapter,
};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::{debug, info, warn};

use crate::allocation::AllocationEngine;

/// Replies shorter than this (after trimming) count as empty.
const MIN_REPLY_CHARS: usize = 2;

/// One inbound text to answer.
#[derive(Debug, Clone)]
pub struct Turn<'a> {
    pub connection_id: &'a str,
    pub representative_name: &'a str,
    pub phone: &'a str,
    pub text: &'a str,
}

/// What the reply must say about payment details.
#[derive(Debug, Clone, PartialEq)]
pub enum Disclosure {
    /// No payment intent.
    None,
    /// Intent, and this destination was allocated.
    Account {
        destination: PaymentDestination,
        block: String,
    },
    /// Intent, but nothing is eligible.
    Unavailable,
}

impl Disclosure {
    /// Text appended to canned replies.
    fn canned_suffix<'a>(&'a self, config: &'a ConversationConfig) -> Option<&'a str> {
        match self {
            Disclosure::None => None,
            Disclosure::Account { block, .. } => Some(block),
            Disclosure::Unavailable => Some(&config.unavailable_reply),
        }
    }
}

/// Lower-cases with `İ` folded to `i`, so `İBAN` matches `iban`.
fn fold_case(text: &str) -> String {
    text.replace('İ', "i").to_lowercase()
}

/// Case-insensitive keyword match.
pub fn detect_intent(text: &str, keywords: &[String]) -> bool {
    let folded = fold_case(text);
    keywords
        .iter()
        .filter(|k| !k.trim().is_empty())
        .any(|k| folded.contains(&fold_case(k)))
}

/// Renders the disclosure template for a destination.
pub fn disclosure_block(template: &str, destination: &PaymentDestination) -> String {
    template
        .replace("{bank}", &destination.bank_name)
        .replace("{holder}", &destination.account_holder)
        .replace("{account}", &destination.account_number)
}

/// Assembles the generation prompt.
pub fn build_prompt(
    config: &ConversationConfig,
    settings: &EngineSettings,
    turn: &Turn<'_>,
    disclosure: &Disclosure,
) -> String {
    let mut prompt = config
        .persona_rules
        .replace("{name}", turn.representative_name);
    prompt.push_str("\n\n");
    prompt.push_str(config.tones.for_tone(settings.tone));

    let instruction = settings.system_instruction.trim();
    if !instruction.is_empty() {
        prompt.push_str("\n\nOperator instructions:\n");
        prompt.push_str(instruction);
    }

    match disclosure {
        Disclosure::None => {}
        Disclosure::Account { block, .. } => {
            prompt.push_str("\n\nThe customer wants to pay. Share these payment details exactly:\n");
            prompt.push_str(block);
        }
        Disclosure::Unavailable => {
            prompt.push_str(
                "\n\nThe customer wants to pay, but no account is available right now. Tell them:\n",
            );
            prompt.push_str(&config.unavailable_reply);
        }
    }

    prompt.push_str("\n\nCustomer message:\n");
    prompt.push_str(turn.text);
    prompt.push_str("\n\nYour reply:");
    prompt
}

fn join_canned(head: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) => format!("{head}\n\n{suffix}"),
        None => head.to_string(),
    }
}

/// Whether a reply contains a deny-listed phrase.
pub fn hits_deny_list(reply: &str, deny_list: &[String]) -> bool {
    let folded = fold_case(reply);
    deny_list
        .iter()
        .filter(|p| !p.trim().is_empty())
        .any(|p| folded.contains(&fold_case(p)))
}

/// Appends the disclosure block when the account number is missing.
pub fn ensure_disclosure(reply: &str, disclosure: &Disclosure) -> String {
    match disclosure {
        Disclosure::Account { destination, block }
            if !reply.contains(&destination.account_number) =>
        {
            let trimmed = reply.trim_end().trim_end_matches(['.', '!', '?', ',', ';', ':']);
            format!("{trimmed}\n\n{block}")
        }
        _ => reply.to_string(),
    }
}

/// Post-processes a generated reply (or its absence) into the final text.
pub fn finalize_reply(
    generated: Option<&str>,
    config: &ConversationConfig,
    disclosure: &Disclosure,
) -> String {
    let suffix = disclosure.canned_suffix(config);
    let reply = match generated.map(str::trim) {
        Some(text) if text.chars().count() >= MIN_REPLY_CHARS => text.to_string(),
        _ => return join_canned(&config.greeting, suffix),
    };

    if hits_deny_list(&reply, &config.deny_list) {
        warn!("generated reply hit the deny-list, replacing it");
        return join_canned(&config.safe_reply, suffix);
    }

    ensure_disclosure(&reply, disclosure)
}

fn simplify_diacritics(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'ı' => 'i',
            'ğ' => 'g',
            'ş' => 's',
            other => other,
        })
        .collect()
}

/// Makes a reply look typed by hand.
pub fn humanize<R: Rng>(text: &str, config: &HumanizeConfig, rng: &mut R) -> String {
    let mut out = text.to_string();

    if rng.gen_bool(config.lowercase_first.clamp(0.0, 1.0)) {
        let mut chars = out.chars();
        if let Some(first) = chars.next() {
            out = first.to_lowercase().chain(chars).collect();
        }
    }

    if rng.gen_bool(config.strip_punctuation.clamp(0.0, 1.0))
        && out.ends_with(['.', '!', '?'])
    {
        out.pop();
    }

    if rng.gen_bool(config.simplify_diacritics.clamp(0.0, 1.0)) {
        out = simplify_diacritics(&out);
    }

    out
}

pub struct ConversationEngine {
    config: ConversationConfig,
    storage: Arc<dyn StorageAdapter>,
    inference: Arc<dyn InferenceAdapter>,
    allocation: Arc<AllocationEngine>,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl ConversationEngine {
    pub fn new(
        config: ConversationConfig,
        storage: Arc<dyn StorageAdapter>,
        inference: Arc<dyn InferenceAdapter>,
        allocation: Arc<AllocationEngine>,
    ) -> Self {
        Self {
            config,
            storage,
            inference,
            allocation,
            rng: Mutex::new(Box::new(StdRng::from_entropy())),
        }
    }

    /// Replaces the random source (for deterministic tests).
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Mutex::new(Box::new(rng));
        self
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    pub fn allocation(&self) -> &AllocationEngine {
        &self.allocation
    }

    /// Current operator settings. Defaults when they cannot be read.
    pub async fn settings(&self) -> EngineSettings {
        match self.storage.get_settings().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "failed to read engine settings, using defaults");
                EngineSettings::default()
            }
        }
    }

    /// Picks one of `options` at random.
    pub fn choose<'a>(&self, options: &'a [String]) -> Option<&'a String> {
        if options.is_empty() {
            return None;
        }
        let idx = match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(0..options.len()),
            Err(_) => 0,
        };
        options.get(idx)
    }

    async fn disclosure_for(&self, turn: &Turn<'_>) -> Disclosure {
        if !detect_intent(turn.text, &self.config.intent_keywords) {
            return Disclosure::None;
        }
        match self.allocation.allocate(turn.phone).await {
            Ok(Some(destination)) => {
                let block = disclosure_block(&self.config.disclosure_template, &destination);
                info!(
                    phone = turn.phone,
                    destination_id = %destination.id,
                    "payment intent, destination allocated"
                );
                Disclosure::Account { destination, block }
            }
            Ok(None) => Disclosure::Unavailable,
            Err(e) => {
                warn!(phone = turn.phone, error = %e, "allocation failed");
                Disclosure::Unavailable
            }
        }
    }

    /// Composes the reply text for a turn. Never fails: errors degrade to
    /// canned replies.
    pub async fn compose(&self, turn: &Turn<'_>, settings: &EngineSettings) -> String {
        let disclosure = self.disclosure_for(turn).await;
        let prompt = build_prompt(&self.config, settings, turn, &disclosure);

        let generated = match self.inference.generate_text(&prompt).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(phone = turn.phone, error = %e, "reply generation failed, using canned reply");
                None
            }
        };
        finalize_reply(generated.as_deref(), &self.config, &disclosure)
    }

    /// Answers one inbound text.
    pub async fn handle_text(
        &self,
        handle: &dyn ProtocolHandle,
        turn: &Turn<'_>,
    ) -> Result<Message, PaydeskError> {
        let settings = self.settings().await;
        let reply = self.compose(turn, &settings).await;
        self.deliver(handle, turn.connection_id, turn.phone, &reply, &settings)
            .await
    }

    /// Composing indicator, delay, optional humanizing, send, record.
    pub async fn deliver(
        &self,
        handle: &dyn ProtocolHandle,
        connection_id: &str,
        phone: &str,
        text: &str,
        settings: &EngineSettings,
    ) -> Result<Message, PaydeskError> {
        if let Err(e) = handle.send_composing(phone).await {
            debug!(phone, error = %e, "composing indicator failed");
        }
        if settings.reply_delay_secs > 0 {
            tokio::time::sleep(Duration::from_secs(settings.reply_delay_secs)).await;
        }

        let text = if settings.humanize {
            match self.rng.lock() {
                Ok(mut rng) => humanize(text, &self.config.humanize, &mut *rng),
                Err(_) => text.to_string(),
            }
        } else {
            text.to_string()
        };

        let protocol_id = handle.send_text(phone, &text).await?;
        let message = Message::sent(connection_id, phone, &text, protocol_id);
        self.storage.insert_message(&message).await?;
        debug!(connection_id, phone, message_id = %message.id, "reply delivered");
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn config() -> ConversationConfig {
        ConversationConfig::default()
    }

    fn destination() -> PaymentDestination {
        PaymentDestination {
            id: "d1".into(),
            bank_name: "Ziraat".into(),
            account_holder: "Acme Ltd".into(),
            account_number: "TR12 0001 0002".into(),
            limit: 0.0,
            running_total: 0.0,
            priority: 5,
            usage_count: 0,
            is_active: true,
            created_at: "2026-01-01T00:00:00.000Z".into(),
        }
    }

    fn account_disclosure() -> Disclosure {
        let d = destination();
        Disclosure::Account {
            block: disclosure_block(&config().disclosure_template, &d),
            destination: d,
        }
    }

    fn turn(text: &str) -> Turn<'_> {
        Turn {
            connection_id: "c1",
            representative_name: "Deniz",
            phone: "905551112233",
            text,
        }
    }

    #[test]
    fn intent_matching_is_case_insensitive() {
        let keywords = config().intent_keywords;
        assert!(detect_intent("İBAN atar mısın", &keywords));
        assert!(detect_intent("Para YATIRMAK istiyorum", &keywords));
        assert!(detect_intent("How do I make a DEPOSIT?", &keywords));
        assert!(!detect_intent("merhaba nasılsın", &keywords));
    }

    #[test]
    fn default_keywords_cover_deposit_phrasings() {
        let keywords = config().intent_keywords;
        for phrase in [
            "yatırım yapmak istiyorum",
            "iban alabilir miyim",
            "para yatır",
            "hesap numarası",
            "yatırmak istiyorum",
            "yatırıcam",
            "yatıracağım",
            "yatırayım",
            "nasıl yatırırım",
            "para göndermek istiyorum",
            "para atmak istiyorum",
            "havale yaptım",
            "eft ile",
            "yatirmak",
            "yatirim",
            "yatır",
            "deposit",
            "transfer",
            "gönder",
            "yatıracam",
            "yatiracam",
        ] {
            assert!(detect_intent(phrase, &keywords), "no intent in {phrase:?}");
        }
    }

    #[test]
    fn prompt_carries_persona_tone_and_disclosure() {
        let mut settings = EngineSettings::default();
        settings.system_instruction = "Always mention the weekend bonus.".into();
        let prompt = build_prompt(&config(), &settings, &turn("iban?"), &account_disclosure());
        assert!(prompt.contains("You are Deniz"));
        assert!(prompt.contains(config().tones.informal.as_str()));
        assert!(prompt.contains("weekend bonus"));
        assert!(prompt.contains("TR12 0001 0002"));
        assert!(prompt.contains("iban?"));
    }

    #[test]
    fn prompt_carries_unavailability_note() {
        let prompt = build_prompt(
            &config(),
            &EngineSettings::default(),
            &turn("iban?"),
            &Disclosure::Unavailable,
        );
        assert!(prompt.contains(config().unavailable_reply.as_str()));
    }

    #[test]
    fn deny_listed_reply_is_replaced_wholesale() {
        let reply = finalize_reply(
            Some("Bir yapay zeka olarak size yardımcı olamam."),
            &config(),
            &Disclosure::None,
        );
        assert_eq!(reply, config().safe_reply);
    }

    #[test]
    fn deny_listed_reply_keeps_pending_disclosure() {
        let reply = finalize_reply(Some("As an AI I cannot"), &config(), &account_disclosure());
        assert!(reply.starts_with(&config().safe_reply));
        assert!(reply.contains("TR12 0001 0002"));
    }

    #[test]
    fn missing_account_number_is_appended() {
        let reply = finalize_reply(Some("Tabii, hemen iletiyorum!"), &config(), &account_disclosure());
        assert!(reply.starts_with("Tabii, hemen iletiyorum\n\n"));
        assert!(reply.contains("TR12 0001 0002"));
    }

    #[test]
    fn reply_with_account_number_is_untouched() {
        let text = "IBAN: TR12 0001 0002, bekliyorum.";
        assert_eq!(finalize_reply(Some(text), &config(), &account_disclosure()), text);
    }

    #[test]
    fn empty_generation_falls_back_to_greeting() {
        assert_eq!(finalize_reply(Some(" x "), &config(), &Disclosure::None), config().greeting);
        let with_block = finalize_reply(None, &config(), &account_disclosure());
        assert!(with_block.starts_with(&config().greeting));
        assert!(with_block.contains("TR12 0001 0002"));
        let unavailable = finalize_reply(None, &config(), &Disclosure::Unavailable);
        assert!(unavailable.ends_with(&config().unavailable_reply));
    }

    #[test]
    fn humanize_always_and_never() {
        let always = HumanizeConfig {
            lowercase_first: 1.0,
            strip_punctuation: 1.0,
            simplify_diacritics: 1.0,
        };
        let never = HumanizeConfig {
            lowercase_first: 0.0,
            strip_punctuation: 0.0,
            simplify_diacritics: 0.0,
        };
        let mut rng = StepRng::new(0, 1);
        assert_eq!(humanize("Işığı şimdi açtım.", &always, &mut rng), "isigi simdi açtim");
        assert_eq!(humanize("Işığı şimdi açtım.", &never, &mut rng), "Işığı şimdi açtım.");
    }

    #[test]
    fn humanize_strips_only_one_mark() {
        let cfg = HumanizeConfig {
            lowercase_first: 0.0,
            strip_punctuation: 1.0,
            simplify_diacritics: 0.0,
        };
        let mut rng = StepRng::new(0, 1);
        assert_eq!(humanize("Tamam!!", &cfg, &mut rng), "Tamam!");
        assert_eq!(humanize("Tamam", &cfg, &mut rng), "Tamam");
    }
}
