// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Paydesk worker.
//!
//! This crate provides the trait definitions, error type, and domain records
//! used throughout the workspace. Every backend (storage, protocol, inference,
//! object store) is reached through a trait defined here.

pub mod error;
pub mod traits;
pub mod types;

pub use error::PaydeskError;
pub use traits::inference::ReceiptExtraction;
pub use traits::protocol::{
    Attachment, AttachmentKind, ByteStream, EstablishRequest, Established, InboundEvent,
    ProtocolEvent,
};
pub use traits::{
    InferenceAdapter, ObjectStore, PluginAdapter, ProtocolConnector, ProtocolHandle,
    StorageAdapter,
};
pub use types::{
    AdapterType, ChangeEvent, ChannelConnection, ConnectionStatus, ConnectionUpdate,
    EngineSettings, HealthStatus, Message, MinimalTransaction, PaymentDestination, Tone,
    Transaction, TransactionStatus, new_id, timestamp_now,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn destination(limit: f64, total: f64, active: bool) -> PaymentDestination {
        PaymentDestination {
            id: "d1".into(),
            bank_name: "Bank".into(),
            account_holder: "Holder".into(),
            account_number: "TR00 0000".into(),
            limit,
            running_total: total,
            priority: 5,
            usage_count: 0,
            is_active: active,
            created_at: timestamp_now(),
        }
    }

    #[test]
    fn connection_status_uses_screaming_case() {
        assert_eq!(ConnectionStatus::QrReady.to_string(), "QR_READY");
        assert_eq!(
            ConnectionStatus::from_str("PAIRING_READY").unwrap(),
            ConnectionStatus::PairingReady
        );
    }

    #[test]
    fn tone_round_trips_through_strings() {
        for tone in [
            Tone::Informal,
            Tone::Professional,
            Tone::AssertiveSales,
            Tone::FormalCorporate,
        ] {
            assert_eq!(Tone::from_str(&tone.to_string()).unwrap(), tone);
        }
        assert_eq!(Tone::AssertiveSales.to_string(), "assertive_sales");
    }

    #[test]
    fn transaction_status_only_moves_forward() {
        use TransactionStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Credited));
        assert!(Approved.can_transition_to(Credited));
        assert!(Approved.can_transition_to(Rejected));
        assert!(!Approved.can_transition_to(Pending));
        assert!(!Credited.can_transition_to(Approved));
        assert!(!Rejected.can_transition_to(Credited));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn transaction_status_parses_case_insensitively() {
        assert_eq!(
            TransactionStatus::from_str("credited").unwrap(),
            TransactionStatus::Credited
        );
    }

    #[test]
    fn unlimited_destination_is_always_eligible_when_active() {
        let d = destination(0.0, 1_000_000.0, true);
        assert!(d.is_eligible());
        assert_eq!(d.utilization(), 0.0);
    }

    #[test]
    fn destination_at_limit_is_not_eligible() {
        assert!(!destination(100.0, 100.0, true).is_eligible());
        assert!(destination(100.0, 99.0, true).is_eligible());
        assert!(!destination(100.0, 10.0, false).is_eligible());
    }

    #[test]
    fn priority_is_clamped() {
        assert_eq!(PaymentDestination::clamp_priority(0), 1);
        assert_eq!(PaymentDestination::clamp_priority(42), 10);
        assert_eq!(PaymentDestination::clamp_priority(7), 7);
    }

    #[test]
    fn manual_review_placeholder_is_a_zero_amount_receipt() {
        let r = ReceiptExtraction::manual_review();
        assert!(r.is_receipt);
        assert_eq!(r.amount, 0.0);
        assert_eq!(r.sender_name.as_deref(), Some("Manual Review"));
    }

    #[test]
    fn engine_settings_debug_redacts_password() {
        let settings = EngineSettings {
            operator_password: Some("hunter2".into()),
            ..EngineSettings::default()
        };
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn operator_pending_message_awaits_relay() {
        let m = Message::operator_pending("c1", "905551234567", "hello");
        assert!(m.awaits_relay());
        assert!(!Message::sent("c1", "905551234567", "hi", None).awaits_relay());
    }

    #[test]
    fn logout_status_detection() {
        use traits::protocol::is_logout_status;
        assert!(is_logout_status(Some(401)));
        assert!(!is_logout_status(Some(428)));
        assert!(!is_logout_status(None));
    }

    proptest::proptest! {
        #[test]
        fn sanitized_amount_is_never_negative(amount in proptest::num::f64::ANY) {
            let r = ReceiptExtraction { amount, ..ReceiptExtraction::not_a_receipt() };
            let clean = r.sanitized_amount();
            proptest::prop_assert!(clean >= 0.0 && clean.is_finite());
        }
    }
}
