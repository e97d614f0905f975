// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound message classification.
//!
//! [`classify`] is pure: it decides what an inbound event is and where it
//! goes. The session's event loop records the message and dispatches it.

use paydesk_core::{Attachment, InboundEvent};

/// Shortest counterpart number accepted.
pub const MIN_PHONE_DIGITS: usize = 7;
/// Longest counterpart number accepted.
pub const MAX_PHONE_DIGITS: usize = 20;

const GROUP_SUFFIX: &str = "@g.us";
const BROADCAST_SUFFIX: &str = "@broadcast";

/// Why an event was not processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    FromSelf,
    Group,
    Broadcast,
    /// The normalized number had an unacceptable length.
    InvalidAddress { digits: usize },
    /// Neither text nor an attachment.
    Empty,
}

/// Where an inbound event goes next.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteDecision {
    Drop(DropReason),
    Text {
        phone: String,
        text: String,
    },
    Media {
        phone: String,
        caption: Option<String>,
        attachment: Attachment,
    },
}

impl RouteDecision {
    pub fn phone(&self) -> Option<&str> {
        match self {
            RouteDecision::Text { phone, .. } | RouteDecision::Media { phone, .. } => Some(phone),
            RouteDecision::Drop(_) => None,
        }
    }
}

/// Reduces a network address to bare digits.
///
/// `905551234567:12@s.whatsapp.net` and `+90 555 123 45 67@s.whatsapp.net`
/// both become `905551234567`.
pub fn normalize_phone(raw: &str) -> String {
    let user = raw.split('@').next().unwrap_or_default();
    let user = user.split(':').next().unwrap_or_default();
    user.chars().filter(char::is_ascii_digit).collect()
}

/// Classifies one inbound protocol message.
pub fn classify(event: &InboundEvent) -> RouteDecision {
    if event.from_self {
        return RouteDecision::Drop(DropReason::FromSelf);
    }
    if event.remote_address.ends_with(GROUP_SUFFIX) {
        return RouteDecision::Drop(DropReason::Group);
    }
    if event.remote_address.ends_with(BROADCAST_SUFFIX) {
        return RouteDecision::Drop(DropReason::Broadcast);
    }

    let phone = normalize_phone(&event.remote_address);
    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&phone.len()) {
        return RouteDecision::Drop(DropReason::InvalidAddress {
            digits: phone.len(),
        });
    }

    let caption = event
        .attachment
        .as_ref()
        .and_then(|a| a.caption.clone());
    let text = [event.text.clone(), event.extended_text.clone(), caption.clone()]
        .into_iter()
        .flatten()
        .find(|t| !t.trim().is_empty());

    match (&event.attachment, text) {
        (Some(attachment), _) => RouteDecision::Media {
            phone,
            caption,
            attachment: attachment.clone(),
        },
        (None, Some(text)) => RouteDecision::Text { phone, text },
        (None, None) => RouteDecision::Drop(DropReason::Empty),
    }
}

/// Text recorded on the message row for an event, if any.
pub fn recorded_text(event: &InboundEvent) -> Option<String> {
    [
        event.text.as_ref(),
        event.extended_text.as_ref(),
        event.attachment.as_ref().and_then(|a| a.caption.as_ref()),
    ]
    .into_iter()
    .flatten()
    .find(|t| !t.trim().is_empty())
    .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use paydesk_core::AttachmentKind;
    use proptest::prelude::*;

    fn event(address: &str) -> InboundEvent {
        InboundEvent {
            message_id: "M1".into(),
            remote_address: address.into(),
            from_self: false,
            text: Some("merhaba".into()),
            extended_text: None,
            attachment: None,
            raw: serde_json::Value::Null,
        }
    }

    fn image(caption: Option<&str>) -> Attachment {
        Attachment {
            kind: AttachmentKind::Image,
            mime_type: Some("image/jpeg".into()),
            file_name: None,
            caption: caption.map(String::from),
        }
    }

    #[test]
    fn normalizes_device_suffix() {
        assert_eq!(normalize_phone("905551234567:12@s.whatsapp.net"), "905551234567");
    }

    #[test]
    fn normalizes_formatted_number() {
        assert_eq!(normalize_phone("+90 555 123 45 67@s.whatsapp.net"), "905551234567");
    }

    #[test]
    fn short_number_is_rejected() {
        assert_eq!(
            classify(&event("12345@s.whatsapp.net")),
            RouteDecision::Drop(DropReason::InvalidAddress { digits: 5 })
        );
    }

    #[test]
    fn overlong_number_is_rejected() {
        let long = format!("{}@s.whatsapp.net", "9".repeat(21));
        assert!(matches!(
            classify(&event(&long)),
            RouteDecision::Drop(DropReason::InvalidAddress { digits: 21 })
        ));
    }

    #[test]
    fn echoes_groups_and_broadcasts_are_dropped() {
        let mut own = event("905551234567@s.whatsapp.net");
        own.from_self = true;
        assert_eq!(classify(&own), RouteDecision::Drop(DropReason::FromSelf));
        assert_eq!(
            classify(&event("120363025@g.us")),
            RouteDecision::Drop(DropReason::Group)
        );
        assert_eq!(
            classify(&event("status@broadcast")),
            RouteDecision::Drop(DropReason::Broadcast)
        );
    }

    #[test]
    fn text_falls_back_to_extended_text() {
        let mut ev = event("905551234567@s.whatsapp.net");
        ev.text = None;
        ev.extended_text = Some("iban atar mısın".into());
        assert_eq!(
            classify(&ev),
            RouteDecision::Text {
                phone: "905551234567".into(),
                text: "iban atar mısın".into()
            }
        );
    }

    #[test]
    fn attachment_routes_to_media() {
        let mut ev = event("905551234567@s.whatsapp.net");
        ev.text = None;
        ev.attachment = Some(image(Some("dekont")));
        match classify(&ev) {
            RouteDecision::Media { phone, caption, attachment } => {
                assert_eq!(phone, "905551234567");
                assert_eq!(caption.as_deref(), Some("dekont"));
                assert_eq!(attachment.kind, AttachmentKind::Image);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(recorded_text(&ev).as_deref(), Some("dekont"));
    }

    #[test]
    fn empty_event_is_dropped() {
        let mut ev = event("905551234567@s.whatsapp.net");
        ev.text = Some("   ".into());
        assert_eq!(classify(&ev), RouteDecision::Drop(DropReason::Empty));
    }

    proptest! {
        #[test]
        fn group_addresses_always_drop(prefix in "[0-9a-z-]{1,30}") {
            let decision = classify(&event(&format!("{prefix}@g.us")));
            prop_assert_eq!(decision, RouteDecision::Drop(DropReason::Group));
        }

        #[test]
        fn normalized_phone_is_digits_only(raw in ".{0,40}") {
            prop_assert!(normalize_phone(&raw).chars().all(|c| c.is_ascii_digit()));
        }
    }
}
