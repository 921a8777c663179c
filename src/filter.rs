use crate::config::split_list;
use crate::message::{domain_part, ParsedMessage};
use serde::{Deserialize, Serialize};

/// Sentinel written over html, text and attachments when a content-only ban
/// rule matches. Redaction happens before persistence and is irreversible.
pub const REDACTED_NOTICE: &str = "The content has been deleted";

/// What a matching ban rule does to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BanAction {
    /// Drop the message entirely: no persistence, no relay.
    #[default]
    All,
    /// Keep the message but replace its content with [`REDACTED_NOTICE`].
    Content,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Drop,
}

/// One parsed ban-list entry. Comparisons are case-insensitive; both forms
/// are stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BanRule {
    /// Exact sender address, e.g. `spam@example.com`.
    Address(String),
    /// Whole-domain block from the `*@domain` form, e.g. `*@example.com`.
    Domain(String),
}

impl BanRule {
    pub fn matches(&self, sender_address: &str) -> bool {
        let sender = sender_address.to_lowercase();
        match self {
            BanRule::Address(address) => *address == sender,
            BanRule::Domain(domain) => *domain == domain_part(&sender),
        }
    }
}

/// Parse a comma-separated ban list into rules, dropping empty entries. A
/// bare `*@` produces `Domain("")`, which only matches senders without a
/// domain; this mirrors the original behavior and is deliberately not
/// hardened.
pub fn parse_ban_list(ban_list: &str) -> Vec<BanRule> {
    split_list(ban_list)
        .into_iter()
        .map(|entry| {
            let entry = entry.to_lowercase();
            match entry.strip_prefix("*@") {
                Some(domain) => BanRule::Domain(domain.to_string()),
                None => BanRule::Address(entry),
            }
        })
        .collect()
}

/// Evaluate the ban rules against the message sender, in list order, first
/// match wins. `All` signals [`Verdict::Drop`]; `Content` redacts the
/// message in place and passes it on. Once redacted, later rules cannot
/// change the outcome, so evaluation stops at the first match.
pub fn apply_ban_rules(
    message: &mut ParsedMessage,
    rules: &[BanRule],
    action: BanAction,
) -> Verdict {
    for rule in rules {
        if !rule.matches(&message.from.address) {
            continue;
        }
        log::debug!(
            "ban rule {:?} matched sender {}, action {:?}",
            rule,
            message.from.address,
            action
        );
        match action {
            BanAction::All => return Verdict::Drop,
            BanAction::Content => {
                message.html = Some(REDACTED_NOTICE.to_string());
                message.text = Some(REDACTED_NOTICE.to_string());
                message.attachments.clear();
                return Verdict::Pass;
            }
        }
    }
    Verdict::Pass
}

/// Whether the recipient's domain appears in the role's comma-separated
/// allowed-domain list. An empty list permits nothing.
pub fn has_domain_permission(avail_domains: &str, recipient: &str) -> bool {
    let recipient_domain = domain_part(recipient).to_lowercase();
    split_list(avail_domains)
        .iter()
        .any(|domain| domain.to_lowercase() == recipient_domain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Mailbox;

    fn message_from(address: &str) -> ParsedMessage {
        ParsedMessage {
            from: Mailbox {
                name: "Sender".to_string(),
                address: address.to_string(),
            },
            html: Some("<p>hello</p>".to_string()),
            text: Some("hello".to_string()),
            attachments: vec![crate::message::Attachment {
                filename: "a.bin".to_string(),
                content_type: "application/octet-stream".to_string(),
                content: vec![1, 2, 3],
                content_id: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_ban_list() {
        let rules = parse_ban_list("Spam@Example.com, *@Junk.example,,");
        assert_eq!(
            rules,
            vec![
                BanRule::Address("spam@example.com".to_string()),
                BanRule::Domain("junk.example".to_string()),
            ]
        );
    }

    #[test]
    fn test_exact_match_drops_with_all_action() {
        let rules = parse_ban_list("spam@example.com");
        let mut message = message_from("SPAM@EXAMPLE.COM");
        assert_eq!(
            apply_ban_rules(&mut message, &rules, BanAction::All),
            Verdict::Drop
        );
    }

    #[test]
    fn test_domain_wildcard_matches_whole_domain() {
        let rules = parse_ban_list("*@junk.example");
        let mut message = message_from("anyone@Junk.Example");
        assert_eq!(
            apply_ban_rules(&mut message, &rules, BanAction::All),
            Verdict::Drop
        );
    }

    #[test]
    fn test_domain_wildcard_does_not_match_other_domain() {
        let rules = parse_ban_list("*@junk.example");
        let mut message = message_from("anyone@fine.example");
        assert_eq!(
            apply_ban_rules(&mut message, &rules, BanAction::All),
            Verdict::Pass
        );
        assert_eq!(message.text.as_deref(), Some("hello"));
    }

    #[test]
    fn test_content_action_redacts_in_place() {
        let rules = parse_ban_list("spam@example.com");
        let mut message = message_from("spam@example.com");
        assert_eq!(
            apply_ban_rules(&mut message, &rules, BanAction::Content),
            Verdict::Pass
        );
        assert_eq!(message.html.as_deref(), Some(REDACTED_NOTICE));
        assert_eq!(message.text.as_deref(), Some(REDACTED_NOTICE));
        assert!(message.attachments.is_empty());
    }

    #[test]
    fn test_no_rules_pass_unmodified() {
        let mut message = message_from("ok@example.com");
        assert_eq!(apply_ban_rules(&mut message, &[], BanAction::All), Verdict::Pass);
        assert_eq!(message.html.as_deref(), Some("<p>hello</p>"));
    }

    #[test]
    fn test_bare_wildcard_only_matches_domainless_sender() {
        let rules = parse_ban_list("*@");
        let mut with_domain = message_from("user@example.com");
        assert_eq!(
            apply_ban_rules(&mut with_domain, &rules, BanAction::All),
            Verdict::Pass
        );
        let mut without_domain = message_from("local-only");
        assert_eq!(
            apply_ban_rules(&mut without_domain, &rules, BanAction::All),
            Verdict::Drop
        );
    }

    #[test]
    fn test_domain_permission() {
        assert!(has_domain_permission("tenant.io,other.io", "bob@Tenant.IO"));
        assert!(!has_domain_permission("tenant.io", "bob@elsewhere.io"));
        assert!(!has_domain_permission("", "bob@tenant.io"));
    }
}
