use serde::{Deserialize, Serialize};

/// Per-tenant settings record. Read-only from the pipeline's point of view;
/// the hosting layer decides where it comes from (here: a YAML file).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Whether inbound mail is accepted at all.
    pub receive: ReceiveMode,
    /// Administrative mailbox, exempt from per-account filtering.
    pub admin_email: String,
    /// Telegram bot credential used for the relay.
    #[serde(default)]
    pub tg_bot_token: String,
    /// Comma-separated relay destination tokens (`<chatId>` or
    /// `<chatId>/<topicId>`).
    #[serde(default)]
    pub tg_chat_ids: String,
    /// Whether the Telegram relay fires after persistence.
    #[serde(default)]
    pub tg_bot_status: RelayMode,
    /// Whether inbound mail is additionally forwarded to another mailbox.
    #[serde(default)]
    pub forward_status: RelayMode,
    /// Forward target address, used when `forward_status` is open.
    #[serde(default)]
    pub forward_email: String,
    /// Recipient allow-filter applied before any external relay.
    #[serde(default)]
    pub rule_type: RuleFilterMode,
    /// Comma-separated recipient addresses for `RuleFilterMode::Rule`.
    #[serde(default)]
    pub rule_emails: String,
    /// Public base domain of the attachment blob store, when one is attached.
    #[serde(default)]
    pub blob_domain: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiveMode {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    Open,
    #[default]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuleFilterMode {
    #[default]
    Off,
    Rule,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            receive: ReceiveMode::Open,
            admin_email: "admin@example.com".to_string(),
            tg_bot_token: String::new(),
            tg_chat_ids: String::new(),
            tg_bot_status: RelayMode::Closed,
            forward_status: RelayMode::Closed,
            forward_email: String::new(),
            rule_type: RuleFilterMode::Off,
            rule_emails: String::new(),
            blob_domain: None,
        }
    }
}

impl Settings {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&content)?;
        Ok(settings)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Split a comma-separated configuration value into trimmed, non-empty
/// tokens, preserving order. Every comma-list in the settings and role
/// records goes through this.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| item.to_string())
        .collect()
}
