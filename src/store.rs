use crate::attachments::StoredAttachment;
use crate::config::Settings;
use crate::filter::BanAction;
use crate::message::{Mailbox, ParsedMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

/// Mailbox account owning a recipient address. Read-only here; lookups are
/// case-insensitive and include soft-deleted rows so ban rules still apply
/// to look-alike deleted accounts.
#[derive(Debug, Clone)]
pub struct Account {
    pub account_id: i64,
    pub user_id: i64,
    pub email: String,
    pub is_del: bool,
}

/// Per-user filtering policy: ban list, ban action, and the domains the
/// account may receive on.
#[derive(Debug, Clone, Default)]
pub struct RolePolicy {
    /// Comma-separated mix of exact addresses and `*@domain` wildcards.
    pub ban_email: String,
    pub ban_email_type: BanAction,
    /// Comma-separated domains the account is allowed to receive on.
    pub avail_domain: String,
}

/// Persistence status. `Saving` is the only initial state; every persisted
/// row ends at exactly one of `Receive` or `Noone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailStatus {
    /// Initial write in progress.
    Saving,
    /// Delivered to a known account.
    Receive,
    /// No matching account; kept as an orphan for admin visibility.
    Noone,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailStatus::Saving => "saving",
            EmailStatus::Receive => "receive",
            EmailStatus::Noone => "noone",
        }
    }
}

/// Fields handed to the mail store for the initial `Saving` write.
#[derive(Debug, Clone)]
pub struct EmailRecord {
    pub to_email: String,
    pub to_name: String,
    pub send_email: String,
    pub send_name: String,
    pub subject: String,
    pub content: Option<String>,
    pub text: Option<String>,
    pub recipient: Vec<Mailbox>,
    pub cc: Vec<Mailbox>,
    pub bcc: Vec<Mailbox>,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
    pub message_id: Option<String>,
    pub user_id: i64,
    pub account_id: i64,
    pub is_del: bool,
    pub status: EmailStatus,
}

impl EmailRecord {
    /// Build the persistence record from a parsed message. Owner ids default
    /// to 0 when no account matched; status always starts at `Saving`.
    pub fn from_message(
        envelope_to: &str,
        message: &ParsedMessage,
        account: Option<&Account>,
    ) -> Self {
        EmailRecord {
            to_email: envelope_to.to_string(),
            to_name: message.recipient_display_name(envelope_to),
            send_email: message.from.address.clone(),
            send_name: message.sender_display_name(),
            subject: message.subject.clone(),
            content: message.html.clone(),
            text: message.text.clone(),
            recipient: message.to.clone(),
            cc: message.cc.clone(),
            bcc: message.bcc.clone(),
            in_reply_to: message.in_reply_to.clone(),
            references: message.references.clone(),
            message_id: message.message_id.clone(),
            user_id: account.map(|a| a.user_id).unwrap_or(0),
            account_id: account.map(|a| a.account_id).unwrap_or(0),
            is_del: false,
            status: EmailStatus::Saving,
        }
    }
}

/// Persisted row returned by the mail store.
#[derive(Debug, Clone)]
pub struct PersistedEmail {
    pub email_id: i64,
    pub create_time: DateTime<Utc>,
    pub record: EmailRecord,
}

/// Tenant settings lookup.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn query(&self) -> anyhow::Result<Settings>;
}

/// Account and role lookups.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Find the account owning an address, case-insensitive, including
    /// soft-deleted rows.
    async fn find_by_address(&self, address: &str) -> anyhow::Result<Option<Account>>;

    async fn role_for_user(&self, user_id: i64) -> anyhow::Result<RolePolicy>;
}

/// Email persistence. One logical receive operation writes the row and its
/// inline attachments; the status transition is a separate call.
#[async_trait]
pub trait MailStore: Send + Sync {
    async fn receive(
        &self,
        record: EmailRecord,
        inline_attachments: &[StoredAttachment],
        blob_domain: Option<&str>,
    ) -> anyhow::Result<PersistedEmail>;

    async fn complete_receive(
        &self,
        status: EmailStatus,
        email_id: i64,
    ) -> anyhow::Result<PersistedEmail>;
}

/// Out-of-band object storage for attachment bodies, keyed by content key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn add_attachments(&self, attachments: &[StoredAttachment]) -> anyhow::Result<()>;
}

/// Fixed settings, for the demo binary and tests.
pub struct StaticSettings(pub Settings);

#[async_trait]
impl SettingsSource for StaticSettings {
    async fn query(&self) -> anyhow::Result<Settings> {
        Ok(self.0.clone())
    }
}

/// In-memory account directory.
#[derive(Default)]
pub struct MemoryDirectory {
    accounts: Vec<Account>,
    roles: HashMap<i64, RolePolicy>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, account: Account, role: RolePolicy) -> Self {
        self.roles.insert(account.user_id, role);
        self.accounts.push(account);
        self
    }
}

#[async_trait]
impl AccountDirectory for MemoryDirectory {
    async fn find_by_address(&self, address: &str) -> anyhow::Result<Option<Account>> {
        Ok(self
            .accounts
            .iter()
            .find(|account| account.email.eq_ignore_ascii_case(address))
            .cloned())
    }

    async fn role_for_user(&self, user_id: i64) -> anyhow::Result<RolePolicy> {
        Ok(self.roles.get(&user_id).cloned().unwrap_or_default())
    }
}

/// In-memory mail store recording every call, for the demo binary and tests.
#[derive(Default)]
pub struct MemoryMailStore {
    next_id: AtomicI64,
    rows: Mutex<Vec<PersistedEmail>>,
    inline: Mutex<Vec<StoredAttachment>>,
}

impl MemoryMailStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<PersistedEmail> {
        self.rows.lock().unwrap().clone()
    }

    pub fn inline_attachments(&self) -> Vec<StoredAttachment> {
        self.inline.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailStore for MemoryMailStore {
    async fn receive(
        &self,
        record: EmailRecord,
        inline_attachments: &[StoredAttachment],
        _blob_domain: Option<&str>,
    ) -> anyhow::Result<PersistedEmail> {
        let row = PersistedEmail {
            email_id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            create_time: Utc::now(),
            record,
        };
        self.inline
            .lock()
            .unwrap()
            .extend(inline_attachments.iter().cloned());
        self.rows.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn complete_receive(
        &self,
        status: EmailStatus,
        email_id: i64,
    ) -> anyhow::Result<PersistedEmail> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|row| row.email_id == email_id)
            .ok_or_else(|| anyhow::anyhow!("no such email row: {email_id}"))?;
        row.record.status = status;
        Ok(row.clone())
    }
}

/// In-memory blob store.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<Vec<StoredAttachment>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn objects(&self) -> Vec<StoredAttachment> {
        self.objects.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn add_attachments(&self, attachments: &[StoredAttachment]) -> anyhow::Result<()> {
        self.objects
            .lock()
            .unwrap()
            .extend(attachments.iter().cloned());
        Ok(())
    }
}
