use crate::attachments::annotate_attachments;
use crate::config::{ReceiveMode, RelayMode, RuleFilterMode, split_list};
use crate::filter::{apply_ban_rules, has_domain_permission, parse_ban_list, Verdict};
use crate::message::{parse_message, InboundEnvelope};
use crate::store::{
    AccountDirectory, BlobStore, EmailRecord, EmailStatus, MailStore, SettingsSource,
};
use crate::telegram::{dispatch_all, render_summary, RelaySink, TelegramSink};
use std::sync::Arc;
use tokio::io::AsyncReadExt;

/// Sequences one inbound delivery end to end: decode, filter, persist,
/// relay. Collaborators are injected so the pipeline runs against real
/// services or in-memory fakes alike.
pub struct IntakePipeline {
    settings: Arc<dyn SettingsSource>,
    directory: Arc<dyn AccountDirectory>,
    store: Arc<dyn MailStore>,
    blobs: Option<Arc<dyn BlobStore>>,
    relay: Option<Arc<dyn RelaySink>>,
}

impl IntakePipeline {
    pub fn new(
        settings: Arc<dyn SettingsSource>,
        directory: Arc<dyn AccountDirectory>,
        store: Arc<dyn MailStore>,
        blobs: Option<Arc<dyn BlobStore>>,
    ) -> Self {
        IntakePipeline {
            settings,
            directory,
            store,
            blobs,
            relay: None,
        }
    }

    /// Replace the Telegram sink, used by tests and the demo binary to keep
    /// deliveries off the network.
    pub fn with_relay_sink(mut self, sink: Arc<dyn RelaySink>) -> Self {
        self.relay = Some(sink);
        self
    }

    /// Process one delivery. Never raises past this boundary: any failure is
    /// logged and the message is abandoned. Best effort, at most once; a
    /// duplicate delivery from the edge platform makes a duplicate row.
    pub async fn process(&self, envelope: InboundEnvelope) {
        let to = envelope.to.clone();
        if let Err(e) = self.run(envelope).await {
            log::error!("inbound message for {to} abandoned: {e:#}");
        }
    }

    async fn run(&self, mut envelope: InboundEnvelope) -> anyhow::Result<()> {
        let settings = self.settings.query().await?;

        if settings.receive == ReceiveMode::Closed {
            log::debug!("receive closed, ignoring message for {}", envelope.to);
            return Ok(());
        }

        // The decoder needs the complete message, so drain the stream fully
        // before parsing.
        let mut raw = Vec::new();
        envelope.raw.read_to_end(&mut raw).await?;
        let mut message = parse_message(&raw)?;

        let account = self.directory.find_by_address(&envelope.to).await?;

        if let Some(account) = account.as_ref() {
            // The administrative mailbox is exempt from per-account rules.
            if !account.email.eq_ignore_ascii_case(&settings.admin_email) {
                let role = self.directory.role_for_user(account.user_id).await?;

                if !has_domain_permission(&role.avail_domain, &envelope.to) {
                    log::debug!(
                        "domain of {} not permitted for account {}, dropping",
                        envelope.to,
                        account.account_id
                    );
                    return Ok(());
                }

                let rules = parse_ban_list(&role.ban_email);
                if apply_ban_rules(&mut message, &rules, role.ban_email_type) == Verdict::Drop {
                    log::debug!("sender {} banned, dropping", message.from.address);
                    return Ok(());
                }
            }
        }

        // Redaction, if any, already happened; from here the record is fixed.
        let record = EmailRecord::from_message(&envelope.to, &message, account.as_ref());
        let (mut attachments, inline) = annotate_attachments(&message.attachments);

        let row = self
            .store
            .receive(record, &inline, settings.blob_domain.as_deref())
            .await?;

        for attachment in &mut attachments {
            attachment.email_id = row.email_id;
            attachment.user_id = row.record.user_id;
            attachment.account_id = row.record.account_id;
        }
        if !attachments.is_empty() {
            if let Some(blobs) = &self.blobs {
                blobs.add_attachments(&attachments).await?;
            }
        }

        let status = if account.is_some() {
            EmailStatus::Receive
        } else {
            EmailStatus::Noone
        };
        let row = self.store.complete_receive(status, row.email_id).await?;
        log::debug!("email {} persisted with status {}", row.email_id, status.as_str());

        if settings.rule_type == RuleFilterMode::Rule {
            let allowed = split_list(&settings.rule_emails);
            if !allowed.iter().any(|address| address == &envelope.to) {
                log::debug!("recipient {} not in relay rule list, done", envelope.to);
                return Ok(());
            }
        }

        if settings.tg_bot_status == RelayMode::Open && !settings.tg_chat_ids.trim().is_empty() {
            let sink: Arc<dyn RelaySink> = match &self.relay {
                Some(sink) => sink.clone(),
                None => Arc::new(TelegramSink::new(&settings.tg_bot_token)?),
            };
            let text = render_summary(&row);
            dispatch_all(sink, &settings.tg_chat_ids, &text).await;
        }

        Ok(())
    }
}
