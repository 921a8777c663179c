use lazy_static::lazy_static;
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};
use regex::Regex;
use tokio::io::AsyncRead;

/// Raw delivery handed over by the edge mail-routing platform: one recipient
/// address and the unread message byte stream.
pub struct InboundEnvelope {
    pub to: String,
    pub raw: Box<dyn AsyncRead + Send + Unpin>,
}

impl InboundEnvelope {
    pub fn new(to: impl Into<String>, raw: Box<dyn AsyncRead + Send + Unpin>) -> Self {
        InboundEnvelope {
            to: to.into(),
            raw,
        }
    }

    /// Envelope over an already-buffered message, used by the demo binary
    /// and tests.
    pub fn from_bytes(to: impl Into<String>, raw: Vec<u8>) -> Self {
        InboundEnvelope {
            to: to.into(),
            raw: Box::new(std::io::Cursor::new(raw)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mailbox {
    pub name: String,
    pub address: String,
}

/// One decoded MIME part carried as an attachment. The content key and
/// owning ids are attached later by the deduplicator and the store.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
    /// Content-ID without angle brackets; present means the part is inline
    /// (referenced from the HTML body via `cid:`).
    pub content_id: Option<String>,
}

/// Structured form of one inbound message. Immutable after parsing except
/// for ban-rule redaction.
#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
    pub from: Mailbox,
    pub to: Vec<Mailbox>,
    pub cc: Vec<Mailbox>,
    pub bcc: Vec<Mailbox>,
    pub subject: String,
    pub html: Option<String>,
    pub text: Option<String>,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl ParsedMessage {
    /// Sender display name, falling back to the local part of the address.
    pub fn sender_display_name(&self) -> String {
        if !self.from.name.is_empty() {
            self.from.name.clone()
        } else {
            local_part(&self.from.address).to_string()
        }
    }

    /// Display name of the recipient entry matching the envelope address,
    /// empty when the To list has no such entry.
    pub fn recipient_display_name(&self, envelope_to: &str) -> String {
        self.to
            .iter()
            .find(|mailbox| mailbox.address == envelope_to)
            .map(|mailbox| mailbox.name.clone())
            .unwrap_or_default()
    }
}

/// Decode a complete raw message into structured form. The MIME grammar
/// itself is delegated to mailparse; this walks the part tree and picks out
/// bodies and attachments.
pub fn parse_message(raw: &[u8]) -> anyhow::Result<ParsedMessage> {
    let parsed = mailparse::parse_mail(raw)?;

    let mut message = ParsedMessage {
        from: address_list(&parsed, "From").into_iter().next().unwrap_or_default(),
        to: address_list(&parsed, "To"),
        cc: address_list(&parsed, "Cc"),
        bcc: address_list(&parsed, "Bcc"),
        subject: parsed.headers.get_first_value("Subject").unwrap_or_default(),
        message_id: parsed.headers.get_first_value("Message-ID"),
        in_reply_to: parsed.headers.get_first_value("In-Reply-To"),
        references: parsed.headers.get_first_value("References"),
        ..Default::default()
    };

    collect_parts(&parsed, &mut message)?;
    Ok(message)
}

/// Walk the MIME tree, filling in the first text and HTML bodies and every
/// attachment part, in document order.
fn collect_parts(part: &ParsedMail<'_>, message: &mut ParsedMessage) -> anyhow::Result<()> {
    if !part.subparts.is_empty() {
        for subpart in &part.subparts {
            collect_parts(subpart, message)?;
        }
        return Ok(());
    }

    let disposition = part.get_content_disposition();
    let filename = disposition
        .params
        .get("filename")
        .cloned()
        .or_else(|| part.ctype.params.get("name").cloned());
    let mimetype = part.ctype.mimetype.as_str();
    let is_text_body = mimetype == "text/plain" || mimetype == "text/html";

    let is_attachment = disposition.disposition == DispositionType::Attachment
        || filename.is_some()
        || !is_text_body;

    if is_attachment {
        let content_id = part
            .headers
            .get_first_value("Content-ID")
            .map(|id| id.trim().trim_matches(['<', '>']).to_string());
        message.attachments.push(Attachment {
            filename: filename.unwrap_or_default(),
            content_type: mimetype.to_string(),
            content: part.get_body_raw()?,
            content_id,
        });
        return Ok(());
    }

    match mimetype {
        "text/html" if message.html.is_none() => {
            message.html = Some(part.get_body()?);
        }
        "text/plain" if message.text.is_none() => {
            message.text = Some(part.get_body()?);
        }
        _ => {}
    }
    Ok(())
}

fn address_list(parsed: &ParsedMail<'_>, header: &str) -> Vec<Mailbox> {
    let Some(value) = parsed.headers.get_first_value(header) else {
        return Vec::new();
    };
    let Ok(addrs) = mailparse::addrparse(&value) else {
        log::debug!("unparseable {header} header: {value}");
        return Vec::new();
    };

    let mut mailboxes = Vec::new();
    for addr in addrs.iter() {
        match addr {
            mailparse::MailAddr::Single(info) => mailboxes.push(Mailbox {
                name: info.display_name.clone().unwrap_or_default(),
                address: info.addr.clone(),
            }),
            mailparse::MailAddr::Group(group) => {
                for info in &group.addrs {
                    mailboxes.push(Mailbox {
                        name: info.display_name.clone().unwrap_or_default(),
                        address: info.addr.clone(),
                    });
                }
            }
        }
    }
    mailboxes
}

/// Domain of an address (the part after the last `@`), empty when absent.
pub fn domain_part(address: &str) -> &str {
    address.rsplit_once('@').map(|(_, domain)| domain).unwrap_or("")
}

/// Local part of an address (everything before the last `@`).
pub fn local_part(address: &str) -> &str {
    address.rsplit_once('@').map(|(local, _)| local).unwrap_or(address)
}

lazy_static! {
    static ref TAG_REGEX: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref SPACE_REGEX: Regex = Regex::new(r"[ \t]+").unwrap();
}

/// Reduce an HTML body to readable plain text: strip tags, decode the common
/// entities, collapse runs of spaces.
pub fn html_to_text(html: &str) -> String {
    let mut text = TAG_REGEX.replace_all(html, " ").to_string();
    text = text.replace("&nbsp;", " ");
    text = text.replace("&amp;", "&");
    text = text.replace("&lt;", "<");
    text = text.replace("&gt;", ">");
    text = text.replace("&quot;", "\"");
    text = SPACE_REGEX.replace_all(&text, " ").to_string();
    text.trim().to_string()
}
