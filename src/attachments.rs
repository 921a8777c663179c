use crate::message::Attachment;
use sha2::{Digest, Sha256};

/// Fixed prefix shared by every stored attachment object key.
pub const ATTACHMENT_PREFIX: &str = "att/";

/// Attachment annotated for storage: content key, byte size, and (after the
/// parent row is persisted) the owning ids.
#[derive(Debug, Clone)]
pub struct StoredAttachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
    pub content_id: Option<String>,
    /// Content-addressed storage key; identical bytes always map to the
    /// identical object.
    pub key: String,
    pub size: usize,
    pub email_id: i64,
    pub user_id: i64,
    pub account_id: i64,
}

/// Lowercased filename extension including the dot, empty when the filename
/// has none.
pub fn normalized_extension(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!(".{}", ext.to_lowercase())
        }
        _ => String::new(),
    }
}

/// Derive the content-addressed key for an attachment body. The key doubles
/// as the storage path, so deduplication falls out of the hash: same bytes,
/// same object, regardless of filename.
pub fn content_key(content: &[u8], filename: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let digest = hasher.finalize();
    format!(
        "{}{}{}",
        ATTACHMENT_PREFIX,
        hex::encode(digest),
        normalized_extension(filename)
    )
}

/// Annotate every attachment with its content key and size, and return the
/// inline (Content-ID) subset alongside, both in original order.
pub fn annotate_attachments(
    attachments: &[Attachment],
) -> (Vec<StoredAttachment>, Vec<StoredAttachment>) {
    let mut all = Vec::with_capacity(attachments.len());
    let mut inline = Vec::new();

    for attachment in attachments {
        let stored = StoredAttachment {
            filename: attachment.filename.clone(),
            content_type: attachment.content_type.clone(),
            content: attachment.content.clone(),
            content_id: attachment.content_id.clone(),
            key: content_key(&attachment.content, &attachment.filename),
            size: attachment.content.len(),
            email_id: 0,
            user_id: 0,
            account_id: 0,
        };
        if stored.content_id.is_some() {
            inline.push(stored.clone());
        }
        all.push(stored);
    }

    (all, inline)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(filename: &str, content: &[u8], content_id: Option<&str>) -> Attachment {
        Attachment {
            filename: filename.to_string(),
            content_type: "application/octet-stream".to_string(),
            content: content.to_vec(),
            content_id: content_id.map(|id| id.to_string()),
        }
    }

    #[test]
    fn test_same_content_same_key_regardless_of_filename() {
        let a = content_key(b"identical bytes", "invoice.pdf");
        let b = content_key(b"identical bytes", "copy-of-invoice.pdf");
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_content_different_key() {
        let a = content_key(b"payload one", "a.bin");
        let b = content_key(b"payload two", "a.bin");
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_shape() {
        let key = content_key(b"x", "Photo.JPG");
        assert!(key.starts_with(ATTACHMENT_PREFIX));
        assert!(key.ends_with(".jpg"));
        // prefix + 64 hex chars + ".jpg"
        assert_eq!(key.len(), ATTACHMENT_PREFIX.len() + 64 + 4);
    }

    #[test]
    fn test_normalized_extension() {
        assert_eq!(normalized_extension("report.PDF"), ".pdf");
        assert_eq!(normalized_extension("archive.tar.gz"), ".gz");
        assert_eq!(normalized_extension("no-extension"), "");
        assert_eq!(normalized_extension(".hidden"), "");
        assert_eq!(normalized_extension(""), "");
    }

    #[test]
    fn test_annotate_separates_inline_and_keeps_order() {
        let attachments = vec![
            attachment("a.pdf", b"aaa", None),
            attachment("b.png", b"bbb", Some("cid-b")),
            attachment("c.png", b"ccc", Some("cid-c")),
        ];

        let (all, inline) = annotate_attachments(&attachments);
        assert_eq!(all.len(), 3);
        assert_eq!(inline.len(), 2);
        assert_eq!(inline[0].content_id.as_deref(), Some("cid-b"));
        assert_eq!(inline[1].content_id.as_deref(), Some("cid-c"));
        assert_eq!(all[0].size, 3);
        assert!(all.iter().all(|a| a.key.starts_with(ATTACHMENT_PREFIX)));
    }
}
