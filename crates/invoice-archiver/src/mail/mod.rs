//! Mailbox access: search for invoice mail and pull its attachments.

mod gmail_client;

use anyhow::Result;
use async_trait::async_trait;

pub use gmail_client::GmailClient;

use crate::query::SearchQuery;

/// Opaque identifier of one message in the mail service
pub type MessageRef = String;

/// One top-level attachment descriptor from a message payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentPart {
    pub filename: String,
    pub mime_type: Option<String>,
    pub attachment_id: Option<String>,
}

/// True when `filename` ends in `.pdf`, ignoring case
pub fn is_pdf_name(filename: &str) -> bool {
    filename.to_ascii_lowercase().ends_with(".pdf")
}

impl AttachmentPart {
    pub fn is_pdf(&self) -> bool {
        is_pdf_name(&self.filename)
    }
}

/// Attachment descriptors of one message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageContent {
    pub id: String,
    pub parts: Vec<AttachmentPart>,
}

impl MessageContent {
    /// Parts that should be archived
    pub fn pdf_parts(&self) -> impl Iterator<Item = &AttachmentPart> {
        self.parts.iter().filter(|part| part.is_pdf())
    }
}

/// Read-only view of a mailbox
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Message references matching `query`, in service order
    async fn search(&self, query: &SearchQuery) -> Result<Vec<MessageRef>>;

    /// Top-level attachment parts of one message
    async fn fetch_message(&self, message_id: &str) -> Result<MessageContent>;

    /// Decoded bytes of one attachment
    async fn fetch_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(filename: &str) -> AttachmentPart {
        AttachmentPart {
            filename: filename.to_string(),
            mime_type: None,
            attachment_id: Some("att".to_string()),
        }
    }

    #[test]
    fn test_pdf_suffix_is_case_insensitive() {
        assert!(part("invoice.pdf").is_pdf());
        assert!(part("INVOICE.PDF").is_pdf());
        assert!(part("Receipt-2026.Pdf").is_pdf());
    }

    #[test]
    fn test_non_pdf_rejected() {
        assert!(!part("invoice.pdf.zip").is_pdf());
        assert!(!part("logo.png").is_pdf());
        assert!(!part("pdf").is_pdf());
        assert!(!part("").is_pdf());
    }

    #[test]
    fn test_pdf_parts_filters() {
        let content = MessageContent {
            id: "m1".to_string(),
            parts: vec![part("a.pdf"), part("b.txt"), part("c.PDF")],
        };
        let names: Vec<&str> = content.pdf_parts().map(|p| p.filename.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "c.PDF"]);
    }
}
