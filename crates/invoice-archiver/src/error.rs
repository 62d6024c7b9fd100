//! Error taxonomy for a single archiving run.
//!
//! Client code works in `anyhow` and attaches context at each call. The job
//! body classifies those failures into `ArchiverError` so every logged line
//! and every entry in the run report says which stage failed and for which
//! message.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiverError {
    /// OAuth bootstrap or token refresh failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The mailbox search could not be executed
    #[error("Search failed: {0}")]
    Search(String),

    /// Fetching the full content of one message failed
    #[error("Error processing message {message_id}: {reason}")]
    MessageFetch { message_id: String, reason: String },

    /// Fetching or persisting one attachment failed
    #[error("Error processing attachment {filename} of message {message_id}: {reason}")]
    AttachmentFetch {
        message_id: String,
        filename: String,
        reason: String,
    },

    /// Uploading one file to the destination folder failed
    #[error("Error uploading {filename}: {reason}")]
    Upload { filename: String, reason: String },

    /// Local filesystem error in the scratch or dead-letter directories
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The processed-message ledger could not be read or written
    #[error("Ledger error: {0}")]
    Ledger(String),
}

impl ArchiverError {
    pub fn message_fetch(message_id: &str, err: &anyhow::Error) -> Self {
        ArchiverError::MessageFetch {
            message_id: message_id.to_string(),
            reason: format!("{:#}", err),
        }
    }

    pub fn attachment_fetch(message_id: &str, filename: &str, err: &anyhow::Error) -> Self {
        ArchiverError::AttachmentFetch {
            message_id: message_id.to_string(),
            filename: filename.to_string(),
            reason: format!("{:#}", err),
        }
    }

    pub fn upload(filename: &str, err: &anyhow::Error) -> Self {
        ArchiverError::Upload {
            filename: filename.to_string(),
            reason: format!("{:#}", err),
        }
    }
}

/// Result type alias for the job body
pub type ArchiverResult<T> = Result<T, ArchiverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_fetch_includes_id_and_context() {
        let err = anyhow::anyhow!("404 not found").context("Failed to get message");
        let wrapped = ArchiverError::message_fetch("18c2f", &err);
        let text = wrapped.to_string();
        assert!(text.contains("18c2f"));
        assert!(text.contains("Failed to get message"));
        assert!(text.contains("404 not found"));
    }

    #[test]
    fn test_upload_names_file() {
        let err = anyhow::anyhow!("quota exceeded");
        let wrapped = ArchiverError::upload("invoice.pdf", &err);
        assert_eq!(
            wrapped.to_string(),
            "Error uploading invoice.pdf: quota exceeded"
        );
    }
}
