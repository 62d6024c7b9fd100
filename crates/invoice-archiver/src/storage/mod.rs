//! Destination storage for archived attachments.

mod drive_client;

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

pub use drive_client::DriveClient;

/// MIME type recorded on every archived file
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Write-only view of the archive folder
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Upload the file at `path` under `name` and return the id the service
    /// assigned to it.
    async fn upload(&self, path: &Path, name: &str) -> Result<String>;
}
