use anyhow::{Context, Result};
use async_trait::async_trait;
use google_drive3::api::{File, Scope};
use google_drive3::hyper_rustls::HttpsConnector;
use google_drive3::DriveHub;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::path::Path;

use super::{FileStore, PDF_MIME_TYPE};
use crate::auth::GoogleAuth;

/// Client for uploading files into one Google Drive folder
pub struct DriveClient {
    hub: DriveHub<HttpsConnector<HttpConnector>>,
    folder_id: Option<String>,
}

impl DriveClient {
    pub fn new(auth: GoogleAuth, folder_id: Option<String>) -> Result<Self> {
        let connector = google_drive3::hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .context("Failed to load native TLS roots")?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);
        let hub = DriveHub::new(client, auth);

        Ok(Self { hub, folder_id })
    }

    fn file_metadata(name: &str, folder_id: &str) -> File {
        File {
            name: Some(name.to_string()),
            parents: Some(vec![folder_id.to_string()]),
            mime_type: Some(PDF_MIME_TYPE.to_string()),
            ..Default::default()
        }
    }
}

/// Uploads without a parent would land in the Drive root, so refuse them.
fn destination_folder(folder_id: Option<&str>) -> Result<&str> {
    folder_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .context("No destination folder configured (set DRIVE_FOLDER_ID)")
}

#[async_trait]
impl FileStore for DriveClient {
    async fn upload(&self, path: &Path, name: &str) -> Result<String> {
        let folder_id = destination_folder(self.folder_id.as_deref())?;

        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let mime_type: mime::Mime = PDF_MIME_TYPE
            .parse()
            .context("Invalid upload MIME type")?;

        let (_, created) = self
            .hub
            .files()
            .create(Self::file_metadata(name, folder_id))
            .param("fields", "id")
            .add_scope(Scope::File)
            .upload_resumable(file, mime_type)
            .await
            .context("Failed to upload file to Drive")?;

        created.id.context("Drive returned no file id")
    }
}
