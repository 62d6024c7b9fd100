//! Gmail API client for finding invoice mail and downloading attachments.

use anyhow::{Context, Result};
use async_trait::async_trait;
use google_gmail1::api::{Message, MessagePart, Scope};
use google_gmail1::hyper_rustls::HttpsConnector;
use google_gmail1::Gmail;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use super::{AttachmentPart, MailSource, MessageContent, MessageRef};
use crate::auth::GoogleAuth;
use crate::query::SearchQuery;

const USER_ID: &str = "me";

/// Client for interacting with Gmail API
pub struct GmailClient {
    hub: Gmail<HttpsConnector<HttpConnector>>,
}

impl GmailClient {
    /// Create a new Gmail client sharing an existing authenticator
    pub fn new(auth: GoogleAuth) -> Result<Self> {
        let connector = google_gmail1::hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .context("Failed to load native TLS roots")?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);
        let hub = Gmail::new(client, auth);

        Ok(Self { hub })
    }

    fn parse_message(message: Message) -> MessageContent {
        let id = message.id.clone().unwrap_or_default();
        let parts = message
            .payload
            .and_then(|payload| payload.parts)
            .map(|parts| parts.iter().filter_map(Self::parse_part).collect())
            .unwrap_or_default();

        MessageContent { id, parts }
    }

    /// Top-level parts only; parts without a filename are message bodies.
    fn parse_part(part: &MessagePart) -> Option<AttachmentPart> {
        let filename = part.filename.as_deref().filter(|f| !f.is_empty())?;

        Some(AttachmentPart {
            filename: filename.to_string(),
            mime_type: part.mime_type.clone(),
            attachment_id: part
                .body
                .as_ref()
                .and_then(|body| body.attachment_id.clone()),
        })
    }
}

#[async_trait]
impl MailSource for GmailClient {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<MessageRef>> {
        let q = query.to_query_string();
        tracing::debug!("Searching mailbox: {}", q);

        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut call = self
                .hub
                .users()
                .messages_list(USER_ID)
                .q(&q)
                .add_scope(Scope::Readonly);
            if let Some(token) = &page_token {
                call = call.page_token(token);
            }

            let (_, response) = call.doit().await.context("Failed to list messages")?;

            ids.extend(
                response
                    .messages
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|msg| msg.id),
            );

            match response.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(ids)
    }

    async fn fetch_message(&self, message_id: &str) -> Result<MessageContent> {
        let (_, message) = self
            .hub
            .users()
            .messages_get(USER_ID, message_id)
            .format("full")
            .add_scope(Scope::Readonly)
            .doit()
            .await
            .context("Failed to get message")?;

        Ok(Self::parse_message(message))
    }

    async fn fetch_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
        let (_, body) = self
            .hub
            .users()
            .messages_attachments_get(USER_ID, message_id, attachment_id)
            .add_scope(Scope::Readonly)
            .doit()
            .await
            .context("Failed to get attachment")?;

        // The client library undoes the URL-safe base64 transport encoding
        body.data.context("Attachment response carried no data")
    }
}
