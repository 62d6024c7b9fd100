//! OAuth setup shared by the Gmail and Drive clients.
//!
//! First-time authorization is a separate, interactive step (`authorize`).
//! Scheduled runs only ever reuse or silently refresh the cached token; if
//! that is impossible they fail instead of waiting for a browser.

use anyhow::{Context, Result};
use google_gmail1::hyper_rustls::HttpsConnector;
use google_gmail1::yup_oauth2::{
    self, authenticator::Authenticator, authenticator_delegate::InstalledFlowDelegate,
    InstalledFlowAuthenticator, InstalledFlowReturnMethod,
};
use hyper_util::client::legacy::connect::HttpConnector;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use crate::config::Config;

pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";
pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

/// Scopes requested during authorization
pub const SCOPES: [&str; 2] = [GMAIL_READONLY_SCOPE, DRIVE_FILE_SCOPE];

pub type GoogleAuth = Authenticator<HttpsConnector<HttpConnector>>;

/// How the authenticator may obtain a token it does not have cached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Open the consent URL and wait for the redirect
    Interactive,
    /// Use the cached refresh token or fail
    Unattended,
}

/// Flow delegate for scheduled runs: refuses to start a consent flow.
struct UnattendedDelegate;

impl InstalledFlowDelegate for UnattendedDelegate {
    fn present_user_url<'a>(
        &'a self,
        _url: &'a str,
        _need_code: bool,
    ) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>> {
        Box::pin(async {
            Err("no usable cached token; run `invoice-archiver authorize` first".to_string())
        })
    }
}

/// Flow delegate for `authorize`: prints the consent URL for the operator.
struct ConsoleDelegate;

impl InstalledFlowDelegate for ConsoleDelegate {
    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        need_code: bool,
    ) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            println!("Open this URL in a browser to authorize access:\n\n{}\n", url);
            if need_code {
                println!("Paste the authorization code and press enter:");
                let mut code = String::new();
                std::io::stdin()
                    .read_line(&mut code)
                    .map_err(|e| format!("Failed to read authorization code: {}", e))?;
                Ok(code.trim().to_string())
            } else {
                Ok(String::new())
            }
        })
    }
}

/// Build the authenticator shared by both Google hubs.
pub async fn build_authenticator(config: &Config, mode: AuthMode) -> Result<GoogleAuth> {
    let secret = yup_oauth2::read_application_secret(&config.credentials_path)
        .await
        .with_context(|| {
            format!(
                "Failed to read OAuth credentials from {}",
                config.credentials_path.display()
            )
        })?;

    let delegate: Box<dyn InstalledFlowDelegate> = match mode {
        AuthMode::Interactive => Box::new(ConsoleDelegate),
        AuthMode::Unattended => Box::new(UnattendedDelegate),
    };

    let auth = InstalledFlowAuthenticator::builder(
        secret,
        InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(Path::new(&config.token_cache_path))
    .flow_delegate(delegate)
    .build()
    .await
    .context("Failed to build authenticator")?;

    Ok(auth)
}

/// Obtain a token covering both scopes, refreshing or prompting as the
/// authenticator's mode allows. Writes the token cache on success.
pub async fn ensure_token(auth: &GoogleAuth) -> Result<()> {
    auth.token(&SCOPES[..])
        .await
        .context("Failed to obtain an access token")?;
    Ok(())
}
