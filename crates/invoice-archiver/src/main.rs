use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use invoice_archiver::auth::{self, AuthMode};
use invoice_archiver::config::{Config, DRIVE_FOLDER_ENV};
use invoice_archiver::mail::GmailClient;
use invoice_archiver::scheduler::{self, DailySchedule};
use invoice_archiver::storage::DriveClient;
use invoice_archiver::{run_job, ArchiverError};

#[derive(Parser)]
#[command(name = "invoice-archiver")]
#[command(about = "Archive PDF invoices from Gmail into a Google Drive folder once a day")]
struct Cli {
    /// Path to the TOML configuration file. Built-in defaults apply when it
    /// does not exist.
    #[arg(
        short,
        long,
        default_value = "invoice-archiver.toml",
        env = "INVOICE_ARCHIVER_CONFIG"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daily scheduler (default)
    Run,
    /// Run a single archiving pass now and exit
    Once,
    /// Authorize Gmail and Drive access interactively and cache the token
    Authorize,
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install crypto provider"))?;

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "invoice_archiver=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    if config.drive_folder_id.is_none() {
        tracing::warn!(
            "{} is not set; uploads will fail until a destination folder is configured",
            DRIVE_FOLDER_ENV
        );
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_scheduler(config).await,
        Commands::Once => {
            run_once(&config).await;
            Ok(())
        }
        Commands::Authorize => authorize(&config).await,
    }
}

async fn run_scheduler(config: Config) -> Result<()> {
    let schedule = DailySchedule::new(config.run_time()?, config.time_zone()?, Utc::now());
    let poll_interval = config.poll_interval();

    scheduler::run_daily(schedule, poll_interval, || run_once(&config)).await;
    Ok(())
}

/// One scheduled pass. Failures are logged, never returned.
async fn run_once(config: &Config) {
    let auth = match auth::build_authenticator(config, AuthMode::Unattended).await {
        Ok(auth) => auth,
        Err(e) => {
            tracing::error!("{}", ArchiverError::Auth(format!("{:#}", e)));
            return;
        }
    };

    if let Err(e) = auth::ensure_token(&auth).await {
        tracing::error!("{}", ArchiverError::Auth(format!("{:#}", e)));
        return;
    }

    match build_clients(config, auth) {
        Ok((gmail, drive)) => {
            run_job(config, &gmail, &drive).await;
        }
        Err(e) => tracing::error!("Failed to create Google API clients: {:#}", e),
    }
}

fn build_clients(config: &Config, auth: auth::GoogleAuth) -> Result<(GmailClient, DriveClient)> {
    let gmail = GmailClient::new(auth.clone())?;
    let drive = DriveClient::new(auth, config.drive_folder_id.clone())?;
    Ok((gmail, drive))
}

async fn authorize(config: &Config) -> Result<()> {
    let auth = auth::build_authenticator(config, AuthMode::Interactive).await?;
    auth::ensure_token(&auth)
        .await
        .context("Authorization did not complete")?;

    println!(
        "Authorization complete. Token cached at {}",
        config.token_cache_path.display()
    );
    Ok(())
}
