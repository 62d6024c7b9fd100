use anyhow::{Context, Result};
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ledger::MAX_RETENTION_DAYS;
use crate::query::SearchQuery;

/// Environment variable naming the destination Drive folder
pub const DRIVE_FOLDER_ENV: &str = "DRIVE_FOLDER_ID";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Drive folder that receives uploaded invoices
    #[serde(default)]
    pub drive_folder_id: Option<String>,

    /// Senders whose mail is scanned (`from:` operands, wildcards allowed)
    #[serde(default = "default_senders")]
    pub senders: Vec<String>,

    /// Subject keywords, any of which must match
    #[serde(default = "default_subject_keywords")]
    pub subject_keywords: Vec<String>,

    /// Trailing search window in days
    #[serde(default = "default_window_days")]
    pub window_days: u32,

    /// Wall-clock time of the daily run, "HH:MM"
    #[serde(default = "default_run_at")]
    pub run_at: String,

    /// IANA time zone the run time is expressed in
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// How often the scheduler checks for a due run (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Scratch space for attachments between download and upload
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Holding area for files whose upload failed
    #[serde(default = "default_dead_letter_dir")]
    pub dead_letter_dir: PathBuf,

    /// Path to Google OAuth client credentials JSON file
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,

    /// Path to store the OAuth token cache
    #[serde(default = "default_token_cache")]
    pub token_cache_path: PathBuf,

    /// Processed message ids, persisted between runs
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    /// Days a processed message id is remembered
    #[serde(default = "default_ledger_retention")]
    pub ledger_retention_days: i64,
}

fn default_senders() -> Vec<String> {
    [
        "billing@render.com",
        "support@netlify.com",
        "billing@netlify.com",
        "payments-noreply@google.com",
        "billing@webflow.com",
        "billing@box.com",
        "billing@typeform.com",
        "no-reply@business.amazon.com",
        "*@anthemwelderssupply.com",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_subject_keywords() -> Vec<String> {
    ["invoice", "receipt", "bill", "payment"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_window_days() -> u32 {
    1
}

fn default_run_at() -> String {
    "08:00".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_poll_interval() -> u64 {
    60
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("invoices")
}

fn default_dead_letter_dir() -> PathBuf {
    PathBuf::from("invoices-failed")
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_token_cache() -> PathBuf {
    PathBuf::from("token_cache.json")
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("processed.json")
}

fn default_ledger_retention() -> i64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            drive_folder_id: None,
            senders: default_senders(),
            subject_keywords: default_subject_keywords(),
            window_days: default_window_days(),
            run_at: default_run_at(),
            timezone: default_timezone(),
            poll_interval_secs: default_poll_interval(),
            scratch_dir: default_scratch_dir(),
            dead_letter_dir: default_dead_letter_dir(),
            credentials_path: default_credentials_path(),
            token_cache_path: default_token_cache(),
            ledger_path: default_ledger_path(),
            ledger_retention_days: default_ledger_retention(),
        }
    }
}

impl Config {
    /// Parse a TOML configuration document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Self::from_toml(&content)?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// `DRIVE_FOLDER_ID` takes precedence over the config file.
    pub fn apply_env(&mut self) {
        if let Ok(folder_id) = std::env::var(DRIVE_FOLDER_ENV) {
            if !folder_id.trim().is_empty() {
                self.drive_folder_id = Some(folder_id.trim().to_string());
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.run_time()?;
        self.time_zone()?;
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be greater than zero");
        }
        if self.window_days == 0 {
            anyhow::bail!("window_days must be greater than zero");
        }
        if !(1..=MAX_RETENTION_DAYS).contains(&self.ledger_retention_days) {
            anyhow::bail!(
                "ledger_retention_days must be between 1 and {}, got {}",
                MAX_RETENTION_DAYS,
                self.ledger_retention_days
            );
        }
        Ok(())
    }

    pub fn run_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.run_at, "%H:%M")
            .with_context(|| format!("run_at must be HH:MM, got '{}'", self.run_at))
    }

    pub fn time_zone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid timezone '{}': {}", self.timezone, e))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn search_query(&self) -> SearchQuery {
        SearchQuery::new(
            self.senders.clone(),
            self.subject_keywords.clone(),
            self.window_days,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_deploy_lists() {
        let config = Config::default();
        assert_eq!(config.senders.len(), 9);
        assert!(config
            .senders
            .contains(&"*@anthemwelderssupply.com".to_string()));
        assert_eq!(
            config.subject_keywords,
            vec!["invoice", "receipt", "bill", "payment"]
        );
        assert_eq!(config.window_days, 1);
        assert_eq!(
            config.run_time().unwrap(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap()
        );
        assert_eq!(config.time_zone().unwrap(), chrono_tz::UTC);
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.scratch_dir, PathBuf::from("invoices"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            drive_folder_id = "folder-123"
            senders = ["billing@example.com"]
            run_at = "06:30"
            timezone = "Europe/Berlin"
            "#,
        )
        .unwrap();

        assert_eq!(config.drive_folder_id.as_deref(), Some("folder-123"));
        assert_eq!(config.senders, vec!["billing@example.com"]);
        assert_eq!(config.subject_keywords.len(), 4);
        assert_eq!(
            config.run_time().unwrap(),
            NaiveTime::from_hms_opt(6, 30, 0).unwrap()
        );
        assert_eq!(config.time_zone().unwrap(), chrono_tz::Europe::Berlin);
    }

    #[test]
    fn test_example_file_parses() {
        let config = Config::from_toml(include_str!("../invoice-archiver.example.toml")).unwrap();
        assert_eq!(config.senders, Config::default().senders);
        assert_eq!(config.ledger_retention_days, 30);
    }

    #[test]
    fn test_invalid_run_time_rejected() {
        let result = Config::from_toml(r#"run_at = "8 o'clock""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_timezone_rejected() {
        let result = Config::from_toml(r#"timezone = "Mars/Olympus""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_ledger_retention_bounded() {
        assert!(Config::from_toml("ledger_retention_days = 200000000").is_err());
        assert!(Config::from_toml("ledger_retention_days = 0").is_err());
        assert!(Config::from_toml("ledger_retention_days = -5").is_err());
        assert!(Config::from_toml("ledger_retention_days = 3650").is_ok());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let result = Config::from_toml("poll_interval_secs = 0");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.window_days, 1);
    }
}
