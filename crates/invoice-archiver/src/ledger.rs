//! Persisted record of messages that have already been archived.
//!
//! The search window alone would reprocess a message if two runs overlap it,
//! and would miss one after downtime. The ledger makes reprocessing explicit:
//! a message id present here is skipped, whatever the window says.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ArchiverError, ArchiverResult};

/// Upper bound on how long a processed id is remembered
pub const MAX_RETENTION_DAYS: i64 = 3650;

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    processed: BTreeMap<String, DateTime<Utc>>,
}

pub struct ProcessedLedger {
    path: PathBuf,
    entries: BTreeMap<String, DateTime<Utc>>,
    retention: Duration,
}

impl ProcessedLedger {
    /// Load the ledger from `path`. A missing file is an empty ledger.
    pub fn load(path: &Path, retention_days: i64) -> ArchiverResult<Self> {
        let entries = if path.exists() {
            let content = fs::read_to_string(path)?;
            let file: LedgerFile = serde_json::from_str(&content).map_err(|e| {
                ArchiverError::Ledger(format!("Failed to parse {}: {}", path.display(), e))
            })?;
            file.processed
        } else {
            BTreeMap::new()
        };

        let mut ledger = Self::empty(path, retention_days);
        ledger.entries = entries;
        Ok(ledger)
    }

    /// An empty ledger that will be written to `path` on save.
    pub fn empty(path: &Path, retention_days: i64) -> Self {
        Self {
            path: path.to_path_buf(),
            entries: BTreeMap::new(),
            retention: Duration::days(retention_days.clamp(1, MAX_RETENTION_DAYS)),
        }
    }

    /// Move an unreadable ledger file aside, keeping it for inspection.
    pub fn quarantine(path: &Path, now: DateTime<Utc>) -> std::io::Result<PathBuf> {
        let mut target = path.as_os_str().to_owned();
        target.push(format!(".corrupt-{}", now.format("%Y%m%d%H%M%S")));
        let target = PathBuf::from(target);
        fs::rename(path, &target)?;
        Ok(target)
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.entries.contains_key(message_id)
    }

    pub fn record(&mut self, message_id: &str, at: DateTime<Utc>) {
        self.entries.insert(message_id.to_string(), at);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries older than the retention period. Returns how many were
    /// removed.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        // Nothing can be older than a cutoff before the representable range
        let Some(cutoff) = now.checked_sub_signed(self.retention) else {
            return 0;
        };
        let before = self.entries.len();
        self.entries.retain(|_, processed_at| *processed_at >= cutoff);
        before - self.entries.len()
    }

    /// Prune, then write the ledger back to disk.
    pub fn save(&mut self, now: DateTime<Utc>) -> ArchiverResult<()> {
        let pruned = self.prune(now);
        if pruned > 0 {
            tracing::debug!("Pruned {} expired ledger entries", pruned);
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = LedgerFile {
            processed: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| ArchiverError::Ledger(format!("Failed to serialize ledger: {}", e)))?;

        // Never leave a truncated ledger behind
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ProcessedLedger::load(&dir.path().join("processed.json"), 30).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.json");

        let mut ledger = ProcessedLedger::load(&path, 30).unwrap();
        ledger.record("msg-1", at("2026-03-10T08:00:00Z"));
        ledger.save(at("2026-03-10T08:05:00Z")).unwrap();

        let reloaded = ProcessedLedger::load(&path, 30).unwrap();
        assert!(reloaded.contains("msg-1"));
        assert!(!reloaded.contains("msg-2"));
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn test_prune_drops_expired_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ProcessedLedger::load(&dir.path().join("p.json"), 7).unwrap();
        ledger.record("old", at("2026-03-01T08:00:00Z"));
        ledger.record("recent", at("2026-03-09T08:00:00Z"));

        let removed = ledger.prune(at("2026-03-10T08:00:00Z"));
        assert_eq!(removed, 1);
        assert!(!ledger.contains("old"));
        assert!(ledger.contains("recent"));
    }

    #[test]
    fn test_huge_retention_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ProcessedLedger::load(&dir.path().join("p.json"), i64::MAX).unwrap();
        ledger.record("2020", at("2020-01-01T00:00:00Z"));
        ledger.record("2010", at("2010-01-01T00:00:00Z"));

        // Capped at MAX_RETENTION_DAYS
        ledger.save(at("2026-03-10T08:00:00Z")).unwrap();
        assert!(ledger.contains("2020"));
        assert!(!ledger.contains("2010"));
    }

    #[test]
    fn test_quarantine_moves_file_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.json");
        fs::write(&path, "{ truncated").unwrap();

        let moved = ProcessedLedger::quarantine(&path, at("2026-03-10T08:00:00Z")).unwrap();
        assert_eq!(
            moved,
            dir.path().join("processed.json.corrupt-20260310080000")
        );
        assert!(!path.exists());
        assert_eq!(fs::read_to_string(moved).unwrap(), "{ truncated");
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.json");
        fs::write(&path, "not json").unwrap();

        let result = ProcessedLedger::load(&path, 30);
        assert!(matches!(result, Err(ArchiverError::Ledger(_))));
    }
}
