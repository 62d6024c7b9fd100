//! The job body: search the mailbox, extract PDF attachments, archive them.
//!
//! Every failure is caught at the smallest unit it concerns (one message,
//! one attachment, one upload), logged, recorded in the [`RunReport`] and
//! then the loop moves on. Nothing here returns an error to the scheduler.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ArchiverError;
use crate::ledger::ProcessedLedger;
use crate::mail::{is_pdf_name, AttachmentPart, MailSource};
use crate::storage::FileStore;

/// Outcome counters for one run
#[derive(Debug, Default)]
pub struct RunReport {
    pub messages_found: usize,
    pub messages_skipped: usize,
    pub messages_processed: usize,
    pub attachments_archived: usize,
    pub attachments_dead_lettered: usize,
    pub dead_letters_recovered: usize,
    pub failures: Vec<ArchiverError>,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, error: ArchiverError) {
        tracing::error!("{}", error);
        self.failures.push(error);
    }
}

pub struct Archiver<'a> {
    mail: &'a dyn MailSource,
    store: &'a dyn FileStore,
    config: &'a Config,
}

impl<'a> Archiver<'a> {
    pub fn new(mail: &'a dyn MailSource, store: &'a dyn FileStore, config: &'a Config) -> Self {
        Self {
            mail,
            store,
            config,
        }
    }

    /// One full pass. Messages already in `ledger` are skipped; messages
    /// whose extraction completed are added to it.
    pub async fn run(&self, ledger: &mut ProcessedLedger) -> RunReport {
        let mut report = RunReport::default();
        self.run_into(ledger, &mut report).await;
        report
    }

    async fn run_into(&self, ledger: &mut ProcessedLedger, report: &mut RunReport) {
        for dir in [&self.config.scratch_dir, &self.config.dead_letter_dir] {
            if let Err(e) = fs::create_dir_all(dir) {
                report.fail(ArchiverError::Io(e));
                return;
            }
        }

        self.retry_dead_letters(report).await;

        let query = self.config.search_query();
        let message_ids = match self.mail.search(&query).await {
            Ok(ids) => ids,
            Err(e) => {
                report.fail(ArchiverError::Search(format!("{:#}", e)));
                return;
            }
        };

        report.messages_found = message_ids.len();
        tracing::info!("Found {} matching messages", message_ids.len());

        for message_id in &message_ids {
            if ledger.contains(message_id) {
                tracing::debug!("Skipping already processed message {}", message_id);
                report.messages_skipped += 1;
                continue;
            }

            if self.process_message(message_id, report).await {
                ledger.record(message_id, Utc::now());
                report.messages_processed += 1;
            }
        }
    }

    /// Returns true when the message and all of its PDF attachments were
    /// extracted. Upload failures do not count; those files are dead-lettered.
    async fn process_message(&self, message_id: &str, report: &mut RunReport) -> bool {
        let content = match self.mail.fetch_message(message_id).await {
            Ok(content) => content,
            Err(e) => {
                report.fail(ArchiverError::message_fetch(message_id, &e));
                return false;
            }
        };

        let mut complete = true;
        for part in content.pdf_parts() {
            complete &= self.process_attachment(message_id, part, report).await;
        }
        complete
    }

    async fn process_attachment(
        &self,
        message_id: &str,
        part: &AttachmentPart,
        report: &mut RunReport,
    ) -> bool {
        let Some(attachment_id) = part.attachment_id.as_deref() else {
            tracing::debug!(
                "Part {} of message {} has no attachment id, skipping",
                part.filename,
                message_id
            );
            return true;
        };

        let Some(local_name) = safe_filename(&part.filename) else {
            report.fail(ArchiverError::AttachmentFetch {
                message_id: message_id.to_string(),
                filename: part.filename.clone(),
                reason: "filename is not usable as a local path".to_string(),
            });
            return false;
        };

        let data = match self.mail.fetch_attachment(message_id, attachment_id).await {
            Ok(data) => data,
            Err(e) => {
                report.fail(ArchiverError::attachment_fetch(
                    message_id,
                    &part.filename,
                    &e,
                ));
                return false;
            }
        };

        let path = self.config.scratch_dir.join(&local_name);
        if let Err(e) = fs::write(&path, &data) {
            report.fail(ArchiverError::AttachmentFetch {
                message_id: message_id.to_string(),
                filename: part.filename.clone(),
                reason: format!("Failed to write {}: {}", path.display(), e),
            });
            return false;
        }

        tracing::debug!("Saved {} ({} bytes)", path.display(), data.len());
        self.archive_file(message_id, &path, &part.filename, report).await;
        true
    }

    /// Upload `path`. The scratch copy is removed on success and moved to
    /// the dead-letter directory on failure.
    async fn archive_file(
        &self,
        message_id: &str,
        path: &Path,
        name: &str,
        report: &mut RunReport,
    ) {
        match self.store.upload(path, name).await {
            Ok(file_id) => {
                tracing::info!("File {} uploaded successfully, ID: {}", name, file_id);
                report.attachments_archived += 1;
                if let Err(e) = fs::remove_file(path) {
                    tracing::warn!("Failed to remove {}: {}", path.display(), e);
                }
            }
            Err(e) => {
                report.fail(ArchiverError::upload(name, &e));
                match self.dead_letter(message_id, path, name) {
                    Ok(kept) => {
                        tracing::warn!("Kept {} for retry on the next run", kept.display());
                        report.attachments_dead_lettered += 1;
                    }
                    Err(e) => report.fail(ArchiverError::Io(e)),
                }
            }
        }
    }

    /// Move a scratch file into the dead-letter directory under a name no
    /// other pending file uses, with its Drive name in a JSON sidecar.
    fn dead_letter(
        &self,
        message_id: &str,
        path: &Path,
        name: &str,
    ) -> std::io::Result<PathBuf> {
        let local_name = path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name")
        })?;
        let target =
            unique_dead_letter_path(&self.config.dead_letter_dir, message_id, local_name);

        if fs::rename(path, &target).is_err() {
            // Different filesystem
            fs::copy(path, &target)?;
            fs::remove_file(path)?;
        }

        let meta = DeadLetterMeta {
            name: name.to_string(),
            message_id: message_id.to_string(),
        };
        let written = serde_json::to_string_pretty(&meta)
            .map_err(std::io::Error::other)
            .and_then(|json| fs::write(sidecar_path(&target), json));
        if let Err(e) = written {
            tracing::warn!(
                "Failed to record original name for {}: {}; it will be retried as {}",
                target.display(),
                e,
                local_name
            );
        }

        Ok(target)
    }

    /// Retry every PDF left behind by earlier failed uploads.
    async fn retry_dead_letters(&self, report: &mut RunReport) {
        let entries = match fs::read_dir(&self.config.dead_letter_dir) {
            Ok(entries) => entries,
            Err(e) => {
                report.fail(ArchiverError::Io(e));
                return;
            }
        };

        let mut pending: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| p.file_name().and_then(|n| n.to_str()).is_some_and(is_pdf_name))
            .collect();
        pending.sort();

        if pending.is_empty() {
            return;
        }

        tracing::info!("Retrying {} previously failed uploads", pending.len());

        for path in pending {
            let sidecar = sidecar_path(&path);
            let name = match read_dead_letter_meta(&sidecar) {
                Some(meta) => meta.name,
                None => match path.file_name().and_then(|n| n.to_str()) {
                    Some(n) => n.to_string(),
                    None => continue,
                },
            };

            match self.store.upload(&path, &name).await {
                Ok(file_id) => {
                    tracing::info!("File {} uploaded on retry, ID: {}", name, file_id);
                    report.dead_letters_recovered += 1;
                    if let Err(e) = fs::remove_file(&path) {
                        tracing::warn!("Failed to remove {}: {}", path.display(), e);
                    }
                    if sidecar.exists() {
                        if let Err(e) = fs::remove_file(&sidecar) {
                            tracing::warn!("Failed to remove {}: {}", sidecar.display(), e);
                        }
                    }
                }
                Err(e) => report.fail(ArchiverError::upload(&name, &e)),
            }
        }
    }
}

/// Original name of a dead-lettered file, stored next to it
#[derive(Debug, Serialize, Deserialize)]
struct DeadLetterMeta {
    name: String,
    message_id: String,
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut sidecar = path.as_os_str().to_owned();
    sidecar.push(".json");
    PathBuf::from(sidecar)
}

fn read_dead_letter_meta(sidecar: &Path) -> Option<DeadLetterMeta> {
    let content = fs::read_to_string(sidecar).ok()?;
    match serde_json::from_str(&content) {
        Ok(meta) => Some(meta),
        Err(e) => {
            tracing::warn!("Ignoring unreadable {}: {}", sidecar.display(), e);
            None
        }
    }
}

/// `<message>-<name>`, or `<message>-<n>-<name>` when that is taken.
fn unique_dead_letter_path(dir: &Path, message_id: &str, local_name: &str) -> PathBuf {
    let prefix = safe_filename(message_id).unwrap_or_else(|| "message".to_string());

    let first = dir.join(format!("{}-{}", prefix, local_name));
    if !first.exists() {
        return first;
    }

    (1u32..)
        .map(|n| dir.join(format!("{}-{}-{}", prefix, n, local_name)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

/// Reduce an attachment filename to a single safe path component.
pub fn safe_filename(filename: &str) -> Option<String> {
    let base = filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();

    if base.is_empty() || base == "." || base == ".." {
        return None;
    }

    Some(
        base.chars()
            .map(|c| if c.is_control() || c == ':' { '_' } else { c })
            .collect(),
    )
}

/// Load the ledger, run one pass, persist the ledger and log a summary.
///
/// An unparsable ledger is moved aside and the run continues with an empty
/// one, so archiving never stalls on it.
pub async fn run_job(
    config: &Config,
    mail: &dyn MailSource,
    store: &dyn FileStore,
) -> RunReport {
    tracing::info!("Starting invoice processing job");

    let mut report = RunReport::default();
    let mut persist = true;

    let mut ledger = match ProcessedLedger::load(&config.ledger_path, config.ledger_retention_days)
    {
        Ok(ledger) => ledger,
        Err(e @ ArchiverError::Ledger(_)) => {
            report.fail(e);
            match ProcessedLedger::quarantine(&config.ledger_path, Utc::now()) {
                Ok(moved) => tracing::warn!(
                    "Moved unreadable ledger to {}, starting with an empty one",
                    moved.display()
                ),
                Err(e) => {
                    report.fail(ArchiverError::Io(e));
                    persist = false;
                }
            }
            ProcessedLedger::empty(&config.ledger_path, config.ledger_retention_days)
        }
        Err(e) => {
            report.fail(e);
            persist = false;
            ProcessedLedger::empty(&config.ledger_path, config.ledger_retention_days)
        }
    };

    Archiver::new(mail, store, config)
        .run_into(&mut ledger, &mut report)
        .await;

    if persist {
        if let Err(e) = ledger.save(Utc::now()) {
            report.fail(e);
        }
    }

    tracing::info!(
        "Completed invoice processing job: {} found, {} skipped, {} processed, {} archived, {} dead-lettered, {} recovered, {} errors",
        report.messages_found,
        report.messages_skipped,
        report.messages_processed,
        report.attachments_archived,
        report.attachments_dead_lettered,
        report.dead_letters_recovered,
        report.failures.len()
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_filename_keeps_plain_names() {
        assert_eq!(safe_filename("invoice.pdf").as_deref(), Some("invoice.pdf"));
        assert_eq!(
            safe_filename(" Receipt 2026-03.PDF ").as_deref(),
            Some("Receipt 2026-03.PDF")
        );
    }

    #[test]
    fn test_safe_filename_strips_directories() {
        assert_eq!(
            safe_filename("../../etc/invoice.pdf").as_deref(),
            Some("invoice.pdf")
        );
        assert_eq!(
            safe_filename("C:\\Users\\me\\bill.pdf").as_deref(),
            Some("bill.pdf")
        );
    }

    #[test]
    fn test_safe_filename_rejects_empty_components() {
        assert_eq!(safe_filename(""), None);
        assert_eq!(safe_filename("docs/"), None);
        assert_eq!(safe_filename(".."), None);
    }

    #[test]
    fn test_safe_filename_replaces_control_chars() {
        assert_eq!(safe_filename("a\u{0}b.pdf").as_deref(), Some("a_b.pdf"));
    }

    #[test]
    fn test_dead_letter_path_never_reuses_a_name() {
        let dir = tempfile::tempdir().unwrap();

        let first = unique_dead_letter_path(dir.path(), "18c2f", "invoice.pdf");
        assert_eq!(first, dir.path().join("18c2f-invoice.pdf"));
        fs::write(&first, b"one").unwrap();

        let second = unique_dead_letter_path(dir.path(), "18c2f", "invoice.pdf");
        assert_eq!(second, dir.path().join("18c2f-1-invoice.pdf"));
        fs::write(&second, b"two").unwrap();

        let third = unique_dead_letter_path(dir.path(), "18c2f", "invoice.pdf");
        assert_eq!(third, dir.path().join("18c2f-2-invoice.pdf"));
    }

    #[test]
    fn test_sidecar_keeps_pdf_extension() {
        let sidecar = sidecar_path(Path::new("failed/m1-invoice.pdf"));
        assert_eq!(sidecar, PathBuf::from("failed/m1-invoice.pdf.json"));
        assert!(!is_pdf_name(sidecar.to_str().unwrap()));
    }
}
