//! Daily job that archives PDF invoices from Gmail into a Google Drive folder.

pub mod archiver;
pub mod auth;
pub mod config;
pub mod error;
pub mod ledger;
pub mod mail;
pub mod query;
pub mod scheduler;
pub mod storage;

pub use archiver::{run_job, Archiver, RunReport};
pub use config::Config;
pub use error::{ArchiverError, ArchiverResult};
