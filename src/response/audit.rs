//! Response Audit Trail
//!
//! Appends every ResponseRecord transition to a JSON-lines file, one record
//! per line. Optional; the in-memory registry stays the source of truth.
//!
//! Created: 2026-10-04

use crate::types::ResponseRecord;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Serialized shape of one audit line.
#[derive(Debug, Serialize)]
pub struct AuditEntry {
    pub logged_at: String,
    pub triggering_tx_hash: String,
    pub response_tx_hash: Option<String>,
    pub status: String,
    pub attempts: u32,
    pub submitted_at: String,
    pub error: Option<String>,
    /// Set when the response was only logged, never broadcast
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

impl AuditEntry {
    pub fn new(record: &ResponseRecord, dry_run: bool) -> Self {
        Self {
            logged_at: chrono::Utc::now().to_rfc3339(),
            triggering_tx_hash: format!("{:?}", record.triggering_tx_hash),
            response_tx_hash: record.response_tx_hash.map(|h| format!("{:?}", h)),
            status: record.status.to_string(),
            attempts: record.attempts,
            submitted_at: record.submitted_at.to_rfc3339(),
            error: record.last_error.clone(),
            dry_run,
        }
    }
}

/// JSONL writer shared by the dispatcher and its confirmation watchers.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    file: Mutex<File>,
    dry_run: bool,
}

impl AuditLog {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create audit directory: {:?}", parent))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open audit log: {:?}", path))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
            dry_run: false,
        })
    }

    /// Tag every line as a dry-run response.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &ResponseRecord) -> Result<()> {
        let line = serde_json::to_string(&AuditEntry::new(record, self.dry_run))
            .context("Failed to serialize response record")?;
        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("audit log lock poisoned"))?;
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }

    /// Append, logging instead of propagating; audit failures never affect a pipeline.
    pub fn record(&self, record: &ResponseRecord) {
        if let Err(e) = self.append(record) {
            warn!("Audit write failed ({}): {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseStatus;
    use alloy::primitives::B256;

    #[test]
    fn test_appends_one_json_line_per_transition() {
        let path = std::env::temp_dir().join(format!("sentinel_audit_{}.jsonl", std::process::id()));
        let _ = fs::remove_file(&path);

        let log = AuditLog::open(&path).unwrap();
        let mut record = ResponseRecord::new_pending(B256::repeat_byte(0x11));
        log.append(&record).unwrap();
        record.status = ResponseStatus::Confirmed;
        record.response_tx_hash = Some(B256::repeat_byte(0x22));
        log.append(&record).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let last: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(last["status"], "confirmed");
        assert_eq!(last["attempts"], 1);
        assert!(last["response_tx_hash"].as_str().unwrap().starts_with("0x2222"));
        assert!(last.get("dry_run").is_none());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_dry_run_lines_are_tagged() {
        let path = std::env::temp_dir().join(format!("sentinel_audit_dry_{}.jsonl", std::process::id()));
        let _ = fs::remove_file(&path);

        let log = AuditLog::open(&path).unwrap().dry_run(true);
        log.append(&ResponseRecord::new_pending(B256::repeat_byte(0x33))).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let line: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(line["dry_run"], true);
        assert_eq!(line["status"], "pending");

        let _ = fs::remove_file(&path);
    }
}
