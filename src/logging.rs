//! Tracing setup for host binaries/tests, and the append-only force-claim
//! audit log.
//!
//! The library itself never installs a global `tracing` subscriber — only
//! [`init_tracing`] does, and it's meant to be called once by whatever
//! binary or test harness wraps this crate rather than from inside
//! library code.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::TrellisError;
use crate::model::Status;

/// One line of the JSONL audit log: task id, original status, resulting
/// status, worktree context, and timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord<'a> {
    pub timestamp: DateTime<Utc>,
    pub task_id: &'a str,
    pub original_status: Status,
    pub new_status: Status,
    pub worktree: Option<&'a str>,
}

const AUDIT_DIR: &str = ".trellis";
const AUDIT_FILE: &str = "audit.log";

/// Append a force-claim audit record to `<root>/.trellis/audit.log`,
/// creating the directory on demand. Always called *before* the claim's
/// mutating write commits; if the audit write fails, the claim is
/// aborted rather than left unaudited.
pub fn append_force_claim_record(root: &Path, record: &AuditRecord<'_>) -> Result<(), TrellisError> {
    let dir = root.join(AUDIT_DIR);
    std::fs::create_dir_all(&dir)?;

    let line = serde_json::to_string(record).map_err(|e| {
        TrellisError::single(
            crate::error::ErrorCode::InvalidField,
            format!("failed to serialize audit record: {e}"),
        )
    })?;

    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(AUDIT_FILE))?;
    writeln!(file, "{line}")?;
    tracing::warn!(task_id = record.task_id, original_status = %record.original_status, new_status = %record.new_status, "force-claim audit record persisted");
    Ok(())
}

/// Install a `tracing-subscriber` formatting layer honoring `RUST_LOG`.
/// Opt-in for binaries and integration tests; safe to call more than
/// once (later calls are ignored).
#[cfg(any(test, feature = "tracing-init"))]
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn append_force_claim_record_writes_jsonl_line() {
        let tmp = TempDir::new().unwrap();
        let record = AuditRecord {
            timestamp: Utc::now(),
            task_id: "T-k",
            original_status: Status::Done,
            new_status: Status::InProgress,
            worktree: None,
        };
        append_force_claim_record(tmp.path(), &record).unwrap();

        let contents = std::fs::read_to_string(tmp.path().join(".trellis/audit.log")).unwrap();
        assert!(contents.contains("\"task_id\":\"T-k\""));
        assert!(contents.contains("\"original_status\":\"done\""));
    }

    #[test]
    fn append_force_claim_record_appends_multiple_lines() {
        let tmp = TempDir::new().unwrap();
        for _ in 0..3 {
            let record = AuditRecord {
                timestamp: Utc::now(),
                task_id: "T-k",
                original_status: Status::Done,
                new_status: Status::InProgress,
                worktree: None,
            };
            append_force_claim_record(tmp.path(), &record).unwrap();
        }
        let contents = std::fs::read_to_string(tmp.path().join(".trellis/audit.log")).unwrap();
        assert_eq!(contents.lines().count(), 3);
    }
}
