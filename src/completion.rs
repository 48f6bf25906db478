//! Move a task to `tasks-done/`, stamp its filename, flip status, and
//! append a log entry.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{ErrorCode, TrellisError};
use crate::model::{self, Kind, LogEntry, ObjectFile, Status};
use crate::resolver;

/// Fields the caller may supply when completing a task.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub task_id: String,
    pub files_changed: Vec<String>,
}

/// Preconditions: task exists and is currently `in-progress`, `review`,
/// or `open` (direct-to-done completion).
fn check_precondition(status: Status) -> Result<(), TrellisError> {
    match status {
        Status::InProgress | Status::Review | Status::Open => Ok(()),
        Status::Done => Ok(()), // handled as idempotent no-op by the caller
        Status::Draft => Err(TrellisError::single(
            ErrorCode::InvalidStatusForCompletion,
            "task is not in a completable status",
        )),
    }
}

/// Complete a task: idempotent if already done, otherwise rewrites its
/// YAML, appends a log entry, and renames it into `tasks-done/`.
pub fn complete_task(
    req: &CompletionRequest,
    root: &Path,
    force_subdir: bool,
) -> Result<ObjectFile, TrellisError> {
    let path = resolver::id_to_path(Kind::Task, &req.task_id, root, force_subdir)?;
    let existing = ObjectFile::load(&path)?;

    if existing.front_matter.status == Status::Done {
        return Ok(existing);
    }

    check_precondition(existing.front_matter.status)?;

    let now = Utc::now();
    let mut fm = existing.front_matter;
    fm.status = Status::Done;
    fm.updated = now;
    fm.schema_version = model::CURRENT_SCHEMA_VERSION.to_string();

    let entry = LogEntry::Structured {
        timestamp: now,
        files_changed: req.files_changed.clone(),
    };
    let body = model::append_log_entry(&existing.body, &entry);

    let (_, slug_id) = resolver::path_to_id(&path)?;
    let slug = slug_id.trim_start_matches("T-");
    let dest_dir = path
        .parent()
        .and_then(|p| p.parent())
        .map(|p| p.join("tasks-done"))
        .ok_or_else(|| {
            TrellisError::single(ErrorCode::InvalidField, "task path has no tasks-open parent directory")
        })?;
    std::fs::create_dir_all(&dest_dir)?;
    let dest_path = dest_dir.join(resolver::task_filename(slug, Status::Done, now));

    let completed = ObjectFile {
        front_matter: fm,
        body,
        path: dest_path.clone(),
    };
    completed.write_atomic()?;
    remove_old_file_after_rename(&path, &dest_path)?;

    Ok(completed)
}

/// Remove the original open-state file now that the done-state file has
/// been durably written. If the two paths happen to already be the same
/// (shouldn't occur given the directory change, but kept defensive for
/// same-path idempotent callers) this is a no-op — the done-path file is
/// the one readers prefer even if the old file briefly lingers.
fn remove_old_file_after_rename(old_path: &Path, new_path: &Path) -> Result<(), TrellisError> {
    if old_path == new_path {
        return Ok(());
    }
    match std::fs::remove_file(old_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
