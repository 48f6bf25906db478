//! Recursive discovery of mixed hierarchical and standalone objects,
//! with optional scope filtering.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{ErrorCode, TrellisError};
use crate::model::{Kind, ObjectFile};
use crate::resolver;

/// One item produced by a scan: either a successfully loaded object, or
/// the path and error of a file that failed to parse. Scanners never
/// abort on a bad file — they yield the failure so the caller
/// (validation pipeline, or a direct listing) decides whether to
/// log-and-skip or fold it into an aggregate.
pub type ScanItem = Result<ObjectFile, (PathBuf, TrellisError)>;

fn is_object_file(name: &str) -> bool {
    matches!(name, "project.md" | "epic.md" | "feature.md")
        || resolver::is_open_task_filename(name)
        || resolver::is_done_task_filename(name)
}

fn is_task_file(name: &str) -> bool {
    resolver::is_open_task_filename(name) || resolver::is_done_task_filename(name)
}

fn walk(dir: &Path, name_filter: fn(&str) -> bool) -> impl Iterator<Item = ScanItem> {
    let dir = dir.to_path_buf();
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(move |entry| {
            entry.file_type().is_file()
                && entry
                    .file_name()
                    .to_str()
                    .map(name_filter)
                    .unwrap_or(false)
        })
        .map(|entry| {
            let path = entry.into_path();
            ObjectFile::load(&path).map_err(|e| {
                tracing::warn!(
                    file = %path.file_name().map(|f| f.to_string_lossy().to_string()).unwrap_or_default(),
                    "skipping unreadable or malformed object file during scan"
                );
                (path, e)
            })
        })
}

/// Every Project, Epic, Feature, and Task under `root` — hierarchical
/// and standalone.
pub fn scan_all(root: &Path, force_subdir: bool) -> impl Iterator<Item = ScanItem> {
    let planning = resolver::planning_dir(root, force_subdir);
    walk(&planning, is_object_file)
}

/// Every Task under `root`, hierarchical and standalone.
pub fn scan_tasks(root: &Path, force_subdir: bool) -> impl Iterator<Item = ScanItem> {
    let planning = resolver::planning_dir(root, force_subdir);
    walk(&planning, is_task_file)
}

/// Recursively scan an arbitrary directory (not necessarily a planning
/// root) for object files, without `planning_dir` resolution. Used by
/// callers who already hold a specific object's own directory (e.g.
/// listing a feature's immediate task children).
pub fn scan_dir_recursive(dir: &Path, only_tasks: bool) -> impl Iterator<Item = ScanItem> {
    walk(dir, if only_tasks { is_task_file } else { is_object_file })
}

/// Task candidates narrowed to a scope id:
/// - `P-<id>`: every task inside that project's hierarchy *plus*
///   standalone tasks.
/// - `E-<id>`: every task within the epic and its features (standalone
///   tasks excluded).
/// - `F-<id>`: only the tasks directly inside the feature.
pub fn filter_by_scope(
    scope_id: &str,
    root: &Path,
    force_subdir: bool,
) -> Result<Vec<ScanItem>, TrellisError> {
    let planning = resolver::planning_dir(root, force_subdir);
    let kind = Kind::from_id_prefix(scope_id).ok_or_else(|| {
        TrellisError::single(ErrorCode::InvalidScope, "scope id does not match P-, E-, or F-")
    })?;

    if kind == Kind::Task {
        return Err(TrellisError::single(
            ErrorCode::InvalidScope,
            "scope must be a project, epic, or feature id, not a task id",
        ));
    }

    let anchor_dir = resolver::id_to_path(kind, scope_id, root, force_subdir)?
        .parent()
        .ok_or_else(|| TrellisError::single(ErrorCode::InvalidScope, "scope object has no containing directory"))?
        .to_path_buf();

    let mut items: Vec<ScanItem> = walk(&anchor_dir, is_task_file).collect();

    if kind == Kind::Project {
        items.extend(walk(&planning.join("tasks-open"), is_task_file));
        items.extend(walk(&planning.join("tasks-done"), is_task_file));
    }

    Ok(items)
}
