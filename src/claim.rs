//! Atomic, priority-ordered task claiming with scope filtering, direct
//! claim by id, and force-override.

use std::path::Path;

use chrono::Utc;

use crate::error::{ErrorCode, TrellisError};
use crate::graph::TaskGraph;
use crate::logging::{self, AuditRecord};
use crate::model::{FrontMatter, Kind, LogEntry, ObjectFile, Status};
use crate::resolver;
use crate::scanner;
use crate::security;

/// Parameters for a claim call. Exactly one of `scope` / `task_id` may be
/// set, and `force_claim` requires `task_id`.
#[derive(Debug, Clone, Default)]
pub struct ClaimRequest {
    pub scope: Option<String>,
    pub task_id: Option<String>,
    pub force_claim: bool,
    pub worktree: Option<String>,
}

/// The outcome of a successful claim.
#[derive(Debug, Clone)]
pub struct ClaimResult {
    pub object: ObjectFile,
    /// Set when this claim bypassed normal preconditions via
    /// `force_claim`; carries the task's prior status for the audit log.
    pub forced_from: Option<Status>,
}

fn validate_request(req: &ClaimRequest) -> Result<(), TrellisError> {
    if req.scope.is_some() && req.task_id.is_some() {
        return Err(TrellisError::single(
            ErrorCode::MutualExclusivityViolation,
            "scope and taskId are mutually exclusive",
        ));
    }
    if req.force_claim && req.task_id.is_none() {
        return Err(TrellisError::single(
            ErrorCode::MutualExclusivityViolation,
            "force_claim requires taskId",
        ));
    }
    if let Some(scope) = &req.scope {
        security::check_id_security(scope)?;
        match Kind::from_id_prefix(scope) {
            Some(Kind::Project) | Some(Kind::Epic) | Some(Kind::Feature) => {}
            _ => {
                return Err(TrellisError::single(
                    ErrorCode::InvalidScope,
                    "scope must be a project, epic, or feature id",
                ))
            }
        }
    }
    Ok(())
}

/// Collect open candidate tasks for priority/scope mode, already filtered
/// to `status=open`.
fn open_candidates(
    scope: Option<&str>,
    root: &Path,
    force_subdir: bool,
) -> Result<Vec<FrontMatter>, TrellisError> {
    let raw: Vec<FrontMatter> = match scope {
        Some(scope_id) => scanner::filter_by_scope(scope_id, root, force_subdir)?
            .into_iter()
            .filter_map(|item| item.ok())
            .map(|obj| obj.front_matter)
            .collect(),
        None => scanner::scan_tasks(root, force_subdir)
            .filter_map(|item| item.ok())
            .map(|obj| obj.front_matter)
            .collect(),
    };
    Ok(raw.into_iter().filter(|fm| fm.status == Status::Open).collect())
}

/// Select the best claim candidate: filter to unblocked, sort by
/// `(priority_rank, created, id)`, take the head.
fn select_candidate(
    candidates: Vec<FrontMatter>,
    graph: &TaskGraph,
) -> Result<FrontMatter, TrellisError> {
    let mut unblocked: Vec<FrontMatter> = Vec::new();
    for fm in candidates {
        // A candidate whose prerequisite can't be resolved anywhere
        // simply isn't a claim candidate; it doesn't abort the whole
        // selection the way it would during validation of that task
        // directly.
        if matches!(graph.is_unblocked(&fm), Ok(true)) {
            unblocked.push(fm);
        }
    }
    unblocked.sort_by(|a, b| {
        a.priority
            .rank()
            .cmp(&b.priority.rank())
            .then(a.created.cmp(&b.created))
            .then(a.id.cmp(&b.id))
    });
    unblocked
        .into_iter()
        .next()
        .ok_or_else(|| TrellisError::single(ErrorCode::NoAvailableTask, "no claimable task matches the request"))
}

/// Commit the claim: reread the file immediately before writing to
/// detect a concurrent claimant, then atomically write the new status.
fn commit_claim(
    path: &Path,
    expect_status: Option<Status>,
    worktree: Option<&str>,
    force: bool,
    root: &Path,
) -> Result<ClaimResult, TrellisError> {
    let fresh = ObjectFile::load(path)?;
    let current_status = fresh.front_matter.status;

    if let Some(expected) = expect_status {
        if current_status != expected {
            return Err(TrellisError::single(
                ErrorCode::TaskAlreadyClaimed,
                "task status changed before the claim could commit",
            ));
        }
    } else if !force && current_status != Status::Open {
        return Err(TrellisError::single(
            ErrorCode::TaskAlreadyClaimed,
            "task is no longer open",
        ));
    }

    let forced_from = if force && current_status != Status::Open {
        Some(current_status)
    } else {
        None
    };

    let now = Utc::now();

    // The audit record is persisted before the mutating write commits;
    // if it can't be written, the claim itself is aborted.
    if let Some(prior) = forced_from {
        logging::append_force_claim_record(
            root,
            &AuditRecord {
                timestamp: now,
                task_id: &fresh.front_matter.id,
                original_status: prior,
                new_status: Status::InProgress,
                worktree,
            },
        )?;
    }

    let mut fm = fresh.front_matter;
    fm.status = Status::InProgress;
    fm.updated = now;
    if let Some(w) = worktree {
        fm.worktree = Some(w.to_string());
    }
    fm.schema_version = crate::model::CURRENT_SCHEMA_VERSION.to_string();

    let obj = ObjectFile {
        front_matter: fm,
        body: fresh.body,
        path: fresh.path,
    };
    obj.write_atomic()?;

    Ok(ClaimResult { object: obj, forced_from })
}

/// Execute a claim request end to end: validate parameters, select (or
/// locate) the task, and commit the status transition.
pub fn claim_next_task(
    req: &ClaimRequest,
    root: &Path,
    force_subdir: bool,
) -> Result<ClaimResult, TrellisError> {
    validate_request(req)?;

    match &req.task_id {
        Some(task_id) => {
            let path = resolver::id_to_path(Kind::Task, task_id, root, force_subdir)?;
            if req.force_claim {
                return commit_claim(&path, None, req.worktree.as_deref(), true, root);
            }

            let obj = ObjectFile::load(&path)?;
            let graph = TaskGraph::build(root, force_subdir);
            match obj.front_matter.status {
                Status::Open => {}
                Status::Done => {
                    return Err(TrellisError::single(
                        ErrorCode::InvalidStatusForCompletion,
                        "task is already done; use force_claim to reopen it",
                    ))
                }
                _ => {
                    return Err(TrellisError::single(
                        ErrorCode::TaskAlreadyClaimed,
                        "task is no longer open",
                    ))
                }
            }
            if !graph.is_unblocked(&obj.front_matter)? {
                return Err(TrellisError::single(
                    ErrorCode::PrerequisitesNotComplete,
                    "task has incomplete prerequisites",
                ));
            }
            commit_claim(&path, Some(Status::Open), req.worktree.as_deref(), false, root)
        }
        None => {
            let candidates = open_candidates(req.scope.as_deref(), root, force_subdir)?;
            let graph = TaskGraph::build(root, force_subdir);
            let chosen = select_candidate(candidates, &graph)?;
            let path = resolver::id_to_path(Kind::Task, &chosen.id, root, force_subdir)?;
            commit_claim(&path, Some(Status::Open), req.worktree.as_deref(), false, root)
        }
    }
}

/// Append the force-claim audit record to the task's own log and return
/// the structured fields the caller (rpc.rs) persists to the audit log
/// file.
pub fn audit_log_entry(result: &ClaimResult) -> Option<LogEntry> {
    result.forced_from.map(|prior| {
        LogEntry::Prose(format!(
            "force-claimed from {} to in-progress",
            prior
        ))
    })
}
