//! The named operations exposed on a `Trellis` handle. Every method takes
//! an explicit `projectRoot`; the handle itself holds no state beyond the
//! kind-inference LRU cache.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::claim::{self, ClaimRequest, ClaimResult};
use crate::completion::{self, CompletionRequest};
use crate::config::TrellisConfig;
use crate::error::{ErrorCode, TrellisError};
use crate::graph;
use crate::kind_cache::KindCache;
use crate::model::{ChildSummary, FrontMatter, Kind, ObjectFile, Priority, Status};
use crate::resolver;
use crate::scanner;
use crate::validation;

/// The entry point every transport (MCP, CLI, test) wraps. Cheap to
/// construct; the only thing carried across calls is the LRU cache.
pub struct Trellis {
    config: TrellisConfig,
    kind_cache: KindCache,
}

impl Trellis {
    pub fn new(config: TrellisConfig) -> Self {
        let kind_cache = KindCache::new(config.kind_cache_capacity);
        Self { config, kind_cache }
    }

    fn force_subdir(&self) -> bool {
        self.config.force_planning_subdir
    }

    // ------------------------------------------------------------------
    // createObject
    // ------------------------------------------------------------------

    pub fn create_object(&self, req: CreateObjectRequest, root: &Path) -> Result<ObjectFile, TrellisError> {
        tracing::info!(kind = %req.kind, id = %req.id, "createObject");
        let now = Utc::now();

        let priority = match &req.priority {
            Some(raw) => Priority::parse_with_alias(raw).ok_or_else(|| {
                TrellisError::single(ErrorCode::InvalidField, "invalid priority value").with_context("field", "priority")
            })?,
            None => Priority::default(),
        };

        let status = req.status.unwrap_or(if req.kind == Kind::Task {
            Status::Open
        } else {
            Status::Draft
        });

        let fm = FrontMatter {
            kind: req.kind,
            id: req.id.clone(),
            parent: req.parent.clone(),
            status,
            title: req.title,
            priority,
            worktree: req.worktree,
            created: now,
            updated: now,
            schema_version: crate::model::CURRENT_SCHEMA_VERSION.to_string(),
            prerequisites: req.prerequisites,
        };

        validation::validate_front_matter(&fm, root, self.force_subdir())?;

        if fm.kind == Kind::Task {
            if let Some(cycle) = graph::would_introduce_cycle(&fm, root, self.force_subdir())? {
                return Err(TrellisError::single(ErrorCode::CycleDetected, "creating this object would introduce a prerequisite cycle")
                    .with_context("cycle", cycle.join(" -> ")));
            }
        }

        let parent_dir = self.resolve_parent_dir(&fm, root)?;
        let path = resolver::resolve_path_for_new(
            fm.kind,
            &fm.id,
            parent_dir.as_deref(),
            fm.status,
            root,
            self.force_subdir(),
            now,
        )?;

        if path.exists() {
            return Err(TrellisError::single(ErrorCode::InvalidField, "an object with this id already exists"));
        }

        let obj = ObjectFile {
            front_matter: fm,
            body: req.body.unwrap_or_default(),
            path,
        };
        obj.write_atomic()?;
        Ok(obj)
    }

    fn resolve_parent_dir(&self, fm: &FrontMatter, root: &Path) -> Result<Option<PathBuf>, TrellisError> {
        let Some(parent_id) = &fm.parent else {
            return Ok(None);
        };
        let expected_parent_kind = match fm.kind {
            Kind::Epic => Kind::Project,
            Kind::Feature => Kind::Epic,
            Kind::Task => Kind::Feature,
            Kind::Project => return Ok(None),
        };
        let parent_path = resolver::id_to_path(expected_parent_kind, parent_id, root, self.force_subdir())?;
        Ok(parent_path.parent().map(|p| p.to_path_buf()))
    }

    // ------------------------------------------------------------------
    // getObject
    // ------------------------------------------------------------------

    pub fn get_object(&self, id: &str, root: &Path) -> Result<ObjectWithChildren, TrellisError> {
        tracing::info!(id = %id, "getObject");
        let info = self.kind_cache.infer_with_validation(id, root, self.force_subdir())?;
        let obj = ObjectFile::load(&info.file_path)?;
        let children = self.list_immediate_children(&obj)?;
        Ok(ObjectWithChildren { object: obj, children })
    }

    /// Immediate children only, scanned directly from the object's own
    /// on-disk directory (never re-resolved through `planning_dir`,
    /// which only applies to a project root).
    fn list_immediate_children(&self, obj: &ObjectFile) -> Result<Vec<ChildSummary>, TrellisError> {
        let dir = obj
            .path
            .parent()
            .ok_or_else(|| TrellisError::single(ErrorCode::InvalidField, "object has no containing directory"))?;

        let child_kind = match obj.front_matter.kind {
            Kind::Project => Kind::Epic,
            Kind::Epic => Kind::Feature,
            Kind::Feature => Kind::Task,
            Kind::Task => return Ok(Vec::new()),
        };

        let mut children = Vec::new();
        if child_kind == Kind::Task {
            // Feature -> Tasks: both open and done live under this
            // feature's own directory tree.
            for child in scanner::scan_dir_recursive(dir, true).filter_map(|item| item.ok()) {
                children.push(to_child_summary(&child));
            }
        } else {
            let Some(child_dir_name) = obj.front_matter.kind.child_dir_name() else {
                return Ok(Vec::new());
            };
            let container = dir.join(child_dir_name);
            for child in scanner::scan_dir_recursive(&container, false)
                .filter_map(|item| item.ok())
                .filter(|child| child.front_matter.kind == child_kind)
            {
                children.push(to_child_summary(&child));
            }
        }
        children.sort_by(|a, b| a.created.cmp(&b.created));
        Ok(children)
    }

    // ------------------------------------------------------------------
    // updateObject
    // ------------------------------------------------------------------

    pub fn update_object(&self, req: UpdateObjectRequest, root: &Path) -> Result<ObjectFile, TrellisError> {
        tracing::info!(id = %req.id, "updateObject");
        let info = self.kind_cache.infer_with_validation(&req.id, root, self.force_subdir())?;
        let existing = ObjectFile::load(&info.file_path)?;

        let mut fm = existing.front_matter.clone();
        if let Some(title) = req.title {
            fm.title = title;
        }
        if let Some(status) = req.status {
            fm.status = status;
        }
        if let Some(priority) = req.priority {
            fm.priority = Priority::parse_with_alias(&priority)
                .ok_or_else(|| TrellisError::single(ErrorCode::InvalidField, "invalid priority value"))?;
        }
        if let Some(worktree) = req.worktree {
            fm.worktree = Some(worktree);
        }
        if let Some(prerequisites) = req.prerequisites {
            fm.prerequisites = prerequisites;
        }
        fm.updated = Utc::now();
        fm.schema_version = crate::model::CURRENT_SCHEMA_VERSION.to_string();

        validation::validate_front_matter(&fm, root, self.force_subdir())?;
        if fm.kind == Kind::Task {
            if let Some(cycle) = graph::would_introduce_cycle(&fm, root, self.force_subdir())? {
                return Err(TrellisError::single(ErrorCode::CycleDetected, "this update would introduce a prerequisite cycle")
                    .with_context("cycle", cycle.join(" -> ")));
            }
        }

        let body = req.body.unwrap_or(existing.body);
        let moved = self.relocate_if_status_changed(&existing, &fm, body, root)?;
        self.kind_cache.invalidate(&req.id);
        Ok(moved)
    }

    /// Tasks move between `tasks-open/`/`tasks-done/` when status crosses
    /// the done boundary via `updateObject`; non-task kinds never move.
    /// Reverting a done task to a non-done status is not supported — the
    /// task lifecycle has no rejection/abandon state.
    fn relocate_if_status_changed(
        &self,
        existing: &ObjectFile,
        fm: &FrontMatter,
        body: String,
        root: &Path,
    ) -> Result<ObjectFile, TrellisError> {
        let was_done = existing.front_matter.status.is_done();
        let now_done = fm.status.is_done();

        if fm.kind != Kind::Task || was_done == now_done {
            let obj = ObjectFile {
                front_matter: fm.clone(),
                body,
                path: existing.path.clone(),
            };
            obj.write_atomic()?;
            return Ok(obj);
        }

        if was_done && !now_done {
            return Err(TrellisError::single(
                ErrorCode::InvalidField,
                "a completed task cannot be reverted to a non-done status",
            ));
        }

        // Persist every patched field except the status flip itself,
        // then hand off to the completion engine so the rename,
        // timestamp, and log-append logic isn't duplicated here.
        let mut pre_move = fm.clone();
        pre_move.status = existing.front_matter.status;
        let staged = ObjectFile {
            front_matter: pre_move,
            body,
            path: existing.path.clone(),
        };
        staged.write_atomic()?;

        let completion_req = CompletionRequest {
            task_id: fm.id.clone(),
            files_changed: vec![],
        };
        completion::complete_task(&completion_req, root, self.force_subdir())
    }

    // ------------------------------------------------------------------
    // deleteObject
    // ------------------------------------------------------------------

    pub fn delete_object(&self, id: &str, root: &Path) -> Result<(), TrellisError> {
        tracing::info!(id = %id, "deleteObject");
        let kind = self.kind_cache.infer_kind(id)?;
        let path = resolver::id_to_path(kind, id, root, self.force_subdir())?;

        let target_dir = match kind {
            Kind::Task => None,
            _ => path.parent().map(|p| p.to_path_buf()),
        };

        match target_dir {
            Some(dir) => std::fs::remove_dir_all(&dir).map_err(TrellisError::from)?,
            None => std::fs::remove_file(&path).map_err(TrellisError::from)?,
        }
        self.kind_cache.invalidate(id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // claimNextTask / completeTask
    // ------------------------------------------------------------------

    pub fn claim_next_task(&self, req: ClaimRequest, root: &Path) -> Result<ClaimResult, TrellisError> {
        tracing::info!(scope = ?req.scope, task_id = ?req.task_id, force = req.force_claim, "claimNextTask");
        let mut result = claim::claim_next_task(&req, root, self.force_subdir())?;
        if let Some(entry) = claim::audit_log_entry(&result) {
            result.object.body = crate::model::append_log_entry(&result.object.body, &entry);
            result.object.write_atomic()?;
        }
        self.kind_cache.invalidate(&result.object.front_matter.id);
        Ok(result)
    }

    pub fn complete_task(&self, req: CompletionRequest, root: &Path) -> Result<ObjectFile, TrellisError> {
        tracing::info!(task_id = %req.task_id, "completeTask");
        let result = completion::complete_task(&req, root, self.force_subdir())?;
        self.kind_cache.invalidate(&req.task_id);
        Ok(result)
    }

    // ------------------------------------------------------------------
    // getNextReviewableTask
    // ------------------------------------------------------------------

    pub fn get_next_reviewable_task(&self, root: &Path) -> Result<Option<ObjectFile>, TrellisError> {
        let mut candidates: Vec<ObjectFile> = scanner::scan_tasks(root, self.force_subdir())
            .filter_map(|item| item.ok())
            .filter(|obj| obj.front_matter.status == Status::Review)
            .collect();
        candidates.sort_by(|a, b| a.front_matter.updated.cmp(&b.front_matter.updated));
        Ok(candidates.into_iter().next())
    }

    // ------------------------------------------------------------------
    // listBacklog
    // ------------------------------------------------------------------

    pub fn list_backlog(&self, filter: BacklogFilter, root: &Path) -> Result<Vec<ObjectFile>, TrellisError> {
        let raw: Vec<ObjectFile> = match &filter.scope {
            Some(scope) => scanner::filter_by_scope(scope, root, self.force_subdir())?
                .into_iter()
                .filter_map(|item| item.ok())
                .collect(),
            None => scanner::scan_tasks(root, self.force_subdir())
                .filter_map(|item| item.ok())
                .collect(),
        };

        let mut filtered: Vec<ObjectFile> = raw
            .into_iter()
            .filter(|obj| filter.status.map(|s| obj.front_matter.status == s).unwrap_or(true))
            .filter(|obj| filter.priority.map(|p| obj.front_matter.priority == p).unwrap_or(true))
            .collect();

        filtered.sort_by(|a, b| {
            a.front_matter
                .priority
                .rank()
                .cmp(&b.front_matter.priority.rank())
                .then(a.front_matter.created.cmp(&b.front_matter.created))
                .then(a.front_matter.id.cmp(&b.front_matter.id))
        });
        Ok(filtered)
    }

    // ------------------------------------------------------------------
    // getCompletedObjects
    // ------------------------------------------------------------------

    pub fn get_completed_objects(&self, id: &str, root: &Path) -> Result<Vec<ObjectFile>, TrellisError> {
        let info = self.kind_cache.infer_with_validation(id, root, self.force_subdir())?;
        let dir = info
            .file_path
            .parent()
            .ok_or_else(|| TrellisError::single(ErrorCode::InvalidField, "object has no containing directory"))?;

        let mut done: Vec<ObjectFile> = scanner::scan_all(dir, false)
            .filter_map(|item| item.ok())
            .filter(|obj| obj.front_matter.status == Status::Done)
            .collect();

        done.sort_by(|a, b| {
            b.front_matter
                .updated
                .cmp(&a.front_matter.updated)
                .then(a.front_matter.priority.rank().cmp(&b.front_matter.priority.rank()))
        });
        Ok(done)
    }
}

fn to_child_summary(obj: &ObjectFile) -> ChildSummary {
    ChildSummary {
        id: obj.front_matter.id.clone(),
        title: obj.front_matter.title.clone(),
        status: obj.front_matter.status,
        kind: obj.front_matter.kind,
        created: obj.front_matter.created,
        file_path: obj.path.clone(),
    }
}

/// Request payload for `createObject`.
#[derive(Debug, Clone, Default)]
pub struct CreateObjectRequest {
    pub kind: Kind,
    pub id: String,
    pub parent: Option<String>,
    pub title: String,
    pub priority: Option<String>,
    pub status: Option<Status>,
    pub worktree: Option<String>,
    pub prerequisites: Vec<String>,
    pub body: Option<String>,
}

/// Request payload for `updateObject`. Every field is optional: only
/// fields that are `Some` are patched onto the existing object.
#[derive(Debug, Clone, Default)]
pub struct UpdateObjectRequest {
    pub id: String,
    pub title: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<String>,
    pub worktree: Option<String>,
    pub prerequisites: Option<Vec<String>>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BacklogFilter {
    pub scope: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone)]
pub struct ObjectWithChildren {
    pub object: ObjectFile,
    pub children: Vec<ChildSummary>,
}
