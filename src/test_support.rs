//! Fixture builders for a `planning/` tree. Always compiled (not
//! `cfg(test)`-gated) so integration tests under `tests/` can use it too.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::model::{FrontMatter, Kind, ObjectFile, Priority, Status};
use crate::resolver;

/// A tiny builder for one object file, with sensible defaults for every
/// field a test doesn't care about.
pub struct ObjectFixture {
    pub kind: Kind,
    pub id: String,
    pub parent: Option<String>,
    pub status: Status,
    pub title: String,
    pub priority: Priority,
    pub prerequisites: Vec<String>,
    pub body: String,
}

impl ObjectFixture {
    pub fn new(kind: Kind, id: impl Into<String>) -> Self {
        let id = id.into();
        let title = id.clone();
        let status = match kind {
            Kind::Task => Status::Open,
            _ => Status::Draft,
        };
        Self {
            kind,
            id,
            parent: None,
            status,
            title,
            priority: Priority::Normal,
            prerequisites: Vec::new(),
            body: "### Log\n".to_string(),
        }
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn prerequisites(mut self, prerequisites: Vec<String>) -> Self {
        self.prerequisites = prerequisites;
        self
    }

    /// Write this fixture under a directory resolved the normal way
    /// (standalone position for tasks with no parent).
    pub fn write(self, root: &Path) -> ObjectFile {
        let now = Utc::now();
        let path = resolver::resolve_path_for_new(
            self.kind,
            &self.id,
            None,
            self.status,
            root,
            false,
            now,
        )
        .unwrap();
        self.write_at(path, now)
    }

    /// Write this fixture directly under `dir` (for hierarchical
    /// placement where the caller already knows the parent's directory).
    pub fn write_in(self, dir: &Path) -> ObjectFile {
        let now = Utc::now();
        let filename = self
            .kind
            .object_filename()
            .map(|f| f.to_string())
            .unwrap_or_else(|| resolver::task_filename(&self.id, self.status, now));
        let subdir = match self.kind {
            Kind::Task if self.status.is_done() => Some("tasks-done"),
            Kind::Task => Some("tasks-open"),
            _ => None,
        };
        let path = match subdir {
            Some(s) => dir.join(s).join(filename),
            None => dir.join(filename),
        };
        self.write_at(path, now)
    }

    fn write_at(self, path: PathBuf, now: chrono::DateTime<Utc>) -> ObjectFile {
        let fm = FrontMatter {
            kind: self.kind,
            id: self.id,
            parent: self.parent,
            status: self.status,
            title: self.title,
            priority: self.priority,
            worktree: None,
            created: now,
            updated: now,
            schema_version: crate::model::CURRENT_SCHEMA_VERSION.to_string(),
            prerequisites: self.prerequisites,
        };
        let obj = ObjectFile {
            front_matter: fm,
            body: self.body,
            path,
        };
        obj.write_atomic().unwrap();
        obj
    }
}

/// Lay out a full Project -> Epic -> Feature -> Task hierarchy under
/// `root/planning`, returning the directories of each level so callers
/// can place siblings or additional tasks.
pub struct PlanningTree {
    pub planning: PathBuf,
    pub project_dir: PathBuf,
    pub epic_dir: PathBuf,
    pub feature_dir: PathBuf,
}

pub fn build_hierarchy(root: &Path, project: &str, epic: &str, feature: &str) -> PlanningTree {
    let planning = root.join("planning");
    let project_dir = planning.join("projects").join(project);
    ObjectFixture::new(Kind::Project, project).write_in(&project_dir);

    let epic_dir = project_dir.join("epics").join(epic);
    ObjectFixture::new(Kind::Epic, epic)
        .parent(project)
        .write_in(&epic_dir);

    let feature_dir = epic_dir.join("features").join(feature);
    ObjectFixture::new(Kind::Feature, feature)
        .parent(epic)
        .write_in(&feature_dir);

    PlanningTree {
        planning,
        project_dir,
        epic_dir,
        feature_dir,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn build_hierarchy_lays_out_all_three_levels() {
        let tmp = TempDir::new().unwrap();
        let tree = build_hierarchy(tmp.path(), "P-x", "E-y", "F-z");
        assert!(tree.project_dir.join("project.md").is_file());
        assert!(tree.epic_dir.join("epic.md").is_file());
        assert!(tree.feature_dir.join("feature.md").is_file());
    }

    #[test]
    fn object_fixture_write_places_standalone_task() {
        let tmp = TempDir::new().unwrap();
        let obj = ObjectFixture::new(Kind::Task, "T-standalone").write(tmp.path());
        assert!(obj.path.to_string_lossy().contains("tasks-open"));
    }
}
