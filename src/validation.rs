//! Aggregated, severity-ordered validation of inbound front-matter
//! before a create or update commits.

use std::path::Path;
use std::time::{Duration, Instant};

use crate::error::{Collector, ErrorCode, FieldError, Severity, TrellisError};
use crate::model::{canonical_task_id, is_recognized_schema_version, FrontMatter, Kind};
use crate::resolver;
use crate::security;

/// A task discriminator used in contextual error messages: distinguishes
/// a standalone task from one filed under a feature.
fn task_label(fm: &FrontMatter) -> &'static str {
    if fm.parent.is_some() {
        "hierarchical task"
    } else {
        "standalone task"
    }
}

fn validate_schema_version(fm: &FrontMatter, collector: &mut Collector) {
    if !is_recognized_schema_version(&fm.schema_version) {
        collector.push(
            FieldError::new(
                Severity::Structural,
                ErrorCode::InvalidField,
                format!("unrecognized schema_version: {}", fm.schema_version),
            )
            .with_field("schema_version"),
        );
    }
}

fn validate_status_for_kind(fm: &FrontMatter, collector: &mut Collector) {
    if !fm.kind.allowed_statuses().contains(&fm.status) {
        collector.push(
            FieldError::new(
                Severity::Structural,
                ErrorCode::InvalidField,
                format!("status {} is not valid for kind {}", fm.status, fm.kind),
            )
            .with_field("status"),
        );
    }
}

/// Parent presence/absence rules: Project parent is null; Epic parent is
/// an existing Project; Feature parent is an existing Epic; Task parent
/// is either an existing Feature or null.
fn validate_parent(
    fm: &FrontMatter,
    root: &Path,
    force_subdir: bool,
    collector: &mut Collector,
) {
    match fm.kind {
        Kind::Project => {
            if fm.parent.is_some() {
                collector.push(
                    FieldError::new(
                        Severity::Structural,
                        ErrorCode::InvalidField,
                        "a project must not declare a parent",
                    )
                    .with_field("parent"),
                );
            }
        }
        Kind::Epic | Kind::Feature => {
            let expected_parent_kind = if fm.kind == Kind::Epic { Kind::Project } else { Kind::Epic };
            match &fm.parent {
                None => {
                    collector.push(
                        FieldError::new(
                            Severity::Semantic,
                            ErrorCode::MissingRequiredField,
                            format!("{} requires a parent {}", fm.kind, expected_parent_kind),
                        )
                        .with_field("parent"),
                    );
                }
                Some(parent_id) => {
                    validate_parent_id(parent_id, expected_parent_kind, fm, root, force_subdir, collector);
                }
            }
        }
        Kind::Task => {
            if let Some(parent_id) = &fm.parent {
                validate_parent_id(parent_id, Kind::Feature, fm, root, force_subdir, collector);
            }
        }
    }
}

fn validate_parent_id(
    parent_id: &str,
    expected_kind: Kind,
    fm: &FrontMatter,
    root: &Path,
    force_subdir: bool,
    collector: &mut Collector,
) {
    if let Err(e) = security::check_id_security(parent_id) {
        collector.push(
            FieldError::new(Severity::Critical, e.code(), "parent id failed security validation")
                .with_field("parent"),
        );
        return;
    }

    match Kind::from_id_prefix(parent_id) {
        Some(found_kind) if found_kind == expected_kind => {}
        Some(found_kind) => {
            collector.push(
                FieldError::new(
                    Severity::Semantic,
                    ErrorCode::CrossSystemReferenceConflict,
                    format!(
                        "{} expects a {} parent but got a {} id",
                        task_label(fm),
                        expected_kind,
                        found_kind
                    ),
                )
                .with_field("parent"),
            );
            return;
        }
        None => {
            collector.push(
                FieldError::new(Severity::Structural, ErrorCode::InvalidIDFormat, "parent id has no recognized kind prefix")
                    .with_field("parent"),
            );
            return;
        }
    }

    if resolver::id_to_path(expected_kind, parent_id, root, force_subdir).is_err() {
        collector.push(
            FieldError::new(
                Severity::Semantic,
                ErrorCode::ParentNotFound,
                format!("parent {} does not exist", expected_kind),
            )
            .with_field("parent")
            .with_context("parent_id", parent_id.to_string()),
        );
    }
}

/// Security + shape validation of `prerequisites`: every entry must be
/// a well-formed `T-…` id, and a task must never list itself.
fn validate_prerequisites(fm: &FrontMatter, collector: &mut Collector) {
    for prereq in &fm.prerequisites {
        if let Err(e) = security::check_id_security(prereq) {
            collector.push(
                FieldError::new(Severity::Critical, e.code(), "prerequisite id failed security validation")
                    .with_field("prerequisites"),
            );
            continue;
        }
        match Kind::from_id_prefix(prereq) {
            Some(Kind::Task) => {}
            _ => {
                collector.push(
                    FieldError::new(
                        Severity::Structural,
                        ErrorCode::InvalidIDFormat,
                        "prerequisites must be task ids",
                    )
                    .with_field("prerequisites")
                    .with_context("prerequisite_id", prereq.clone()),
                );
                continue;
            }
        }
        if canonical_task_id(prereq) == canonical_task_id(&fm.id) {
            collector.push(
                FieldError::new(
                    Severity::Semantic,
                    ErrorCode::CycleDetected,
                    format!("{} cannot list itself as a prerequisite", task_label(fm)),
                )
                .with_field("prerequisites"),
            );
        }
    }
}

/// A floor under which every validation call returns, win or lose, to
/// blunt timing side-channels on security-sensitive rejections.
const MIN_VALIDATION_DURATION: Duration = Duration::from_millis(2);

/// Validate a front-matter record destined for `createObject` or
/// `updateObject`. Runs the full battery and aggregates every problem
/// found rather than failing on the first.
pub fn validate_front_matter(
    fm: &FrontMatter,
    root: &Path,
    force_subdir: bool,
) -> Result<(), TrellisError> {
    let started = Instant::now();
    let mut collector = Collector::new();

    if let Err(e) = security::check_id_security(&fm.id) {
        collector.push(FieldError::new(Severity::Critical, e.code(), "id failed security validation").with_field("id"));
    }
    validate_schema_version(fm, &mut collector);
    validate_status_for_kind(fm, &mut collector);
    validate_parent(fm, root, force_subdir, &mut collector);
    validate_prerequisites(fm, &mut collector);

    let result = collector.finish();

    let elapsed = started.elapsed();
    if elapsed < MIN_VALIDATION_DURATION {
        std::thread::sleep(MIN_VALIDATION_DURATION - elapsed);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Priority, Status};
    use chrono::Utc;
    use tempfile::TempDir;

    fn base_fm(kind: Kind, id: &str, parent: Option<&str>) -> FrontMatter {
        let now = Utc::now();
        FrontMatter {
            kind,
            id: id.to_string(),
            parent: parent.map(|s| s.to_string()),
            status: match kind {
                Kind::Task => Status::Open,
                _ => Status::Draft,
            },
            title: "t".to_string(),
            priority: Priority::Normal,
            worktree: None,
            created: now,
            updated: now,
            schema_version: "1.1".to_string(),
            prerequisites: vec![],
        }
    }

    #[test]
    fn project_rejects_a_parent() {
        let tmp = TempDir::new().unwrap();
        let fm = base_fm(Kind::Project, "P-x", Some("P-other"));
        let err = validate_front_matter(&fm, tmp.path(), false).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidField);
    }

    #[test]
    fn epic_requires_existing_parent_project() {
        let tmp = TempDir::new().unwrap();
        let fm = base_fm(Kind::Epic, "E-x", Some("P-missing"));
        let err = validate_front_matter(&fm, tmp.path(), false).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ParentNotFound);
    }

    #[test]
    fn epic_with_existing_parent_project_passes() {
        let tmp = TempDir::new().unwrap();
        let now = Utc::now();
        let path = resolver::resolve_path_for_new(Kind::Project, "P-x", None, Status::Draft, tmp.path(), false, now).unwrap();
        std::fs::write(&path, "---\n---\n").unwrap();

        let fm = base_fm(Kind::Epic, "E-x", Some("P-x"));
        assert!(validate_front_matter(&fm, tmp.path(), false).is_ok());
    }

    #[test]
    fn standalone_task_without_parent_is_fine() {
        let tmp = TempDir::new().unwrap();
        let fm = base_fm(Kind::Task, "T-x", None);
        assert!(validate_front_matter(&fm, tmp.path(), false).is_ok());
    }

    #[test]
    fn task_self_referencing_prerequisite_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut fm = base_fm(Kind::Task, "T-x", None);
        fm.prerequisites = vec!["T-x".to_string()];
        let err = validate_front_matter(&fm, tmp.path(), false).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CycleDetected);
    }

    #[test]
    fn task_self_referencing_prerequisite_via_alias_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut fm = base_fm(Kind::Task, "T-x", None);
        fm.prerequisites = vec!["task-x".to_string()];
        let err = validate_front_matter(&fm, tmp.path(), false).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CycleDetected);
    }

    #[test]
    fn non_task_prerequisite_id_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut fm = base_fm(Kind::Task, "T-x", None);
        fm.prerequisites = vec!["P-wrong-kind".to_string()];
        let err = validate_front_matter(&fm, tmp.path(), false).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidIDFormat);
    }

    #[test]
    fn wrong_kind_parent_is_cross_system_conflict() {
        let tmp = TempDir::new().unwrap();
        let fm = base_fm(Kind::Epic, "E-x", Some("F-wrong-kind"));
        let err = validate_front_matter(&fm, tmp.path(), false).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CrossSystemReferenceConflict);
    }

    #[test]
    fn security_violation_in_parent_id_is_critical_and_wins_aggregate() {
        let tmp = TempDir::new().unwrap();
        let fm = base_fm(Kind::Epic, "E-x", Some("../../etc/passwd"));
        let err = validate_front_matter(&fm, tmp.path(), false).unwrap_err();
        assert_eq!(err.code(), ErrorCode::SecurityViolation);
    }

    #[test]
    fn invalid_status_for_kind_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut fm = base_fm(Kind::Project, "P-x", None);
        fm.status = Status::Review;
        let err = validate_front_matter(&fm, tmp.path(), false).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidField);
    }
}
