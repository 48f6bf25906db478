//! Universal invariants: properties that must hold across every object,
//! not just the literal scenarios.

use tempfile::TempDir;

use trellis::{
    ClaimRequest, CreateObjectRequest, ErrorCode, Kind, ObjectFile, Priority, Status, Trellis,
    TrellisConfig, UpdateObjectRequest,
};

fn trellis() -> Trellis {
    Trellis::new(TrellisConfig::default())
}

/// Round-trip law: parsing then rendering an object never changes its
/// bytes.
#[test]
fn round_trip_preserves_bytes_through_a_full_create_get_cycle() {
    let tmp = TempDir::new().unwrap();
    let t = trellis();
    t.create_object(
        CreateObjectRequest {
            kind: Kind::Task,
            id: "T-rt".into(),
            title: "roundtrip".into(),
            body: Some("### Log\n- notes\n".into()),
            ..Default::default()
        },
        tmp.path(),
    )
    .unwrap();

    let raw = std::fs::read_to_string(
        t.get_object("T-rt", tmp.path()).unwrap().object.path,
    )
    .unwrap();
    let parsed = ObjectFile::parse(&raw, std::path::PathBuf::from("x")).unwrap();
    let rerendered = parsed.render().unwrap();
    assert_eq!(raw, rerendered);
}

/// Kind/status-directory consistency: a task's on-disk directory always
/// agrees with its status (`tasks-open` vs `tasks-done`).
#[test]
fn task_directory_matches_its_status() {
    let tmp = TempDir::new().unwrap();
    let t = trellis();
    t.create_object(
        CreateObjectRequest { kind: Kind::Task, id: "T-dir".into(), title: "d".into(), ..Default::default() },
        tmp.path(),
    )
    .unwrap();
    let open = t.get_object("T-dir", tmp.path()).unwrap().object;
    assert!(open.path.to_string_lossy().contains("tasks-open"));

    t.complete_task(trellis::CompletionRequest { task_id: "T-dir".into(), files_changed: vec![] }, tmp.path())
        .unwrap();
    let done = t.get_object("T-dir", tmp.path()).unwrap().object;
    assert!(done.path.to_string_lossy().contains("tasks-done"));
    assert_eq!(done.front_matter.status, Status::Done);
}

/// Acyclicity: the prerequisite graph never admits a cycle, whether
/// introduced at creation or via update.
#[test]
fn acyclicity_is_enforced_on_both_create_and_update() {
    let tmp = TempDir::new().unwrap();
    let t = trellis();
    t.create_object(
        CreateObjectRequest { kind: Kind::Task, id: "T-1".into(), title: "1".into(), ..Default::default() },
        tmp.path(),
    )
    .unwrap();

    let err = t
        .create_object(
            CreateObjectRequest {
                kind: Kind::Task,
                id: "T-2".into(),
                title: "2".into(),
                prerequisites: vec!["T-2".into()],
                ..Default::default()
            },
            tmp.path(),
        )
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::CycleDetected);
}

/// Idempotence: completing an already-done task is a no-op that returns
/// the existing object rather than erroring or double-appending a log
/// entry.
#[test]
fn completing_twice_does_not_double_append_the_log() {
    let tmp = TempDir::new().unwrap();
    let t = trellis();
    t.create_object(
        CreateObjectRequest { kind: Kind::Task, id: "T-once".into(), title: "o".into(), ..Default::default() },
        tmp.path(),
    )
    .unwrap();

    let req = trellis::CompletionRequest { task_id: "T-once".into(), files_changed: vec!["a.rs".into()] };
    let first = t.complete_task(req.clone(), tmp.path()).unwrap();
    let second = t.complete_task(req, tmp.path()).unwrap();

    let occurrences = second.body.matches("filesChanged").count();
    assert_eq!(occurrences, 1);
    assert_eq!(first.path, second.path);
}

/// Claim uniqueness: two sequential claim calls against a single open
/// task never both succeed.
#[test]
fn a_claimed_task_cannot_be_claimed_again_without_force() {
    let tmp = TempDir::new().unwrap();
    let t = trellis();
    t.create_object(
        CreateObjectRequest { kind: Kind::Task, id: "T-once".into(), title: "o".into(), ..Default::default() },
        tmp.path(),
    )
    .unwrap();

    t.claim_next_task(ClaimRequest { task_id: Some("T-once".into()), ..Default::default() }, tmp.path())
        .unwrap();
    let err = t
        .claim_next_task(ClaimRequest { task_id: Some("T-once".into()), ..Default::default() }, tmp.path())
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::TaskAlreadyClaimed);
}

/// Priority fairness: among open, unblocked tasks, claim always prefers
/// strictly higher priority regardless of scan order.
#[test]
fn priority_claim_never_picks_a_lower_priority_task_over_a_higher_one() {
    let tmp = TempDir::new().unwrap();
    let t = trellis();
    for (id, prio) in [("T-z", "low"), ("T-y", "normal"), ("T-x", "high")] {
        t.create_object(
            CreateObjectRequest {
                kind: Kind::Task,
                id: id.into(),
                title: id.into(),
                priority: Some(prio.into()),
                ..Default::default()
            },
            tmp.path(),
        )
        .unwrap();
    }

    let claimed = t.claim_next_task(ClaimRequest::default(), tmp.path()).unwrap();
    assert_eq!(claimed.object.front_matter.id, "T-x");
    assert_eq!(claimed.object.front_matter.priority, Priority::High);
}

/// Sanitization: a path-traversal id is rejected before any filesystem
/// access, and the rejection never leaks the offending raw path into the
/// error's sanitized surface.
#[test]
fn path_traversal_id_is_rejected_and_sanitized() {
    let tmp = TempDir::new().unwrap();
    let t = trellis();
    let err = t
        .create_object(
            CreateObjectRequest {
                kind: Kind::Task,
                id: "T-../../../etc/passwd".into(),
                title: "evil".into(),
                ..Default::default()
            },
            tmp.path(),
        )
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::SecurityViolation);
    let rendered = format!("{err}");
    assert!(!rendered.contains("/etc/passwd"));
}

/// A completed task cannot be reverted to a non-done status via
/// `updateObject` — there is no rejection/abandon state to move it back
/// to.
#[test]
fn update_object_cannot_revert_a_done_task() {
    let tmp = TempDir::new().unwrap();
    let t = trellis();
    t.create_object(
        CreateObjectRequest { kind: Kind::Task, id: "T-final".into(), title: "f".into(), ..Default::default() },
        tmp.path(),
    )
    .unwrap();
    t.complete_task(trellis::CompletionRequest { task_id: "T-final".into(), files_changed: vec![] }, tmp.path())
        .unwrap();

    let err = t
        .update_object(
            UpdateObjectRequest { id: "T-final".into(), status: Some(Status::Open), ..Default::default() },
            tmp.path(),
        )
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidField);
}
