//! The unified cross-system task graph, cycle detection, and the
//! unblocked predicate.

use std::collections::HashMap;
use std::path::Path;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::error::{ErrorCode, TrellisError};
use crate::model::{canonical_task_id, FrontMatter, Status};
use crate::scanner;

/// The unified task graph: nodes are task ids, edges run
/// `prerequisite -> dependent`.
pub struct TaskGraph {
    graph: DiGraph<FrontMatter, ()>,
    id_to_index: HashMap<String, NodeIndex>,
}

impl TaskGraph {
    /// Build the graph from every task under `root` (hierarchical and
    /// standalone). Malformed files are skipped, matching the scanner's
    /// error-resilience contract; callers that need those failures
    /// surfaced should run the validation pipeline first.
    pub fn build(root: &Path, force_subdir: bool) -> Self {
        let mut graph = DiGraph::new();
        let mut id_to_index = HashMap::new();

        let tasks: Vec<FrontMatter> = scanner::scan_tasks(root, force_subdir)
            .filter_map(|item| item.ok())
            .map(|obj| obj.front_matter)
            .collect();

        for fm in &tasks {
            let idx = graph.add_node(fm.clone());
            id_to_index.insert(canonical_task_id(&fm.id), idx);
        }
        for fm in &tasks {
            let Some(&dependent_idx) = id_to_index.get(&canonical_task_id(&fm.id)) else {
                continue;
            };
            for prereq in &fm.prerequisites {
                if let Some(&prereq_idx) = id_to_index.get(&canonical_task_id(prereq)) {
                    graph.add_edge(prereq_idx, dependent_idx, ());
                }
            }
        }

        Self { graph, id_to_index }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn status_of(&self, id: &str) -> Option<Status> {
        self.id_to_index
            .get(&canonical_task_id(id))
            .map(|&idx| self.graph[idx].status)
    }

    /// Whether every prerequisite of `task` is `done`. A prerequisite
    /// that can't be found anywhere in the unified graph is a
    /// `CrossSystemPrerequisiteInvalid` condition, not "unblocked" and
    /// not silently ignored.
    pub fn is_unblocked(&self, fm: &FrontMatter) -> Result<bool, TrellisError> {
        for prereq in &fm.prerequisites {
            match self.status_of(prereq) {
                Some(Status::Done) => {}
                Some(_) => return Ok(false),
                None => {
                    return Err(TrellisError::single(
                        ErrorCode::CrossSystemPrerequisiteInvalid,
                        "prerequisite task does not exist anywhere in the task graph",
                    )
                    .with_context("prerequisite_id", prereq.clone())
                    .with_context("task_id", fm.id.clone()))
                }
            }
        }
        Ok(true)
    }

    /// Depth-first tri-color cycle detection. Returns a witnessing cycle
    /// (the sequence of task ids forming it) if one exists, `None`
    /// otherwise — the caller gets the actual cycle path, not just a
    /// yes/no answer.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let n = self.graph.node_count();
        let mut color = vec![Color::White; n];
        let mut path = Vec::new();

        for start in self.graph.node_indices() {
            if color[start.index()] != Color::White {
                continue;
            }
            if let Some(cycle) = self.dfs_visit(start, &mut color, &mut path) {
                return Some(cycle);
            }
        }
        None
    }

    fn dfs_visit(
        &self,
        node: NodeIndex,
        color: &mut [Color],
        path: &mut Vec<NodeIndex>,
    ) -> Option<Vec<String>> {
        color[node.index()] = Color::Gray;
        path.push(node);

        for edge in self.graph.edges(node) {
            let next = edge.target();
            match color[next.index()] {
                Color::White => {
                    if let Some(cycle) = self.dfs_visit(next, color, path) {
                        return Some(cycle);
                    }
                }
                Color::Gray => {
                    let start = path.iter().position(|&n| n == next).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..]
                        .iter()
                        .map(|&idx| self.graph[idx].id.clone())
                        .collect();
                    cycle.push(self.graph[next].id.clone());
                    return Some(cycle);
                }
                Color::Black => {}
            }
        }

        path.pop();
        color[node.index()] = Color::Black;
        None
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Validate that adding/updating `fm`'s `prerequisites` would not
/// introduce a cycle, without requiring the caller to have built a
/// [`TaskGraph`] first. Builds the graph fresh (scans are cheap relative
/// to the O(V+E) detection) and checks reachability from the candidate
/// node back to itself through the proposed edges.
pub fn would_introduce_cycle(
    candidate: &FrontMatter,
    root: &Path,
    force_subdir: bool,
) -> Result<Option<Vec<String>>, TrellisError> {
    let mut graph = TaskGraph::build(root, force_subdir);
    let candidate_key = canonical_task_id(&candidate.id);

    let candidate_idx = match graph.id_to_index.get(&candidate_key) {
        Some(&idx) => {
            graph.graph[idx] = candidate.clone();
            idx
        }
        None => graph.graph.add_node(candidate.clone()),
    };
    graph.id_to_index.insert(candidate_key, candidate_idx);

    // Drop this node's existing outgoing prerequisite edges and replace
    // them with the candidate's proposed set.
    let stale: Vec<_> = graph
        .graph
        .edges(candidate_idx)
        .map(|e| e.id())
        .collect();
    for edge_id in stale {
        graph.graph.remove_edge(edge_id);
    }
    for prereq in &candidate.prerequisites {
        if let Some(&prereq_idx) = graph.id_to_index.get(&canonical_task_id(prereq)) {
            graph.graph.add_edge(prereq_idx, candidate_idx, ());
        }
    }

    Ok(graph.find_cycle())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FrontMatter, Kind, Priority};
    use crate::resolver;
    use chrono::Utc;
    use tempfile::TempDir;

    fn write_task(root: &Path, id: &str, status: Status, prerequisites: Vec<String>) {
        let now = Utc::now();
        let slug = &id[2..];
        let path = resolver::resolve_path_for_new(Kind::Task, id, None, status, root, false, now).unwrap();
        let fm = FrontMatter {
            kind: Kind::Task,
            id: id.to_string(),
            parent: None,
            status,
            title: slug.to_string(),
            priority: Priority::Normal,
            worktree: None,
            created: now,
            updated: now,
            schema_version: "1.1".to_string(),
            prerequisites,
        };
        let obj = crate::model::ObjectFile {
            front_matter: fm,
            body: "### Log\n".to_string(),
            path,
        };
        obj.write_atomic().unwrap();
    }

    #[test]
    fn unblocked_when_prerequisite_done() {
        let tmp = TempDir::new().unwrap();
        write_task(tmp.path(), "T-a", Status::Done, vec![]);
        write_task(tmp.path(), "T-b", Status::Open, vec!["T-a".to_string()]);

        let graph = TaskGraph::build(tmp.path(), false);
        let b = scanner::scan_tasks(tmp.path(), false)
            .filter_map(|r| r.ok())
            .map(|o| o.front_matter)
            .find(|fm| fm.id == "T-b")
            .unwrap();
        assert!(graph.is_unblocked(&b).unwrap());
    }

    #[test]
    fn blocked_when_prerequisite_not_done() {
        let tmp = TempDir::new().unwrap();
        write_task(tmp.path(), "T-a", Status::Open, vec![]);
        write_task(tmp.path(), "T-b", Status::Open, vec!["T-a".to_string()]);

        let graph = TaskGraph::build(tmp.path(), false);
        let b = scanner::scan_tasks(tmp.path(), false)
            .filter_map(|r| r.ok())
            .map(|o| o.front_matter)
            .find(|fm| fm.id == "T-b")
            .unwrap();
        assert!(!graph.is_unblocked(&b).unwrap());
    }

    #[test]
    fn missing_prerequisite_is_cross_system_invalid() {
        let tmp = TempDir::new().unwrap();
        write_task(tmp.path(), "T-b", Status::Open, vec!["T-ghost".to_string()]);

        let graph = TaskGraph::build(tmp.path(), false);
        let b = scanner::scan_tasks(tmp.path(), false)
            .filter_map(|r| r.ok())
            .map(|o| o.front_matter)
            .find(|fm| fm.id == "T-b")
            .unwrap();
        let err = graph.is_unblocked(&b).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CrossSystemPrerequisiteInvalid);
    }

    #[test]
    fn detects_direct_cycle() {
        let tmp = TempDir::new().unwrap();
        write_task(tmp.path(), "T-a", Status::Open, vec!["T-b".to_string()]);
        write_task(tmp.path(), "T-b", Status::Open, vec!["T-a".to_string()]);

        let graph = TaskGraph::build(tmp.path(), false);
        let cycle = graph.find_cycle();
        assert!(cycle.is_some());
        let cycle = cycle.unwrap();
        assert!(cycle.contains(&"T-a".to_string()));
        assert!(cycle.contains(&"T-b".to_string()));
    }

    #[test]
    fn acyclic_graph_reports_no_cycle() {
        let tmp = TempDir::new().unwrap();
        write_task(tmp.path(), "T-a", Status::Done, vec![]);
        write_task(tmp.path(), "T-b", Status::Open, vec!["T-a".to_string()]);

        let graph = TaskGraph::build(tmp.path(), false);
        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn would_introduce_cycle_detects_proposed_self_loop_via_chain() {
        let tmp = TempDir::new().unwrap();
        write_task(tmp.path(), "T-a", Status::Open, vec![]);
        write_task(tmp.path(), "T-b", Status::Open, vec!["T-a".to_string()]);

        let now = Utc::now();
        let candidate = FrontMatter {
            kind: Kind::Task,
            id: "T-a".to_string(),
            parent: None,
            status: Status::Open,
            title: "a".to_string(),
            priority: Priority::Normal,
            worktree: None,
            created: now,
            updated: now,
            schema_version: "1.1".to_string(),
            prerequisites: vec!["T-b".to_string()],
        };

        let cycle = would_introduce_cycle(&candidate, tmp.path(), false).unwrap();
        assert!(cycle.is_some());
    }

    #[test]
    fn task_dash_alias_and_t_dash_form_resolve_to_the_same_node() {
        let tmp = TempDir::new().unwrap();
        write_task(tmp.path(), "T-s", Status::Done, vec![]);
        write_task(tmp.path(), "T-h", Status::Open, vec!["task-s".to_string()]);

        let graph = TaskGraph::build(tmp.path(), false);
        let h = scanner::scan_tasks(tmp.path(), false)
            .filter_map(|r| r.ok())
            .map(|o| o.front_matter)
            .find(|fm| fm.id == "T-h")
            .unwrap();
        assert!(graph.is_unblocked(&h).unwrap());
    }
}
