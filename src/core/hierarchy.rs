//! Hierarchy builder - project → task chain → assignee rows
//!
//! Parent/child links never cross project buckets. Trees are built with an
//! explicit stack and a visited set, so untrusted `parent_id` chains can be
//! arbitrarily deep (or cyclic) without blowing the call stack.

use super::directory::Directory;
use super::task::{Project, Task, UNASSIGNED};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Kind of a hierarchy row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    Project,
    TaskChain,
    Assignee,
    Task,
}

/// A node of the Gantt row tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GanttRow {
    pub kind: RowKind,
    pub id: String,
    pub name: String,
    /// Only `Task` and `Assignee` rows carry tasks directly
    pub tasks: Vec<Task>,
    pub children: Vec<GanttRow>,
    pub collapsed: bool,
}

impl GanttRow {
    /// Every task under this row, pre-order
    pub fn all_tasks(&self) -> Vec<&Task> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(row) = stack.pop() {
            out.extend(row.tasks.iter());
            stack.extend(row.children.iter().rev());
        }
        out
    }

    pub fn earliest_start(&self) -> Option<DateTime<Utc>> {
        self.all_tasks().into_iter().map(|t| t.start).min()
    }
}

/// Row id helpers, stable across runs
pub fn project_row_id(project_key: &str) -> String {
    format!("project_{}", project_key)
}

pub fn task_row_id(task_id: &str) -> String {
    format!("task_{}", task_id)
}

pub fn assignee_row_id(chain_root_id: &str, assignee_key: &str) -> String {
    format!("assignee_{}_{}", chain_root_id, assignee_key)
}

/// Case-insensitive name ordering with a byte-wise tie-break
pub fn collate(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Order rows by earliest descendant start, then name, then id
fn sort_by_start_then_name(rows: &mut [GanttRow]) {
    rows.sort_by_cached_key(|row| {
        (
            row.earliest_start().unwrap_or(DateTime::<Utc>::MAX_UTC),
            row.name.to_lowercase(),
            row.name.clone(),
            row.id.clone(),
        )
    });
}

/// Builds project rows from normalized tasks
pub struct HierarchyBuilder<'a> {
    projects: HashMap<&'a str, &'a Project>,
    collapsed: &'a HashSet<String>,
    directory: Option<&'a Directory>,
}

impl<'a> HierarchyBuilder<'a> {
    pub fn new(projects: &'a [Project], collapsed: &'a HashSet<String>) -> Self {
        Self {
            projects: projects.iter().map(|p| (p.id.as_str(), p)).collect(),
            collapsed,
            directory: None,
        }
    }

    /// Use user names for assignee rows
    pub fn with_directory(mut self, directory: &'a Directory) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Bucket key: a known project id, else `unassigned`
    fn bucket_key<'t>(&self, task: &'t Task) -> &'t str {
        match task.project_id.as_deref() {
            Some(id) if self.projects.contains_key(id) => id,
            _ => UNASSIGNED,
        }
    }

    fn assignee_label(&self, key: &str) -> String {
        match self.directory {
            Some(directory) => directory.assignee_label(key),
            None if key == UNASSIGNED => "Unassigned".to_string(),
            None => format!("User {}", key),
        }
    }

    /// One row per non-empty project bucket
    pub fn build(&self, tasks: &[Task]) -> Vec<GanttRow> {
        let mut bucket_order: Vec<&str> = Vec::new();
        let mut buckets: HashMap<&str, Vec<&Task>> = HashMap::new();
        for task in tasks {
            let key = self.bucket_key(task);
            buckets
                .entry(key)
                .or_insert_with(|| {
                    bucket_order.push(key);
                    Vec::new()
                })
                .push(task);
        }

        let mut rows: Vec<GanttRow> = bucket_order
            .into_iter()
            .filter_map(|key| self.build_project(key, &buckets[key]))
            .collect();
        sort_by_start_then_name(&mut rows);
        rows
    }

    fn build_project(&self, key: &str, members: &[&Task]) -> Option<GanttRow> {
        let by_id: HashMap<&str, &Task> = members.iter().map(|&t| (t.id.as_str(), t)).collect();

        // The unassigned bucket mixes unknown project ids, so a parent link
        // only holds when both tasks carry the same project id.
        let mut children_of: HashMap<&str, Vec<&Task>> = HashMap::new();
        let mut roots = Vec::new();
        for &task in members {
            let local_parent = task
                .parent_id
                .as_deref()
                .and_then(|parent| by_id.get(parent))
                .filter(|parent| parent.project_id == task.project_id);
            match local_parent {
                Some(parent) => children_of.entry(parent.id.as_str()).or_default().push(task),
                None => roots.push(task),
            }
        }

        let mut placed = 0;
        let mut chains: Vec<GanttRow> = roots
            .into_iter()
            .map(|root| {
                let row = self.build_chain(root, &children_of);
                placed += row.all_tasks().len();
                row
            })
            .collect();

        if placed < members.len() {
            log::debug!(
                "Project bucket {}: {} tasks unreachable from any root (parent cycle)",
                key,
                members.len() - placed
            );
        }
        if chains.is_empty() {
            return None;
        }
        sort_by_start_then_name(&mut chains);

        let id = project_row_id(key);
        let name = self
            .projects
            .get(key)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "No project".to_string());

        Some(GanttRow {
            kind: RowKind::Project,
            collapsed: self.collapsed.contains(&id),
            id,
            name,
            tasks: Vec::new(),
            children: chains,
        })
    }

    /// A root with descendants becomes a task chain grouped by assignee;
    /// a root without descendants is a plain task row.
    fn build_chain(&self, root: &Task, children_of: &HashMap<&str, Vec<&Task>>) -> GanttRow {
        let mut members: Vec<&Task> = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack = vec![root];
        while let Some(task) = stack.pop() {
            if !visited.insert(task.id.as_str()) {
                continue;
            }
            members.push(task);
            if let Some(children) = children_of.get(task.id.as_str()) {
                stack.extend(children.iter().rev());
            }
        }

        let id = task_row_id(&root.id);
        let collapsed = self.collapsed.contains(&id);

        if members.len() == 1 {
            return GanttRow {
                kind: RowKind::Task,
                id,
                name: root.title.clone(),
                tasks: vec![root.clone()],
                children: Vec::new(),
                collapsed,
            };
        }

        let mut assignee_order: Vec<&str> = Vec::new();
        let mut by_assignee: HashMap<&str, Vec<Task>> = HashMap::new();
        for task in members {
            let key = task.assignee_key();
            by_assignee
                .entry(key)
                .or_insert_with(|| {
                    assignee_order.push(key);
                    Vec::new()
                })
                .push(task.clone());
        }

        let mut assignees: Vec<GanttRow> = assignee_order
            .into_iter()
            .map(|key| {
                let row_id = assignee_row_id(&root.id, key);
                GanttRow {
                    kind: RowKind::Assignee,
                    collapsed: self.collapsed.contains(&row_id),
                    id: row_id,
                    name: self.assignee_label(key),
                    tasks: by_assignee.remove(key).unwrap_or_default(),
                    children: Vec::new(),
                }
            })
            .collect();
        assignees.sort_by(|a, b| collate(&a.name, &b.name).then_with(|| a.id.cmp(&b.id)));

        GanttRow {
            kind: RowKind::TaskChain,
            id,
            name: root.title.clone(),
            tasks: Vec::new(),
            children: assignees,
            collapsed,
        }
    }
}

/// Build project rows (no user directory; assignee rows labelled by id)
pub fn build_rows(tasks: &[Task], projects: &[Project], collapsed: &HashSet<String>) -> Vec<GanttRow> {
    HierarchyBuilder::new(projects, collapsed).build(tasks)
}

/// Set of collapsed row ids, toggled by the client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollapseState {
    ids: HashSet<String>,
}

impl CollapseState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&mut self, id: &str) {
        if !self.ids.remove(id) {
            self.ids.insert(id.to_string());
        }
    }

    /// Collapse every given project row
    pub fn collapse_all<I, S>(&mut self, project_row_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids.extend(project_row_ids.into_iter().map(Into::into));
    }

    pub fn expand_all(&mut self) {
        self.ids.clear();
    }

    pub fn is_collapsed(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn ids(&self) -> &HashSet<String> {
        &self.ids
    }
}
