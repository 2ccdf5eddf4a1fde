//! Row flattener - pre-order walk of the row tree into renderable rows

use super::hierarchy::{GanttRow, RowKind};
use super::task::{Task, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a render row summarizes a group or is a single task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderKind {
    Summary,
    Task,
}

/// Emphasis flags for the renderer; colors are the renderer's business
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationHints {
    /// Task is overdue
    pub emphasize_background: bool,
    /// Task lies on the critical path
    pub emphasize_progress: bool,
}

/// One line of the Gantt chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRow {
    pub id: String,
    pub name: String,
    pub kind: RenderKind,
    /// Source row kind for summaries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_kind: Option<RowKind>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub progress: f64,
    /// Mirrors the row's collapse state (summaries only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hide_children: Option<bool>,
    /// Grouping id for the renderer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    pub hints: PresentationHints,
}

impl RenderRow {
    fn leaf(task: &Task, parent: Option<&str>) -> Self {
        Self {
            id: task.id.clone(),
            name: task.title.clone(),
            kind: RenderKind::Task,
            row_kind: None,
            start: task.start,
            end: task.end,
            progress: f64::from(task.progress),
            hide_children: None,
            parent: parent.map(str::to_string),
            dependencies: task.depends_on.iter().cloned().collect(),
            status: task.status,
            assignee_id: task.assignee_id.clone(),
            hints: PresentationHints {
                emphasize_background: task.is_overdue,
                emphasize_progress: task.is_critical,
            },
        }
    }

    /// Aggregate over every task under `row`; `None` for an empty row
    fn summary(row: &GanttRow, parent: Option<&str>) -> Option<Self> {
        let tasks = row.all_tasks();
        let start = tasks.iter().map(|t| t.start).min()?;
        let end = tasks.iter().map(|t| t.end).max()?;
        let progress =
            tasks.iter().map(|t| f64::from(t.progress)).sum::<f64>() / tasks.len() as f64;

        Some(Self {
            id: row.id.clone(),
            name: row.name.clone(),
            kind: RenderKind::Summary,
            row_kind: Some(row.kind),
            start,
            end,
            progress,
            hide_children: Some(row.collapsed),
            parent: parent.map(str::to_string),
            dependencies: Vec::new(),
            status: None,
            assignee_id: None,
            hints: PresentationHints::default(),
        })
    }
}

/// Flatten rows in pre-order. Leaves of a `Task` row are grouped under the
/// row's parent, never under the task row itself.
pub fn flatten(rows: &[GanttRow]) -> Vec<RenderRow> {
    let mut out = Vec::new();
    let mut stack: Vec<(&GanttRow, Option<&str>)> = rows.iter().rev().map(|r| (r, None)).collect();

    while let Some((row, parent)) = stack.pop() {
        if row.kind == RowKind::Task {
            out.extend(row.tasks.iter().map(|task| RenderRow::leaf(task, parent)));
            continue;
        }

        match RenderRow::summary(row, parent) {
            Some(summary) => out.push(summary),
            None => log::debug!("Skipping empty row {}", row.id),
        }

        if row.kind == RowKind::Assignee {
            out.extend(row.tasks.iter().map(|task| RenderRow::leaf(task, Some(row.id.as_str()))));
        }

        stack.extend(row.children.iter().rev().map(|child| (child, Some(row.id.as_str()))));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hierarchy::build_rows;
    use crate::core::task::Project;
    use chrono::{Duration, TimeZone};
    use std::collections::{BTreeSet, HashSet};

    fn task(id: &str, parent: Option<&str>, assignee: &str, day: i64, len: i64, progress: u8) -> Task {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day);
        Task {
            id: id.to_string(),
            title: id.to_string(),
            start,
            end: start + Duration::days(len),
            status: None,
            progress,
            assignee_id: Some(assignee.to_string()),
            parent_id: parent.map(str::to_string),
            project_id: Some("p".to_string()),
            depends_on: BTreeSet::new(),
            is_overdue: false,
            is_critical: false,
        }
    }

    fn rows(tasks: &[Task], collapsed: &[&str]) -> Vec<GanttRow> {
        let collapsed: HashSet<String> = collapsed.iter().map(|s| s.to_string()).collect();
        build_rows(tasks, &[Project::new("p", "P")], &collapsed)
    }

    #[test]
    fn test_preorder_with_parents() {
        let tasks = vec![
            task("1", None, "a", 0, 2, 100),
            task("2", Some("1"), "b", 2, 3, 50),
            task("3", None, "a", 1, 1, 0),
        ];
        let flat = flatten(&rows(&tasks, &[]));
        let layout: Vec<(&str, Option<&str>)> = flat
            .iter()
            .map(|r| (r.id.as_str(), r.parent.as_deref()))
            .collect();
        assert_eq!(
            layout,
            vec![
                ("project_p", None),
                ("task_1", Some("project_p")),
                ("assignee_1_a", Some("task_1")),
                ("1", Some("assignee_1_a")),
                ("assignee_1_b", Some("task_1")),
                ("2", Some("assignee_1_b")),
                // single task row: the leaf hangs off the project
                ("3", Some("project_p")),
            ]
        );
    }

    #[test]
    fn test_summary_span_and_progress() {
        let tasks = vec![task("1", None, "a", 0, 2, 100), task("2", Some("1"), "b", 2, 3, 50)];
        let flat = flatten(&rows(&tasks, &["task_1"]));
        let chain = flat.iter().find(|r| r.id == "task_1").unwrap();
        assert_eq!(chain.kind, RenderKind::Summary);
        assert_eq!(chain.row_kind, Some(RowKind::TaskChain));
        assert_eq!(chain.start, tasks[0].start);
        assert_eq!(chain.end, tasks[1].end);
        assert!((chain.progress - 75.0).abs() < f64::EPSILON);
        assert_eq!(chain.hide_children, Some(true));

        let project = &flat[0];
        assert_eq!(project.hide_children, Some(false));
    }

    #[test]
    fn test_leaf_hints() {
        let mut overdue = task("1", None, "a", 0, 1, 0);
        overdue.is_overdue = true;
        let mut critical = task("2", None, "a", 0, 1, 0);
        critical.is_critical = true;
        let flat = flatten(&rows(&[overdue, critical], &[]));

        let leaf = |id: &str| flat.iter().find(|r| r.id == id).unwrap().hints;
        assert!(leaf("1").emphasize_background);
        assert!(!leaf("1").emphasize_progress);
        assert!(leaf("2").emphasize_progress);
        assert!(!leaf("2").emphasize_background);
    }

    #[test]
    fn test_empty_rows() {
        assert!(flatten(&[]).is_empty());
        let empty = GanttRow {
            kind: RowKind::Project,
            id: "project_x".to_string(),
            name: "X".to_string(),
            tasks: Vec::new(),
            children: Vec::new(),
            collapsed: false,
        };
        assert!(flatten(&[empty]).is_empty());
    }
}
