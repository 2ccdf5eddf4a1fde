//! Task filters and summary statistics for the dashboard side panel

use super::directory::Directory;
use super::task::{Task, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Conjunctive task filter; empty criteria are inactive
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskFilter {
    /// Case-insensitive title substring
    pub search: Option<String>,
    pub date_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub statuses: HashSet<TaskStatus>,
    pub assignees: HashSet<String>,
    /// Requires a directory to resolve assignee membership
    pub departments: HashSet<String>,
    /// Project bucket keys (`unassigned` for tasks without a project)
    pub projects: HashSet<String>,
    pub only_overdue: bool,
    pub only_critical: bool,
}

impl TaskFilter {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Check one task against every active criterion
    pub fn matches(&self, task: &Task, directory: Option<&Directory>) -> bool {
        if let Some(query) = self.search.as_deref().filter(|q| !q.is_empty()) {
            if !task.title.to_lowercase().contains(&query.to_lowercase()) {
                return false;
            }
        }

        if let Some((from, to)) = self.date_range {
            let starts_inside = task.start >= from && task.start <= to;
            let ends_inside = task.end >= from && task.end <= to;
            let spans = task.start <= from && task.end >= to;
            if !(starts_inside || ends_inside || spans) {
                return false;
            }
        }

        if !self.statuses.is_empty() && !task.status.is_some_and(|s| self.statuses.contains(&s)) {
            return false;
        }

        if !self.assignees.is_empty()
            && !task
                .assignee_id
                .as_ref()
                .is_some_and(|a| self.assignees.contains(a))
        {
            return false;
        }

        if !self.departments.is_empty() {
            let member = match (task.assignee_id.as_deref(), directory) {
                (Some(assignee), Some(directory)) => {
                    directory.in_any_department(assignee, self.departments.iter())
                }
                _ => false,
            };
            if !member {
                return false;
            }
        }

        if !self.projects.is_empty() && !self.projects.contains(task.project_key()) {
            return false;
        }

        (!self.only_overdue || task.is_overdue) && (!self.only_critical || task.is_critical)
    }

    /// Keep the tasks that match
    pub fn apply(&self, tasks: Vec<Task>, directory: Option<&Directory>) -> Vec<Task> {
        if self.is_empty() {
            return tasks;
        }
        let before = tasks.len();
        let kept: Vec<Task> = tasks
            .into_iter()
            .filter(|task| self.matches(task, directory))
            .collect();
        log::debug!("Filter kept {} of {} tasks", kept.len(), before);
        kept
    }
}

/// Header counters shown next to the chart
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub total: usize,
    pub overdue: usize,
    pub completed: usize,
    pub critical: usize,
}

impl SummaryStats {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        tasks.iter().fold(Self::default(), |mut stats, task| {
            stats.total += 1;
            stats.overdue += usize::from(task.is_overdue);
            stats.completed += usize::from(task.progress >= 100);
            stats.critical += usize::from(task.is_critical);
            stats
        })
    }
}
