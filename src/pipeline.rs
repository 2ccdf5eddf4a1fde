//! Pipeline - raw upstream records to renderable Gantt rows
//!
//! normalize → mark critical → filter → build rows → flatten. Critical flags
//! are computed over the whole batch before filtering, so hiding a task never
//! changes which of the remaining tasks are critical.

use crate::core::{
    flatten, mark_critical, Directory, HierarchyBuilder, Normalizer, RenderRow, SummaryStats,
    TaskFilter,
};
use crate::error::EngineError;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

/// Raw upstream payloads as saved by `ganttkit fetch --save` or by hand
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDump {
    pub tasks: Vec<Value>,
    pub projects: Vec<Value>,
    pub users: Vec<Value>,
    pub departments: Vec<Value>,
}

impl RawDump {
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let dump = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(dump)
    }

    pub fn directory(&self) -> Directory {
        Directory::from_raw(&self.users, &self.departments)
    }
}

/// Everything the chart needs for one render
#[derive(Debug, Clone, Serialize)]
pub struct GanttView {
    pub rows: Vec<RenderRow>,
    /// Counters over the whole batch, independent of the active filter
    pub stats: SummaryStats,
    /// Raw records that could not be scheduled
    pub dropped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct GanttPipeline {
    now: Option<DateTime<Utc>>,
    directory: Option<Directory>,
    filter: TaskFilter,
    collapsed: HashSet<String>,
}

impl GanttPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate overdue flags against `now` instead of the wall clock
    pub fn now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn directory(mut self, directory: Directory) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn filter(mut self, filter: TaskFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn collapsed<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collapsed = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn run(&self, raw_tasks: &[Value], raw_projects: &[Value]) -> Result<GanttView, EngineError> {
        let normalizer = self.now.map(Normalizer::at).unwrap_or_default();
        let batch = normalizer.run(raw_tasks, raw_projects);

        let tasks = mark_critical(batch.tasks)?;
        let stats = SummaryStats::from_tasks(&tasks);
        let tasks = self.filter.apply(tasks, self.directory.as_ref());

        let mut builder = HierarchyBuilder::new(&batch.projects, &self.collapsed);
        if let Some(directory) = &self.directory {
            builder = builder.with_directory(directory);
        }
        let rows = flatten(&builder.build(&tasks));

        Ok(GanttView {
            rows,
            stats,
            dropped: batch.dropped,
        })
    }

    pub fn run_dump(&self, dump: &RawDump) -> Result<GanttView, EngineError> {
        self.run(&dump.tasks, &dump.projects)
    }
}

/// Raw records to render rows with default settings
pub fn compute_gantt_rows(
    raw_tasks: &[Value],
    raw_projects: &[Value],
    collapsed: &HashSet<String>,
) -> Result<Vec<RenderRow>, EngineError> {
    GanttPipeline::new()
        .collapsed(collapsed.iter().cloned())
        .run(raw_tasks, raw_projects)
        .map(|view| view.rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RenderKind, TaskStatus};
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn records() -> Vec<Value> {
        vec![
            json!({ "ID": "1", "TITLE": "Design", "START_DATE_PLAN": "2024-01-01", "END_DATE_PLAN": "2024-01-03", "STATUS": "5", "GROUP_ID": "10", "RESPONSIBLE_ID": "7" }),
            json!({ "ID": "2", "TITLE": "Build", "START_DATE_PLAN": "2024-01-03", "END_DATE_PLAN": "2024-01-08", "STATUS": "3", "GROUP_ID": "10", "RESPONSIBLE_ID": "7", "DEPENDS_ON": ["1"], "DEADLINE": "2024-02-01" }),
            json!({ "ID": "3", "TITLE": "Docs", "START_DATE_PLAN": "2024-01-02", "END_DATE_PLAN": "2024-01-03", "STATUS": "2" }),
            json!({ "ID": "4", "TITLE": "No dates" }),
        ]
    }

    #[test]
    fn test_pipeline_end_to_end() {
        let projects = vec![json!({ "ID": "10", "NAME": "Website" })];
        let view = GanttPipeline::new().now(now()).run(&records(), &projects).unwrap();

        assert_eq!(view.dropped, 1);
        assert_eq!(view.stats.total, 3);
        assert_eq!(view.stats.completed, 1);
        assert_eq!(view.stats.overdue, 1);
        assert_eq!(view.stats.critical, 2);

        let ids: Vec<&str> = view.rows.iter().map(|r| r.id.as_str()).collect();
        assert!(ids.contains(&"project_10"));
        assert!(ids.contains(&"project_unassigned"));

        let build = view.rows.iter().find(|r| r.id == "2").unwrap();
        assert_eq!(build.kind, RenderKind::Task);
        assert_eq!(build.status, Some(TaskStatus::InProgress));
        assert!(build.hints.emphasize_background);
        assert!(build.hints.emphasize_progress);
    }

    #[test]
    fn test_filter_runs_after_critical_marking() {
        let filter = TaskFilter {
            search: Some("build".to_string()),
            ..Default::default()
        };
        let view = GanttPipeline::new()
            .now(now())
            .filter(filter)
            .run(&records(), &[])
            .unwrap();

        assert_eq!(view.stats.total, 3);
        assert_eq!(view.stats.critical, 2);
        let leaves: Vec<&RenderRow> = view.rows.iter().filter(|r| r.kind == RenderKind::Task).collect();
        assert_eq!(leaves.len(), 1);
        let leaf = leaves[0];
        assert_eq!(leaf.id, "2");
        assert!(leaf.hints.emphasize_progress);
    }

    #[test]
    fn test_stats_ignore_filter() {
        let unfiltered = GanttPipeline::new().now(now()).run(&records(), &[]).unwrap();
        let filtered = GanttPipeline::new()
            .now(now())
            .filter(TaskFilter {
                only_overdue: true,
                ..Default::default()
            })
            .run(&records(), &[])
            .unwrap();

        assert_eq!(filtered.stats, unfiltered.stats);
        assert!(filtered.rows.len() < unfiltered.rows.len());
    }

    #[test]
    fn test_cycle_surfaces_as_error() {
        let cyclic = vec![
            json!({ "id": "a", "title": "A", "startDatePlan": "2024-01-01", "endDatePlan": "2024-01-02", "dependsOn": ["b"] }),
            json!({ "id": "b", "title": "B", "startDatePlan": "2024-01-01", "endDatePlan": "2024-01-02", "dependsOn": ["a"] }),
        ];
        let err = compute_gantt_rows(&cyclic, &[], &HashSet::new()).unwrap_err();
        assert!(matches!(err, EngineError::CyclicDependency { .. }));
    }

    #[test]
    fn test_collapsed_ids_reach_summaries() {
        let collapsed: HashSet<String> = ["project_unassigned".to_string()].into_iter().collect();
        let rows = compute_gantt_rows(&records(), &[], &collapsed).unwrap();
        let summary = rows.iter().find(|r| r.id == "project_unassigned").unwrap();
        assert_eq!(summary.hide_children, Some(true));
    }

    #[test]
    fn test_dump_defaults_missing_sections() {
        let dump: RawDump = serde_json::from_value(json!({ "tasks": records() })).unwrap();
        assert!(dump.projects.is_empty());
        let view = GanttPipeline::new().now(now()).run_dump(&dump).unwrap();
        assert_eq!(view.stats.total, 3);
    }
}
