//! Task normalizer - turns loosely-typed upstream records into canonical tasks
//!
//! Upstream task payloads arrive in several historical schema variants
//! (`START_DATE_PLAN` vs `startDatePlan`, ...). Every logical field is
//! resolved once, here, through an ordered alias table; nothing past this
//! module sees raw JSON.

use super::task::{Project, Task, TaskStatus};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashSet};
use std::sync::OnceLock;

/// Ordered alias keys per logical field. The first present, non-empty value wins.
pub struct Aliases;

impl Aliases {
    pub const ID: &'static [&'static str] = &["ID", "id"];
    pub const TITLE: &'static [&'static str] = &["TITLE", "title", "NAME", "name"];
    pub const START: &'static [&'static str] =
        &["START_DATE_PLAN", "startDatePlan", "CREATED_DATE", "createdDate"];
    pub const END: &'static [&'static str] = &[
        "END_DATE_PLAN",
        "endDatePlan",
        "DEADLINE",
        "deadline",
        "CLOSED_DATE",
        "closedDate",
    ];
    pub const DEADLINE: &'static [&'static str] = &["DEADLINE", "deadline"];
    pub const STATUS: &'static [&'static str] = &["STATUS", "status"];
    pub const ASSIGNEE: &'static [&'static str] = &["RESPONSIBLE_ID", "responsibleId"];
    pub const PARENT: &'static [&'static str] = &["PARENT_ID", "parentId"];
    pub const PROJECT: &'static [&'static str] = &["GROUP_ID", "groupId"];
    pub const PROJECT_NAME: &'static [&'static str] = &["GROUP_NAME", "groupName"];
    pub const PROJECT_OBJECT: &'static [&'static str] = &["GROUP", "group"];
    pub const DEPENDENCIES: &'static [&'static str] =
        &["SE_DEPENDS_ON", "seDependsOn", "DEPENDS_ON", "dependsOn"];
    pub const DEPENDENCY_ID: &'static [&'static str] =
        &["DEPENDS_ON_ID", "dependsOnId", "TASK_ID", "taskId"];
    pub const NAME: &'static [&'static str] = &["NAME", "name"];
}

const UNTITLED_TASK: &str = "Untitled";
const UNTITLED_PROJECT: &str = "Untitled project";

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:-]*$").expect("static regex"))
}

/// Result of one normalization pass
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub tasks: Vec<Task>,
    /// Known projects followed by projects synthesized from task metadata
    pub projects: Vec<Project>,
    /// Records excluded because they could not be scheduled
    pub dropped: usize,
}

/// Normalizer with a fixed notion of "now" for the overdue check
#[derive(Debug, Clone)]
pub struct Normalizer {
    now: DateTime<Utc>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self { now: Utc::now() }
    }

    /// Evaluate overdue flags against a fixed instant
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    /// Normalize raw task and project records
    pub fn run(&self, records: &[Value], raw_projects: &[Value]) -> NormalizedBatch {
        let mut projects = normalize_projects(raw_projects);
        let mut known: HashSet<String> = projects.iter().map(|p| p.id.clone()).collect();

        let mut tasks = Vec::with_capacity(records.len());
        let mut seen_ids = HashSet::new();
        let mut dropped = 0;

        for (index, record) in records.iter().enumerate() {
            let Some(fields) = record.as_object() else {
                log::debug!("Dropping record #{}: not an object", index);
                dropped += 1;
                continue;
            };

            let Some((task, project_name)) = self.normalize_record(fields) else {
                log::debug!("Dropping record #{}: no schedulable dates", index);
                dropped += 1;
                continue;
            };

            if !seen_ids.insert(task.id.clone()) {
                log::debug!("Dropping record #{}: duplicate task id {}", index, task.id);
                dropped += 1;
                continue;
            }

            if let Some(project_id) = &task.project_id {
                if known.insert(project_id.clone()) {
                    projects.push(match project_name {
                        Some(name) => Project::new(project_id.as_str(), name),
                        None => Project::synthesized(project_id),
                    });
                }
            }

            tasks.push(task);
        }

        log::info!(
            "Normalized {} tasks ({} dropped), {} projects",
            tasks.len(),
            dropped,
            projects.len()
        );

        NormalizedBatch {
            tasks,
            projects,
            dropped,
        }
    }

    /// Resolve one record; `None` when it cannot be scheduled
    fn normalize_record(&self, fields: &Map<String, Value>) -> Option<(Task, Option<String>)> {
        let start_raw = pick_string(fields, Aliases::START)?;
        let end_raw = pick_string(fields, Aliases::END)?;

        let start = parse_timestamp(&start_raw)?;
        let end = match parse_timestamp(&end_raw) {
            Some(end) if end >= start => end,
            _ => start + Duration::days(1),
        };

        let title = pick_string(fields, Aliases::TITLE).unwrap_or_else(|| UNTITLED_TASK.to_string());
        let assignee_id = reference(fields, Aliases::ASSIGNEE);
        let id = pick_string(fields, Aliases::ID).unwrap_or_else(|| {
            format!("{}_{}", title, assignee_id.as_deref().unwrap_or("unknown"))
        });

        let status = pick_string(fields, Aliases::STATUS).and_then(|code| TaskStatus::from_code(&code));
        let progress = status.map(|s| s.progress()).unwrap_or(0);

        let is_overdue = match pick_string(fields, Aliases::DEADLINE).and_then(|d| parse_timestamp(&d)) {
            Some(deadline) if status != Some(TaskStatus::Done) => {
                deadline.date_naive() < self.now.date_naive()
            }
            _ => false,
        };

        let mut depends_on = dependencies(fields);
        depends_on.remove(&id);

        let task = Task {
            parent_id: reference(fields, Aliases::PARENT).filter(|p| *p != id),
            project_id: reference(fields, Aliases::PROJECT),
            id,
            title,
            start,
            end,
            status,
            progress,
            assignee_id,
            depends_on,
            is_overdue,
            is_critical: false,
        };

        Some((task, project_name(fields)))
    }
}

/// Normalize with the current time; returns only the tasks
pub fn normalize(records: &[Value], raw_projects: &[Value]) -> Vec<Task> {
    Normalizer::new().run(records, raw_projects).tasks
}

/// Normalize raw project records, skipping ones without an id
pub fn normalize_projects(raw_projects: &[Value]) -> Vec<Project> {
    let mut seen = HashSet::new();
    raw_projects
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|fields| {
            let id = pick_string(fields, Aliases::ID)?;
            let name = pick_string(fields, Aliases::NAME).unwrap_or_else(|| UNTITLED_PROJECT.to_string());
            Some(Project { id, name })
        })
        .filter(|project| seen.insert(project.id.clone()))
        .collect()
}

/// Parse the date formats seen in upstream payloads. Naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%d %H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%d.%m.%Y %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for format in ["%Y-%m-%d", "%d.%m.%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// First present, non-empty value among `keys`
fn pick<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|key| fields.get(*key)).find(|value| match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    })
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn pick_string(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    pick(fields, keys).and_then(scalar_string)
}

/// A reference to another entity; `0` is the upstream "none" marker
fn reference(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    pick_string(fields, keys).filter(|id| id != "0" && id_pattern().is_match(id))
}

fn project_name(fields: &Map<String, Value>) -> Option<String> {
    pick_string(fields, Aliases::PROJECT_NAME).or_else(|| {
        pick(fields, Aliases::PROJECT_OBJECT)
            .and_then(Value::as_object)
            .and_then(|group| pick_string(group, Aliases::NAME))
    })
}

fn dependencies(fields: &Map<String, Value>) -> BTreeSet<String> {
    let Some(Value::Array(items)) = pick(fields, Aliases::DEPENDENCIES) else {
        return BTreeSet::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(dep) => pick_string(dep, Aliases::DEPENDENCY_ID),
            other => scalar_string(other),
        })
        .filter(|id| id != "0" && id_pattern().is_match(id))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_uppercase_schema() {
        let records = vec![json!({
            "ID": 42,
            "TITLE": "Build API",
            "START_DATE_PLAN": "2024-06-01T09:00:00+03:00",
            "END_DATE_PLAN": "2024-06-05T18:00:00+03:00",
            "STATUS": "3",
            "RESPONSIBLE_ID": "7",
            "PARENT_ID": "40",
            "GROUP_ID": 3,
            "SE_DEPENDS_ON": [{ "DEPENDS_ON_ID": "41" }, { "TASK_ID": 39 }]
        })];
        let batch = Normalizer::at(now()).run(&records, &[]);
        assert_eq!(batch.tasks.len(), 1);

        let task = &batch.tasks[0];
        assert_eq!(task.id, "42");
        assert_eq!(task.title, "Build API");
        assert_eq!(task.status, Some(TaskStatus::InProgress));
        assert_eq!(task.progress, 50);
        assert_eq!(task.assignee_id.as_deref(), Some("7"));
        assert_eq!(task.parent_id.as_deref(), Some("40"));
        assert_eq!(task.project_id.as_deref(), Some("3"));
        assert_eq!(
            task.depends_on.iter().cloned().collect::<Vec<_>>(),
            vec!["39".to_string(), "41".to_string()]
        );
        assert_eq!(task.start, Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap());
    }

    #[test]
    fn test_camel_case_schema_and_fallback_dates() {
        let records = vec![json!({
            "id": "9",
            "title": "",
            "name": "Fallback name",
            "createdDate": "2024-05-01",
            "deadline": "2024-05-03",
            "status": "5"
        })];
        let task = &Normalizer::at(now()).run(&records, &[]).tasks[0];
        assert_eq!(task.title, "Fallback name");
        assert_eq!(task.start, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
        assert_eq!(task.end, Utc.with_ymd_and_hms(2024, 5, 3, 0, 0, 0).unwrap());
        assert_eq!(task.progress, 100);
        // done tasks are never overdue
        assert!(!task.is_overdue);
    }

    #[test]
    fn test_records_without_dates_are_dropped() {
        let records = vec![
            json!({ "ID": "1", "TITLE": "no dates" }),
            json!({ "ID": "2", "START_DATE_PLAN": "2024-01-01" }),
            json!({ "ID": "3", "START_DATE_PLAN": "garbage", "DEADLINE": "2024-01-02" }),
            json!("not an object"),
            json!({ "ID": "4", "START_DATE_PLAN": "2024-01-01", "DEADLINE": "2024-01-02" }),
        ];
        let batch = Normalizer::at(now()).run(&records, &[]);
        assert_eq!(batch.dropped, 4);
        assert_eq!(batch.tasks.len(), 1);
        assert_eq!(batch.tasks[0].id, "4");
    }

    #[test]
    fn test_end_before_start_is_forced_to_one_day() {
        let records = vec![
            json!({ "ID": "1", "START_DATE_PLAN": "2024-03-10", "END_DATE_PLAN": "2024-03-01" }),
            json!({ "ID": "2", "START_DATE_PLAN": "2024-03-10", "END_DATE_PLAN": "soon" }),
        ];
        let batch = Normalizer::at(now()).run(&records, &[]);
        for task in &batch.tasks {
            assert!(task.end >= task.start);
            assert_eq!(task.end - task.start, Duration::days(1));
        }
    }

    #[test]
    fn test_overdue_uses_day_granularity() {
        let records = vec![
            json!({ "ID": "past", "START_DATE_PLAN": "2024-06-01", "DEADLINE": "2024-06-14T23:00:00Z", "STATUS": "3" }),
            json!({ "ID": "today", "START_DATE_PLAN": "2024-06-01", "DEADLINE": "2024-06-15T00:01:00Z", "STATUS": "3" }),
            json!({ "ID": "no-deadline", "START_DATE_PLAN": "2024-06-01", "END_DATE_PLAN": "2024-06-02" }),
        ];
        let tasks = Normalizer::at(now()).run(&records, &[]).tasks;
        assert!(tasks[0].is_overdue);
        assert!(!tasks[1].is_overdue);
        assert!(!tasks[2].is_overdue);
    }

    #[test]
    fn test_project_synthesis() {
        let projects = vec![json!({ "ID": "1", "NAME": "Known" })];
        let records = vec![
            json!({ "ID": "a", "START_DATE_PLAN": "2024-01-01", "DEADLINE": "2024-01-02", "GROUP_ID": "1" }),
            json!({ "ID": "b", "START_DATE_PLAN": "2024-01-01", "DEADLINE": "2024-01-02", "GROUP_ID": "2",
                    "group": { "id": "2", "name": "From metadata" } }),
            json!({ "ID": "c", "START_DATE_PLAN": "2024-01-01", "DEADLINE": "2024-01-02", "GROUP_ID": "5" }),
            json!({ "ID": "d", "START_DATE_PLAN": "2024-01-01", "DEADLINE": "2024-01-02", "GROUP_ID": "0" }),
        ];
        let batch = Normalizer::at(now()).run(&records, &projects);
        assert_eq!(
            batch.projects,
            vec![
                Project::new("1", "Known"),
                Project::new("2", "From metadata"),
                Project::new("5", "Project 5"),
            ]
        );
        assert_eq!(batch.tasks[3].project_id, None);
    }

    #[test]
    fn test_malformed_dependency_ids_filtered() {
        let records = vec![json!({
            "ID": "5",
            "START_DATE_PLAN": "2024-01-01",
            "DEADLINE": "2024-01-02",
            "DEPENDS_ON": ["1", 2, "bad id", "", null, { "dependsOnId": "3" }, "5", "0"]
        })];
        let task = &Normalizer::at(now()).run(&records, &[]).tasks[0];
        assert_eq!(
            task.depends_on.iter().cloned().collect::<Vec<_>>(),
            vec!["1".to_string(), "2".to_string(), "3".to_string()]
        );
    }

    #[test]
    fn test_missing_id_falls_back_to_title_and_assignee() {
        let records = vec![json!({
            "TITLE": "Orphan",
            "RESPONSIBLE_ID": 3,
            "START_DATE_PLAN": "2024-01-01",
            "DEADLINE": "2024-01-02"
        })];
        let task = &Normalizer::at(now()).run(&records, &[]).tasks[0];
        assert_eq!(task.id, "Orphan_3");
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let records = vec![
            json!({ "ID": "1", "TITLE": "first", "START_DATE_PLAN": "2024-01-01", "DEADLINE": "2024-01-02" }),
            json!({ "ID": "1", "TITLE": "second", "START_DATE_PLAN": "2024-01-01", "DEADLINE": "2024-01-02" }),
        ];
        let batch = Normalizer::at(now()).run(&records, &[]);
        assert_eq!(batch.tasks.len(), 1);
        assert_eq!(batch.tasks[0].title, "first");
        assert_eq!(batch.dropped, 1);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 2, 29, 10, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-02-29T10:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-02-29T13:30:00+0300"), Some(expected));
        assert_eq!(parse_timestamp("2024-02-29 10:30:00"), Some(expected));
        assert_eq!(parse_timestamp("29.02.2024 10:30:00"), Some(expected));
        assert!(parse_timestamp("29.02.2024").is_some());
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }
}
