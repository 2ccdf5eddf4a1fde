//! Canonical task and project types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Bucket key for tasks without a resolvable project
pub const UNASSIGNED: &str = "unassigned";

/// Task status, decoded from upstream numeric codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    New,
    InProgress,
    PendingReview,
    Done,
    Deferred,
}

impl TaskStatus {
    /// Map an upstream numeric status code (`2,3,4,5,7`)
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "2" => Some(Self::New),
            "3" => Some(Self::InProgress),
            "4" => Some(Self::PendingReview),
            "5" => Some(Self::Done),
            "7" => Some(Self::Deferred),
            _ => None,
        }
    }

    /// Upstream numeric code for this status
    pub fn code(&self) -> &'static str {
        match self {
            Self::New => "2",
            Self::InProgress => "3",
            Self::PendingReview => "4",
            Self::Done => "5",
            Self::Deferred => "7",
        }
    }

    /// Completion percentage implied by the status
    pub fn progress(&self) -> u8 {
        match self {
            Self::Done => 100,
            Self::PendingReview => 75,
            Self::InProgress => 50,
            Self::New | Self::Deferred => 0,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::InProgress => write!(f, "in_progress"),
            Self::PendingReview => write!(f, "pending_review"),
            Self::Done => write!(f, "done"),
            Self::Deferred => write!(f, "deferred"),
        }
    }
}

/// A normalized, schedulable task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: Option<TaskStatus>,
    pub progress: u8,
    pub assignee_id: Option<String>,
    pub parent_id: Option<String>,
    pub project_id: Option<String>,
    pub depends_on: BTreeSet<String>,
    pub is_overdue: bool,
    #[serde(default)]
    pub is_critical: bool,
}

impl Task {
    /// Scheduled length in milliseconds (never negative)
    pub fn duration_ms(&self) -> i64 {
        (self.end - self.start).num_milliseconds().max(0)
    }

    /// Project bucket key: the project id, or `unassigned`
    pub fn project_key(&self) -> &str {
        self.project_id.as_deref().unwrap_or(UNASSIGNED)
    }

    /// Assignee bucket key: the assignee id, or `unassigned`
    pub fn assignee_key(&self) -> &str {
        self.assignee_id.as_deref().unwrap_or(UNASSIGNED)
    }

    pub fn is_done(&self) -> bool {
        self.status == Some(TaskStatus::Done)
    }
}

/// A project (upstream work group) that tasks are bucketed under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Placeholder project for an id with no known metadata
    pub fn synthesized(id: &str) -> Self {
        Self::new(id, format!("Project {}", id))
    }
}
