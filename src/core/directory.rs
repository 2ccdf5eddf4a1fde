//! Users and departments - assignee labels and department membership

use super::task::UNASSIGNED;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// An upstream user who can be responsible for tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub last_name: String,
    pub position: String,
    pub department_ids: Vec<String>,
    pub active: bool,
}

impl User {
    /// "LastName Name", or `None` when both are blank
    pub fn display_name(&self) -> Option<String> {
        let label = format!("{} {}", self.last_name, self.name).trim().to_string();
        (!label.is_empty()).then_some(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: String,
    pub name: String,
    pub parent: Option<String>,
    pub sort: i64,
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Normalize raw `user.get` records; records without an id are skipped
pub fn normalize_users(raw: &[Value]) -> Vec<User> {
    raw.iter()
        .filter_map(|user| {
            let id = text(user.get("ID"))?;
            let department_ids = user
                .get("UF_DEPARTMENT")
                .and_then(Value::as_array)
                .map(|ids| ids.iter().filter_map(|d| text(Some(d))).collect())
                .unwrap_or_default();
            Some(User {
                id,
                name: text(user.get("NAME")).unwrap_or_default(),
                last_name: text(user.get("LAST_NAME")).unwrap_or_default(),
                position: text(user.get("WORK_POSITION")).unwrap_or_default(),
                department_ids,
                active: user.get("ACTIVE").and_then(Value::as_bool) == Some(true),
            })
        })
        .collect()
}

/// Normalize raw `department.get` records
pub fn normalize_departments(raw: &[Value]) -> Vec<Department> {
    raw.iter()
        .filter_map(|dept| {
            Some(Department {
                id: text(dept.get("ID"))?,
                name: text(dept.get("NAME")).unwrap_or_default(),
                parent: text(dept.get("PARENT")).filter(|p| !p.is_empty()),
                sort: dept
                    .get("SORT")
                    .and_then(|s| s.as_i64().or_else(|| s.as_str()?.parse().ok()))
                    .unwrap_or(0),
            })
        })
        .collect()
}

/// Lookup table of users and departments
#[derive(Debug, Clone, Default)]
pub struct Directory {
    users: HashMap<String, User>,
    departments: Vec<Department>,
}

impl Directory {
    pub fn new(users: Vec<User>, departments: Vec<Department>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.id.clone(), u)).collect(),
            departments,
        }
    }

    /// Build from raw upstream payloads
    pub fn from_raw(users: &[Value], departments: &[Value]) -> Self {
        Self::new(normalize_users(users), normalize_departments(departments))
    }

    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.get(id)
    }

    pub fn departments(&self) -> &[Department] {
        &self.departments
    }

    /// Row label for an assignee bucket key
    pub fn assignee_label(&self, key: &str) -> String {
        if key == UNASSIGNED {
            return "Unassigned".to_string();
        }
        self.user(key)
            .and_then(User::display_name)
            .unwrap_or_else(|| format!("User {}", key))
    }

    /// True if the user exists and belongs to any of `departments`
    pub fn in_any_department<'a>(
        &self,
        user_id: &str,
        mut departments: impl Iterator<Item = &'a String>,
    ) -> bool {
        let Some(user) = self.user(user_id) else {
            return false;
        };
        departments.any(|d| user.department_ids.contains(d))
    }
}
