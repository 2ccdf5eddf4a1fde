//! Critical path analyzer - longest dependency chains over task durations
//!
//! Distances are computed in topological order (Kahn), so a cyclic
//! dependency graph is rejected up front instead of recursing forever.

use super::task::Task;
use crate::error::EngineError;
use std::collections::{HashMap, HashSet, VecDeque};

/// Result of a critical path pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CriticalPath {
    /// Accumulated duration (ms) of the longest chain ending at each task
    pub distances: HashMap<String, i64>,
    /// Longest accumulated duration over all tasks
    pub max_distance: i64,
    /// Every task lying on some chain of length `max_distance`
    pub critical: HashSet<String>,
}

impl CriticalPath {
    pub fn total_duration(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.max_distance)
    }

    pub fn is_critical(&self, task_id: &str) -> bool {
        self.critical.contains(task_id)
    }
}

/// Compute distances and the critical set without touching the tasks
pub fn analyze(tasks: &[Task]) -> Result<CriticalPath, EngineError> {
    if tasks.is_empty() {
        return Ok(CriticalPath::default());
    }

    let mut index: HashMap<&str, usize> = HashMap::with_capacity(tasks.len());
    for (i, task) in tasks.iter().enumerate() {
        if index.insert(task.id.as_str(), i).is_some() {
            return Err(EngineError::InvalidInput(format!(
                "duplicate task id {}",
                task.id
            )));
        }
    }

    // Dangling references are ignored
    let deps: Vec<Vec<usize>> = tasks
        .iter()
        .map(|task| {
            task.depends_on
                .iter()
                .filter_map(|dep| index.get(dep.as_str()).copied())
                .collect()
        })
        .collect();

    let mut pending: Vec<usize> = deps.iter().map(Vec::len).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
    for (i, task_deps) in deps.iter().enumerate() {
        for &dep in task_deps {
            dependents[dep].push(i);
        }
    }

    let mut ready: VecDeque<usize> = (0..tasks.len()).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(tasks.len());
    while let Some(i) = ready.pop_front() {
        order.push(i);
        for &next in &dependents[i] {
            pending[next] -= 1;
            if pending[next] == 0 {
                ready.push_back(next);
            }
        }
    }

    if order.len() < tasks.len() {
        let mut ids: Vec<String> = (0..tasks.len())
            .filter(|&i| pending[i] > 0)
            .map(|i| tasks[i].id.clone())
            .collect();
        ids.sort();
        return Err(EngineError::CyclicDependency { ids });
    }

    let mut distance = vec![0i64; tasks.len()];
    for &i in &order {
        let longest_dep = deps[i].iter().map(|&d| distance[d]).max().unwrap_or(0);
        distance[i] = longest_dep
            .checked_add(tasks[i].duration_ms())
            .ok_or_else(|| {
                EngineError::InvalidInput(format!(
                    "dependency chain ending at task {} is too long to measure",
                    tasks[i].id
                ))
            })?;
    }
    let max_distance = distance.iter().copied().max().unwrap_or(0);

    // Walk back from every chain end that reaches the maximum, following
    // only edges whose accumulated length ties exactly.
    let mut critical = HashSet::new();
    let mut stack: Vec<usize> = (0..tasks.len())
        .filter(|&i| distance[i] == max_distance)
        .collect();
    while let Some(i) = stack.pop() {
        if !critical.insert(tasks[i].id.clone()) {
            continue;
        }
        let own = tasks[i].duration_ms();
        for &dep in &deps[i] {
            if distance[dep].checked_add(own) == Some(distance[i]) {
                stack.push(dep);
            }
        }
    }

    log::debug!(
        "Critical path: {} of {} tasks, length {}ms",
        critical.len(),
        tasks.len(),
        max_distance
    );

    Ok(CriticalPath {
        distances: tasks
            .iter()
            .zip(distance)
            .map(|(task, d)| (task.id.clone(), d))
            .collect(),
        max_distance,
        critical,
    })
}

/// Populate `is_critical` on every task
pub fn mark_critical(mut tasks: Vec<Task>) -> Result<Vec<Task>, EngineError> {
    let path = analyze(&tasks)?;
    for task in &mut tasks {
        task.is_critical = path.is_critical(&task.id);
    }
    Ok(tasks)
}
