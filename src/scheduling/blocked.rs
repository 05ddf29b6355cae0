// src/scheduling/blocked.rs

//! Advisory diagnostics for tasks that cannot be scheduled.
//!
//! The gate performs no cycle detection, so tasks in a dependency cycle
//! starve in QUEUED forever. This module only *reports* that situation; the
//! selector never consults it.

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use serde::Serialize;

use crate::scheduling::gate::{status_index, unmet_dependencies};
use crate::task::{Task, TaskId};
use crate::types::TaskStatus;

/// A QUEUED task held back by dependencies that are present but not COMPLETED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedTask {
    pub task_id: TaskId,
    pub waiting_on: Vec<TaskId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlockedReport {
    pub blocked: Vec<BlockedTask>,
    /// Dependency cycles among non-terminal tasks, each sorted by id.
    pub cycles: Vec<Vec<TaskId>>,
}

impl BlockedReport {
    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty() && self.cycles.is_empty()
    }
}

pub fn blocked_report(snapshot: &[Task]) -> BlockedReport {
    let index = status_index(snapshot);

    let blocked = snapshot
        .iter()
        .filter(|t| t.status == TaskStatus::Queued)
        .filter_map(|t| {
            let waiting_on = unmet_dependencies(t, &index);
            if waiting_on.is_empty() {
                None
            } else {
                Some(BlockedTask {
                    task_id: t.id.clone(),
                    waiting_on: waiting_on.into_iter().map(str::to_string).collect(),
                })
            }
        })
        .collect();

    BlockedReport {
        blocked,
        cycles: dependency_cycles(snapshot),
    }
}

/// Strongly connected dependency components among non-terminal tasks.
///
/// Edge direction: dependency -> dependent.
pub fn dependency_cycles(snapshot: &[Task]) -> Vec<Vec<TaskId>> {
    let live: Vec<&Task> = snapshot
        .iter()
        .filter(|t| !t.status.is_terminal())
        .collect();

    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for task in &live {
        graph.add_node(task.id.as_str());
    }
    for task in &live {
        for dep in &task.dependencies {
            if graph.contains_node(dep.as_str()) {
                graph.add_edge(dep.as_str(), task.id.as_str(), ());
            }
        }
    }

    let mut cycles: Vec<Vec<TaskId>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|component| {
            component.len() > 1
                || component
                    .first()
                    .is_some_and(|n| graph.contains_edge(*n, *n))
        })
        .map(|component| {
            let mut ids: Vec<TaskId> = component.into_iter().map(str::to_string).collect();
            ids.sort();
            ids
        })
        .collect();

    cycles.sort();
    cycles
}
