#![allow(dead_code)]

use std::time::Duration;

use tasksched::task::{Runnable, TaskSpec};
use tasksched::types::{Priority, TaskType};

/// Builder for `TaskSpec` to simplify test setup.
///
/// The fake backend scripts behaviour per command, so by default the command
/// line is the task name.
pub struct TaskSpecBuilder {
    spec: TaskSpec,
}

impl TaskSpecBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            spec: TaskSpec {
                name: name.to_string(),
                runnable: Some(Runnable::shell(name)),
                ..TaskSpec::default()
            },
        }
    }

    /// A task without a runnable; completes as soon as it is claimed.
    pub fn marker(name: &str) -> Self {
        let mut builder = Self::new(name);
        builder.spec.runnable = None;
        builder
    }

    pub fn id(mut self, id: &str) -> Self {
        self.spec.id = Some(id.to_string());
        self
    }

    pub fn command(mut self, cmd: &str) -> Self {
        self.spec.runnable = Some(Runnable::shell(cmd));
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.spec.priority = priority;
        self
    }

    pub fn task_type(mut self, task_type: TaskType) -> Self {
        self.spec.task_type = task_type;
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.spec.dependencies.insert(dep.to_string());
        self
    }

    pub fn retry_limit(mut self, limit: u32) -> Self {
        self.spec.retry_limit = Some(limit);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.spec.timeout = Some(timeout);
        self
    }

    pub fn description(mut self, text: &str) -> Self {
        self.spec.description = text.to_string();
        self
    }

    pub fn meta(mut self, key: &str, value: serde_json::Value) -> Self {
        self.spec.metadata.insert(key.to_string(), value);
        self
    }

    pub fn build(self) -> TaskSpec {
        self.spec
    }
}
