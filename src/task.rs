//! Task records as supplied by the external task store.
//!
//! The engine only reads tasks; it never mutates or persists them. Field
//! names follow the JSON the task store produces, so tasks can be decoded
//! straight from a `JsValue`.

use serde::{Deserialize, Serialize};

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Sort rank, highest priority first.
    pub fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

/// Task (and subtask) status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    #[default]
    Pending,
    InProgress,
    Done,
}

impl Status {
    /// Sort rank within a level column: active work first, finished work last.
    pub fn rank(self) -> u8 {
        match self {
            Self::InProgress => 0,
            Self::Pending => 1,
            Self::Done => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Subtask {
    pub id: u32,
    pub title: String,
    pub status: Status,
}

/// A task in the project task list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    pub id: u32,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: Status,
    /// Ids of the tasks this task depends on. May be dangling or cyclic.
    pub dependencies: Vec<u32>,
    pub subtasks: Vec<Subtask>,
}

impl Task {
    pub fn new(id: u32, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = u32>) -> Self {
        self.dependencies = dependencies.into_iter().collect();
        self
    }

    pub fn with_subtasks(mut self, subtasks: Vec<Subtask>) -> Self {
        self.subtasks = subtasks;
        self
    }

    /// A task is active when it, or any of its subtasks, is in progress.
    pub fn is_active(&self) -> bool {
        self.status == Status::InProgress
            || self.subtasks.iter().any(|s| s.status == Status::InProgress)
    }
}
