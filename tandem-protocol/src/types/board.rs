//! Task board types: records, comments, and wire deltas

use serde::{Deserialize, Serialize};

/// Board column a task lives in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TaskColumn {
    Todo,
    InProgress,
    Done,
}

impl std::fmt::Display for TaskColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskColumn::Todo => "todo",
            TaskColumn::InProgress => "in-progress",
            TaskColumn::Done => "done",
        };
        write!(f, "{}", s)
    }
}

/// Task priority level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskPriority::High => "high",
            TaskPriority::Medium => "medium",
            TaskPriority::Low => "low",
        };
        write!(f, "{}", s)
    }
}

/// One comment on a task, append-only
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub user_id: String,
    pub text: String,
    /// Milliseconds since epoch, supplied by the voice/transcription layer
    pub timestamp: u64,
}

/// A shared task card
///
/// Records carry no version or clock field: concurrent edits from two
/// participants are unordered and resolve last-writer-wins per field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    pub id: String,
    pub column: TaskColumn,
    pub priority: TaskPriority,
    pub text: String,
    /// Ordering index within the column
    pub position: i32,
    pub comments: Vec<Comment>,
    pub assigned_to: Option<String>,
}

impl TaskRecord {
    /// Create an empty record in the todo column
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            column: TaskColumn::Todo,
            priority: TaskPriority::Medium,
            text: String::new(),
            position: 0,
            comments: Vec::new(),
            assigned_to: None,
        }
    }

    /// Apply a wire delta field by field, last writer wins
    ///
    /// Column and position are always present in a delta; the optional
    /// fields only overwrite when set.
    pub fn apply(&mut self, update: &TaskUpdate) {
        self.column = update.column;
        self.position = update.position;
        if let Some(text) = &update.text {
            self.text = text.clone();
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        if let Some(assigned_to) = &update.assigned_to {
            self.assigned_to = Some(assigned_to.clone());
        }
    }

    /// Append a comment; comments are never reordered or removed
    pub fn push_comment(&mut self, comment: Comment) {
        self.comments.push(comment);
    }
}

/// Wire delta for a task mutation
///
/// Column and position ride on every update (they describe where the card
/// sits); text, priority, and assignee are only carried when they changed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskUpdate {
    pub task_id: String,
    pub column: TaskColumn,
    pub position: i32,
    pub text: Option<String>,
    pub priority: Option<TaskPriority>,
    pub assigned_to: Option<String>,
}

impl TaskUpdate {
    /// Delta describing a pure card movement
    pub fn movement(task_id: impl Into<String>, column: TaskColumn, position: i32) -> Self {
        Self {
            task_id: task_id.into(),
            column,
            position,
            text: None,
            priority: None,
            assigned_to: None,
        }
    }
}
