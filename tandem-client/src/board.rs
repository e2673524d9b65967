//! Shared task board mirror

use std::collections::HashMap;

use tracing::debug;

use tandem_protocol::{Comment, TaskColumn, TaskPriority, TaskRecord, TaskUpdate};

use crate::transport::SessionEvent;

/// Client-side mirror of the shared task board
///
/// Local edits are optimistic: the record mutates immediately and the
/// returned delta is handed to the transport. Remote deltas overwrite
/// field by field; there is no ordering token, so concurrent edits from
/// two participants race and the last delta to arrive wins at each
/// observer — observers may disagree until the next write.
#[derive(Debug, Default)]
pub struct TaskBoardReplica {
    tasks: HashMap<String, TaskRecord>,
}

impl TaskBoardReplica {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the initial board contents
    pub fn seed(&mut self, tasks: impl IntoIterator<Item = TaskRecord>) {
        for task in tasks {
            self.tasks.insert(task.id.clone(), task);
        }
    }

    pub fn get(&self, task_id: &str) -> Option<&TaskRecord> {
        self.tasks.get(task_id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.values()
    }

    /// Tasks in one column, ordered by position
    pub fn column(&self, column: TaskColumn) -> Vec<&TaskRecord> {
        let mut tasks: Vec<&TaskRecord> = self
            .tasks
            .values()
            .filter(|task| task.column == column)
            .collect();
        tasks.sort_by_key(|task| task.position);
        tasks
    }

    // ==================== Local (optimistic) mutations ====================

    /// Drag a card to a new column/position
    ///
    /// Returns the delta to send, or None if the task is unknown locally.
    pub fn move_task(
        &mut self,
        task_id: &str,
        column: TaskColumn,
        position: i32,
    ) -> Option<TaskUpdate> {
        let task = self.tasks.get_mut(task_id)?;
        task.column = column;
        task.position = position;
        Some(TaskUpdate::movement(task_id, column, position))
    }

    /// Change a card's priority
    pub fn set_priority(&mut self, task_id: &str, priority: TaskPriority) -> Option<TaskUpdate> {
        let task = self.tasks.get_mut(task_id)?;
        task.priority = priority;
        let mut update = TaskUpdate::movement(task_id, task.column, task.position);
        update.priority = Some(priority);
        Some(update)
    }

    /// Edit a card's text
    pub fn edit_text(&mut self, task_id: &str, text: &str) -> Option<TaskUpdate> {
        let task = self.tasks.get_mut(task_id)?;
        task.text = text.to_string();
        let mut update = TaskUpdate::movement(task_id, task.column, task.position);
        update.text = Some(text.to_string());
        Some(update)
    }

    /// Assign a card to a participant
    pub fn assign(&mut self, task_id: &str, user_id: &str) -> Option<TaskUpdate> {
        let task = self.tasks.get_mut(task_id)?;
        task.assigned_to = Some(user_id.to_string());
        let mut update = TaskUpdate::movement(task_id, task.column, task.position);
        update.assigned_to = Some(user_id.to_string());
        Some(update)
    }

    /// Append a local comment
    ///
    /// Returns the comment to send as a voice-comment, or None if the task
    /// is unknown locally.
    pub fn add_comment(
        &mut self,
        task_id: &str,
        user_id: &str,
        text: &str,
        timestamp: u64,
    ) -> Option<Comment> {
        let task = self.tasks.get_mut(task_id)?;
        let comment = Comment {
            user_id: user_id.to_string(),
            text: text.to_string(),
            timestamp,
        };
        task.push_comment(comment.clone());
        Some(comment)
    }

    // ==================== Remote application ====================

    /// Apply one transport event; non-board events are ignored
    pub fn apply(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::TaskChanged { update } => {
                // Unknown tasks are upserted: the delta always carries
                // column and position, so the record is well-formed
                let task = self
                    .tasks
                    .entry(update.task_id.clone())
                    .or_insert_with(|| TaskRecord::new(update.task_id.clone()));
                task.apply(update);
            }
            SessionEvent::NewComment {
                user_id,
                task_id,
                text,
                timestamp,
            } => match self.tasks.get_mut(task_id) {
                Some(task) => task.push_comment(Comment {
                    user_id: user_id.clone(),
                    text: text.clone(),
                    timestamp: *timestamp,
                }),
                // No buffering for out-of-order task creation
                None => debug!("Comment for unknown task {} dropped", task_id),
            },
            _ => {}
        }
    }
}
