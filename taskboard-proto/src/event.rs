//! Consumer-facing board events.
//!
//! The gateway publishes exactly one event per non-rejected successful
//! mutation. Events travel to subscribers as JSON text frames tagged with
//! the original event names (`TASK_CREATED` etc.), so existing web clients
//! keep working unchanged.

use serde::{Deserialize, Serialize};

use crate::task::{Column, Task};

/// The fields one update or move actually changed.
///
/// Only creation events carry a full task; update and move events carry
/// just what was applied, so consumers merge them into their own copy
/// without clobbering fields the mutation never touched. Absent fields
/// are omitted from the JSON entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    /// Id of the task the change applies to.
    pub task_id: i32,
    /// New title, when the mutation set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description, when the mutation set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New column, when the mutation moved the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<Column>,
    /// When the backend applied the mutation, milliseconds since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

/// Closed set of board events, replacing stringly-typed dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BoardEvent {
    /// A task was created; carries the full task with its assigned id.
    #[serde(rename = "TASK_CREATED")]
    TaskCreated {
        /// The newly created task.
        task: Task,
    },
    /// A task's title/description changed.
    #[serde(rename = "TASK_UPDATED")]
    TaskUpdated {
        /// The fields the update applied.
        patch: TaskPatch,
        /// Advisory: the backend reconciled this write against a
        /// concurrent edit. The write was still applied.
        #[serde(default)]
        conflict: bool,
    },
    /// A task moved to another column.
    #[serde(rename = "TASK_MOVED")]
    TaskMoved {
        /// The fields the move applied.
        patch: TaskPatch,
        /// Advisory conflict flag, as for updates.
        #[serde(default)]
        conflict: bool,
    },
    /// A task was permanently deleted.
    #[serde(rename = "TASK_DELETED")]
    TaskDeleted {
        /// Id of the deleted task; never reissued by the backend.
        task_id: i32,
    },
}

/// Discriminant of [`BoardEvent`], used as the consumer dispatch-table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Task created.
    Created,
    /// Task updated.
    Updated,
    /// Task moved.
    Moved,
    /// Task deleted.
    Deleted,
}

impl BoardEvent {
    /// Returns the event's kind discriminant.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::TaskCreated { .. } => EventKind::Created,
            Self::TaskUpdated { .. } => EventKind::Updated,
            Self::TaskMoved { .. } => EventKind::Moved,
            Self::TaskDeleted { .. } => EventKind::Deleted,
        }
    }

    /// Returns the id of the task this event concerns.
    #[must_use]
    pub const fn task_id(&self) -> i32 {
        match self {
            Self::TaskCreated { task } => task.task_id,
            Self::TaskUpdated { patch, .. } | Self::TaskMoved { patch, .. } => patch.task_id,
            Self::TaskDeleted { task_id } => *task_id,
        }
    }
}

/// Encodes a [`BoardEvent`] as a JSON string for the event channel.
///
/// # Errors
///
/// Returns an error string if serialization fails.
pub fn encode(event: &BoardEvent) -> Result<String, String> {
    serde_json::to_string(event).map_err(|e| format!("event encode error: {e}"))
}

/// Decodes a [`BoardEvent`] from a JSON string.
///
/// # Errors
///
/// Returns an error string if deserialization fails.
pub fn decode(json: &str) -> Result<BoardEvent, String> {
    serde_json::from_str(json).map_err(|e| format!("event decode error: {e}"))
}
