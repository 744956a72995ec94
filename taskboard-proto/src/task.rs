//! Task data model shared by the gateway and consumer-side crates.
//!
//! The backend assigns `task_id` values; ids are unique within a board and
//! never reused after deletion. Consumer-side optimistic placeholders use
//! negative ids so the two namespaces can never collide.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Board column a task lives in.
///
/// The numeric codes are part of the backend wire format and of the JSON
/// event payloads, so the enum serializes as its code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Column {
    /// Not started.
    #[default]
    Todo,
    /// Actively being worked on.
    InProgress,
    /// Finished.
    Done,
}

impl From<Column> for i32 {
    fn from(column: Column) -> Self {
        match column {
            Column::Todo => 0,
            Column::InProgress => 1,
            Column::Done => 2,
        }
    }
}

impl TryFrom<i32> for Column {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Todo),
            1 => Ok(Self::InProgress),
            2 => Ok(Self::Done),
            other => Err(format!("invalid column code: {other}")),
        }
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Todo => write!(f, "todo"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Backend operation codes, sent as a 4-byte big-endian prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    /// Create a new task; the backend assigns the id.
    Create,
    /// Rewrite title/description of an existing task.
    Update,
    /// Move an existing task to another column.
    Move,
    /// Permanently delete a task; its id is never reissued.
    Delete,
    /// Fetch the full board snapshot.
    List,
}

impl From<OpType> for i32 {
    fn from(op: OpType) -> Self {
        match op {
            OpType::Create => 0,
            OpType::Update => 1,
            OpType::Move => 2,
            OpType::Delete => 3,
            OpType::List => 4,
        }
    }
}

impl TryFrom<i32> for OpType {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Create),
            1 => Ok(Self::Update),
            2 => Ok(Self::Move),
            3 => Ok(Self::Delete),
            4 => Ok(Self::List),
            other => Err(format!("invalid op code: {other}")),
        }
    }
}

/// A task as seen by consumers.
///
/// `vector_clock` is maintained by the replicated backend and is opaque to
/// this layer; the only invariant observed here is that counters never
/// decrease for a given actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Backend-assigned id, unique within the board.
    pub task_id: i32,
    /// Board this task belongs to.
    pub board_id: String,
    /// Task title.
    pub title: String,
    /// Task description.
    pub description: String,
    /// Column the task currently lives in.
    pub column: Column,
    /// Who created the task.
    pub created_by: String,
    /// Opaque replication metadata: actor id -> counter.
    pub vector_clock: BTreeMap<i32, u32>,
    /// Creation time, milliseconds since epoch.
    pub created_at: i64,
    /// Last mutation time, milliseconds since epoch.
    pub updated_at: i64,
}

/// One backend operation payload.
///
/// Shares its byte layout with the per-task records of a list response, so
/// the same codec handles both directions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskRecord {
    /// Target task id; 0 when the backend has not assigned one yet.
    pub task_id: i32,
    /// Task title (empty string encodes as zero length, no bytes).
    pub title: String,
    /// Task description.
    pub description: String,
    /// Board the operation applies to.
    pub board_id: String,
    /// Originating user.
    pub created_by: String,
    /// Column code carried with the operation.
    pub column: Column,
    /// Originating gateway client id.
    pub client_id: i32,
    /// Creation time; 0 lets the backend stamp it.
    pub created_at: i64,
    /// Last-update time; 0 lets the backend stamp it.
    pub updated_at: i64,
    /// Vector-clock entries, actor id -> counter.
    pub vector_clock: BTreeMap<i32, u32>,
}

impl TaskRecord {
    /// Converts a decoded record into the consumer-facing [`Task`] shape.
    #[must_use]
    pub fn into_task(self) -> Task {
        Task {
            task_id: self.task_id,
            board_id: self.board_id,
            title: self.title,
            description: self.description,
            column: self.column,
            created_by: self.created_by,
            vector_clock: self.vector_clock,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Builds a record from a task, for re-encoding board snapshots.
    #[must_use]
    pub fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.task_id,
            title: task.title.clone(),
            description: task.description.clone(),
            board_id: task.board_id.clone(),
            created_by: task.created_by.clone(),
            column: task.column,
            client_id: 0,
            created_at: task.created_at,
            updated_at: task.updated_at,
            vector_clock: task.vector_clock.clone(),
        }
    }
}
