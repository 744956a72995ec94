//! Mutation gateway: translates board calls into backend operations and
//! publishes one event per non-rejected successful mutation.
//!
//! Update-style requests are classified before hitting the backend: a
//! request that supplies a column and neither title nor description is a
//! MOVE; anything else is an UPDATE, and any column supplied alongside
//! title/description is dropped in favor of a placeholder. Callers that
//! need both a text change and a move issue two sequential calls. This
//! mirrors the backend's observed contract and is deliberately not
//! "fixed" here.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use taskboard_proto::event::{BoardEvent, TaskPatch};
use taskboard_proto::task::{Column, OpType, Task, TaskRecord};

use crate::backend::{BackendError, BackendSession};
use crate::events::EventBroadcaster;

/// Advisory text attached when the backend reconciled a concurrent edit.
pub const CONFLICT_WARNING: &str = "Concurrent edit detected - applied with last-write-wins";

/// Input for a create call.
#[derive(Debug, Clone)]
pub struct CreateTask {
    /// Board the task belongs to.
    pub board_id: String,
    /// Task title.
    pub title: String,
    /// Task description.
    pub description: String,
    /// Initial column.
    pub column: Column,
    /// Creating user.
    pub created_by: String,
}

/// Input for an update/move call; all fields optional.
#[derive(Debug, Clone, Default)]
pub struct UpdateTask {
    /// New title, if changing.
    pub title: Option<String>,
    /// New description, if changing.
    pub description: Option<String>,
    /// Target column, if moving.
    pub column: Option<Column>,
}

/// A board snapshot as returned to consumers.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Board {
    /// The board's id.
    pub board_id: String,
    /// All live tasks on the board.
    pub tasks: Vec<Task>,
}

/// Outcome of a successful update/move.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// The task as visible after the mutation.
    pub task: Task,
    /// Advisory: the write was applied but reconciled by the backend.
    pub conflict: bool,
    /// Human-readable advisory when `conflict` is set.
    pub warning: Option<String>,
}

/// Errors at the consumer-facing gateway boundary.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The backend did not recognize the task id.
    #[error("task {0} not found")]
    NotFound(i32),

    /// The write was refused by the backend's ordering rule. Carries the
    /// task's last known representation for client-side reconciliation.
    #[error("update rejected - operation was outdated")]
    Rejected {
        /// Last known representation of the task.
        task: Box<Task>,
    },

    /// The backend could not be reached or refused the operation.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl From<BackendError> for GatewayError {
    fn from(err: BackendError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Decides whether an update-style request is a MOVE or an UPDATE.
///
/// Presence of title and/or description always wins over a simultaneously
/// supplied column.
#[must_use]
pub fn classify_update(update: &UpdateTask) -> OpType {
    if update.column.is_some() && update.title.is_none() && update.description.is_none() {
        OpType::Move
    } else {
        OpType::Update
    }
}

/// Consumer-facing entry point for board mutations and fetches.
pub struct TaskGateway {
    session: BackendSession,
    broadcaster: Arc<EventBroadcaster>,
    client_id: i32,
    default_board: String,
}

impl TaskGateway {
    /// Creates a gateway over the given session and broadcaster.
    #[must_use]
    pub fn new(
        session: BackendSession,
        broadcaster: Arc<EventBroadcaster>,
        client_id: i32,
        default_board: impl Into<String>,
    ) -> Self {
        Self {
            session,
            broadcaster,
            client_id,
            default_board: default_board.into(),
        }
    }

    /// Milliseconds since epoch, saturating on clock anomalies.
    fn now_ms() -> i64 {
        i64::try_from(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis(),
        )
        .unwrap_or(i64::MAX)
    }

    /// Fetches the full board snapshot from the backend.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unavailable`] if the backend cannot be
    /// reached after the failover retry.
    pub async fn fetch_board(&self, board_id: &str) -> Result<Board, GatewayError> {
        let record = TaskRecord {
            board_id: board_id.to_string(),
            client_id: self.client_id,
            ..TaskRecord::default()
        };
        let records = self.session.list(&record).await?;
        let tasks = records.into_iter().map(TaskRecord::into_task).collect();
        Ok(Board {
            board_id: board_id.to_string(),
            tasks,
        })
    }

    /// Creates a task; the backend assigns the final id.
    ///
    /// Broadcasts a `TASK_CREATED` event on success.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unavailable`] on any backend failure or an
    /// unsuccessful verdict; nothing is broadcast in that case.
    pub async fn create_task(&self, input: CreateTask) -> Result<Task, GatewayError> {
        let record = TaskRecord {
            task_id: 0,
            title: input.title.clone(),
            description: input.description.clone(),
            board_id: input.board_id.clone(),
            created_by: input.created_by.clone(),
            column: input.column,
            client_id: self.client_id,
            ..TaskRecord::default()
        };

        let verdict = self.session.execute(OpType::Create, &record).await?;
        if !verdict.success {
            return Err(GatewayError::Unavailable(
                "backend refused the create".to_string(),
            ));
        }

        let now = Self::now_ms();
        let task = Task {
            task_id: verdict.task_id,
            board_id: input.board_id,
            title: input.title,
            description: input.description,
            column: input.column,
            created_by: input.created_by,
            vector_clock: std::collections::BTreeMap::new(),
            created_at: now,
            updated_at: now,
        };

        tracing::info!(task_id = task.task_id, board = %task.board_id, "task created");
        self.broadcaster
            .publish(BoardEvent::TaskCreated { task: task.clone() })
            .await;
        Ok(task)
    }

    /// Updates or moves a task, classified per [`classify_update`].
    ///
    /// Broadcasts `TASK_MOVED` when the request supplied a column, else
    /// `TASK_UPDATED`. Rejected writes are surfaced as
    /// [`GatewayError::Rejected`] and never broadcast; conflicting writes
    /// were applied and are broadcast with the advisory flag set.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotFound`] for an unknown id,
    /// [`GatewayError::Rejected`] for a refused write, and
    /// [`GatewayError::Unavailable`] for backend failures.
    pub async fn update_task(
        &self,
        task_id: i32,
        update: UpdateTask,
    ) -> Result<UpdateOutcome, GatewayError> {
        let op = classify_update(&update);
        let record = match op {
            OpType::Move => TaskRecord {
                task_id,
                board_id: self.default_board.clone(),
                created_by: "user".to_string(),
                // Column is present by classification.
                column: update.column.unwrap_or_default(),
                client_id: self.client_id,
                ..TaskRecord::default()
            },
            _ => TaskRecord {
                task_id,
                title: update.title.clone().unwrap_or_default(),
                description: update.description.clone().unwrap_or_default(),
                board_id: self.default_board.clone(),
                created_by: "user".to_string(),
                // Placeholder: a column alongside title/description is dropped.
                column: Column::Todo,
                client_id: self.client_id,
                ..TaskRecord::default()
            },
        };
        tracing::debug!(task_id, op = ?op, "classified update request");

        let verdict = self.session.execute(op, &record).await?;
        if !verdict.success {
            return Err(GatewayError::NotFound(task_id));
        }

        let now = Self::now_ms();
        let task = Task {
            task_id,
            board_id: self.default_board.clone(),
            title: update.title.clone().unwrap_or_default(),
            description: update.description.clone().unwrap_or_default(),
            column: update.column.unwrap_or_default(),
            created_by: "user".to_string(),
            vector_clock: std::collections::BTreeMap::new(),
            created_at: 0,
            updated_at: now,
        };

        if verdict.rejected {
            tracing::warn!(task_id, "write rejected by backend ordering rule");
            return Err(GatewayError::Rejected {
                task: Box::new(task),
            });
        }

        // Broadcast only what the backend applied: a MOVE touched the
        // column, an UPDATE touched title/description (a column supplied
        // alongside them was dropped). Fields the mutation never touched
        // stay out of the patch so subscribers keep their own copies.
        let patch = match op {
            OpType::Move => TaskPatch {
                task_id,
                column: update.column,
                updated_at: Some(now),
                ..TaskPatch::default()
            },
            _ => TaskPatch {
                task_id,
                title: update.title.clone(),
                description: update.description.clone(),
                updated_at: Some(now),
                ..TaskPatch::default()
            },
        };
        let event = if update.column.is_some() {
            BoardEvent::TaskMoved {
                patch,
                conflict: verdict.conflict,
            }
        } else {
            BoardEvent::TaskUpdated {
                patch,
                conflict: verdict.conflict,
            }
        };
        self.broadcaster.publish(event).await;

        if verdict.conflict {
            tracing::warn!(task_id, "concurrent edit reconciled by backend");
        }
        Ok(UpdateOutcome {
            task,
            conflict: verdict.conflict,
            warning: verdict.conflict.then(|| CONFLICT_WARNING.to_string()),
        })
    }

    /// Permanently deletes a task; the backend never reissues its id.
    ///
    /// Broadcasts `TASK_DELETED` on success.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotFound`] for an unknown id and
    /// [`GatewayError::Unavailable`] for backend failures.
    pub async fn delete_task(&self, task_id: i32) -> Result<(), GatewayError> {
        let record = TaskRecord {
            task_id,
            board_id: self.default_board.clone(),
            created_by: "user".to_string(),
            client_id: self.client_id,
            ..TaskRecord::default()
        };

        let verdict = self.session.execute(OpType::Delete, &record).await?;
        if !verdict.success {
            return Err(GatewayError::NotFound(task_id));
        }

        tracing::info!(task_id, "task deleted");
        self.broadcaster
            .publish(BoardEvent::TaskDeleted { task_id })
            .await;
        Ok(())
    }
}
