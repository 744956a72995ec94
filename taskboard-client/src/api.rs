//! Board-API seam between the reconciliation core and a gateway.
//!
//! The client never talks the backend wire protocol itself; everything
//! authoritative goes through [`BoardApi`]. Tests and embedders running the
//! gateway in-process implement the trait directly over it.

use std::future::Future;

use taskboard_proto::task::{Column, Task};

/// Errors surfaced at the board-API boundary.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The gateway did not recognize the task id.
    #[error("task {0} not found")]
    NotFound(i32),

    /// The write was refused as outdated. Carries the task's last known
    /// representation so the caller can converge on it.
    #[error("update rejected - operation was outdated")]
    Rejected {
        /// Last known representation of the task.
        task: Box<Task>,
    },

    /// The gateway or its backend could not be reached.
    #[error("board service unavailable: {0}")]
    Unavailable(String),
}

/// Input for a create call.
#[derive(Debug, Clone)]
pub struct CreateRequest {
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
pub struct UpdateRequest {
    /// New title, if changing.
    pub title: Option<String>,
    /// New description, if changing.
    pub description: Option<String>,
    /// Target column, if moving.
    pub column: Option<Column>,
}

/// Authoritative reply to an update/move call.
#[derive(Debug, Clone)]
pub struct UpdateReply {
    /// The task as visible after the mutation.
    pub task: Task,
    /// The write was applied but reconciled against a concurrent edit.
    pub conflict: bool,
    /// Human-readable advisory when `conflict` is set.
    pub warning: Option<String>,
}

/// Authoritative board operations as seen from the client.
pub trait BoardApi: Send + Sync + 'static {
    /// Fetches every live task on the board.
    fn fetch_board(
        &self,
        board_id: &str,
    ) -> impl Future<Output = Result<Vec<Task>, ApiError>> + Send;

    /// Creates a task; the returned task carries the assigned id.
    fn create_task(
        &self,
        request: CreateRequest,
    ) -> impl Future<Output = Result<Task, ApiError>> + Send;

    /// Updates or moves a task.
    fn update_task(
        &self,
        task_id: i32,
        request: UpdateRequest,
    ) -> impl Future<Output = Result<UpdateReply, ApiError>> + Send;

    /// Permanently deletes a task.
    fn delete_task(&self, task_id: i32) -> impl Future<Output = Result<(), ApiError>> + Send;
}
