// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! End-to-end board flow against a live stub node.
//!
//! Walks one task through create → move → edit → delete and checks both the
//! board snapshots and the event kinds published along the way:
//! - create assigns a positive id and publishes TASK_CREATED
//! - a column-only request moves the task and publishes TASK_MOVED
//! - a text edit alongside a column leaves the column untouched, and the
//!   published event carries only the fields the backend applied
//! - delete removes the task from subsequent fetches

mod support;

use std::sync::Arc;

use taskboard_gateway::backend::BackendSession;
use taskboard_gateway::events::EventBroadcaster;
use taskboard_gateway::failover::FailoverDirector;
use taskboard_gateway::gateway::{CreateTask, TaskGateway, UpdateTask};
use taskboard_proto::event::{BoardEvent, EventKind};
use taskboard_proto::task::Column;

#[tokio::test]
async fn create_move_edit_delete_scenario() {
    let store = support::Store::new();
    let node = support::spawn_node(Arc::clone(&store)).await;
    let director = Arc::new(FailoverDirector::new(
        node.addr.clone(),
        support::dead_addr().await,
    ));
    let broadcaster = Arc::new(EventBroadcaster::new());
    let gateway = TaskGateway::new(
        BackendSession::new(director),
        Arc::clone(&broadcaster),
        1,
        "board-1",
    );
    let (_sub, mut events) = broadcaster.subscribe().await;

    // Create: backend assigns a positive id.
    let task = gateway
        .create_task(CreateTask {
            board_id: "board-1".to_string(),
            title: "write the report".to_string(),
            description: "quarterly numbers".to_string(),
            column: Column::Todo,
            created_by: "alice".to_string(),
        })
        .await
        .unwrap();
    let id = task.task_id;
    assert!(id > 0);
    assert_eq!(events.recv().await.unwrap().kind(), EventKind::Created);

    // Column-only request is a move.
    let outcome = gateway
        .update_task(
            id,
            UpdateTask {
                column: Some(Column::InProgress),
                ..UpdateTask::default()
            },
        )
        .await
        .unwrap();
    assert!(!outcome.conflict);
    let event = events.recv().await.unwrap();
    assert_eq!(event.kind(), EventKind::Moved);
    let BoardEvent::TaskMoved { patch, .. } = event else {
        panic!("expected a moved event");
    };
    assert_eq!(patch.column, Some(Column::InProgress));
    assert!(patch.title.is_none(), "a move carries no text fields");
    assert_eq!(store.task(id).unwrap().column, Column::InProgress);

    // A text edit with a column rides as an update; the column is dropped.
    gateway
        .update_task(
            id,
            UpdateTask {
                title: Some("write the Q3 report".to_string()),
                column: Some(Column::Done),
                ..UpdateTask::default()
            },
        )
        .await
        .unwrap();
    let event = events.recv().await.unwrap();
    assert_eq!(event.kind(), EventKind::Moved, "column present selects the moved event");
    let BoardEvent::TaskMoved { patch, .. } = event else {
        panic!("expected a moved event");
    };
    assert_eq!(patch.title.as_deref(), Some("write the Q3 report"));
    assert!(patch.column.is_none(), "the dropped column never rides in the event");
    let stored = store.task(id).unwrap();
    assert_eq!(stored.title, "write the Q3 report");
    assert_eq!(stored.column, Column::InProgress, "column untouched by the edit");

    // Delete: gone from the next fetch.
    gateway.delete_task(id).await.unwrap();
    assert_eq!(
        events.recv().await.unwrap(),
        BoardEvent::TaskDeleted { task_id: id }
    );
    let board = gateway.fetch_board("board-1").await.unwrap();
    assert!(board.tasks.iter().all(|t| t.task_id != id));
}

#[tokio::test]
async fn unknown_task_is_not_found_and_publishes_nothing() {
    let store = support::Store::new();
    let node = support::spawn_node(Arc::clone(&store)).await;
    let director = Arc::new(FailoverDirector::new(
        node.addr.clone(),
        support::dead_addr().await,
    ));
    let broadcaster = Arc::new(EventBroadcaster::new());
    let gateway = TaskGateway::new(
        BackendSession::new(director),
        Arc::clone(&broadcaster),
        1,
        "board-1",
    );
    let (_sub, mut events) = broadcaster.subscribe().await;

    let err = gateway.delete_task(999).await;
    assert!(matches!(
        err,
        Err(taskboard_gateway::gateway::GatewayError::NotFound(999))
    ));
    assert!(events.try_recv().is_err());
}
