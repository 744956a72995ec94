// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! Reconciliation invariants of the board client.
//!
//! Validates with a scripted board API:
//! - an optimistic create and its CREATED event collapse to one entry in
//!   either arrival order
//! - duplicate CREATED events never duplicate a task
//! - a rejected update converges on the authoritative representation
//! - the reconnect backoff follows the 1s-doubling-to-8s schedule
//!
//! And against a full in-process stack, that a bystander client's mirror
//! survives another client's mutations: a move leaves its text alone and a
//! text edit leaves its column alone.

mod support;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskboard_client::api::{ApiError, BoardApi, CreateRequest, UpdateReply, UpdateRequest};
use taskboard_client::client::{BoardClient, ClientNotice};
use taskboard_client::reconnect::backoff_delay;
use taskboard_gateway::backend::BackendSession;
use taskboard_gateway::events::EventBroadcaster;
use taskboard_gateway::failover::FailoverDirector;
use taskboard_gateway::gateway::{CreateTask, TaskGateway, UpdateTask};
use taskboard_proto::event::BoardEvent;
use taskboard_proto::task::{Column, Task};

fn task(task_id: i32, title: &str) -> Task {
    Task {
        task_id,
        board_id: "board-1".to_string(),
        title: title.to_string(),
        description: String::new(),
        column: Column::Todo,
        created_by: "bob".to_string(),
        vector_clock: BTreeMap::new(),
        created_at: 1,
        updated_at: 1,
    }
}

/// Board API returning pre-scripted replies.
#[derive(Default)]
struct ScriptedApi {
    create_replies: Mutex<Vec<Result<Task, ApiError>>>,
    update_replies: Mutex<Vec<Result<UpdateReply, ApiError>>>,
}

impl BoardApi for ScriptedApi {
    async fn fetch_board(&self, _board_id: &str) -> Result<Vec<Task>, ApiError> {
        Ok(Vec::new())
    }

    async fn create_task(&self, _request: CreateRequest) -> Result<Task, ApiError> {
        self.create_replies
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(ApiError::Unavailable("script exhausted".to_string())))
    }

    async fn update_task(
        &self,
        _task_id: i32,
        _request: UpdateRequest,
    ) -> Result<UpdateReply, ApiError> {
        self.update_replies
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(ApiError::Unavailable("script exhausted".to_string())))
    }

    async fn delete_task(&self, _task_id: i32) -> Result<(), ApiError> {
        Ok(())
    }
}

#[tokio::test]
async fn create_response_then_event_is_one_task() {
    let api = ScriptedApi::default();
    api.create_replies
        .lock()
        .unwrap()
        .push(Ok(task(42, "once")));

    let (client, _notices, _loop) = BoardClient::spawn(api, "board-1");
    client.create("once", "", Column::Todo, "alice");
    // The event for the same creation arrives after the response.
    client.apply_event(BoardEvent::TaskCreated {
        task: task(42, "once"),
    });

    let view = client.snapshot().await.unwrap();
    assert_eq!(view.tasks.len(), 1);
    assert_eq!(view.tasks[0].task_id, 42);
}

#[tokio::test]
async fn event_then_create_response_is_one_task() {
    // The broadcast can outrun the mutation response. Queue the event
    // first; the create's temp entry must fold into the existing task.
    let api = ScriptedApi::default();
    api.create_replies
        .lock()
        .unwrap()
        .push(Ok(task(42, "once")));

    let (client, _notices, _loop) = BoardClient::spawn(api, "board-1");
    client.apply_event(BoardEvent::TaskCreated {
        task: task(42, "once"),
    });
    client.create("once", "", Column::Todo, "alice");

    let view = client.snapshot().await.unwrap();
    assert_eq!(view.tasks.len(), 1);
    assert_eq!(view.tasks[0].task_id, 42);
}

#[tokio::test]
async fn duplicate_created_events_do_not_duplicate() {
    let (client, _notices, _loop) = BoardClient::spawn(ScriptedApi::default(), "board-1");
    for _ in 0..2 {
        client.apply_event(BoardEvent::TaskCreated {
            task: task(7, "echoed"),
        });
    }

    let view = client.snapshot().await.unwrap();
    assert_eq!(view.tasks.len(), 1);
}

#[tokio::test]
async fn rejected_update_converges_on_authoritative_task() {
    let api = ScriptedApi::default();
    api.update_replies.lock().unwrap().push(Err(ApiError::Rejected {
        task: Box::new(task(7, "authoritative")),
    }));

    let (client, mut notices, _loop) = BoardClient::spawn(api, "board-1");
    client.apply_event(BoardEvent::TaskCreated {
        task: task(7, "stale"),
    });
    client.update(
        7,
        UpdateRequest {
            title: Some("my edit".to_string()),
            ..UpdateRequest::default()
        },
    );

    let view = client.snapshot().await.unwrap();
    assert_eq!(view.tasks[0].title, "authoritative");
    assert!(matches!(
        notices.recv().await,
        Some(ClientNotice::UpdateRejected { task_id: 7 })
    ));
}

/// A gateway over a stub node, plus a bystander client fed every broadcast
/// event. The bystander issues no mutations of its own; its mirror must
/// still converge on what other clients do.
struct Bystander {
    gateway: TaskGateway,
    client: BoardClient,
    _node: support::StubNode,
}

async fn spawn_bystander() -> Bystander {
    let node = support::spawn_node(support::Store::new()).await;
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

    let (client, _notices, _loop) = BoardClient::spawn(ScriptedApi::default(), "board-1");
    let (_id, mut events) = broadcaster.subscribe().await;
    let feed = client.clone();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if !feed.apply_event(event) {
                break;
            }
        }
    });

    Bystander {
        gateway,
        client,
        _node: node,
    }
}

async fn wait_for_task<F: Fn(&Task) -> bool>(client: &BoardClient, pred: F) -> Task {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let view = client.snapshot().await.unwrap();
        if let Some(task) = view.tasks.iter().find(|t| pred(t)) {
            return task.clone();
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for a matching task"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn anothers_move_keeps_text_in_bystander_mirror() {
    let fixture = spawn_bystander().await;
    let created = fixture
        .gateway
        .create_task(CreateTask {
            board_id: "board-1".to_string(),
            title: "draft the announcement".to_string(),
            description: "blog post plus changelog entry".to_string(),
            column: Column::Todo,
            created_by: "alice".to_string(),
        })
        .await
        .unwrap();
    wait_for_task(&fixture.client, |t| t.task_id == created.task_id).await;

    fixture
        .gateway
        .update_task(
            created.task_id,
            UpdateTask {
                column: Some(Column::Done),
                ..UpdateTask::default()
            },
        )
        .await
        .unwrap();

    let mirrored = wait_for_task(&fixture.client, |t| t.column == Column::Done).await;
    assert_eq!(mirrored.title, "draft the announcement");
    assert_eq!(mirrored.description, "blog post plus changelog entry");
}

#[tokio::test]
async fn anothers_text_edit_keeps_column_in_bystander_mirror() {
    let fixture = spawn_bystander().await;
    let created = fixture
        .gateway
        .create_task(CreateTask {
            board_id: "board-1".to_string(),
            title: "old title".to_string(),
            description: String::new(),
            column: Column::Todo,
            created_by: "alice".to_string(),
        })
        .await
        .unwrap();
    wait_for_task(&fixture.client, |t| t.task_id == created.task_id).await;

    fixture
        .gateway
        .update_task(
            created.task_id,
            UpdateTask {
                column: Some(Column::Done),
                ..UpdateTask::default()
            },
        )
        .await
        .unwrap();
    wait_for_task(&fixture.client, |t| t.column == Column::Done).await;

    fixture
        .gateway
        .update_task(
            created.task_id,
            UpdateTask {
                title: Some("new title".to_string()),
                ..UpdateTask::default()
            },
        )
        .await
        .unwrap();

    let mirrored = wait_for_task(&fixture.client, |t| t.title == "new title").await;
    assert_eq!(mirrored.column, Column::Done);
}

#[test]
fn backoff_schedule_doubles_to_eight_seconds() {
    let expected = [1000u64, 2000, 4000, 8000, 8000];
    for (attempts, millis) in expected.iter().enumerate() {
        assert_eq!(
            backoff_delay(attempts as u32),
            Duration::from_millis(*millis)
        );
    }
}
