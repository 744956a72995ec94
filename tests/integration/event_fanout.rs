// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! WebSocket fan-out from gateway mutations to connected subscribers.
//!
//! Validates over real WebSocket connections:
//! - every connected subscriber receives each mutation's event
//! - a subscriber connecting after a mutation sees nothing retroactively
//! - a disconnected subscriber is unregistered and does not stall others

mod support;

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use taskboard_gateway::backend::BackendSession;
use taskboard_gateway::events::EventBroadcaster;
use taskboard_gateway::failover::FailoverDirector;
use taskboard_gateway::gateway::{CreateTask, TaskGateway};
use taskboard_gateway::server;
use taskboard_proto::event::{self, BoardEvent, EventKind};
use taskboard_proto::task::Column;
use tokio_tungstenite::tungstenite;

struct Fixture {
    gateway: TaskGateway,
    broadcaster: Arc<EventBroadcaster>,
    url: String,
    _node: support::StubNode,
}

async fn start_fixture() -> Fixture {
    let store = support::Store::new();
    let node = support::spawn_node(store).await;
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
    let (addr, _handle) = server::start_server("127.0.0.1:0", Arc::clone(&broadcaster))
        .await
        .unwrap();
    Fixture {
        gateway,
        broadcaster,
        url: format!("ws://{addr}/ws"),
        _node: node,
    }
}

async fn wait_for_subscribers(broadcaster: &EventBroadcaster, n: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while broadcaster.subscriber_count().await != n {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {n} subscribers"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn next_event(
    ws: &mut (impl StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin),
) -> BoardEvent {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for event")
            .unwrap()
            .unwrap();
        if let tungstenite::Message::Text(json) = frame {
            return event::decode(&json).unwrap();
        }
    }
}

fn create_input(title: &str) -> CreateTask {
    CreateTask {
        board_id: "board-1".to_string(),
        title: title.to_string(),
        description: String::new(),
        column: Column::Todo,
        created_by: "alice".to_string(),
    }
}

#[tokio::test]
async fn every_connected_subscriber_sees_each_mutation() {
    let fixture = start_fixture().await;
    let (mut ws_a, _) = tokio_tungstenite::connect_async(&fixture.url).await.unwrap();
    let (mut ws_b, _) = tokio_tungstenite::connect_async(&fixture.url).await.unwrap();
    wait_for_subscribers(&fixture.broadcaster, 2).await;

    let task = fixture.gateway.create_task(create_input("shared")).await.unwrap();

    for ws in [&mut ws_a, &mut ws_b] {
        let got = next_event(ws).await;
        assert_eq!(got.kind(), EventKind::Created);
        assert_eq!(got.task_id(), task.task_id);
    }
}

#[tokio::test]
async fn late_subscriber_sees_nothing_retroactively() {
    let fixture = start_fixture().await;
    fixture.gateway.create_task(create_input("early")).await.unwrap();

    let (mut ws, _) = tokio_tungstenite::connect_async(&fixture.url).await.unwrap();
    wait_for_subscribers(&fixture.broadcaster, 1).await;

    // Only the mutation made after connecting arrives.
    let task = fixture.gateway.create_task(create_input("late")).await.unwrap();
    let got = next_event(&mut ws).await;
    assert_eq!(got.task_id(), task.task_id);
}

#[tokio::test]
async fn dropped_subscriber_does_not_stall_the_rest() {
    let fixture = start_fixture().await;
    let (ws_gone, _) = tokio_tungstenite::connect_async(&fixture.url).await.unwrap();
    let (mut ws_kept, _) = tokio_tungstenite::connect_async(&fixture.url).await.unwrap();
    wait_for_subscribers(&fixture.broadcaster, 2).await;

    drop(ws_gone);
    wait_for_subscribers(&fixture.broadcaster, 1).await;

    let task = fixture.gateway.create_task(create_input("still flows")).await.unwrap();
    let got = next_event(&mut ws_kept).await;
    assert_eq!(got.task_id(), task.task_id);
}
