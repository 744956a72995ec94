//! Reconciliation loop owning the local board mirror.
//!
//! All inputs funnel through one mpsc command channel processed by a single
//! task, so optimistic edits, authoritative responses, incoming events, and
//! highlight-expiry timers apply in one well-defined order. Authoritative
//! calls are awaited inside the loop; events arriving meanwhile queue
//! behind and are de-duplicated by the board state.

use tokio::sync::{mpsc, oneshot};

use taskboard_proto::event::BoardEvent;
use taskboard_proto::task::{Column, Task};

use crate::api::{ApiError, BoardApi, CreateRequest, UpdateRequest};
use crate::board::{BoardState, BoardView};
use crate::subscription::{HandlerId, SubscriptionRegistry};

/// How long a remote-origin change stays highlighted.
pub const HIGHLIGHT_DURATION: std::time::Duration = std::time::Duration::from_millis(600);

/// Notices pushed to the embedder about the fate of its edits.
#[derive(Debug)]
pub enum ClientNotice {
    /// An optimistic create was backed out.
    CreateFailed {
        /// Why the create failed.
        reason: String,
    },
    /// An optimistic update was rolled back.
    UpdateFailed {
        /// The affected task.
        task_id: i32,
        /// Why the update failed.
        reason: String,
    },
    /// An update was refused as outdated; the view converged on the
    /// task's last known representation.
    UpdateRejected {
        /// The affected task.
        task_id: i32,
    },
    /// An update was applied but reconciled against a concurrent edit.
    ConflictWarning {
        /// The affected task.
        task_id: i32,
        /// Advisory text from the gateway.
        warning: String,
    },
    /// A delete could not be confirmed; the local removal stands.
    DeleteUnconfirmed {
        /// The affected task.
        task_id: i32,
        /// Why confirmation failed.
        reason: String,
    },
}

type SubscribeHandler = Box<dyn Fn(&BoardEvent) + Send>;

/// Per-task count of pending echo events for our own confirmed edits.
///
/// Every confirmed local mutation produces exactly one event back on the
/// subscription, so each confirmation banks one token and each arriving
/// event for that id spends one. Back-to-back edits of the same task bank
/// as many tokens as edits, and only events beyond them count as remote.
#[derive(Default)]
struct EchoTokens(std::collections::HashMap<i32, u32>);

impl EchoTokens {
    fn bank(&mut self, task_id: i32) {
        *self.0.entry(task_id).or_insert(0) += 1;
    }

    /// Spends one token for the id. Returns `true` if one was banked.
    fn spend(&mut self, task_id: i32) -> bool {
        let Some(count) = self.0.get_mut(&task_id) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            self.0.remove(&task_id);
        }
        true
    }

    fn forget(&mut self, task_id: i32) {
        self.0.remove(&task_id);
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}

enum Command {
    Create {
        title: String,
        description: String,
        column: Column,
        created_by: String,
    },
    Update {
        task_id: i32,
        request: UpdateRequest,
    },
    Delete {
        task_id: i32,
    },
    Event(BoardEvent),
    Resync,
    Unmark(i32),
    Snapshot(oneshot::Sender<BoardView>),
    Subscribe {
        kind: taskboard_proto::event::EventKind,
        handler: SubscribeHandler,
        reply: oneshot::Sender<HandlerId>,
    },
    Unsubscribe(HandlerId),
}

/// Handle to the reconciliation loop. Cheap to clone; the loop stops once
/// every handle is dropped.
#[derive(Clone)]
pub struct BoardClient {
    commands: mpsc::UnboundedSender<Command>,
}

impl BoardClient {
    /// Spawns the reconciliation loop over the given board API.
    ///
    /// Returns the handle, the notice stream, and the loop's join handle.
    #[must_use]
    pub fn spawn<A: BoardApi>(
        api: A,
        board_id: impl Into<String>,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<ClientNotice>,
        tokio::task::JoinHandle<()>,
    ) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        // Weak so the loop's own timer path cannot keep the channel alive
        // after the last handle is dropped.
        let loop_tx = command_tx.downgrade();
        let handle = tokio::spawn(run_loop(api, board_id.into(), command_rx, loop_tx, notice_tx));
        (
            Self {
                commands: command_tx,
            },
            notice_rx,
            handle,
        )
    }

    fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Queues an optimistic create.
    pub fn create(
        &self,
        title: impl Into<String>,
        description: impl Into<String>,
        column: Column,
        created_by: impl Into<String>,
    ) {
        self.send(Command::Create {
            title: title.into(),
            description: description.into(),
            column,
            created_by: created_by.into(),
        });
    }

    /// Queues an optimistic update or move.
    pub fn update(&self, task_id: i32, request: UpdateRequest) {
        self.send(Command::Update { task_id, request });
    }

    /// Queues an immediate, irreversible delete.
    pub fn delete(&self, task_id: i32) {
        self.send(Command::Delete { task_id });
    }

    /// Feeds one board event into the processing path.
    ///
    /// Returns `false` if the loop has stopped.
    pub fn apply_event(&self, event: BoardEvent) -> bool {
        self.send(Command::Event(event))
    }

    /// Requests a full resync from the authoritative board.
    ///
    /// Returns `false` if the loop has stopped.
    pub fn resync(&self) -> bool {
        self.send(Command::Resync)
    }

    /// Returns the current board view, or `None` if the loop has stopped.
    pub async fn snapshot(&self) -> Option<BoardView> {
        let (tx, rx) = oneshot::channel();
        if !self.send(Command::Snapshot(tx)) {
            return None;
        }
        rx.await.ok()
    }

    /// Registers a handler invoked for every event of the given kind, after
    /// the event has been applied to the board.
    pub async fn subscribe(
        &self,
        kind: taskboard_proto::event::EventKind,
        handler: impl Fn(&BoardEvent) + Send + 'static,
    ) -> Option<HandlerId> {
        let (tx, rx) = oneshot::channel();
        if !self.send(Command::Subscribe {
            kind,
            handler: Box::new(handler),
            reply: tx,
        }) {
            return None;
        }
        rx.await.ok()
    }

    /// Removes a previously registered handler.
    pub fn unsubscribe(&self, id: HandlerId) {
        self.send(Command::Unsubscribe(id));
    }
}

async fn run_loop<A: BoardApi>(
    api: A,
    board_id: String,
    mut commands: mpsc::UnboundedReceiver<Command>,
    loop_tx: mpsc::WeakUnboundedSender<Command>,
    notices: mpsc::UnboundedSender<ClientNotice>,
) {
    let mut state = BoardState::new();
    let mut subscriptions = SubscriptionRegistry::new();
    let mut local_echo = EchoTokens::default();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Create {
                title,
                description,
                column,
                created_by,
            } => {
                let temp_id = state.allocate_temp_id();
                state.insert(Task {
                    task_id: temp_id,
                    board_id: board_id.clone(),
                    title: title.clone(),
                    description: description.clone(),
                    column,
                    created_by: created_by.clone(),
                    vector_clock: std::collections::BTreeMap::new(),
                    created_at: 0,
                    updated_at: 0,
                });

                let request = CreateRequest {
                    board_id: board_id.clone(),
                    title,
                    description,
                    column,
                    created_by,
                };
                match api.create_task(request).await {
                    Ok(task) => {
                        let final_id = task.task_id;
                        state.promote(temp_id, task);
                        local_echo.bank(final_id);
                        tracing::debug!(temp_id, final_id, "create confirmed");
                    }
                    Err(e) => {
                        state.remove(temp_id);
                        tracing::warn!(temp_id, error = %e, "create backed out");
                        let _ = notices.send(ClientNotice::CreateFailed {
                            reason: e.to_string(),
                        });
                    }
                }
            }
            Command::Update { task_id, request } => {
                let Some(previous) = state.get(task_id).cloned() else {
                    let _ = notices.send(ClientNotice::UpdateFailed {
                        task_id,
                        reason: "task not on the board".to_string(),
                    });
                    continue;
                };

                let mut optimistic = previous.clone();
                if let Some(title) = &request.title {
                    optimistic.title.clone_from(title);
                }
                if let Some(description) = &request.description {
                    optimistic.description.clone_from(description);
                }
                if let Some(column) = request.column {
                    optimistic.column = column;
                }
                state.insert(optimistic);

                match api.update_task(task_id, request).await {
                    Ok(reply) => {
                        local_echo.bank(task_id);
                        if reply.conflict {
                            let warning = reply.warning.unwrap_or_default();
                            tracing::warn!(task_id, "update reconciled against concurrent edit");
                            let _ =
                                notices.send(ClientNotice::ConflictWarning { task_id, warning });
                        }
                    }
                    Err(ApiError::Rejected { task }) => {
                        // Converge on the authoritative representation.
                        state.insert(*task);
                        tracing::warn!(task_id, "update rejected as outdated");
                        let _ = notices.send(ClientNotice::UpdateRejected { task_id });
                    }
                    Err(e) => {
                        state.insert(previous);
                        tracing::warn!(task_id, error = %e, "update rolled back");
                        let _ = notices.send(ClientNotice::UpdateFailed {
                            task_id,
                            reason: e.to_string(),
                        });
                    }
                }
            }
            Command::Delete { task_id } => {
                state.remove(task_id);
                local_echo.forget(task_id);
                if let Err(e) = api.delete_task(task_id).await {
                    // Deletes are irreversible locally; only report.
                    tracing::warn!(task_id, error = %e, "delete unconfirmed");
                    let _ = notices.send(ClientNotice::DeleteUnconfirmed {
                        task_id,
                        reason: e.to_string(),
                    });
                }
            }
            Command::Event(event) => {
                apply_event(&mut state, &mut local_echo, &loop_tx, &event);
                subscriptions.dispatch(&event);
            }
            Command::Resync => match api.fetch_board(&board_id).await {
                Ok(tasks) => {
                    tracing::info!(tasks = tasks.len(), "board resynced");
                    state.replace_snapshot(tasks);
                    local_echo.clear();
                }
                Err(e) => tracing::warn!(error = %e, "resync failed"),
            },
            Command::Unmark(task_id) => state.unmark_highlighted(task_id),
            Command::Snapshot(reply) => {
                let _ = reply.send(state.view());
            }
            Command::Subscribe {
                kind,
                handler,
                reply,
            } => {
                let _ = reply.send(subscriptions.subscribe(kind, handler));
            }
            Command::Unsubscribe(id) => {
                subscriptions.unsubscribe(id);
            }
        }
    }
}

/// Applies one event to the board, highlighting remote-origin changes.
fn apply_event(
    state: &mut BoardState,
    local_echo: &mut EchoTokens,
    loop_tx: &mpsc::WeakUnboundedSender<Command>,
    event: &BoardEvent,
) {
    match event {
        BoardEvent::TaskCreated { task } => {
            let id = task.task_id;
            let inserted = state.apply_created(task.clone());
            if !local_echo.spend(id) && inserted {
                highlight(state, loop_tx, id);
            }
        }
        BoardEvent::TaskUpdated { patch, .. } | BoardEvent::TaskMoved { patch, .. } => {
            let applied = state.apply_patch(patch);
            if !local_echo.spend(patch.task_id) && applied {
                highlight(state, loop_tx, patch.task_id);
            }
        }
        BoardEvent::TaskDeleted { task_id } => {
            state.remove(*task_id);
            local_echo.forget(*task_id);
        }
    }
}

/// Marks a task and schedules the expiry through the command loop.
fn highlight(state: &mut BoardState, loop_tx: &mpsc::WeakUnboundedSender<Command>, task_id: i32) {
    state.mark_highlighted(task_id);
    let Some(tx) = loop_tx.upgrade() else {
        return;
    };
    tokio::spawn(async move {
        tokio::time::sleep(HIGHLIGHT_DURATION).await;
        let _ = tx.send(Command::Unmark(task_id));
    });
}
