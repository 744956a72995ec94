//! Local mirror of one board.
//!
//! Pure state container: the reconciliation rules that decide *when* these
//! operations run live in [`crate::client`]. Optimistic creates occupy a
//! negative id namespace disjoint from backend-assigned ids, so a temp
//! entry can never collide with an authoritative one.

use std::collections::{HashMap, HashSet};

use taskboard_proto::event::TaskPatch;
use taskboard_proto::task::Task;

/// Snapshot handed to embedders: the tasks plus cosmetic highlight marks.
#[derive(Debug, Clone)]
pub struct BoardView {
    /// All tasks, ordered by id (temp entries first).
    pub tasks: Vec<Task>,
    /// Ids currently marked as recently changed by a remote client.
    pub highlighted: Vec<i32>,
}

/// The local task collection with highlight marks and a temp-id allocator.
#[derive(Debug, Default)]
pub struct BoardState {
    tasks: HashMap<i32, Task>,
    highlighted: HashSet<i32>,
    next_temp_id: i32,
}

impl BoardState {
    /// Creates an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next temporary id: -1, -2, ...
    pub const fn allocate_temp_id(&mut self) -> i32 {
        self.next_temp_id -= 1;
        self.next_temp_id
    }

    /// Returns the task with the given id, if present.
    #[must_use]
    pub fn get(&self, task_id: i32) -> Option<&Task> {
        self.tasks.get(&task_id)
    }

    /// Inserts or replaces a task wholesale.
    pub fn insert(&mut self, task: Task) {
        self.tasks.insert(task.task_id, task);
    }

    /// Removes a task and its highlight mark.
    pub fn remove(&mut self, task_id: i32) -> Option<Task> {
        self.highlighted.remove(&task_id);
        self.tasks.remove(&task_id)
    }

    /// Replaces a temp entry with its backend-assigned identity.
    ///
    /// Returns `true` if the final task was inserted here. If an event for
    /// the same creation already delivered the final id, the temp entry is
    /// dropped and the existing entry stands, so the replacement happens
    /// exactly once regardless of arrival order.
    pub fn promote(&mut self, temp_id: i32, final_task: Task) -> bool {
        self.tasks.remove(&temp_id);
        self.highlighted.remove(&temp_id);
        if self.tasks.contains_key(&final_task.task_id) {
            return false;
        }
        self.insert(final_task);
        true
    }

    /// Applies a CREATED event, de-duplicating by id.
    ///
    /// Returns `true` if the task was new to this board.
    pub fn apply_created(&mut self, task: Task) -> bool {
        if self.tasks.contains_key(&task.task_id) {
            return false;
        }
        self.insert(task);
        true
    }

    /// Merges an UPDATED/MOVED patch into the existing entry.
    ///
    /// Only the fields the patch carries change; everything else keeps its
    /// current value. Unknown ids are ignored and heal on the next resync.
    /// Returns `true` if a task was changed.
    pub fn apply_patch(&mut self, patch: &TaskPatch) -> bool {
        let Some(existing) = self.tasks.get_mut(&patch.task_id) else {
            return false;
        };
        if let Some(title) = &patch.title {
            existing.title = title.clone();
        }
        if let Some(description) = &patch.description {
            existing.description = description.clone();
        }
        if let Some(column) = patch.column {
            existing.column = column;
        }
        if let Some(updated_at) = patch.updated_at {
            existing.updated_at = updated_at;
        }
        true
    }

    /// Replaces the whole collection with an authoritative snapshot.
    ///
    /// Highlight marks survive only for ids still on the board; pending
    /// temp entries are discarded (their creates either landed in the
    /// snapshot or failed while disconnected).
    pub fn replace_snapshot(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks.into_iter().map(|t| (t.task_id, t)).collect();
        self.highlighted.retain(|id| self.tasks.contains_key(id));
    }

    /// Marks a task as recently changed by a remote client.
    pub fn mark_highlighted(&mut self, task_id: i32) {
        if self.tasks.contains_key(&task_id) {
            self.highlighted.insert(task_id);
        }
    }

    /// Clears a highlight mark.
    pub fn unmark_highlighted(&mut self, task_id: i32) {
        self.highlighted.remove(&task_id);
    }

    /// Number of tasks, temp entries included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the board has no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Builds an id-ordered view for embedders.
    #[must_use]
    pub fn view(&self) -> BoardView {
        let mut tasks: Vec<Task> = self.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| t.task_id);
        let mut highlighted: Vec<i32> = self.highlighted.iter().copied().collect();
        highlighted.sort_unstable();
        BoardView { tasks, highlighted }
    }
}
