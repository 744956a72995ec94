//! Per-kind event subscriptions.
//!
//! A closed dispatch table from [`EventKind`] to handler lists. Handlers
//! are plain closures invoked synchronously during dispatch; unsubscribing
//! is by the handle returned at registration.

use std::collections::HashMap;

use taskboard_proto::event::{BoardEvent, EventKind};

/// Handle identifying one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler = Box<dyn Fn(&BoardEvent) + Send>;

/// Dispatch table from event kind to registered handlers.
#[derive(Default)]
pub struct SubscriptionRegistry {
    handlers: HashMap<EventKind, Vec<(HandlerId, Handler)>>,
    next_id: u64,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for one event kind.
    pub fn subscribe(
        &mut self,
        kind: EventKind,
        handler: impl Fn(&BoardEvent) + Send + 'static,
    ) -> HandlerId {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.handlers
            .entry(kind)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Removes a handler by its handle.
    ///
    /// Returns `false` if the handle was unknown or already removed.
    pub fn unsubscribe(&mut self, id: HandlerId) -> bool {
        for handlers in self.handlers.values_mut() {
            let before = handlers.len();
            handlers.retain(|(h, _)| *h != id);
            if handlers.len() != before {
                return true;
            }
        }
        false
    }

    /// Invokes every handler registered for the event's kind.
    ///
    /// Returns the number of handlers invoked.
    pub fn dispatch(&self, event: &BoardEvent) -> usize {
        self.handlers.get(&event.kind()).map_or(0, |handlers| {
            for (_, handler) in handlers {
                handler(event);
            }
            handlers.len()
        })
    }
}
