//! Routes events to handlers registered per `(kind, target)`.

use std::collections::HashMap;

use tracing::trace;

use super::{Event, EventKind, EventReceiver, EventTarget};

type Handler = Box<dyn FnMut(&Event)>;

/// Handler registry for the single dispatch thread.
///
/// Handlers run synchronously, one event at a time, in the order the events
/// were queued.  A handler is free to call stream operations; any events those
/// operations publish are picked up by the next drain.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<(EventKind, EventTarget), Vec<Handler>>,
    unhandled: u64,
}

impl EventDispatcher {
    /// Creates an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for events of `kind` on `target`.
    pub fn add_handler<F>(&mut self, kind: EventKind, target: EventTarget, handler: F)
    where
        F: FnMut(&Event) + 'static,
    {
        self.handlers
            .entry((kind, target))
            .or_default()
            .push(Box::new(handler));
    }

    /// Removes every handler registered for `target`.
    pub fn remove_target(&mut self, target: EventTarget) {
        self.handlers.retain(|(_, t), _| *t != target);
    }

    /// Delivers one event.  Returns `true` if at least one handler ran.
    pub fn dispatch(&mut self, event: &Event) -> bool {
        match self.handlers.get_mut(&(event.kind, event.target)) {
            Some(handlers) if !handlers.is_empty() => {
                for handler in handlers.iter_mut() {
                    handler(event);
                }
                true
            }
            _ => {
                trace!(kind = ?event.kind, target = %event.target, "no handler for event");
                self.unhandled += 1;
                false
            }
        }
    }

    /// Drains `rx` and dispatches every queued event.  Returns the number of
    /// events taken from the queue.
    pub fn dispatch_pending(&mut self, rx: &mut EventReceiver) -> usize {
        let mut count = 0;
        while let Some(event) = rx.try_next() {
            self.dispatch(&event);
            count += 1;
        }
        count
    }

    /// Number of events that found no handler.
    pub fn unhandled_count(&self) -> u64 {
        self.unhandled
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::event::{ChannelEventQueue, EventQueue};

    #[test]
    fn test_dispatch_routes_by_kind_and_target() {
        // Arrange
        let mut dispatcher = EventDispatcher::new();
        let mine = EventTarget::new();
        let other = EventTarget::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        dispatcher.add_handler(EventKind::InputReady, mine, move |e| {
            sink.borrow_mut().push(e.target)
        });

        // Act
        let hit = dispatcher.dispatch(&Event::new(EventKind::InputReady, mine));
        let miss_target = dispatcher.dispatch(&Event::new(EventKind::InputReady, other));
        let miss_kind = dispatcher.dispatch(&Event::new(EventKind::OutputError, mine));

        // Assert
        assert!(hit);
        assert!(!miss_target);
        assert!(!miss_kind);
        assert_eq!(*seen.borrow(), vec![mine]);
        assert_eq!(dispatcher.unhandled_count(), 2);
    }

    #[test]
    fn test_dispatch_pending_drains_queue_in_order() {
        // Arrange
        let (queue, mut rx) = ChannelEventQueue::new();
        let target = EventTarget::new();
        let mut dispatcher = EventDispatcher::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for kind in [EventKind::InputReady, EventKind::Disconnected] {
            let sink = Rc::clone(&order);
            dispatcher.add_handler(kind, target, move |e| sink.borrow_mut().push(e.kind));
        }
        queue.add_event(Event::new(EventKind::InputReady, target));
        queue.add_event(Event::new(EventKind::Disconnected, target));

        // Act
        let count = dispatcher.dispatch_pending(&mut rx);

        // Assert
        assert_eq!(count, 2);
        assert_eq!(
            *order.borrow(),
            vec![EventKind::InputReady, EventKind::Disconnected]
        );
    }

    #[test]
    fn test_remove_target_unregisters_handlers() {
        let mut dispatcher = EventDispatcher::new();
        let target = EventTarget::new();
        dispatcher.add_handler(EventKind::InputReady, target, |_| {});
        dispatcher.remove_target(target);
        assert!(!dispatcher.dispatch(&Event::new(EventKind::InputReady, target)));
    }
}
