//! Channel-backed [`EventQueue`] implementation.
//!
//! Uses a Tokio unbounded MPSC channel.  `UnboundedSender::send` is a plain
//! synchronous call, so streams can publish from anywhere (inside or outside
//! a runtime, from any thread) without blocking.  The receiving half can be
//! drained synchronously by a hand-rolled loop or awaited inside a Tokio task.

use tokio::sync::mpsc;
use tracing::trace;

use super::{Event, EventQueue};

/// Publishing half of a channel event queue.
#[derive(Debug, Clone)]
pub struct ChannelEventQueue {
    tx: mpsc::UnboundedSender<Event>,
}

/// Receiving half of a channel event queue.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl ChannelEventQueue {
    /// Creates a connected queue/receiver pair.
    pub fn new() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, EventReceiver { rx })
    }
}

impl EventQueue for ChannelEventQueue {
    fn add_event(&self, event: Event) {
        trace!(kind = ?event.kind, target = %event.target, "event queued");
        // A dropped receiver means nobody is listening any more; the event is
        // simply discarded.
        let _ = self.tx.send(event);
    }
}

impl EventReceiver {
    /// Returns the next queued event without waiting.
    pub fn try_next(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Removes and returns every event queued so far, in FIFO order.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once every [`ChannelEventQueue`] clone has been dropped
    /// and the queue is empty.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}
