//! Echo and ping sessions over any message-preserving [`Stream`].
//!
//! Neither session knows about sockets.  The caller delivers readiness
//! notifications and dispatches the chain's events; the sessions only read and
//! write whole messages.  This keeps them testable over in-memory pipes.
//!
//! # Session flow (for beginners)
//!
//! ```text
//! PingSession                          EchoSession
//!   send("PING") ── write + flush ──▶    on_readiness(Readable)
//!                                          read "PING", write it back, flush
//!   on_readiness(Readable) ◀───────────
//!     → PingReply { rtt, matched }
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use kvm_stream::{Event, EventDispatcher, EventKind, EventTarget, Readiness, Stream, StreamError};
use tracing::{debug, warn};

/// Events after which a link can no longer carry a request/response exchange.
const TERMINAL_KINDS: [EventKind; 4] = [
    EventKind::InputShutdown,
    EventKind::InputFormatError,
    EventKind::OutputError,
    EventKind::Disconnected,
];

/// The first terminal event observed on a link.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkEnd {
    /// Which event ended the link.
    pub kind: EventKind,
    /// The failure it carried, if any.
    pub error: Option<StreamError>,
}

/// Records the health of one chain from its dispatched events.
#[derive(Debug, Clone, Default)]
pub struct LinkWatch {
    ended: Rc<RefCell<Option<LinkEnd>>>,
    input_ready: Rc<Cell<u64>>,
}

impl LinkWatch {
    /// Registers handlers for `target` on `dispatcher`.
    pub fn install(dispatcher: &mut EventDispatcher, target: EventTarget) -> Self {
        let watch = Self::default();
        for kind in TERMINAL_KINDS {
            let ended = Rc::clone(&watch.ended);
            dispatcher.add_handler(kind, target, move |event: &Event| {
                let mut slot = ended.borrow_mut();
                if slot.is_none() {
                    debug!(kind = ?event.kind, "link ended");
                    *slot = Some(LinkEnd {
                        kind: event.kind,
                        error: event.error.clone(),
                    });
                }
            });
        }
        let input_ready = Rc::clone(&watch.input_ready);
        dispatcher.add_handler(EventKind::InputReady, target, move |_| {
            input_ready.set(input_ready.get() + 1);
        });
        watch
    }

    /// The event that ended the link, if one has been dispatched.
    pub fn ended(&self) -> Option<LinkEnd> {
        self.ended.borrow().clone()
    }

    /// Number of `InputReady` events dispatched so far.
    pub fn input_ready_count(&self) -> u64 {
        self.input_ready.get()
    }
}

/// Reads the front message of `stream` in one call.
fn read_message<S: Stream>(stream: &mut S) -> Vec<u8> {
    let mut message = vec![0u8; stream.size()];
    let n = stream.read(&mut message);
    message.truncate(n);
    message
}

// ── EchoSession ───────────────────────────────────────────────────────────────

/// Writes every received message straight back to the sender.
pub struct EchoSession<S> {
    stream: S,
    echoed: u64,
}

impl<S: Stream> EchoSession<S> {
    /// Wraps an assembled chain.
    pub fn new(stream: S) -> Self {
        Self { stream, echoed: 0 }
    }

    /// Delivers `readiness` to the chain and echoes every complete message.
    ///
    /// Returns the messages echoed by this call, in arrival order.
    pub fn on_readiness(&mut self, readiness: Readiness) -> Vec<Vec<u8>> {
        self.stream.handle_readiness(readiness);
        let mut echoed = Vec::new();
        while self.stream.is_ready() {
            let message = read_message(&mut self.stream);
            if message.is_empty() {
                break;
            }
            self.stream.write(&message);
            echoed.push(message);
        }
        if !echoed.is_empty() {
            self.stream.flush();
            self.echoed += echoed.len() as u64;
            debug!(count = echoed.len(), total = self.echoed, "messages echoed");
        }
        echoed
    }

    /// Messages echoed since the session started.
    pub fn echoed(&self) -> u64 {
        self.echoed
    }

    /// The underlying chain.
    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// Closes the underlying chain.
    pub fn close(&mut self) {
        self.stream.close();
    }
}

// ── PingSession ───────────────────────────────────────────────────────────────

/// Outcome of one request/echo exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingReply {
    /// Sequence number of the request, starting at 1.
    pub sequence: u32,
    /// The bytes that came back.
    pub payload: Vec<u8>,
    /// Time from `send` to the reply being decoded.
    pub rtt: Duration,
    /// Whether the reply equals the request.
    pub matched: bool,
}

struct Outstanding {
    sequence: u32,
    payload: Vec<u8>,
    sent_at: Instant,
}

/// Sends one message at a time and times the echo.
pub struct PingSession<S> {
    stream: S,
    sent: u32,
    outstanding: Option<Outstanding>,
}

impl<S: Stream> PingSession<S> {
    /// Wraps an assembled chain.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            sent: 0,
            outstanding: None,
        }
    }

    /// Writes and flushes `payload`; returns its sequence number.
    ///
    /// A request still awaiting its reply is forgotten.
    pub fn send(&mut self, payload: &[u8]) -> u32 {
        if let Some(previous) = self.outstanding.take() {
            warn!(sequence = previous.sequence, "request abandoned without reply");
        }
        self.sent += 1;
        self.stream.write(payload);
        self.stream.flush();
        self.outstanding = Some(Outstanding {
            sequence: self.sent,
            payload: payload.to_vec(),
            sent_at: Instant::now(),
        });
        self.sent
    }

    /// Returns `true` while a request has not been answered.
    pub fn awaiting_reply(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Delivers `readiness` and returns the reply if one has arrived.
    pub fn on_readiness(&mut self, readiness: Readiness) -> Option<PingReply> {
        self.stream.handle_readiness(readiness);
        while self.stream.is_ready() {
            let message = read_message(&mut self.stream);
            let Some(request) = self.outstanding.take() else {
                warn!(bytes = message.len(), "unsolicited message dropped");
                continue;
            };
            return Some(PingReply {
                sequence: request.sequence,
                matched: message == request.payload,
                rtt: request.sent_at.elapsed(),
                payload: message,
            });
        }
        None
    }

    /// The underlying chain.
    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// Closes the underlying chain.
    pub fn close(&mut self) {
        self.stream.close();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
