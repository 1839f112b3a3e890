//! TCP plumbing: a [`NativeHandle`] over a tokio socket plus the loops that
//! drive the echo and ping sessions.
//!
//! # Readiness with tokio (for beginners)
//!
//! The stream stack never waits on its own; somebody has to tell it when the
//! socket became readable.  Here that somebody is tokio: the driver awaits
//! [`tokio::net::TcpStream::readable`], then calls
//! `handle_readiness(Readable)` on the outermost filter.  The native reads and
//! writes go through tokio's `try_read` / `try_write`, which keep the
//! reactor's readiness flags accurate.
//!
//! `flush` must block until the kernel has accepted every byte.  For that one
//! path the handle keeps a duplicate of the socket descriptor and switches it
//! to blocking mode for the duration of the write, like
//! [`kvm_stream::TcpHandle`] does.
//!
//! Everything runs on a current-thread runtime: chains, dispatchers and
//! sessions are not `Send`, and never need to be.

use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, ensure, Context};
use kvm_stream::{
    secure_chain, ChannelEventQueue, Cipher, EventDispatcher, EventReceiver, NativeHandle,
    Readiness, Role, SecureChain, SharedEventQueue, Stream, StreamConfig,
};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::application::{EchoSession, LinkWatch, PingReply, PingSession};

/// [`NativeHandle`] over a tokio-registered TCP socket.
pub struct TokioTcpHandle {
    io: Arc<TcpStream>,
    blocking: std::net::TcpStream,
    peer: String,
}

impl NativeHandle for TokioTcpHandle {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.io.try_read(buf)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.io.try_write(buf)
    }

    fn write_blocking(&mut self, buf: &[u8]) -> io::Result<()> {
        self.blocking.set_nonblocking(false)?;
        let result = self
            .blocking
            .write_all(buf)
            .and_then(|()| self.blocking.flush());
        self.blocking.set_nonblocking(true)?;
        result
    }

    fn shutdown(&mut self, how: Shutdown) -> io::Result<()> {
        match self.blocking.shutdown(how) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }

    fn peer_name(&self) -> String {
        self.peer.clone()
    }
}

/// Splits a connected socket into the chain's handle and the readiness source
/// the driver awaits.
///
/// # Errors
///
/// Returns any error from re-registering or duplicating the socket.
pub fn split_socket(stream: TcpStream) -> io::Result<(TokioTcpHandle, Arc<TcpStream>)> {
    let std_stream = stream.into_std()?;
    std_stream.set_nodelay(true)?;
    let peer = std_stream.peer_addr()?.to_string();
    let blocking = std_stream.try_clone()?;
    let io = Arc::new(TcpStream::from_std(std_stream)?);
    Ok((
        TokioTcpHandle {
            io: Arc::clone(&io),
            blocking,
            peer,
        },
        io,
    ))
}

/// A secure chain plus the event plumbing that watches it.
pub struct Link {
    /// Readiness source for the chain's socket.
    pub readiness: Arc<TcpStream>,
    /// The assembled chain.
    pub chain: SecureChain<TokioTcpHandle>,
    /// Routes the chain's events to `watch`.
    pub dispatcher: EventDispatcher,
    /// Events published by the chain.
    pub events_rx: EventReceiver,
    /// Health of the chain, fed by dispatching `events_rx`.
    pub watch: LinkWatch,
}

impl Link {
    /// Builds the secure chain over `stream`.
    ///
    /// # Errors
    ///
    /// Returns any error from [`split_socket`].
    pub fn new(stream: TcpStream, config: &StreamConfig, cipher: Cipher) -> io::Result<Self> {
        let (handle, readiness) = split_socket(stream)?;
        let (queue, events_rx) = ChannelEventQueue::new();
        let events: SharedEventQueue = Arc::new(queue);
        let chain = secure_chain(handle, events, config, cipher);
        let mut dispatcher = EventDispatcher::new();
        let watch = LinkWatch::install(&mut dispatcher, chain.event_target());
        Ok(Self {
            readiness,
            chain,
            dispatcher,
            events_rx,
            watch,
        })
    }
}

/// Binds the listening socket.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn listen(bind: &str) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Accepts one connection and echoes messages until the peer goes away.
///
/// Returns the number of messages echoed.
///
/// # Errors
///
/// Returns an error if `cipher` is not a [`Role::Responder`] cipher, or if
/// accepting or polling the socket fails.
pub async fn serve_echo(
    listener: TcpListener,
    config: &StreamConfig,
    cipher: Cipher,
) -> anyhow::Result<u64> {
    ensure!(
        cipher.role() == Role::Responder,
        "the listening side needs a responder cipher"
    );
    let (stream, peer) = listener.accept().await.context("accept failed")?;
    info!(%peer, "connection accepted");
    let Link {
        readiness,
        chain,
        mut dispatcher,
        mut events_rx,
        watch,
    } = Link::new(stream, config, cipher).context("failed to set up socket")?;
    let mut session = EchoSession::new(chain);

    loop {
        readiness.readable().await.context("socket readiness failed")?;
        for message in session.on_readiness(Readiness::Readable) {
            info!(bytes = message.len(), "echoed {:?}", String::from_utf8_lossy(&message));
        }
        dispatcher.dispatch_pending(&mut events_rx);
        if let Some(end) = watch.ended() {
            match end.error {
                Some(error) => warn!(kind = ?end.kind, %error, "link ended"),
                None => info!(kind = ?end.kind, "link ended"),
            }
            break;
        }
    }

    session.close();
    Ok(session.echoed())
}

/// Summary of a `connect` run.
#[derive(Debug, Clone, Default)]
pub struct PingReport {
    /// Every reply, in order.
    pub replies: Vec<PingReply>,
}

impl PingReport {
    /// Replies whose payload differed from the request.
    pub fn mismatches(&self) -> usize {
        self.replies.iter().filter(|r| !r.matched).count()
    }

    /// Mean round-trip time, if any reply arrived.
    pub fn mean_rtt(&self) -> Option<Duration> {
        let total: Duration = self.replies.iter().map(|r| r.rtt).sum();
        u32::try_from(self.replies.len())
            .ok()
            .filter(|n| *n > 0)
            .map(|n| total / n)
    }
}

/// Connects to `addr`, sends `message` `count` times and waits for each echo.
///
/// # Errors
///
/// Returns an error if `cipher` is not a [`Role::Initiator`] cipher, the
/// connection cannot be established, an echo does not arrive within
/// `reply_timeout`, or the link ends early.
pub async fn run_pings(
    addr: SocketAddr,
    message: &[u8],
    count: u32,
    config: &StreamConfig,
    cipher: Cipher,
    connect_timeout: Duration,
    reply_timeout: Duration,
) -> anyhow::Result<PingReport> {
    ensure!(
        cipher.role() == Role::Initiator,
        "the connecting side needs an initiator cipher"
    );
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .with_context(|| format!("timed out connecting to {addr}"))?
        .with_context(|| format!("failed to connect to {addr}"))?;
    info!(%addr, "connected");
    let Link {
        readiness,
        chain,
        mut dispatcher,
        mut events_rx,
        watch,
    } = Link::new(stream, config, cipher).context("failed to set up socket")?;
    let mut session = PingSession::new(chain);
    let mut report = PingReport::default();

    for _ in 0..count {
        let sequence = session.send(message);
        debug!(sequence, "request sent");
        let reply = tokio::time::timeout(
            reply_timeout,
            await_reply(&readiness, &mut session, &mut dispatcher, &mut events_rx, &watch),
        )
        .await
        .with_context(|| format!("no echo for request {sequence} within {reply_timeout:?}"))?
        .context("socket readiness failed")?;

        match reply {
            Some(reply) => {
                info!(
                    sequence = reply.sequence,
                    rtt_us = reply.rtt.as_micros() as u64,
                    matched = reply.matched,
                    "echo received"
                );
                report.replies.push(reply);
            }
            None => {
                let end = watch.ended();
                session.close();
                bail!("link ended before echo {sequence}: {end:?}");
            }
        }
    }

    session.close();
    Ok(report)
}

/// Waits for the reply to the outstanding request, or for the link to end.
async fn await_reply<S: Stream>(
    readiness: &TcpStream,
    session: &mut PingSession<S>,
    dispatcher: &mut EventDispatcher,
    events_rx: &mut EventReceiver,
    watch: &LinkWatch,
) -> io::Result<Option<PingReply>> {
    loop {
        readiness.readable().await?;
        if let Some(reply) = session.on_readiness(Readiness::Readable) {
            return Ok(Some(reply));
        }
        dispatcher.dispatch_pending(events_rx);
        if watch.ended().is_some() {
            return Ok(None);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
