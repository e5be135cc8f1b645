//! One websocket client: a reader, a writer and a renderer sharing a
//! [`SessionState`].
//!
//! The reader only watches for liveness and close frames. The renderer
//! captures on a fixed cadence and queues bytes in the outbox. The writer owns
//! the sink, sends keepalive pings and merges whatever is already queued into a
//! single text message. Whichever activity stops first tears the session down
//! and the other two follow within one wait.

use crate::stream::request::StreamRequest;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use sandcore::device::{indicate, LedState};
use sandcore::prelude::{SandError, SandResult};
use sandcore::stream::PayloadRenderer;
use sandcore::telemetry::StreamMetrics;
use std::error::Error as StdError;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::{self, Instant, MissedTickBehavior};
use warp::ws::{Message, WebSocket};

pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
pub const READ_TIMEOUT: Duration = Duration::from_secs(60);
/// Pings go out at nine tenths of the read deadline.
pub const PING_PERIOD: Duration = Duration::from_secs(READ_TIMEOUT.as_secs() * 9 / 10);
/// Largest message accepted from a client.
pub const MAX_MESSAGE_SIZE: usize = 512;

const INBOX_CAPACITY: usize = 16;
const OUTBOX_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub ping_period: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            read_timeout: READ_TIMEOUT,
            write_timeout: WRITE_TIMEOUT,
            ping_period: PING_PERIOD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionStage {
    Starting = 0,
    Active = 1,
    Closing = 2,
    Closed = 3,
}

impl SessionStage {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => SessionStage::Starting,
            1 => SessionStage::Active,
            2 => SessionStage::Closing,
            _ => SessionStage::Closed,
        }
    }
}

/// Flags shared by the three activities of a session.
#[derive(Debug)]
pub struct SessionState {
    closed: AtomicBool,
    torn_down: AtomicBool,
    stage: AtomicU8,
    teardown: Notify,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            closed: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            stage: AtomicU8::new(SessionStage::Starting as u8),
            teardown: Notify::new(),
        }
    }
}

impl SessionState {
    /// True once the peer closed or dropped the connection.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    pub fn stage(&self) -> SessionStage {
        SessionStage::from_u8(self.stage.load(Ordering::SeqCst))
    }

    fn set_stage(&self, stage: SessionStage) {
        self.stage.store(stage as u8, Ordering::SeqCst);
    }

    /// Asks every activity to stop. Idempotent.
    pub fn tear_down(&self) {
        if !self.torn_down.swap(true, Ordering::SeqCst) {
            let _ = self.stage.compare_exchange(
                SessionStage::Active as u8,
                SessionStage::Closing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        }
        self.teardown.notify_waiters();
    }

    /// Resolves once [`tear_down`](Self::tear_down) has been called.
    pub async fn torn_down(&self) {
        loop {
            let notified = self.teardown.notified();
            if self.is_torn_down() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    pub closed_by_peer: bool,
    pub payloads_sent: usize,
}

pub struct Session {
    request: StreamRequest,
    renderer: PayloadRenderer,
    metrics: Arc<StreamMetrics>,
    timings: SessionTimings,
    state: Arc<SessionState>,
}

impl Session {
    pub fn new(
        request: StreamRequest,
        renderer: PayloadRenderer,
        metrics: Arc<StreamMetrics>,
    ) -> Self {
        Self {
            request,
            renderer,
            metrics,
            timings: SessionTimings::default(),
            state: Arc::new(SessionState::default()),
        }
    }

    pub fn with_timings(mut self, timings: SessionTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Drives the connection until all three activities have stopped.
    pub async fn run(self, socket: WebSocket) -> SessionReport {
        let Session {
            request,
            renderer,
            metrics,
            timings,
            state,
        } = self;

        metrics.record_session_opened();
        info!(
            "stream session opened: {:?} every {:?}",
            request.content, request.interval
        );

        let (sink, stream) = socket.split();
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        let (outbox_tx, outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);

        let reader = tokio::spawn(read_loop(
            stream,
            inbox_tx,
            state.clone(),
            timings.read_timeout,
        ));
        let writer = tokio::spawn(write_loop(sink, outbox_rx, state.clone(), timings));
        let render = tokio::spawn(render_loop(
            request,
            renderer,
            outbox_tx,
            inbox_rx,
            state.clone(),
            metrics.clone(),
        ));
        state.set_stage(SessionStage::Active);
        if state.is_torn_down() {
            state.set_stage(SessionStage::Closing);
        }

        let (reader, writer, render) = tokio::join!(reader, writer, render);
        for (name, outcome) in [("reader", reader.err()), ("writer", writer.err())] {
            if let Some(err) = outcome {
                error!("session {} task failed: {}", name, err);
            }
        }
        let payloads_sent = render.unwrap_or_else(|err| {
            error!("session renderer task failed: {}", err);
            0
        });

        debug!("session {:?} -> {:?}", state.stage(), SessionStage::Closed);
        state.set_stage(SessionStage::Closed);
        metrics.record_session_closed();
        let report = SessionReport {
            closed_by_peer: state.is_closed(),
            payloads_sent,
        };
        info!(
            "stream session closed: peer={} payloads={}",
            report.closed_by_peer, report.payloads_sent
        );
        report
    }
}

async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    inbox: mpsc::Sender<Vec<u8>>,
    state: Arc<SessionState>,
    read_timeout: Duration,
) {
    loop {
        let next = tokio::select! {
            _ = state.torn_down() => break,
            next = time::timeout(read_timeout, stream.next()) => next,
        };
        match next {
            Err(_) => {
                debug!("no traffic within {:?}, dropping client", read_timeout);
                break;
            }
            Ok(None) => {
                state.mark_closed();
                break;
            }
            Ok(Some(Err(err))) => {
                if is_close_error(&err) {
                    state.mark_closed();
                    debug!("client went away: {}", err);
                } else {
                    warn!("websocket read failed: {}", err);
                }
                break;
            }
            Ok(Some(Ok(message))) => {
                if message.is_close() {
                    debug!("close frame received: {:?}", message.close_frame());
                    state.mark_closed();
                    break;
                }
                if (message.is_text() || message.is_binary())
                    && inbox.try_send(message.into_bytes()).is_err()
                {
                    debug!("inbox full, client message dropped");
                }
            }
        }
    }
    state.tear_down();
}

/// Close-type read failures: the peer dropped the socket without a close frame.
fn is_close_error(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(cause) = current {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        // tungstenite's ProtocolError::ResetWithoutClosingHandshake, which warp
        // only exposes through its message
        if cause.to_string().contains("without closing handshake") {
            return true;
        }
        current = cause.source();
    }
    false
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbox: mpsc::Receiver<Vec<u8>>,
    state: Arc<SessionState>,
    timings: SessionTimings,
) {
    let mut keepalive =
        time::interval_at(Instant::now() + timings.ping_period, timings.ping_period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let outcome = loop {
        tokio::select! {
            queued = outbox.recv() => match queued {
                Some(first) => {
                    let body = coalesce(first, &mut outbox);
                    let sent = send(&mut sink, text_message(body), timings.write_timeout).await;
                    if let Err(err) = sent {
                        break Err(err);
                    }
                }
                None => break send(&mut sink, Message::close(), timings.write_timeout).await,
            },
            _ = keepalive.tick() => {
                let ping = Message::ping(Vec::<u8>::new());
                if let Err(err) = send(&mut sink, ping, timings.write_timeout).await {
                    break Err(err);
                }
            }
            _ = state.torn_down() => {
                if state.is_closed() {
                    break Ok(());
                }
                break send(&mut sink, Message::close(), timings.write_timeout).await;
            }
        }
    };

    if let Err(err) = outcome {
        debug!("writer stopped: {}", err);
    }
    state.tear_down();
}

/// Appends every payload already waiting in the outbox to `first`.
pub(crate) fn coalesce(first: Vec<u8>, outbox: &mut mpsc::Receiver<Vec<u8>>) -> Vec<u8> {
    let mut body = first;
    while let Ok(next) = outbox.try_recv() {
        body.extend_from_slice(&next);
    }
    body
}

fn text_message(body: Vec<u8>) -> Message {
    match String::from_utf8(body) {
        Ok(text) => Message::text(text),
        Err(err) => Message::binary(err.into_bytes()),
    }
}

async fn send(
    sink: &mut SplitSink<WebSocket, Message>,
    message: Message,
    deadline: Duration,
) -> SandResult<()> {
    match time::timeout(deadline, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(SandError::Connection(err.to_string())),
        Err(_) => Err(SandError::Connection(format!(
            "write not flushed within {:?}",
            deadline
        ))),
    }
}

async fn render_loop(
    request: StreamRequest,
    renderer: PayloadRenderer,
    outbox: mpsc::Sender<Vec<u8>>,
    mut inbox: mpsc::Receiver<Vec<u8>>,
    state: Arc<SessionState>,
    metrics: Arc<StreamMetrics>,
) -> usize {
    indicate(renderer.camera(), LedState::BlinkRedYellow);
    let mut sent = 0;

    loop {
        while let Ok(command) = inbox.try_recv() {
            debug!("ignoring {} byte client message", command.len());
        }

        let job = {
            let renderer = renderer.clone();
            let content = request.content;
            tokio::task::spawn_blocking(move || renderer.render(&content))
        };
        match job.await {
            Ok(Ok(bytes)) => {
                let queued = tokio::select! {
                    queued = outbox.send(bytes) => queued.is_ok(),
                    _ = state.torn_down() => false,
                };
                if !queued {
                    break;
                }
                sent += 1;
                metrics.record_payload();
            }
            Ok(Err(err)) => {
                metrics.record_render_error();
                warn!("render tick skipped: {}", err);
            }
            Err(err) => {
                error!("render task failed: {}", err);
                break;
            }
        }

        tokio::select! {
            _ = time::sleep(request.interval) => {}
            _ = state.torn_down() => {}
        }
        if state.is_closed() || state.is_torn_down() {
            break;
        }
    }

    indicate(renderer.camera(), LedState::Off);
    drop(outbox);
    state.tear_down();
    sent
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn coalesce_drains_queued_payloads_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        for chunk in [b"{\"c\":[]}".to_vec(), b"{\"c\":[1]}".to_vec(), b"{\"c\":[2]}".to_vec()] {
            tx.send(chunk).await.unwrap();
        }
        let first = rx.recv().await.unwrap();
        let body = coalesce(first, &mut rx);
        assert_eq!(body, b"{\"c\":[]}{\"c\":[1]}{\"c\":[2]}".to_vec());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn teardown_wakes_every_waiter() {
        let state = Arc::new(SessionState::default());
        let waiters = (0..3)
            .map(|_| {
                let state = state.clone();
                tokio::spawn(async move { state.torn_down().await })
            })
            .collect::<Vec<_>>();
        tokio::task::yield_now().await;
        state.set_stage(SessionStage::Active);
        state.tear_down();
        state.tear_down();
        for waiter in waiters {
            time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter woke")
                .unwrap();
        }
        assert_eq!(state.stage(), SessionStage::Closing);
        assert!(!state.is_closed());
        // already torn down: resolves immediately
        time::timeout(Duration::from_millis(50), state.torn_down())
            .await
            .unwrap();
    }

    #[test]
    fn close_errors_are_recognised_through_sources() {
        #[derive(Debug)]
        struct Wrapped(io::Error);
        impl std::fmt::Display for Wrapped {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "transport failed")
            }
        }
        impl StdError for Wrapped {
            fn source(&self) -> Option<&(dyn StdError + 'static)> {
                Some(&self.0)
            }
        }

        let reset = Wrapped(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(is_close_error(&reset));
        let other = Wrapped(io::Error::new(io::ErrorKind::InvalidData, "bad frame"));
        assert!(!is_close_error(&other));
    }

    #[test]
    fn ping_period_is_nine_tenths_of_read_deadline() {
        assert_eq!(PING_PERIOD, Duration::from_secs(54));
        assert!(PING_PERIOD < READ_TIMEOUT);
    }
}
