//! Handle to one live WebSocket session.
//!
//! The socket itself is owned by the actor task (`ws::actor`). Everything
//! else in the system holds an `Arc<Connection>` and talks to the socket
//! through the bounded outbound queue and the close signal.

use axum::extract::ws::Message;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::config::GatewayConfig;

/// Reserved text frame used for client liveness, in both directions.
pub const HEARTBEAT: &str = "heartbeat";

/// Receiving half of a connection's outbound queue, drained by the writer task.
pub type OutboundReceiver = mpsc::Receiver<Message>;

/// Fixed per-connection metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub user_id: String,
    /// Random non-negative 63-bit key used by the topic index.
    pub subscriber_id: i64,
}

/// Lifecycle of a connection. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Close code and reason sent to the peer when the server ends a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// A newer connection for the same user was admitted.
    pub fn replaced() -> Self {
        Self::new(4000, "connection has been replaced")
    }

    pub fn heartbeat_timeout() -> Self {
        Self::new(1001, "heartbeat timeout")
    }

    pub fn shutdown() -> Self {
        Self::new(1001, "server shutdown")
    }

    pub fn kicked(reason: impl Into<String>) -> Self {
        Self::new(4004, reason)
    }

    /// Peer closed or the transport failed; nothing is sent back.
    pub fn peer_gone() -> Self {
        Self::new(1000, "peer gone")
    }
}

/// Why a frame could not be queued for a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// Outbound queue is full: the peer is not keeping up
    Full,
    /// Connection is closing or its writer is gone
    Closed,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::Full => write!(f, "Outbound queue full"),
            SendError::Closed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for SendError {}

pub struct Connection {
    session: SessionInfo,
    state: AtomicU8,
    outbound: mpsc::Sender<Message>,
    close_tx: watch::Sender<Option<CloseReason>>,
    deadline: Mutex<Instant>,
    liveness_window: std::time::Duration,
}

impl Connection {
    /// Create the handle for a freshly upgraded socket.
    ///
    /// The caller owns the returned receiver and must drain it into the socket.
    pub fn new(user_id: impl Into<String>, config: &GatewayConfig) -> (Arc<Self>, OutboundReceiver) {
        let subscriber_id = rand::rng().random_range(0..=i64::MAX);
        let (outbound, rx) = mpsc::channel(config.send_queue_capacity.max(1));
        let (close_tx, _) = watch::channel(None);
        let liveness_window = config.liveness_window();

        let conn = Self {
            session: SessionInfo {
                user_id: user_id.into(),
                subscriber_id,
            },
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            outbound,
            close_tx,
            deadline: Mutex::new(Instant::now() + liveness_window),
            liveness_window,
        };
        (Arc::new(conn), rx)
    }

    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    pub fn user_id(&self) -> &str {
        &self.session.user_id
    }

    pub fn subscriber_id(&self) -> i64 {
        self.session.subscriber_id
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// True once the connection has started closing; sends are refused from then on.
    pub fn is_closing(&self) -> bool {
        matches!(self.state(), ConnectionState::Closing | ConnectionState::Closed)
    }

    /// `Connecting -> Open`. Returns false if the connection was not connecting.
    pub fn mark_open(&self) -> bool {
        self.transition(ConnectionState::Connecting, ConnectionState::Open)
    }

    /// Final transition, after registry and topic references are gone.
    pub fn mark_closed(&self) {
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Queue one pre-encoded envelope. Never waits for the peer.
    pub fn send(&self, frame: Bytes) -> Result<(), SendError> {
        self.push(Message::Binary(frame))
    }

    /// Answer a client heartbeat.
    pub fn send_heartbeat(&self) -> Result<(), SendError> {
        self.push(Message::Text(HEARTBEAT.into()))
    }

    pub(crate) fn push(&self, message: Message) -> Result<(), SendError> {
        if self.is_closing() {
            return Err(SendError::Closed);
        }
        self.outbound.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Ask the actor to end the session with `reason`.
    ///
    /// Moves `Connecting|Open -> Closing`. Returns false if the connection was
    /// already closing, in which case the first reason wins.
    pub fn close(&self, reason: CloseReason) -> bool {
        let started = self.transition(ConnectionState::Open, ConnectionState::Closing)
            || self.transition(ConnectionState::Connecting, ConnectionState::Closing);
        if started {
            self.close_tx.send_replace(Some(reason));
        }
        started
    }

    /// Reason passed to [`Connection::close`], if any.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_tx.borrow().clone()
    }

    /// Watch for the close signal. The value turns `Some` exactly once.
    pub fn close_signal(&self) -> watch::Receiver<Option<CloseReason>> {
        self.close_tx.subscribe()
    }

    pub fn deadline(&self) -> Instant {
        *self.deadline.lock()
    }

    /// Push the liveness deadline out to now + interval + grace.
    pub fn touch(&self) -> Instant {
        let next = Instant::now() + self.liveness_window;
        *self.deadline.lock() = next;
        next
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("user_id", &self.session.user_id)
            .field("subscriber_id", &self.session.subscriber_id)
            .field("state", &self.state())
            .finish()
    }
}
