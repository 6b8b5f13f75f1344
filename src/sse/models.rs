use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use uuid::Uuid;

/// One encoded aggregate-state message, shared by every connection it is pushed to.
pub type Payload = Arc<str>;

pub const KEEPALIVE_COMMENT: &str = "keepalive";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        ConnectionId(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    #[error("connection closed")]
    Closed,
    #[error("push timed out")]
    Timeout,
}

/// One push: a payload stamped with the sequence number taken before its state was read.
#[derive(Debug, Clone)]
pub struct Update {
    pub seq: u64,
    pub payload: Payload,
}

impl Update {
    pub fn new(seq: u64, payload: Payload) -> Self {
        Update { seq, payload }
    }
}

/// Sending half of one viewer's stream.
///
/// Handles compare by connection id only; two handles are never equal unless they are
/// clones of the same registration.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Update>,
}

impl ChannelHandle {
    pub fn new(capacity: usize) -> (Self, ChannelReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            ChannelHandle {
                id: ConnectionId::new(),
                tx,
            },
            ChannelReceiver { rx, last_seq: 0 },
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues an update for this viewer, waiting at most `timeout` for buffer space.
    pub async fn push(&self, update: Update, timeout: Duration) -> Result<(), PushError> {
        self.tx
            .send_timeout(update, timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => PushError::Timeout,
                SendTimeoutError::Closed(_) => PushError::Closed,
            })
    }
}

impl PartialEq for ChannelHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ChannelHandle {}

/// Receiving half of one viewer's stream.
///
/// Updates older than one already yielded are skipped, so a slow initial fetch can never
/// land after a newer broadcast.
#[derive(Debug)]
pub struct ChannelReceiver {
    rx: mpsc::Receiver<Update>,
    last_seq: u64,
}

impl ChannelReceiver {
    pub async fn recv(&mut self) -> Option<Payload> {
        while let Some(update) = self.rx.recv().await {
            if let Some(payload) = self.accept(update) {
                return Some(payload);
            }
        }
        None
    }

    #[cfg(test)]
    pub fn try_recv(&mut self) -> Result<Payload, mpsc::error::TryRecvError> {
        loop {
            let update = self.rx.try_recv()?;
            if let Some(payload) = self.accept(update) {
                return Ok(payload);
            }
        }
    }

    fn accept(&mut self, update: Update) -> Option<Payload> {
        if update.seq <= self.last_seq {
            return None;
        }
        self.last_seq = update.seq;
        Some(update.payload)
    }
}
