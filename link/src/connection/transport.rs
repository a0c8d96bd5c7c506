//! The seam between the connection manager and the wire.
//!
//! [`Connector`] opens a socket; [`Transport`] moves typed messages over it.
//! The manager performs the `authenticate` exchange itself, so an
//! implementation only needs to frame and classify.

use async_trait::async_trait;
use std::fmt;

use crate::error::Result;
use crate::models::{ClientMessage, ServerMessage};

/// Framing negotiated for one socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Binary frames allowed; the server may gzip large payloads.
    Message,
    /// Plain JSON text frames only.
    Degraded,
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message => write!(f, "message"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}

/// Why a transport stopped delivering messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCause {
    /// The server ended the session on purpose (close frame with a normal or
    /// policy code). Never retried.
    Server(String),
    /// Network loss: stream end, socket error, abnormal close code. Retried.
    Lost(String),
}

impl fmt::Display for CloseCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(reason) => write!(f, "server close: {}", reason),
            Self::Lost(reason) => write!(f, "{}", reason),
        }
    }
}

/// One inbound item.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(ServerMessage),
    Closed(CloseCause),
}

/// An open, bidirectional session socket.
#[async_trait]
pub trait Transport: Send + 'static {
    async fn send(&mut self, message: &ClientMessage) -> Result<()>;

    /// Wait for the next inbound event.
    ///
    /// Must be cancel-safe: the manager polls it inside `select!`. After a
    /// `Closed` event the transport is dropped and never polled again.
    async fn next_event(&mut self) -> TransportEvent;

    /// Best-effort graceful close.
    async fn close(&mut self);
}

/// Opens transports to the one upstream endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a socket using `framing`.
    ///
    /// HTTP-level credential rejection (401/403) must surface as
    /// `AuthenticationError` so it is never retried.
    async fn open(&self, framing: Framing) -> Result<Box<dyn Transport>>;
}
