//! Per-connection state machine.
//!
//! ```text
//! Accepted ─▶ Reading ─▶ Dispatching ─▶ Writing ─▶ Closing ─▶ Closed
//!                │             │                      ▲
//!                └─────────────┴──────────────────────┘
//!                 EOF, read error, undecodable request
//! ```
//!
//! Each accepted socket is owned by one [`Connection`], which also owns the
//! inbound buffer (until the codec has copied what it needs out of it) and
//! the outbound frame (until the write completes). A connection serves
//! exactly one request. Dropping the connection releases everything it
//! holds, so a forced close at any state leaks nothing.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use super::codec;
use super::dispatch::AfterWrite;
use super::frame;
use super::server::IpcState;
use crate::daemon::ShutdownSignal;

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    Reading,
    Dispatching,
    Writing,
    Closing,
    Closed,
}

/// One accepted client connection.
pub struct Connection {
    id: u64,
    stream: Option<UnixStream>,
    state: ConnectionState,
    inbound: Vec<u8>,
    outbound: Option<Vec<u8>>,
    after_write: AfterWrite,
    shared: Arc<IpcState>,
}

impl Connection {
    pub fn new(id: u64, stream: UnixStream, shared: Arc<IpcState>) -> Self {
        Self {
            id,
            stream: Some(stream),
            state: ConnectionState::Accepted,
            inbound: Vec::new(),
            outbound: None,
            after_write: AfterWrite::Close,
            shared,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Drive the connection to [`ConnectionState::Closed`].
    ///
    /// `cancel` flipping to `true` force-closes the connection from
    /// whatever state it is in; no response is sent in that case. Returns
    /// the state the connection was in when it finished or was cancelled.
    pub async fn run(mut self, mut cancel: watch::Receiver<bool>) -> ConnectionState {
        while self.state != ConnectionState::Closed {
            let cancelled = tokio::select! {
                biased;
                Ok(_) = cancel.wait_for(|cancelled| *cancelled) => true,
                _ = self.step() => false,
            };
            if cancelled {
                let interrupted = self.state;
                debug!(conn = self.id, state = ?interrupted, "connection cancelled");
                self.abort();
                return interrupted;
            }
        }
        ConnectionState::Closed
    }

    /// Run one transition. Each step suspends at most once.
    async fn step(&mut self) {
        let next = match self.state {
            ConnectionState::Accepted => {
                self.inbound = vec![0; self.shared.max_message_bytes];
                ConnectionState::Reading
            }
            ConnectionState::Reading => self.read().await,
            ConnectionState::Dispatching => self.dispatch(),
            ConnectionState::Writing => self.write().await,
            ConnectionState::Closing => self.close().await,
            ConnectionState::Closed => ConnectionState::Closed,
        };
        trace!(conn = self.id, from = ?self.state, to = ?next, "transition");
        self.state = next;
    }

    /// A single read is the whole request.
    async fn read(&mut self) -> ConnectionState {
        let Some(stream) = self.stream.as_mut() else {
            return ConnectionState::Closing;
        };
        match stream.read(&mut self.inbound).await {
            Ok(0) => {
                debug!(conn = self.id, "peer closed without sending a request");
                ConnectionState::Closing
            }
            Ok(len) => {
                self.inbound.truncate(len);
                ConnectionState::Dispatching
            }
            Err(err) => {
                warn!(conn = self.id, error = %err, "read failed");
                ConnectionState::Closing
            }
        }
    }

    fn dispatch(&mut self) -> ConnectionState {
        let inbound = std::mem::take(&mut self.inbound);
        let payload = frame::payload(&inbound);
        debug!(
            conn = self.id,
            request = %String::from_utf8_lossy(payload),
            "request received"
        );

        let dispatcher = &self.shared.dispatcher;
        let outcome = match codec::decode_request(payload) {
            Ok(request) => dispatcher.dispatch(&request),
            Err(err) if err.is_answerable() => dispatcher.reject(&err),
            Err(err) => {
                warn!(conn = self.id, error = %err, "dropping request without a response");
                return ConnectionState::Closing;
            }
        };

        match codec::encode_response(&outcome.response) {
            Ok(document) => {
                self.outbound = Some(frame::seal(document));
                self.after_write = outcome.after_write;
                ConnectionState::Writing
            }
            Err(err) => {
                warn!(conn = self.id, error = %err, "dropping request without a response");
                ConnectionState::Closing
            }
        }
    }

    async fn write(&mut self) -> ConnectionState {
        if let (Some(stream), Some(outbound)) = (self.stream.as_mut(), self.outbound.as_deref()) {
            match stream.write_all(outbound).await {
                Ok(()) => trace!(conn = self.id, bytes = outbound.len(), "response written"),
                Err(err) => warn!(conn = self.id, error = %err, "write failed"),
            }
        }
        self.outbound = None;
        ConnectionState::Closing
    }

    async fn close(&mut self) -> ConnectionState {
        if let Some(mut stream) = self.stream.take() {
            if let Err(err) = stream.shutdown().await {
                debug!(conn = self.id, error = %err, "socket shutdown failed");
            }
        }
        self.release_buffers();
        debug!(conn = self.id, "connection closed");

        if self.after_write == AfterWrite::Shutdown {
            info!(conn = self.id, "shutdown requested by client");
            let _ = self.shared.shutdown_tx.send(ShutdownSignal);
        }
        ConnectionState::Closed
    }

    /// Forced close. The stream is dropped without a graceful shutdown.
    fn abort(&mut self) {
        self.stream = None;
        self.release_buffers();
        self.state = ConnectionState::Closed;
    }

    fn release_buffers(&mut self) {
        self.inbound = Vec::new();
        self.outbound = None;
    }
}
