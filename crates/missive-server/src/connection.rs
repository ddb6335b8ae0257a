//! Per-connection driver.
//!
//! Owns one socket end to end: assembles request frames, dispatches them
//! one at a time, writes responses, and forwards delivery pushes between
//! requests. Generic over the stream so tests can drive it through an
//! in-memory duplex pipe instead of a TCP socket.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use missive_core::Account;
use missive_protocol::{Action, Envelope, FrameAssembler, ProtocolError};

use crate::delivery::{PushCommand, PushHandle};
use crate::dispatcher::Dispatcher;
use crate::error::ServerResult;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Connection-scoped state the dispatcher works on.
pub struct Session {
    /// Server-unique connection id.
    pub conn_id: u64,
    /// Account bound by login, if any. At most one per connection.
    pub account: Option<Account>,
    /// Sending half of this connection's push channel; login hands a clone
    /// to the delivery engine's roster.
    pub push: PushHandle,
}

impl Session {
    /// Creates an unbound session.
    pub fn new(conn_id: u64, push: PushHandle) -> Self {
        Self {
            conn_id,
            account: None,
            push,
        }
    }
}

/// Drives one client connection to completion.
pub struct Connection {
    dispatcher: Arc<Dispatcher>,
    session: Session,
    push_rx: mpsc::UnboundedReceiver<PushCommand>,
    assembler: FrameAssembler,
    in_flight: bool,
}

impl Connection {
    /// Creates a connection driver with a fresh push channel.
    pub fn new(dispatcher: Arc<Dispatcher>, conn_id: u64) -> Self {
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        Self {
            dispatcher,
            session: Session::new(conn_id, push_tx),
            push_rx,
            assembler: FrameAssembler::new(),
            in_flight: false,
        }
    }

    /// Runs the connection until the peer disconnects, a newer login
    /// evicts it, or a transport error closes it.
    ///
    /// Whatever the outcome, the account binding is released on the way
    /// out; the guarded unbind makes that a no-op after an eviction.
    pub async fn run<S>(mut self, stream: S) -> ServerResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let result = self.drive(stream).await;
        if let Some(account) = self.session.account.take() {
            self.dispatcher
                .delivery()
                .unbind(account.id, self.session.conn_id)
                .await;
        }
        result
    }

    async fn drive<S>(&mut self, stream: S) -> ServerResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            tokio::select! {
                read = reader.read(&mut chunk) => {
                    let n = read?;
                    if n == 0 {
                        if self.assembler.is_between_frames() {
                            debug!(conn_id = self.session.conn_id, "peer disconnected");
                        } else {
                            warn!(
                                conn_id = self.session.conn_id,
                                buffered = self.assembler.buffered(),
                                "peer disconnected mid-frame"
                            );
                        }
                        return Ok(());
                    }
                    self.assembler.feed(&chunk[..n]);
                    if self.pump(&mut writer).await? {
                        return Ok(());
                    }
                }
                command = self.push_rx.recv() => {
                    match command {
                        Some(PushCommand::Deliver(view)) => {
                            // Deliveries only follow a login frame, so the
                            // connection's mode is locked by now.
                            let Some(mode) = self.assembler.mode() else { continue };
                            debug!(
                                conn_id = self.session.conn_id,
                                message_id = view.message_id,
                                "pushing message"
                            );
                            let frame = Envelope::ok(view).to_frame(mode, Action::DeliverMessage)?;
                            writer.write_all(&frame).await?;
                            writer.flush().await?;
                        }
                        Some(PushCommand::Evicted) | None => {
                            info!(
                                conn_id = self.session.conn_id,
                                "connection superseded by a newer login"
                            );
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Dispatches every complete buffered frame, writing and flushing each
    /// response before pulling the next frame. Returns true when the
    /// connection must close.
    async fn pump<W>(&mut self, writer: &mut W) -> ServerResult<bool>
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(frame) = self.assembler.next_frame()? {
            // Alternation invariant: the previous response is flushed
            // before another request may be dispatched.
            if self.in_flight {
                return Err(ProtocolError::malformed(
                    "request received while another is in flight",
                )
                .into());
            }
            self.in_flight = true;
            let dispatch = self.dispatcher.dispatch(&mut self.session, frame).await?;
            writer.write_all(&dispatch.frame).await?;
            writer.flush().await?;
            self.in_flight = false;

            if dispatch.close_after {
                debug!(
                    conn_id = self.session.conn_id,
                    "closing connection after final response"
                );
                return Ok(true);
            }
        }
        Ok(false)
    }
}
