//! TCP listener and accept loop for the message daemon.
//!
//! The server binds a [`TcpListener`], caps concurrent connections with a
//! semaphore, and spawns one [`Connection`] task per accepted client. Each
//! task holds its semaphore permit until the connection closes.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::dispatcher::Dispatcher;
use crate::error::{ServerError, ServerResult};

/// TCP server that accepts client connections.
pub struct SocketServer {
    /// Server configuration.
    config: ServerConfig,
    /// The bound listener.
    listener: TcpListener,
    /// Limits concurrent connections.
    connection_semaphore: Arc<Semaphore>,
    /// Source of connection ids, monotonically increasing per accept.
    next_conn_id: AtomicU64,
}

impl SocketServer {
    /// Creates a new server bound to the configured address.
    pub async fn new(config: ServerConfig) -> ServerResult<Self> {
        let addr = config.bind_addr();
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                return Err(ServerError::addr_in_use(addr));
            }
            Err(e) => return Err(e.into()),
        };

        info!(addr = %listener.local_addr()?, "Server listening");

        let max_connections = config.max_connections;
        Ok(Self {
            config,
            listener,
            connection_semaphore: Arc::new(Semaphore::new(max_connections)),
            next_conn_id: AtomicU64::new(1),
        })
    }

    /// Returns the address the listener is actually bound to.
    ///
    /// Useful when the configured port is 0 and the OS picked one.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accepts a single connection, waiting for a free connection slot first.
    pub async fn accept(&self) -> ServerResult<(TcpStream, SocketAddr, OwnedSemaphorePermit)> {
        let permit = self
            .connection_semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore should not be closed");

        let (stream, peer) = self.listener.accept().await?;
        debug!(%peer, "Accepted new connection");

        Ok((stream, peer, permit))
    }

    /// Runs the accept loop, spawning a task per connection.
    ///
    /// Runs until an unrecoverable listener error occurs. Per-connection
    /// failures are logged and do not stop the loop.
    pub async fn run(&self, dispatcher: Arc<Dispatcher>) -> ServerResult<()> {
        loop {
            match self.accept().await {
                Ok((stream, peer, permit)) => {
                    let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
                    let connection = Connection::new(dispatcher.clone(), conn_id);
                    info!(conn_id, %peer, "Connection opened");

                    tokio::spawn(async move {
                        match connection.run(stream).await {
                            Ok(()) => info!(conn_id, %peer, "Connection closed"),
                            Err(e) => warn!(conn_id, %peer, error = %e, "Connection failed"),
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Runs the server until the shutdown future completes.
    pub async fn run_until_shutdown<S>(
        &self,
        dispatcher: Arc<Dispatcher>,
        shutdown: S,
    ) -> ServerResult<()>
    where
        S: std::future::Future<Output = ()>,
    {
        tokio::select! {
            result = self.run(dispatcher) => result,
            _ = shutdown => {
                info!("Shutdown signal received, stopping server");
                Ok(())
            }
        }
    }
}
