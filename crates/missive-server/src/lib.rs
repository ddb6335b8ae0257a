//! Daemon: socket server, dispatcher, delivery engine, store.
//!
//! This crate provides the missive server daemon that handles:
//! - TCP connections speaking the framed wire protocol
//! - Account login, discovery, and deletion
//! - Message delivery, immediate to online recipients or queued for later
//! - In-memory persistence behind the [`MessageStore`] trait
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use missive_server::{
//!     DeliveryEngine, Dispatcher, MemoryStore, ServerConfig, SocketServer,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     let delivery = Arc::new(DeliveryEngine::new(store.clone()));
//!     let dispatcher = Arc::new(Dispatcher::new(store, delivery));
//!
//!     let server = SocketServer::new(ServerConfig::default()).await?;
//!     server.run(dispatcher).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod connection;
mod delivery;
mod dispatcher;
mod error;
mod signals;
mod socket;
mod store;

pub use config::{DEFAULT_HOST, DEFAULT_PORT, ServerConfig};
pub use connection::{Connection, Session};
pub use delivery::{DeliveryEngine, PushCommand, PushHandle};
pub use dispatcher::{Dispatch, Dispatcher};
pub use error::{ServerError, ServerResult};
pub use signals::{ShutdownHandle, ShutdownSignal, SignalHandler};
pub use socket::SocketServer;
pub use store::{MemoryStore, MessageStore, StoreError, StoreResult};
