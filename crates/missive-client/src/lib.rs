//! CLI, interactive messaging session, output rendering
//!
//! This crate provides the `missive` command-line client.

pub mod cli;
pub mod error;
pub mod repl;
pub mod socket;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
pub use repl::Repl;
