//! simplechat - A minimal message relay
//!
//! This library provides an in-memory, bounded message log served over two
//! TCP endpoints: one for clients posting and fetching messages, and one for
//! an operator holding the admin token.

pub mod chatserver;

pub use chatserver::{ConnectionServer, MessageLog, ServerConfig};
