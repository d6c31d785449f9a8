// Chat server: a minimal message relay
//
// Clients post short messages and fetch everything newer than a sequence
// number they already saw. A second endpoint, guarded by a shared token,
// reports statistics and schedules a delayed shutdown of the whole server.

pub mod message;
pub mod protocol;
pub mod client;
pub mod admin;
pub mod shutdown;
pub mod config;
pub mod server;
pub mod remote;
pub mod cli;
pub mod commands;

pub use message::{LogError, LogStats, Message, MessageLog};
pub use protocol::{Endpoint, Envelope, ProtocolError, Request, Response};
pub use client::ClientService;
pub use admin::AdminService;
pub use shutdown::{Lifecycle, ShutdownController, ShutdownTimer};
pub use config::{ConfigError, ServerConfig};
pub use server::{ConnectionServer, Dispatcher};
pub use remote::{send_raw, send_request};
pub use cli::{ChatCli, ChatCommand};
pub use commands::execute_command;
