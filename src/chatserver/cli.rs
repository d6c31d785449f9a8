// CLI commands for the chat server

use crate::chatserver::config::{DEFAULT_ADMIN_PORT, DEFAULT_CLIENT_PORT};
use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

/// Chat server CLI
#[derive(Debug, Parser)]
#[command(name = "simplechat")]
#[command(about = "Minimal message relay with a token-gated admin endpoint")]
pub struct ChatCli {
    #[command(subcommand)]
    pub command: ChatCommand,
}

/// Chat server subcommands
#[derive(Debug, Subcommand)]
pub enum ChatCommand {
    /// Run the chat server
    Serve {
        /// JSON config file; flags below override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Address to bind both endpoints to
        #[arg(long)]
        host: Option<IpAddr>,

        /// Client endpoint port
        #[arg(long)]
        client_port: Option<u16>,

        /// Admin endpoint port
        #[arg(long)]
        admin_port: Option<u16>,

        /// Maximum number of retained messages
        #[arg(short = 'l', long)]
        storage_limit: Option<usize>,

        /// Admin token (generated when not set)
        #[arg(long, env = "SIMPLECHAT_ADMIN_TOKEN", hide_env_values = true)]
        admin_token: Option<String>,
    },

    /// Show server status
    Status {
        /// Admin endpoint address
        #[arg(short, long, default_value_t = default_admin_addr())]
        addr: String,

        /// Admin token
        #[arg(short, long, env = "SIMPLECHAT_ADMIN_TOKEN", hide_env_values = true)]
        token: String,
    },

    /// Schedule a server shutdown
    Shutdown {
        /// Admin endpoint address
        #[arg(short, long, default_value_t = default_admin_addr())]
        addr: String,

        /// Admin token
        #[arg(short, long, env = "SIMPLECHAT_ADMIN_TOKEN", hide_env_values = true)]
        token: String,

        /// Delay before shutdown in seconds (default: 10)
        #[arg(short = 'T', long, default_value = "10")]
        timeout: u64,
    },

    /// Post a message
    Post {
        /// Client endpoint address
        #[arg(short, long, default_value_t = default_client_addr())]
        addr: String,

        /// Nickname to post as
        #[arg(short, long)]
        nick: String,

        /// Message text
        text: String,
    },

    /// Fetch messages newer than a sequence number
    Get {
        /// Client endpoint address
        #[arg(short, long, default_value_t = default_client_addr())]
        addr: String,

        /// Last sequence number already seen
        #[arg(short, long, default_value = "0", allow_negative_numbers = true)]
        last: i64,
    },
}

fn default_client_addr() -> String {
    format!("127.0.0.1:{}", DEFAULT_CLIENT_PORT)
}

fn default_admin_addr() -> String {
    format!("127.0.0.1:{}", DEFAULT_ADMIN_PORT)
}
