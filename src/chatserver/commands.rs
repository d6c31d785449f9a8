// Command handlers for the chat server CLI

use crate::chatserver::*;
use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::path::PathBuf;

/// Execute a CLI command
pub async fn execute_command(command: ChatCommand) -> Result<()> {
    match command {
        ChatCommand::Serve {
            config,
            host,
            client_port,
            admin_port,
            storage_limit,
            admin_token,
        } => {
            let overrides = ServeOverrides {
                host,
                client_port,
                admin_port,
                storage_limit,
                admin_token,
            };
            handle_serve(config, overrides).await
        }
        ChatCommand::Status { addr, token } => handle_status(addr, token).await,
        ChatCommand::Shutdown {
            addr,
            token,
            timeout,
        } => handle_shutdown(addr, token, timeout).await,
        ChatCommand::Post { addr, nick, text } => handle_post(addr, nick, text).await,
        ChatCommand::Get { addr, last } => handle_get(addr, last).await,
    }
}

/// Flag values that take precedence over the config file
#[derive(Debug, Default)]
pub struct ServeOverrides {
    pub host: Option<std::net::IpAddr>,
    pub client_port: Option<u16>,
    pub admin_port: Option<u16>,
    pub storage_limit: Option<usize>,
    pub admin_token: Option<String>,
}

/// Merge the config file (if any) with flag overrides
pub fn resolve_config(path: Option<PathBuf>, overrides: ServeOverrides) -> Result<ServerConfig> {
    let mut config = match path {
        Some(path) => ServerConfig::from_file(&path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => ServerConfig::default(),
    };

    if let Some(host) = overrides.host {
        config.host = host;
    }
    if let Some(port) = overrides.client_port {
        config.client_port = port;
    }
    if let Some(port) = overrides.admin_port {
        config.admin_port = port;
    }
    if let Some(limit) = overrides.storage_limit {
        config.storage_limit = limit;
    }
    if let Some(token) = overrides.admin_token {
        config.admin_token = Some(token);
    }

    config.validate().context("Invalid server configuration")?;
    Ok(config)
}

async fn handle_serve(path: Option<PathBuf>, overrides: ServeOverrides) -> Result<()> {
    let config = resolve_config(path, overrides)?;
    let server = ConnectionServer::bind(config).await?;

    println!("Client endpoint: {}", server.client_addr());
    println!("Admin endpoint:  {}", server.admin_addr());

    // Ctrl+C drains the server the same way an admin shutdown does
    let controller = server.controller();
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!("Failed to listen for Ctrl+C: {}", e);
                    return;
                }
                tracing::info!("Interrupted, stopping server");
                controller.begin_drain();
            }
            _ = controller.cancelled() => {}
        }
    });

    server.run().await?;

    println!("Shutdown was requested and performed.");
    Ok(())
}

async fn handle_status(addr: String, token: String) -> Result<()> {
    let request = json!({"action": "status", "token": token});
    let response = send_request(addr.as_str(), &request).await?;

    if let Some(what) = error_text(&response) {
        bail!("Server error: {}", what);
    }

    println!("Server status:");
    println!("Messages stored: {}", response["stored"]);
    println!("Total messages received: {}", response["total"]);
    println!("Storage limit: {}", response["size limit"]);

    Ok(())
}

async fn handle_shutdown(addr: String, token: String, timeout_secs: u64) -> Result<()> {
    let timeout_ms = timeout_secs
        .checked_mul(1000)
        .context("Shutdown timeout is too large")?;
    let request = json!({"action": "shutdown", "token": token, "timeout": timeout_ms});
    let response = send_request(addr.as_str(), &request).await?;

    if let Some(what) = error_text(&response) {
        bail!("Server error: {}", what);
    }

    println!("Server will shut down in {} seconds.", timeout_secs);
    Ok(())
}

async fn handle_post(addr: String, nick: String, text: String) -> Result<()> {
    let request = json!({"action": "post", "nick": nick, "text": text});
    let response = send_request(addr.as_str(), &request).await?;

    if let Some(what) = error_text(&response) {
        bail!("Server error: {}", what);
    }

    println!("Message posted.");
    Ok(())
}

async fn handle_get(addr: String, last: i64) -> Result<()> {
    let request = json!({"action": "get", "last": last});
    let response = send_request(addr.as_str(), &request).await?;

    if let Some(what) = error_text(&response) {
        bail!("Server error: {}", what);
    }

    let messages = response["messages"].as_array().cloned().unwrap_or_default();
    if messages.is_empty() {
        println!("No new messages.");
    }
    for message in messages {
        println!(
            "[{}] {}: {}",
            message["n"],
            message["who"].as_str().unwrap_or("?"),
            message["text"].as_str().unwrap_or("")
        );
    }

    Ok(())
}

fn error_text(response: &Value) -> Option<&str> {
    if response["status"] == "err" {
        Some(response["what"].as_str().unwrap_or("unknown error"))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_flags_override_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"storage_limit": 5, "admin_token": "from-file"}}"#).unwrap();

        let overrides = ServeOverrides {
            admin_token: Some("from-flag".to_string()),
            client_port: Some(4000),
            ..Default::default()
        };

        let config = resolve_config(Some(file.path().to_path_buf()), overrides).unwrap();
        assert_eq!(config.storage_limit, 5);
        assert_eq!(config.client_port, 4000);
        assert_eq!(config.admin_token.as_deref(), Some("from-flag"));
    }

    #[test]
    fn test_invalid_override_rejected() {
        let overrides = ServeOverrides {
            storage_limit: Some(0),
            ..Default::default()
        };
        assert!(resolve_config(None, overrides).is_err());
    }

    #[test]
    fn test_error_text() {
        let err = json!({"status": "err", "what": "Invalid password."});
        assert_eq!(error_text(&err), Some("Invalid password."));

        let status = json!({"total": 1, "stored": 1, "size limit": 1000});
        assert_eq!(error_text(&status), None);
    }
}
