// One-shot client for talking to a running chat server

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

/// Send raw request bytes and return the raw response
pub async fn send_raw<A: ToSocketAddrs>(addr: A, request: &[u8]) -> Result<Vec<u8>> {
    let mut stream = TcpStream::connect(addr)
        .await
        .context("Failed to connect to chat server")?;

    stream
        .write_all(request)
        .await
        .context("Failed to send request")?;

    // Half-close so the server sees the end of the request
    stream
        .shutdown()
        .await
        .context("Failed to close write side")?;

    let mut response = Vec::new();
    stream
        .read_to_end(&mut response)
        .await
        .context("Failed to read response")?;

    Ok(response)
}

/// Send a JSON request and parse the JSON response
pub async fn send_request<A: ToSocketAddrs>(addr: A, request: &Value) -> Result<Value> {
    let bytes = serde_json::to_vec(request).context("Failed to encode request")?;
    let response = send_raw(addr, &bytes).await?;

    serde_json::from_slice(&response).context("Server sent a malformed response")
}
