// Client endpoint: posting and fetching messages

use crate::chatserver::message::MessageLog;
use crate::chatserver::protocol::{Endpoint, Envelope, ProtocolError, Request, Response};
use std::sync::Arc;

/// Default poll interval advertised to clients, in milliseconds
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 1000;

/// Implements `get` and `post` against the shared message log
pub struct ClientService {
    log: Arc<MessageLog>,
    poll_timeout_ms: u64,
}

impl ClientService {
    /// Create a new client service
    pub fn new(log: Arc<MessageLog>, poll_timeout_ms: u64) -> Self {
        Self {
            log,
            poll_timeout_ms,
        }
    }

    /// Handle a decoded client request
    pub async fn handle(&self, envelope: Envelope) -> Response {
        match envelope.into_request(Endpoint::Client) {
            Ok(Request::Get { last }) => self.handle_get(last).await,
            Ok(Request::Post { sender, text }) => self.handle_post(sender, text).await,
            Ok(other) => ProtocolError::UnknownAction(other.action().to_string()).into(),
            Err(e) => e.into(),
        }
    }

    /// Return every retained message newer than `last`
    pub async fn handle_get(&self, last: u64) -> Response {
        match self.log.since(last).await {
            Ok(messages) => {
                tracing::debug!("Returning {} messages after {}", messages.len(), last);
                Response::Messages {
                    timeout_ms: self.poll_timeout_ms,
                    messages,
                }
            }
            Err(e) => {
                tracing::debug!("Rejected watermark: {}", e);
                ProtocolError::from(e).into()
            }
        }
    }

    /// Accept a new message
    pub async fn handle_post(&self, sender: String, text: String) -> Response {
        let message = self.log.append(sender, text).await;

        tracing::info!("Message {} from {} stored", message.sequence, message.sender);

        Response::Posted {
            timeout_ms: self.poll_timeout_ms,
        }
    }
}
