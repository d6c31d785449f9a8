// Admin endpoint: token-gated status and shutdown

use crate::chatserver::message::MessageLog;
use crate::chatserver::protocol::{Endpoint, Envelope, ProtocolError, Request, Response};
use crate::chatserver::shutdown::{ShutdownController, ShutdownTimer};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Length of generated admin tokens
pub const ADMIN_TOKEN_LEN: usize = 20;

/// Generate a random admin token
pub fn generate_admin_token() -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

    let mut rng = rand::thread_rng();
    (0..ADMIN_TOKEN_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

fn token_digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

/// Handles `status` and `shutdown` for holders of the admin token
pub struct AdminService {
    log: Arc<MessageLog>,
    token_digest: [u8; 32],
    controller: Arc<ShutdownController>,
    timer: Mutex<Option<ShutdownTimer>>,
}

impl AdminService {
    /// Create a new admin service with a fixed token
    pub fn new(log: Arc<MessageLog>, admin_token: &str, controller: Arc<ShutdownController>) -> Self {
        Self {
            log,
            token_digest: token_digest(admin_token),
            controller,
            timer: Mutex::new(None),
        }
    }

    /// Handle an admin request
    ///
    /// The token is checked before the action is looked at, so a caller
    /// without it learns nothing about which actions exist.
    pub async fn handle(&self, envelope: Envelope) -> Response {
        let authorized = envelope.token().and_then(|token| self.authorize(token));
        if let Err(e) = authorized {
            tracing::warn!("Rejected admin request: {}", e);
            return e.into();
        }

        match envelope.into_request(Endpoint::Admin) {
            Ok(Request::Status { .. }) => self.handle_status().await,
            Ok(Request::Shutdown { timeout_ms, .. }) => self.handle_shutdown(timeout_ms).await,
            Ok(other) => ProtocolError::UnknownAction(other.action().to_string()).into(),
            Err(e) => e.into(),
        }
    }

    /// Compare a presented token against the admin token
    pub fn authorize(&self, token: &str) -> Result<(), ProtocolError> {
        // Digests have a fixed length, so the fold touches every byte
        let presented = token_digest(token);
        let diff = presented
            .iter()
            .zip(self.token_digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));

        if diff == 0 {
            Ok(())
        } else {
            Err(ProtocolError::Unauthorized)
        }
    }

    /// Report the log counters
    pub async fn handle_status(&self) -> Response {
        Response::Status(self.log.stats().await)
    }

    /// Arm the shutdown timer
    ///
    /// Only one shutdown may be pending; later requests are rejected and
    /// leave the armed timer alone.
    pub async fn handle_shutdown(&self, timeout_ms: u64) -> Response {
        let mut timer = self.timer.lock().await;

        if !self.controller.try_schedule() {
            match timer.as_ref().filter(|t| !t.is_finished()) {
                Some(pending) => tracing::warn!(
                    "Shutdown requested while one is already pending ({} ms left)",
                    pending.remaining().as_millis()
                ),
                None => tracing::warn!("Shutdown requested while the server is stopping"),
            }
            return ProtocolError::ShutdownPending.into();
        }

        let delay = Duration::from_millis(timeout_ms);
        *timer = Some(ShutdownTimer::arm(self.controller.clone(), delay));

        tracing::info!("Shutdown scheduled in {} ms", timeout_ms);
        Response::ShutdownScheduled
    }
}
