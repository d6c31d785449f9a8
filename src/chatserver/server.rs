// Two one-shot request/response endpoints sharing one message log

use crate::chatserver::admin::{generate_admin_token, AdminService};
use crate::chatserver::client::ClientService;
use crate::chatserver::config::ServerConfig;
use crate::chatserver::message::MessageLog;
use crate::chatserver::protocol::{Endpoint, Envelope, ProtocolError, Response};
use crate::chatserver::shutdown::{Lifecycle, ShutdownController};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Routes a request body to the service behind an endpoint
pub struct Dispatcher {
    client: ClientService,
    admin: AdminService,
}

impl Dispatcher {
    pub fn new(client: ClientService, admin: AdminService) -> Self {
        Self { client, admin }
    }

    /// Decode, execute and produce exactly one response
    pub async fn dispatch(&self, endpoint: Endpoint, body: &[u8]) -> Response {
        let envelope = match Envelope::decode(body) {
            Ok(envelope) => envelope,
            Err(e) => return e.into(),
        };

        match endpoint {
            Endpoint::Client => self.client.handle(envelope).await,
            Endpoint::Admin => self.admin.handle(envelope).await,
        }
    }
}

/// A chat server with both endpoints bound
pub struct ConnectionServer {
    client_listener: TcpListener,
    admin_listener: TcpListener,
    client_addr: SocketAddr,
    admin_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    controller: Arc<ShutdownController>,
    max_request_bytes: usize,
}

impl ConnectionServer {
    /// Bind both endpoints
    ///
    /// Fails without leaving either endpoint open if one of them cannot be
    /// bound.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        config.validate().context("Invalid server configuration")?;

        let client_listener = TcpListener::bind(config.client_addr())
            .await
            .with_context(|| format!("Failed to bind client endpoint on {}", config.client_addr()))?;
        let admin_listener = TcpListener::bind(config.admin_addr())
            .await
            .with_context(|| format!("Failed to bind admin endpoint on {}", config.admin_addr()))?;

        let client_addr = client_listener
            .local_addr()
            .context("Failed to read client endpoint address")?;
        let admin_addr = admin_listener
            .local_addr()
            .context("Failed to read admin endpoint address")?;

        let admin_token = match config.admin_token {
            Some(token) => token,
            None => {
                let token = generate_admin_token();
                warn!("No admin token configured, generated one: {}", token);
                token
            }
        };

        let log = Arc::new(MessageLog::new(config.storage_limit));
        let controller = Arc::new(ShutdownController::new());

        let client = ClientService::new(log.clone(), config.poll_timeout_ms);
        let admin = AdminService::new(log.clone(), &admin_token, controller.clone());

        info!(
            "Client endpoint on {}, admin endpoint on {} (storage limit {})",
            client_addr, admin_addr, config.storage_limit
        );

        Ok(Self {
            client_listener,
            admin_listener,
            client_addr,
            admin_addr,
            dispatcher: Arc::new(Dispatcher::new(client, admin)),
            controller,
            max_request_bytes: config.max_request_bytes,
        })
    }

    /// Bound client endpoint address
    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    /// Bound admin endpoint address
    pub fn admin_addr(&self) -> SocketAddr {
        self.admin_addr
    }

    /// Handle used to stop the server from outside
    pub fn controller(&self) -> Arc<ShutdownController> {
        self.controller.clone()
    }

    /// Watch lifecycle transitions
    pub fn lifecycle(&self) -> watch::Receiver<Lifecycle> {
        self.controller.subscribe()
    }

    /// Serve both endpoints until the server is cancelled
    ///
    /// Returns after both listeners are closed and every connection task has
    /// finished or been dropped.
    pub async fn run(self) -> Result<()> {
        let token = self.controller.token();
        let tracker = TaskTracker::new();

        info!("Chat server running");

        tokio::join!(
            run_listener(
                self.client_listener,
                Endpoint::Client,
                self.dispatcher.clone(),
                token.clone(),
                tracker.clone(),
                self.max_request_bytes,
            ),
            run_listener(
                self.admin_listener,
                Endpoint::Admin,
                self.dispatcher.clone(),
                token.clone(),
                tracker.clone(),
                self.max_request_bytes,
            ),
        );

        // Listeners only return on cancellation
        self.controller.begin_drain();

        tracker.close();
        tracker.wait().await;

        self.controller.mark_stopped();
        info!("Shutdown was requested and performed");

        Ok(())
    }
}

/// Accept connections on one endpoint until cancelled
async fn run_listener(
    listener: TcpListener,
    endpoint: Endpoint,
    dispatcher: Arc<Dispatcher>,
    token: CancellationToken,
    tracker: TaskTracker,
    max_request_bytes: usize,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let dispatcher = dispatcher.clone();
                        let token = token.clone();
                        tracker.spawn(
                            async move {
                                info!("Connected");
                                let exchange = handle_connection(stream, endpoint, &dispatcher, max_request_bytes);
                                match token.run_until_cancelled(exchange).await {
                                    Some(Ok(())) => {}
                                    Some(Err(e)) => warn!("Connection error: {:#}", e),
                                    None => debug!("Connection cancelled"),
                                }
                            }
                            .instrument(info_span!("connection", endpoint = %endpoint, peer = %peer)),
                        );
                    }
                    Err(e) => {
                        error!("Accept error on {} endpoint: {}", endpoint, e);
                    }
                }
            }
            _ = token.cancelled() => {
                info!("{} listener shutting down", endpoint);
                break;
            }
        }
    }
}

/// Run one request/response exchange
async fn handle_connection(
    mut stream: TcpStream,
    endpoint: Endpoint,
    dispatcher: &Dispatcher,
    max_request_bytes: usize,
) -> Result<()> {
    // The peer closing its write side marks the end of the request
    let mut body = Vec::new();
    (&mut stream)
        .take(max_request_bytes as u64 + 1)
        .read_to_end(&mut body)
        .await
        .context("Failed to read request")?;

    debug!("Request: {}", String::from_utf8_lossy(&body));

    let response: Response = if body.len() > max_request_bytes {
        // Unread input would make the close reset the peer before it sees the reply
        let discarded = tokio::io::copy(&mut stream, &mut tokio::io::sink())
            .await
            .context("Failed to discard oversized request")?;
        debug!("Discarded {} bytes past the request limit", discarded);
        ProtocolError::TooLarge(max_request_bytes).into()
    } else {
        dispatcher.dispatch(endpoint, &body).await
    };

    let bytes = response.to_bytes().context("Failed to encode response")?;

    debug!("Responding with {}", String::from_utf8_lossy(&bytes));

    stream
        .write_all(&bytes)
        .await
        .context("Failed to write response")?;
    stream
        .shutdown()
        .await
        .context("Failed to close connection")?;

    Ok(())
}
