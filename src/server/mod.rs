//! Broadcast server: accepts WebSocket connections, decodes envelopes,
//! and relays messages through the room registry.

mod ws;

pub use ws::{router, ServerState};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::ServerConfig;
use crate::{RelayChatError, Result};

/// The chat broadcast server.
pub struct ChatServer {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl ChatServer {
    /// Bind to the configured address.
    ///
    /// Failure to bind is the one unrecoverable startup error.
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        info!("Broadcast server listening on {}", local_addr);

        Ok(Self {
            listener,
            state: Arc::new(ServerState::new(config.history_size)),
        })
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared server state (registry access for tests and stats).
    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Serve connections until the process exits.
    pub async fn run(self) -> Result<()> {
        let app = router(self.state);
        axum::serve(self.listener, app)
            .await
            .map_err(RelayChatError::Io)
    }
}
