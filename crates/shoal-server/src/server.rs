//! Listener: accepts inbound connections and spawns one relay session task
//! per connection.

use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::registry::Registry;
use crate::relay;

/// The rendezvous server: one shared registry plus the accept loop.
pub struct RelayServer {
    registry: Arc<Registry>,
}

impl RelayServer {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::new()),
        }
    }

    /// The shared session registry (exposed for integration tests).
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Bind to an address and return the TCP listener.
    pub async fn bind(listen_addr: &str) -> Result<TcpListener> {
        let listener = TcpListener::bind(listen_addr).await?;
        info!("Relay server listening on {}", listen_addr);
        Ok(listener)
    }

    /// Unbounded accept loop. A failure on one connection never terminates
    /// the listener or any other session's task.
    pub async fn run(&self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("Accepted connection from {}", addr);
                    tokio::spawn(relay::run(stream, addr, Arc::clone(&self.registry)));
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

impl Default for RelayServer {
    fn default() -> Self {
        Self::new()
    }
}
