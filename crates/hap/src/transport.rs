//! Network transport collaborator
//!
//! The transport terminates client connections, decodes requests and calls
//! into the [`Driver`](crate::Driver). The driver only needs it to start, stop
//! and push event payloads to individual clients.

use std::net::SocketAddr;

use async_trait::async_trait;

/// Address identifying a connected client
pub type ClientAddr = SocketAddr;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Begin accepting connections
    async fn start(&self) -> anyhow::Result<()>;

    /// Close every connection and stop accepting new ones
    async fn stop(&self) -> anyhow::Result<()>;

    /// Push one event payload to one client
    ///
    /// Returns `false` if the payload could not be delivered. Must not block
    /// for long; it is called from the control loop.
    fn push_event(&self, data: &[u8], client: ClientAddr) -> bool;
}

/// Transport that accepts nothing and drops every event
#[derive(Debug, Default)]
pub struct NullTransport;

#[async_trait]
impl Transport for NullTransport {
    async fn start(&self) -> anyhow::Result<()> {
        tracing::debug!("Null transport started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::debug!("Null transport stopped");
        Ok(())
    }

    fn push_event(&self, data: &[u8], client: ClientAddr) -> bool {
        tracing::trace!(%client, bytes = data.len(), "Dropping event");
        true
    }
}
