use crate::protocol::ProtocolVersion;
use async_trait::async_trait;
use std::net::SocketAddr;

/// Snapshot handed to the connection manager at registration time.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub zone: String,
    pub client_id: String,
    pub username: Option<String>,
    pub peer_address: SocketAddr,
    pub proto_version: ProtocolVersion,
    pub clean_start: bool,
    pub keepalive: u16,
    pub is_bridge: bool,
}

/// Registry mapping client identifiers to live connection handles.
/// Registration happens once per successful handshake; unregistration
/// exactly once at shutdown.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    async fn register(&self, client_id: &str, info: ConnectionInfo) -> anyhow::Result<()>;
    async fn unregister(&self, client_id: &str);
}
