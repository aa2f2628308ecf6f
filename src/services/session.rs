use crate::protocol::{ProtocolVersion, Qos, ReasonCode, SubscribeOptions};
use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;

/// Internal representation of a routed message.
///
/// The topic carries the connection's mountpoint prefix while inside
/// the broker; it is stripped again on outbound delivery.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub topic: String,
    pub payload: Bytes,
    pub qos: Qos,
    pub retain: bool,
    pub headers: MessageHeaders,
    /// Client id of the publishing connection, when known.
    pub publisher: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct MessageHeaders {
    /// True when the message is being replayed from the retained store,
    /// as opposed to carrying a publisher-set retain flag.
    pub retained: bool,
    pub dup: bool,
}

/// A SUBSCRIBE filter flowing through the pipeline, annotated with the
/// reason code it has accumulated so far. Order is preserved end to
/// end; denied entries keep their position.
#[derive(Debug, Clone)]
pub struct SubscriptionRequest {
    pub topic: String,
    pub opts: SubscribeOptions,
    pub reason: ReasonCode,
}

impl SubscriptionRequest {
    pub fn granted(&self) -> bool {
        self.reason.is_success()
    }
}

/// Parameters for opening (or resuming) a session at handshake.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub zone: String,
    pub client_id: String,
    pub username: Option<String>,
    pub clean_start: bool,
    pub keepalive: u16,
    pub proto_version: ProtocolVersion,
    pub peer_address: SocketAddr,
    pub session_expiry_interval: Option<u32>,
}

/// Result of a session open: the handle plus whether prior state was
/// recovered (the CONNACK session-present flag).
pub struct SessionOpen {
    pub session: Arc<dyn Session>,
    pub present: bool,
}

#[async_trait]
pub trait SessionManager: Send + Sync {
    async fn open(&self, params: SessionParams) -> anyhow::Result<SessionOpen>;
}

/// The long-lived per-client session: owns subscriptions and in-flight
/// QoS > 0 state, drives retransmission. The engine only forwards.
#[async_trait]
pub trait Session: Send + Sync {
    async fn publish(&self, packet_id: Option<u16>, message: Message) -> anyhow::Result<()>;

    async fn puback(&self, packet_id: u16, reason: ReasonCode) -> anyhow::Result<()>;
    async fn pubrec(&self, packet_id: u16, reason: ReasonCode) -> anyhow::Result<()>;
    async fn pubrel(&self, packet_id: u16, reason: ReasonCode) -> anyhow::Result<()>;
    async fn pubcomp(&self, packet_id: u16, reason: ReasonCode) -> anyhow::Result<()>;

    async fn subscribe(
        &self,
        packet_id: u16,
        user_properties: Vec<(String, String)>,
        filters: Vec<SubscriptionRequest>,
    ) -> anyhow::Result<()>;

    async fn unsubscribe(&self, packet_id: u16, topics: Vec<String>) -> anyhow::Result<()>;
}

/// Broker routing fabric; the engine only reaches it directly for will
/// publication, everything else goes through the session.
#[async_trait]
pub trait BrokerHandle: Send + Sync {
    async fn publish(&self, message: Message) -> anyhow::Result<()>;
}
