use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("peer closed the connection")]
    Closed,
    #[error("transport error: {0}")]
    Io(String),
}

/// Outbound byte sink; the transport owns serialization ordering, the
/// engine owns frame construction. A failed send is not retried.
#[async_trait]
pub trait PacketSink: Send {
    async fn send(&mut self, frame: Bytes) -> Result<(), SinkError>;
}

/// Handle through which the engine arms the connection's keepalive
/// wakeup. Expiry handling (converting the wakeup into a shutdown)
/// belongs to the owning task, not the engine.
pub trait KeepaliveTimer: Send {
    fn arm(&mut self, after: Duration);
}

/// Timer handle for hosts that do not track keepalive.
#[derive(Debug, Default)]
pub struct NoopTimer;

impl KeepaliveTimer for NoopTimer {
    fn arm(&mut self, _after: Duration) {}
}
