//! MQTT packet model shared by the engine and the deliver encoder.
//!
//! Inbound packets arrive already decoded by the framer; this module
//! defines the decoded shapes, the protocol version lattice, and the
//! outbound frame construction helpers:
//! - Control packet sum type and per-packet structs
//! - MQTT 5.0 property blocks carried on CONNECT and CONNACK
//! - Reason codes and the pre-5.0 compatibility tables
//! - Outbound wire encoding
//! - Structural packet validation
//! - Topic filter parsing and mountpoint handling

pub mod encode;
pub mod reason;
pub mod topic;
pub mod validate;

pub use reason::ReasonCode;

use bytes::Bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V3_1,
    V3_1_1,
    V5,
}

impl ProtocolVersion {
    /// Wire protocol level byte carried in CONNECT.
    pub fn level(self) -> u8 {
        match self {
            Self::V3_1 => 3,
            Self::V3_1_1 => 4,
            Self::V5 => 5,
        }
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            3 => Some(Self::V3_1),
            4 => Some(Self::V3_1_1),
            5 => Some(Self::V5),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl Qos {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::AtMostOnce),
            1 => Some(Self::AtLeastOnce),
            2 => Some(Self::ExactlyOnce),
            _ => None,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectPacket {
    /// Protocol name as decoded from the variable header ("MQTT"/"MQIsdp").
    pub protocol_name: String,
    pub protocol: ProtocolVersion,
    pub client_id: String,
    pub keep_alive: u16,
    pub clean_start: bool,
    pub is_bridge: bool,
    pub will: Option<Will>,
    pub properties: ConnectProperties,
    pub username: Option<String>,
    pub password: Option<Bytes>,
}

#[derive(Debug, Clone)]
pub struct Will {
    pub topic: String,
    pub payload: Bytes,
    pub qos: Qos,
    pub retain: bool,
}

#[derive(Debug, Clone)]
pub struct PublishPacket {
    pub topic: String,
    pub payload: Bytes,
    pub qos: Qos,
    pub packet_id: Option<u16>,
    pub dup: bool,
    pub retain: bool,
}

/// Per-filter options carried in SUBSCRIBE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    pub qos: Option<Qos>,
    pub no_local: bool,
    pub retain_as_published: bool,
    pub retain_handling: u8,
    /// Shared subscription group, filled by the topic parser.
    pub shared_group: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub filters: Vec<(String, SubscribeOptions)>,
    pub user_properties: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct UnsubscribePacket {
    pub packet_id: u16,
    pub topics: Vec<String>,
    pub user_properties: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct DisconnectPacket {
    pub reason_code: u8,
}

/// Decoded control packets handed to the engine by the framer.
#[derive(Debug, Clone)]
pub enum ControlPacket {
    Connect(ConnectPacket),
    Publish(PublishPacket),
    PubAck { packet_id: u16, reason: ReasonCode },
    PubRec { packet_id: u16, reason: ReasonCode },
    PubRel { packet_id: u16, reason: ReasonCode },
    PubComp { packet_id: u16, reason: ReasonCode },
    Subscribe(SubscribePacket),
    Unsubscribe(UnsubscribePacket),
    PingReq,
    Disconnect(DisconnectPacket),
}

impl ControlPacket {
    pub fn label(&self) -> &'static str {
        match self {
            ControlPacket::Connect(_) => "connect",
            ControlPacket::Publish(_) => "publish",
            ControlPacket::PubAck { .. } => "puback",
            ControlPacket::PubRec { .. } => "pubrec",
            ControlPacket::PubRel { .. } => "pubrel",
            ControlPacket::PubComp { .. } => "pubcomp",
            ControlPacket::Subscribe(_) => "subscribe",
            ControlPacket::Unsubscribe(_) => "unsubscribe",
            ControlPacket::PingReq => "pingreq",
            ControlPacket::Disconnect(_) => "disconnect",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectProperties {
    pub session_expiry_interval: Option<u32>,
    pub receive_maximum: Option<u16>,
    pub max_packet_size: Option<u32>,
    pub topic_alias_max: Option<u16>,
    pub user_properties: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct AckProperties {
    pub receive_max: Option<u16>,
    pub session_expiry: Option<u32>,
    pub server_keep_alive: Option<u16>,
    pub assigned_client_identifier: Option<String>,
    pub reason_string: Option<String>,
    pub user_properties: Vec<(String, String)>,
}

/// Initial framer state derived from the connection's negotiated limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramerSeed {
    pub max_packet_size: u32,
    pub proto_version: ProtocolVersion,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_level_round_trips() {
        for proto in [
            ProtocolVersion::V3_1,
            ProtocolVersion::V3_1_1,
            ProtocolVersion::V5,
        ] {
            assert_eq!(ProtocolVersion::from_level(proto.level()), Some(proto));
        }
        assert_eq!(ProtocolVersion::from_level(6), None);
    }

    #[test]
    fn qos_bits_round_trip() {
        for qos in [Qos::AtMostOnce, Qos::AtLeastOnce, Qos::ExactlyOnce] {
            assert_eq!(Qos::from_bits(qos.bits()), Some(qos));
        }
        assert_eq!(Qos::from_bits(3), None);
        assert!(Qos::AtLeastOnce < Qos::ExactlyOnce);
    }
}
