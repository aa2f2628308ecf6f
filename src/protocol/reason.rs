//! MQTT 5.0 reason codes and the pre-5.0 compatibility tables.
//!
//! The engine speaks MQTT 5 reason codes internally; whenever the peer
//! negotiated an older protocol version the deliver path consults the
//! tables here to downgrade CONNACK and SUBACK payloads. DISCONNECT has
//! no pre-5.0 equivalent and is suppressed entirely by the caller.

/// Reason codes as defined in MQTT 5.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReasonCode {
    /// Success / Normal disconnection / Granted QoS 0.
    Success = 0x00,
    /// Granted QoS 1.
    GrantedQos1 = 0x01,
    /// Granted QoS 2.
    GrantedQos2 = 0x02,
    /// Unspecified error.
    UnspecifiedError = 0x80,
    /// Malformed Packet.
    MalformedPacket = 0x81,
    /// Protocol Error.
    ProtocolError = 0x82,
    /// Implementation specific error.
    ImplementationSpecificError = 0x83,
    /// Unsupported Protocol Version.
    UnsupportedProtocolVersion = 0x84,
    /// Client Identifier not valid.
    ClientIdentifierNotValid = 0x85,
    /// Bad User Name or Password.
    BadUserNameOrPassword = 0x86,
    /// Not authorized.
    NotAuthorized = 0x87,
    /// Server unavailable.
    ServerUnavailable = 0x88,
    /// Server busy.
    ServerBusy = 0x89,
    /// Banned.
    Banned = 0x8A,
    /// Keep Alive timeout.
    KeepAliveTimeout = 0x8D,
    /// Session taken over.
    SessionTakenOver = 0x8E,
    /// Topic Filter invalid.
    TopicFilterInvalid = 0x8F,
    /// Topic Name invalid.
    TopicNameInvalid = 0x90,
    /// Packet Identifier in use.
    PacketIdentifierInUse = 0x91,
    /// Packet too large.
    PacketTooLarge = 0x95,
    /// Quota exceeded.
    QuotaExceeded = 0x97,
    /// Retain not supported.
    RetainNotSupported = 0x9A,
    /// QoS not supported.
    QosNotSupported = 0x9B,
    /// Shared Subscriptions not supported.
    SharedSubscriptionsNotSupported = 0x9E,
    /// Subscription Identifiers not supported.
    SubscriptionIdentifiersNotSupported = 0xA1,
    /// Wildcard Subscriptions not supported.
    WildcardSubscriptionsNotSupported = 0xA2,
}

impl ReasonCode {
    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn is_success(self) -> bool {
        (self as u8) < 0x80
    }

    pub fn is_error(self) -> bool {
        (self as u8) >= 0x80
    }

    pub fn reason_string(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::GrantedQos1 => "Granted QoS 1",
            Self::GrantedQos2 => "Granted QoS 2",
            Self::UnspecifiedError => "Unspecified error",
            Self::MalformedPacket => "Malformed Packet",
            Self::ProtocolError => "Protocol Error",
            Self::ImplementationSpecificError => "Implementation specific error",
            Self::UnsupportedProtocolVersion => "Unsupported Protocol Version",
            Self::ClientIdentifierNotValid => "Client Identifier not valid",
            Self::BadUserNameOrPassword => "Bad User Name or Password",
            Self::NotAuthorized => "Not authorized",
            Self::ServerUnavailable => "Server unavailable",
            Self::ServerBusy => "Server busy",
            Self::Banned => "Banned",
            Self::KeepAliveTimeout => "Keep Alive timeout",
            Self::SessionTakenOver => "Session taken over",
            Self::TopicFilterInvalid => "Topic Filter invalid",
            Self::TopicNameInvalid => "Topic Name invalid",
            Self::PacketIdentifierInUse => "Packet Identifier in use",
            Self::PacketTooLarge => "Packet too large",
            Self::QuotaExceeded => "Quota exceeded",
            Self::RetainNotSupported => "Retain not supported",
            Self::QosNotSupported => "QoS not supported",
            Self::SharedSubscriptionsNotSupported => "Shared Subscriptions not supported",
            Self::SubscriptionIdentifiersNotSupported => "Subscription Identifiers not supported",
            Self::WildcardSubscriptionsNotSupported => "Wildcard Subscriptions not supported",
        }
    }

    /// Granted-QoS code for a SUBACK payload entry.
    pub fn granted(qos: super::Qos) -> Self {
        match qos {
            super::Qos::AtMostOnce => Self::Success,
            super::Qos::AtLeastOnce => Self::GrantedQos1,
            super::Qos::ExactlyOnce => Self::GrantedQos2,
        }
    }
}

/// CONNACK return codes used by MQTT 3.1 and 3.1.1.
mod legacy {
    pub const ACCEPTED: u8 = 0x00;
    pub const UNACCEPTABLE_PROTOCOL: u8 = 0x01;
    pub const IDENTIFIER_REJECTED: u8 = 0x02;
    pub const SERVER_UNAVAILABLE: u8 = 0x03;
    pub const BAD_CREDENTIALS: u8 = 0x04;
    pub const NOT_AUTHORIZED: u8 = 0x05;
    pub const SUBACK_FAILURE: u8 = 0x80;
}

use super::ProtocolVersion;

/// Map a V5 reason code to the CONNACK byte for the negotiated version.
pub fn connack_code(proto: ProtocolVersion, code: ReasonCode) -> u8 {
    match proto {
        ProtocolVersion::V5 => code.value(),
        ProtocolVersion::V3_1 | ProtocolVersion::V3_1_1 => match code {
            ReasonCode::Success => legacy::ACCEPTED,
            ReasonCode::UnsupportedProtocolVersion | ReasonCode::ProtocolError => {
                legacy::UNACCEPTABLE_PROTOCOL
            }
            ReasonCode::ClientIdentifierNotValid => legacy::IDENTIFIER_REJECTED,
            ReasonCode::BadUserNameOrPassword => legacy::BAD_CREDENTIALS,
            ReasonCode::NotAuthorized | ReasonCode::Banned => legacy::NOT_AUTHORIZED,
            _ => legacy::SERVER_UNAVAILABLE,
        },
    }
}

/// Map a V5 reason code to the SUBACK payload byte for the negotiated
/// version. Pre-5.0 peers only understand granted QoS 0-2 and 0x80.
pub fn suback_code(proto: ProtocolVersion, code: ReasonCode) -> u8 {
    match proto {
        ProtocolVersion::V5 => code.value(),
        ProtocolVersion::V3_1 | ProtocolVersion::V3_1_1 => {
            if code.is_success() {
                code.value()
            } else {
                legacy::SUBACK_FAILURE
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Qos;

    #[test]
    fn success_and_error_partition() {
        assert!(ReasonCode::Success.is_success());
        assert!(ReasonCode::GrantedQos2.is_success());
        assert!(ReasonCode::NotAuthorized.is_error());
        assert!(!ReasonCode::NotAuthorized.is_success());
    }

    #[test]
    fn connack_downgrade_covers_handshake_failures() {
        let v4 = ProtocolVersion::V3_1_1;
        assert_eq!(connack_code(v4, ReasonCode::Success), 0x00);
        assert_eq!(connack_code(v4, ReasonCode::UnsupportedProtocolVersion), 0x01);
        assert_eq!(connack_code(v4, ReasonCode::ClientIdentifierNotValid), 0x02);
        assert_eq!(connack_code(v4, ReasonCode::BadUserNameOrPassword), 0x04);
        assert_eq!(connack_code(v4, ReasonCode::NotAuthorized), 0x05);
        assert_eq!(connack_code(v4, ReasonCode::UnspecifiedError), 0x03);
    }

    #[test]
    fn connack_v5_passes_through() {
        assert_eq!(
            connack_code(ProtocolVersion::V5, ReasonCode::NotAuthorized),
            0x87
        );
    }

    #[test]
    fn suback_downgrade_stays_in_legal_set() {
        let legal = [0x00u8, 0x01, 0x02, 0x80];
        for code in [
            ReasonCode::granted(Qos::AtMostOnce),
            ReasonCode::granted(Qos::ExactlyOnce),
            ReasonCode::NotAuthorized,
            ReasonCode::TopicFilterInvalid,
            ReasonCode::QuotaExceeded,
        ] {
            assert!(legal.contains(&suback_code(ProtocolVersion::V3_1_1, code)));
        }
        assert_eq!(
            suback_code(ProtocolVersion::V5, ReasonCode::TopicFilterInvalid),
            0x8F
        );
    }
}
