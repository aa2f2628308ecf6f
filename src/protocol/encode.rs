//! Outbound wire frame construction.
//!
//! The engine emits bytes through an injected sink, so every encoder
//! here is a pure function from packet fields to a complete frame
//! (fixed header, remaining length, variable header, payload). Reason
//! codes are downgraded for pre-5.0 peers at this layer.

use super::reason::{connack_code, suback_code};
use super::{AckProperties, ProtocolVersion, Qos, ReasonCode};
use bytes::Bytes;

const PACKET_CONNACK: u8 = 0x20;
const PACKET_PUBLISH: u8 = 0x30;
const PACKET_PUBACK: u8 = 0x40;
const PACKET_PUBREC: u8 = 0x50;
const PACKET_PUBREL: u8 = 0x62;
const PACKET_PUBCOMP: u8 = 0x70;
const PACKET_SUBACK: u8 = 0x90;
const PACKET_UNSUBACK: u8 = 0xB0;
const PACKET_PINGRESP: u8 = 0xD0;
const PACKET_DISCONNECT: u8 = 0xE0;

const PROP_SESSION_EXPIRY: u8 = 0x11;
const PROP_ASSIGNED_CLIENT_ID: u8 = 0x12;
const PROP_SERVER_KEEP_ALIVE: u8 = 0x13;
const PROP_REASON_STRING: u8 = 0x1F;
const PROP_RECEIVE_MAX: u8 = 0x21;
const PROP_USER_PROPERTY: u8 = 0x26;

pub fn connack(
    proto: ProtocolVersion,
    session_present: bool,
    reason: ReasonCode,
    props: &AckProperties,
) -> Bytes {
    let flags = u8::from(session_present);
    let code = connack_code(proto, reason);
    let mut payload = vec![flags, code];
    if matches!(proto, ProtocolVersion::V5) {
        let props_buf = encode_ack_properties(props);
        payload.extend(encode_remaining_length(props_buf.len()));
        payload.extend(props_buf);
    }
    frame(PACKET_CONNACK, payload)
}

pub fn publish(
    proto: ProtocolVersion,
    topic: &str,
    payload: &[u8],
    qos: Qos,
    retain: bool,
    dup: bool,
    packet_id: Option<u16>,
) -> Bytes {
    let header = PACKET_PUBLISH
        | (qos.bits() << 1)
        | u8::from(retain)
        | if dup { 0b0000_1000 } else { 0 };
    let mut body = Vec::with_capacity(topic.len() + payload.len() + 8);
    body.extend_from_slice(&(topic.len() as u16).to_be_bytes());
    body.extend_from_slice(topic.as_bytes());
    if !matches!(qos, Qos::AtMostOnce) {
        // Packet id presence is guaranteed by the validator for QoS > 0.
        let pid = packet_id.unwrap_or_default();
        body.extend_from_slice(&pid.to_be_bytes());
    }
    if matches!(proto, ProtocolVersion::V5) {
        body.push(0); // property length
    }
    body.extend_from_slice(payload);
    frame(header, body)
}

pub fn puback(proto: ProtocolVersion, packet_id: u16, reason: ReasonCode) -> Bytes {
    ack_variant(proto, PACKET_PUBACK, packet_id, reason)
}

pub fn pubrec(proto: ProtocolVersion, packet_id: u16, reason: ReasonCode) -> Bytes {
    ack_variant(proto, PACKET_PUBREC, packet_id, reason)
}

pub fn pubrel(proto: ProtocolVersion, packet_id: u16, reason: ReasonCode) -> Bytes {
    ack_variant(proto, PACKET_PUBREL, packet_id, reason)
}

pub fn pubcomp(proto: ProtocolVersion, packet_id: u16, reason: ReasonCode) -> Bytes {
    ack_variant(proto, PACKET_PUBCOMP, packet_id, reason)
}

pub fn suback(proto: ProtocolVersion, packet_id: u16, reasons: &[ReasonCode]) -> Bytes {
    let mut payload = Vec::with_capacity(reasons.len() + 3);
    payload.extend_from_slice(&packet_id.to_be_bytes());
    if matches!(proto, ProtocolVersion::V5) {
        payload.push(0); // property length
    }
    for code in reasons {
        payload.push(suback_code(proto, *code));
    }
    frame(PACKET_SUBACK, payload)
}

pub fn unsuback(proto: ProtocolVersion, packet_id: u16, reasons: &[ReasonCode]) -> Bytes {
    let mut payload = Vec::with_capacity(reasons.len() + 3);
    payload.extend_from_slice(&packet_id.to_be_bytes());
    if matches!(proto, ProtocolVersion::V5) {
        payload.push(0); // property length
        for code in reasons {
            payload.push(code.value());
        }
    }
    frame(PACKET_UNSUBACK, payload)
}

pub fn pingresp() -> Bytes {
    Bytes::from_static(&[PACKET_PINGRESP, 0x00])
}

/// DISCONNECT is a 5.0-only emission; callers suppress it for older
/// peers before reaching this encoder.
pub fn disconnect(reason: ReasonCode) -> Bytes {
    frame(PACKET_DISCONNECT, vec![reason.value(), 0x00])
}

fn ack_variant(proto: ProtocolVersion, packet_type: u8, packet_id: u16, reason: ReasonCode) -> Bytes {
    let mut payload = Vec::with_capacity(6);
    payload.extend_from_slice(&packet_id.to_be_bytes());
    if matches!(proto, ProtocolVersion::V5) {
        payload.push(reason.value());
        payload.push(0); // property length
    }
    frame(packet_type, payload)
}

fn frame(header: u8, payload: Vec<u8>) -> Bytes {
    let mut out = Vec::with_capacity(payload.len() + 5);
    out.push(header);
    out.extend(encode_remaining_length(payload.len()));
    out.extend(payload);
    Bytes::from(out)
}

fn encode_ack_properties(props: &AckProperties) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(rm) = props.receive_max {
        buf.push(PROP_RECEIVE_MAX);
        buf.extend_from_slice(&rm.to_be_bytes());
    }
    if let Some(expiry) = props.session_expiry {
        buf.push(PROP_SESSION_EXPIRY);
        buf.extend_from_slice(&expiry.to_be_bytes());
    }
    if let Some(keep_alive) = props.server_keep_alive {
        buf.push(PROP_SERVER_KEEP_ALIVE);
        buf.extend_from_slice(&keep_alive.to_be_bytes());
    }
    if let Some(assigned) = &props.assigned_client_identifier {
        buf.push(PROP_ASSIGNED_CLIENT_ID);
        buf.extend_from_slice(&(assigned.len() as u16).to_be_bytes());
        buf.extend_from_slice(assigned.as_bytes());
    }
    if let Some(reason) = &props.reason_string {
        buf.push(PROP_REASON_STRING);
        buf.extend_from_slice(&(reason.len() as u16).to_be_bytes());
        buf.extend_from_slice(reason.as_bytes());
    }
    for (k, v) in &props.user_properties {
        buf.push(PROP_USER_PROPERTY);
        buf.extend_from_slice(&(k.len() as u16).to_be_bytes());
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(&(v.len() as u16).to_be_bytes());
        buf.extend_from_slice(v.as_bytes());
    }
    buf
}

fn encode_remaining_length(mut len: usize) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if len == 0 {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connack_legacy_is_two_byte_payload() {
        let buf = connack(
            ProtocolVersion::V3_1_1,
            true,
            ReasonCode::Success,
            &AckProperties::default(),
        );
        assert_eq!(&buf[..], &[0x20, 0x02, 0x01, 0x00]);
    }

    #[test]
    fn connack_v5_carries_assigned_client_id() {
        let props = AckProperties {
            assigned_client_identifier: Some("g-1".into()),
            ..Default::default()
        };
        let buf = connack(ProtocolVersion::V5, false, ReasonCode::Success, &props);
        assert_eq!(buf[0], 0x20);
        assert!(
            buf.windows(4).any(|w| w == [0x12, 0x00, 0x03, b'g']),
            "expected assigned-client-identifier property in CONNACK frame"
        );
    }

    #[test]
    fn connack_legacy_downgrades_reason() {
        let buf = connack(
            ProtocolVersion::V3_1,
            false,
            ReasonCode::NotAuthorized,
            &AckProperties::default(),
        );
        assert_eq!(&buf[..], &[0x20, 0x02, 0x00, 0x05]);
    }

    #[test]
    fn publish_qos1_places_packet_id_after_topic() {
        let buf = publish(
            ProtocolVersion::V3_1_1,
            "t",
            b"x",
            Qos::AtLeastOnce,
            false,
            false,
            Some(7),
        );
        assert_eq!(&buf[..], &[0x32, 0x06, 0x00, 0x01, b't', 0x00, 0x07, b'x']);
    }

    #[test]
    fn publish_sets_retain_and_dup_flags() {
        let buf = publish(
            ProtocolVersion::V3_1_1,
            "t",
            b"",
            Qos::AtMostOnce,
            true,
            true,
            None,
        );
        assert_eq!(buf[0], 0x30 | 0x08 | 0x01);
    }

    #[test]
    fn puback_legacy_omits_reason_byte() {
        let buf = puback(ProtocolVersion::V3_1_1, 7, ReasonCode::Success);
        assert_eq!(&buf[..], &[0x40, 0x02, 0x00, 0x07]);
    }

    #[test]
    fn pubrec_v5_carries_reason_byte() {
        let buf = pubrec(ProtocolVersion::V5, 9, ReasonCode::NotAuthorized);
        assert_eq!(&buf[..], &[0x50, 0x04, 0x00, 0x09, 0x87, 0x00]);
    }

    #[test]
    fn suback_legacy_maps_errors_to_0x80() {
        let buf = suback(
            ProtocolVersion::V3_1_1,
            3,
            &[ReasonCode::GrantedQos1, ReasonCode::NotAuthorized],
        );
        assert_eq!(&buf[..], &[0x90, 0x04, 0x00, 0x03, 0x01, 0x80]);
    }

    #[test]
    fn unsuback_legacy_has_no_reason_payload() {
        let buf = unsuback(ProtocolVersion::V3_1_1, 4, &[ReasonCode::Success]);
        assert_eq!(&buf[..], &[0xB0, 0x02, 0x00, 0x04]);
    }

    #[test]
    fn remaining_length_multi_byte() {
        let payload = vec![0u8; 321];
        let buf = frame(PACKET_PUBLISH, payload);
        // 321 = 0xC1 * 1 + 2 * 128 -> bytes [0xC1, 0x02]
        assert_eq!(&buf[..3], &[0x30, 0xC1, 0x02]);
    }
}
