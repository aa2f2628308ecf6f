//! Version-aware structural validation of decoded inbound packets.
//!
//! The framer guarantees framing-level shape; this pass rejects packets
//! that are framable but semantically impossible (wildcard publish
//! topics, zero packet ids at QoS > 0, empty filter lists). Failures
//! carrying an MQTT 5 reason code become DISCONNECT(code); everything
//! else becomes DISCONNECT(MalformedPacket).

use super::topic::{valid_topic_filter, valid_topic_name};
use super::{ControlPacket, Qos, ReasonCode};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("malformed packet: {0}")]
    Malformed(&'static str),
    #[error("protocol violation ({code:?}): {detail}")]
    Protocol {
        code: ReasonCode,
        detail: &'static str,
    },
}

impl ValidationError {
    fn protocol(code: ReasonCode, detail: &'static str) -> Self {
        Self::Protocol { code, detail }
    }

    /// Reason code carried on the outgoing DISCONNECT.
    pub fn disconnect_code(&self) -> ReasonCode {
        match self {
            Self::Malformed(_) => ReasonCode::MalformedPacket,
            Self::Protocol { code, .. } => *code,
        }
    }
}

pub fn validate(packet: &ControlPacket) -> Result<(), ValidationError> {
    match packet {
        ControlPacket::Connect(connect) => {
            if let Some(will) = &connect.will {
                if !valid_topic_name(&will.topic) {
                    return Err(ValidationError::protocol(
                        ReasonCode::TopicNameInvalid,
                        "will topic",
                    ));
                }
            }
            Ok(())
        }
        ControlPacket::Publish(publish) => {
            if !valid_topic_name(&publish.topic) {
                return Err(ValidationError::protocol(
                    ReasonCode::TopicNameInvalid,
                    "publish topic",
                ));
            }
            if publish.qos == Qos::AtMostOnce && publish.dup {
                return Err(ValidationError::Malformed("dup flag set at QoS 0"));
            }
            if publish.qos > Qos::AtMostOnce {
                match publish.packet_id {
                    None | Some(0) => {
                        return Err(ValidationError::Malformed(
                            "missing or zero packet id at QoS > 0",
                        ));
                    }
                    Some(_) => {}
                }
            }
            Ok(())
        }
        ControlPacket::Subscribe(sub) => {
            if sub.packet_id == 0 {
                return Err(ValidationError::Malformed("zero subscribe packet id"));
            }
            if sub.filters.is_empty() {
                return Err(ValidationError::protocol(
                    ReasonCode::ProtocolError,
                    "empty subscribe filter list",
                ));
            }
            for (filter, opts) in &sub.filters {
                if !valid_topic_filter(filter) {
                    return Err(ValidationError::protocol(
                        ReasonCode::TopicFilterInvalid,
                        "subscribe filter",
                    ));
                }
                if opts.retain_handling > 2 {
                    return Err(ValidationError::Malformed("retain handling out of range"));
                }
            }
            Ok(())
        }
        ControlPacket::Unsubscribe(unsub) => {
            if unsub.packet_id == 0 {
                return Err(ValidationError::Malformed("zero unsubscribe packet id"));
            }
            if unsub.topics.is_empty() {
                return Err(ValidationError::protocol(
                    ReasonCode::ProtocolError,
                    "empty unsubscribe filter list",
                ));
            }
            for filter in &unsub.topics {
                if !valid_topic_filter(filter) {
                    return Err(ValidationError::protocol(
                        ReasonCode::TopicFilterInvalid,
                        "unsubscribe filter",
                    ));
                }
            }
            Ok(())
        }
        ControlPacket::PubAck { packet_id, .. }
        | ControlPacket::PubRec { packet_id, .. }
        | ControlPacket::PubRel { packet_id, .. }
        | ControlPacket::PubComp { packet_id, .. } => {
            if *packet_id == 0 {
                return Err(ValidationError::Malformed("zero ack packet id"));
            }
            Ok(())
        }
        ControlPacket::PingReq | ControlPacket::Disconnect(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PublishPacket, SubscribeOptions, SubscribePacket, UnsubscribePacket};
    use bytes::Bytes;

    fn publish(topic: &str, qos: Qos, packet_id: Option<u16>, dup: bool) -> ControlPacket {
        ControlPacket::Publish(PublishPacket {
            topic: topic.to_string(),
            payload: Bytes::from_static(b"x"),
            qos,
            packet_id,
            dup,
            retain: false,
        })
    }

    #[test]
    fn publish_with_wildcard_topic_is_protocol_error() {
        let err = validate(&publish("a/+/b", Qos::AtMostOnce, None, false)).unwrap_err();
        assert_eq!(err.disconnect_code(), ReasonCode::TopicNameInvalid);
    }

    #[test]
    fn publish_qos1_requires_nonzero_packet_id() {
        assert!(validate(&publish("t", Qos::AtLeastOnce, Some(1), false)).is_ok());
        let err = validate(&publish("t", Qos::AtLeastOnce, Some(0), false)).unwrap_err();
        assert_eq!(err.disconnect_code(), ReasonCode::MalformedPacket);
        let err = validate(&publish("t", Qos::ExactlyOnce, None, false)).unwrap_err();
        assert_eq!(err.disconnect_code(), ReasonCode::MalformedPacket);
    }

    #[test]
    fn publish_qos0_rejects_dup() {
        let err = validate(&publish("t", Qos::AtMostOnce, None, true)).unwrap_err();
        assert_eq!(err.disconnect_code(), ReasonCode::MalformedPacket);
    }

    #[test]
    fn subscribe_rejects_empty_and_malformed_filters() {
        let empty = ControlPacket::Subscribe(SubscribePacket {
            packet_id: 1,
            filters: vec![],
            user_properties: vec![],
        });
        assert_eq!(
            validate(&empty).unwrap_err().disconnect_code(),
            ReasonCode::ProtocolError
        );

        let bad = ControlPacket::Subscribe(SubscribePacket {
            packet_id: 1,
            filters: vec![("a/#/b".to_string(), SubscribeOptions::default())],
            user_properties: vec![],
        });
        assert_eq!(
            validate(&bad).unwrap_err().disconnect_code(),
            ReasonCode::TopicFilterInvalid
        );
    }

    #[test]
    fn unsubscribe_requires_filters() {
        let empty = ControlPacket::Unsubscribe(UnsubscribePacket {
            packet_id: 2,
            topics: vec![],
            user_properties: vec![],
        });
        assert_eq!(
            validate(&empty).unwrap_err().disconnect_code(),
            ReasonCode::ProtocolError
        );
    }

    #[test]
    fn ack_with_zero_packet_id_is_malformed() {
        let err = validate(&ControlPacket::PubAck {
            packet_id: 0,
            reason: ReasonCode::Success,
        })
        .unwrap_err();
        assert_eq!(err.disconnect_code(), ReasonCode::MalformedPacket);
    }
}
