use super::session::SubscriptionRequest;
use crate::core::config::ZoneConfig;
use crate::protocol::{Qos, ReasonCode};

/// Flags of an inbound PUBLISH checked against zone policy.
#[derive(Debug, Clone, Copy)]
pub struct PublishFlags {
    pub qos: Qos,
    pub retain: bool,
}

/// Zone capability snapshot surfaced through the connection's `caps`
/// view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneCaps {
    pub max_qos_allowed: Qos,
    pub retain_available: bool,
    pub max_packet_size: u32,
    pub max_clientid_len: usize,
}

/// Per-zone limits on what publishers and subscribers may do.
pub trait CapabilityPolicy: Send + Sync {
    fn check_pub(&self, zone: &str, flags: PublishFlags) -> Result<(), ReasonCode>;

    /// Annotate each filter in place with its granted QoS or denial
    /// code. Order is preserved; callers emit SUBACK over the full
    /// list regardless of failures.
    fn check_sub(&self, zone: &str, filters: &mut [SubscriptionRequest]);

    fn caps(&self, zone: &str) -> ZoneCaps;
}

/// Capability policy backed by a single zone's static configuration.
#[derive(Debug, Clone)]
pub struct ZoneCapabilityPolicy {
    cfg: ZoneConfig,
}

impl ZoneCapabilityPolicy {
    pub fn new(cfg: ZoneConfig) -> Self {
        Self { cfg }
    }

    fn max_qos(&self) -> Qos {
        Qos::from_bits(self.cfg.max_qos_allowed).unwrap_or(Qos::ExactlyOnce)
    }
}

impl CapabilityPolicy for ZoneCapabilityPolicy {
    fn check_pub(&self, _zone: &str, flags: PublishFlags) -> Result<(), ReasonCode> {
        if flags.qos > self.max_qos() {
            return Err(ReasonCode::QosNotSupported);
        }
        if flags.retain && !self.cfg.retain_available {
            return Err(ReasonCode::RetainNotSupported);
        }
        Ok(())
    }

    fn check_sub(&self, _zone: &str, filters: &mut [SubscriptionRequest]) {
        let max_qos = self.max_qos();
        for filter in filters.iter_mut() {
            if !filter.granted() {
                continue;
            }
            let requested = filter.opts.qos.unwrap_or(Qos::AtMostOnce);
            let granted = requested.min(max_qos);
            filter.opts.qos = Some(granted);
            filter.reason = ReasonCode::granted(granted);
        }
    }

    fn caps(&self, _zone: &str) -> ZoneCaps {
        ZoneCaps {
            max_qos_allowed: self.max_qos(),
            retain_available: self.cfg.retain_available,
            max_packet_size: self.cfg.max_packet_size,
            max_clientid_len: self.cfg.max_clientid_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SubscribeOptions;

    fn policy(max_qos: u8, retain: bool) -> ZoneCapabilityPolicy {
        ZoneCapabilityPolicy::new(ZoneConfig {
            max_qos_allowed: max_qos,
            retain_available: retain,
            ..ZoneConfig::default()
        })
    }

    fn request(qos: Qos) -> SubscriptionRequest {
        SubscriptionRequest {
            topic: "t".into(),
            opts: SubscribeOptions {
                qos: Some(qos),
                ..Default::default()
            },
            reason: ReasonCode::Success,
        }
    }

    #[test]
    fn publish_above_zone_qos_is_rejected() {
        let policy = policy(1, true);
        assert!(policy
            .check_pub(
                "z",
                PublishFlags {
                    qos: Qos::AtLeastOnce,
                    retain: false
                }
            )
            .is_ok());
        assert_eq!(
            policy.check_pub(
                "z",
                PublishFlags {
                    qos: Qos::ExactlyOnce,
                    retain: false
                }
            ),
            Err(ReasonCode::QosNotSupported)
        );
    }

    #[test]
    fn retained_publish_needs_zone_support() {
        let policy = policy(2, false);
        assert_eq!(
            policy.check_pub(
                "z",
                PublishFlags {
                    qos: Qos::AtMostOnce,
                    retain: true
                }
            ),
            Err(ReasonCode::RetainNotSupported)
        );
    }

    #[test]
    fn subscribe_qos_is_capped_not_denied() {
        let policy = policy(1, true);
        let mut filters = vec![request(Qos::ExactlyOnce), request(Qos::AtMostOnce)];
        policy.check_sub("z", &mut filters);
        assert_eq!(filters[0].reason, ReasonCode::GrantedQos1);
        assert_eq!(filters[0].opts.qos, Some(Qos::AtLeastOnce));
        assert_eq!(filters[1].reason, ReasonCode::Success);
    }

    #[test]
    fn denied_filters_are_left_untouched() {
        let policy = policy(2, true);
        let mut filters = vec![SubscriptionRequest {
            reason: ReasonCode::NotAuthorized,
            ..request(Qos::AtLeastOnce)
        }];
        policy.check_sub("z", &mut filters);
        assert_eq!(filters[0].reason, ReasonCode::NotAuthorized);
    }
}
