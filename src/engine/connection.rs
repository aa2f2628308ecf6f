//! The per-connection protocol state machine.
//!
//! One task owns a `Connection`; all mutation flows through the three
//! entry points (`received`, `deliver`, `shutdown`). Awaits on the
//! collaborators are the only suspension points, and the state is never
//! observable mid-update.

use crate::core::config::{PeerCertAsUsername, ZoneConfig};
use crate::core::time::{Clock, SystemClock};
use crate::engine::checks::{run_checks, CheckFn};
use crate::protocol::validate::{validate, ValidationError};
use crate::protocol::{
    encode, topic, AckProperties, ConnectPacket, ConnectProperties, ControlPacket, FramerSeed,
    ProtocolVersion, PublishPacket, Qos, ReasonCode, SubscribePacket, UnsubscribePacket,
};
use crate::services::auth::{
    Access, AccessControl, AclAction, AuthDecision, Credentials, PeerCertificate,
};
use crate::services::caps::{CapabilityPolicy, PublishFlags, ZoneCaps};
use crate::services::hooks::{
    HookContext, HookPayload, HookRegistry, CLIENT_CONNECTED, CLIENT_DISCONNECTED,
    CLIENT_SUBSCRIBE, CLIENT_UNSUBSCRIBE, MESSAGE_DELIVERED,
};
use crate::services::metrics::{self, MetricsSink};
use crate::services::registry::{ConnectionInfo, ConnectionRegistry};
use crate::services::session::{
    BrokerHandle, Message, MessageHeaders, Session, SessionManager, SessionOpen, SessionParams,
    SubscriptionRequest,
};
use crate::services::transport::{KeepaliveTimer, PacketSink, SinkError};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("packet received before connect")]
    NotConnected,
    #[error("duplicate connect on an established connection")]
    DuplicateConnect,
    #[error("malformed packet: {0}")]
    Malformed(&'static str),
    #[error("protocol error: {}", .0.reason_string())]
    Protocol(ReasonCode),
    #[error("not authorized")]
    NotAuthorized,
    #[error("client identifier rejected")]
    ClientIdRejected,
    #[error("handshake refused: {}", .0.reason_string())]
    HandshakeRefused(ReasonCode),
    #[error(transparent)]
    Send(#[from] SinkError),
}

/// Action to take after handling an incoming packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Continue processing packets.
    Continue,
    /// Client sent DISCONNECT; exit the session loop gracefully.
    Disconnect,
}

/// Terminal reason handed to `shutdown` by the owning task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Normal,
    /// A newer connection claimed this client id; only unregister.
    Conflict,
    AuthFailure,
    KeepaliveTimeout,
    TransportClosed,
    Other(String),
}

impl ShutdownReason {
    pub fn label(&self) -> &str {
        match self {
            Self::Normal => "normal",
            Self::Conflict => "conflict",
            Self::AuthFailure => "auth_failure",
            Self::KeepaliveTimeout => "keepalive_timeout",
            Self::TransportClosed => "transport_closed",
            Self::Other(label) => label,
        }
    }
}

/// Outbound events originated by the session, the broker, or the
/// engine itself; `deliver` turns them into wire frames.
#[derive(Debug, Clone)]
pub enum Delivery {
    Publish {
        packet_id: Option<u16>,
        message: Message,
    },
    ConnAck {
        reason: ReasonCode,
        session_present: bool,
    },
    PubAck {
        packet_id: u16,
        reason: ReasonCode,
    },
    PubRec {
        packet_id: u16,
        reason: ReasonCode,
    },
    PubRel {
        packet_id: u16,
        reason: ReasonCode,
    },
    PubComp {
        packet_id: u16,
        reason: ReasonCode,
    },
    SubAck {
        packet_id: u16,
        reasons: Vec<ReasonCode>,
    },
    UnsubAck {
        packet_id: u16,
        reasons: Vec<ReasonCode>,
    },
    PingResp,
    Disconnect {
        reason: ReasonCode,
    },
}

/// Packet/message counters; `msg` moves only for PUBLISH frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketStats {
    pub pkt: u64,
    pub msg: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub recv: PacketStats,
    pub send: PacketStats,
}

/// Shared broker services injected at connection init.
#[derive(Clone)]
pub struct ConnectionCtx<C: Clock = SystemClock> {
    pub sessions: Arc<dyn SessionManager>,
    pub auth: Arc<dyn AccessControl>,
    pub caps: Arc<dyn CapabilityPolicy>,
    pub registry: Arc<dyn ConnectionRegistry>,
    pub broker: Arc<dyn BrokerHandle>,
    pub hooks: Arc<HookRegistry>,
    pub metrics: Arc<dyn MetricsSink>,
    pub clock: C,
}

/// Immutable per-connection inputs known before the first packet.
pub struct ConnectionInit {
    pub zone: String,
    pub cfg: ZoneConfig,
    pub peer_address: SocketAddr,
    pub peer_certificate: Option<PeerCertificate>,
}

/// Per-connection MQTT protocol engine.
pub struct Connection<C: Clock = SystemClock> {
    ctx: ConnectionCtx<C>,
    sink: Box<dyn PacketSink>,
    timer: Box<dyn KeepaliveTimer>,

    zone: String,
    cfg: ZoneConfig,
    peer_address: SocketAddr,
    peer_certificate: Option<PeerCertificate>,

    proto_version: ProtocolVersion,
    proto_name: String,
    client_id: String,
    username: Option<String>,
    is_super: bool,
    is_bridge: bool,
    clean_start: bool,
    keepalive: u16,
    mountpoint: Option<String>,
    enable_acl: bool,
    will_message: Option<Message>,
    session: Option<Arc<dyn Session>>,
    conn_props: ConnectProperties,
    ack_props: AckProperties,
    recv_stats: PacketStats,
    send_stats: PacketStats,
    connected: bool,
    connected_at: Option<Instant>,
}

impl<C: Clock> Connection<C> {
    pub fn init(
        init: ConnectionInit,
        ctx: ConnectionCtx<C>,
        sink: Box<dyn PacketSink>,
        timer: Box<dyn KeepaliveTimer>,
    ) -> Self {
        let username = match init.cfg.peer_cert_as_username {
            PeerCertAsUsername::Cn => init
                .peer_certificate
                .as_ref()
                .map(|cert| cert.common_name.clone()),
            PeerCertAsUsername::Dn => init
                .peer_certificate
                .as_ref()
                .map(|cert| cert.subject_dn.clone()),
            PeerCertAsUsername::None => None,
        };
        let enable_acl = init.cfg.enable_acl;
        Self {
            ctx,
            sink,
            timer,
            zone: init.zone,
            peer_address: init.peer_address,
            peer_certificate: init.peer_certificate,
            proto_version: ProtocolVersion::V3_1_1,
            proto_name: String::new(),
            client_id: String::new(),
            username,
            is_super: false,
            is_bridge: false,
            clean_start: true,
            keepalive: 0,
            mountpoint: None,
            enable_acl,
            will_message: None,
            session: None,
            conn_props: ConnectProperties::default(),
            ack_props: AckProperties::default(),
            recv_stats: PacketStats::default(),
            send_stats: PacketStats::default(),
            connected: false,
            connected_at: None,
            cfg: init.cfg,
        }
    }

    // ------------------------------------------------------------------
    // Read-only views
    // ------------------------------------------------------------------

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            zone: self.zone.clone(),
            client_id: self.client_id.clone(),
            username: self.username.clone(),
            peer_address: self.peer_address,
            proto_version: self.proto_version,
            clean_start: self.clean_start,
            keepalive: self.keepalive,
            is_bridge: self.is_bridge,
        }
    }

    pub fn caps(&self) -> ZoneCaps {
        self.ctx.caps.caps(&self.zone)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            zone: self.zone.clone(),
            client_id: self.client_id.clone(),
            username: self.username.clone(),
            peer_address: self.peer_address,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn protocol_name(&self) -> &str {
        &self.proto_name
    }

    pub fn peer_certificate(&self) -> Option<&PeerCertificate> {
        self.peer_certificate.as_ref()
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            recv: self.recv_stats,
            send: self.send_stats,
        }
    }

    pub fn parser_seed(&self) -> FramerSeed {
        FramerSeed {
            max_packet_size: self.cfg.max_packet_size,
            proto_version: self.proto_version,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn connected_at(&self) -> Option<Instant> {
        self.connected_at
    }

    pub fn will_message(&self) -> Option<&Message> {
        self.will_message.as_ref()
    }

    // ------------------------------------------------------------------
    // Entry point: inbound packet
    // ------------------------------------------------------------------

    pub async fn received(&mut self, packet: ControlPacket) -> Result<ConnectionAction, EngineError> {
        if let Err(err) = validate(&packet) {
            tracing::warn!(
                "invalid packet client_id={} packet={} err={err}",
                self.client_id,
                packet.label()
            );
            let code = err.disconnect_code();
            self.deliver(Delivery::Disconnect { reason: code }).await?;
            return Err(match err {
                ValidationError::Malformed(detail) => EngineError::Malformed(detail),
                ValidationError::Protocol { code, .. } => EngineError::Protocol(code),
            });
        }
        self.recv_stats.pkt += 1;
        self.ctx.metrics.incr(metrics::PACKETS_RECEIVED);
        if matches!(packet, ControlPacket::Publish(_)) {
            self.recv_stats.msg += 1;
            self.ctx.metrics.incr(metrics::MESSAGES_RECEIVED);
        }
        match &packet {
            ControlPacket::Connect(_) if self.connected => {
                return Err(EngineError::DuplicateConnect);
            }
            ControlPacket::Connect(_) => {}
            _ if !self.connected => return Err(EngineError::NotConnected),
            _ => {}
        }
        tracing::debug!(
            "mqtt packet received zone={} client_id={} packet={}",
            self.zone,
            self.client_id,
            packet.label()
        );
        self.process(packet).await
    }

    async fn process(&mut self, packet: ControlPacket) -> Result<ConnectionAction, EngineError> {
        match packet {
            ControlPacket::Connect(connect) => {
                self.handle_connect(connect).await?;
                Ok(ConnectionAction::Continue)
            }
            ControlPacket::Publish(publish) => {
                self.handle_publish(publish).await?;
                Ok(ConnectionAction::Continue)
            }
            ControlPacket::Subscribe(sub) => {
                self.handle_subscribe(sub).await?;
                Ok(ConnectionAction::Continue)
            }
            ControlPacket::Unsubscribe(unsub) => {
                self.handle_unsubscribe(unsub).await?;
                Ok(ConnectionAction::Continue)
            }
            ControlPacket::PubAck { packet_id, reason } => {
                let session = self.session_ref()?.clone();
                if let Err(err) = session.puback(packet_id, reason).await {
                    tracing::warn!(
                        "session puback failed client_id={} packet_id={} err={err:?}",
                        self.client_id,
                        packet_id
                    );
                }
                Ok(ConnectionAction::Continue)
            }
            ControlPacket::PubRec { packet_id, reason } => {
                let session = self.session_ref()?.clone();
                if let Err(err) = session.pubrec(packet_id, reason).await {
                    tracing::warn!(
                        "session pubrec failed client_id={} packet_id={} err={err:?}",
                        self.client_id,
                        packet_id
                    );
                }
                self.deliver(Delivery::PubRel {
                    packet_id,
                    reason: ReasonCode::Success,
                })
                .await?;
                Ok(ConnectionAction::Continue)
            }
            ControlPacket::PubRel { packet_id, reason } => {
                let session = self.session_ref()?.clone();
                if let Err(err) = session.pubrel(packet_id, reason).await {
                    tracing::warn!(
                        "session pubrel failed client_id={} packet_id={} err={err:?}",
                        self.client_id,
                        packet_id
                    );
                }
                self.deliver(Delivery::PubComp {
                    packet_id,
                    reason: ReasonCode::Success,
                })
                .await?;
                Ok(ConnectionAction::Continue)
            }
            ControlPacket::PubComp { packet_id, reason } => {
                let session = self.session_ref()?.clone();
                if let Err(err) = session.pubcomp(packet_id, reason).await {
                    tracing::warn!(
                        "session pubcomp failed client_id={} packet_id={} err={err:?}",
                        self.client_id,
                        packet_id
                    );
                }
                Ok(ConnectionAction::Continue)
            }
            ControlPacket::PingReq => {
                self.deliver(Delivery::PingResp).await?;
                Ok(ConnectionAction::Continue)
            }
            ControlPacket::Disconnect(packet) => {
                tracing::debug!(
                    "client disconnect client_id={} reason_code={}",
                    self.client_id,
                    packet.reason_code
                );
                self.will_message = None;
                Ok(ConnectionAction::Disconnect)
            }
        }
    }

    // ------------------------------------------------------------------
    // Connect handshake
    // ------------------------------------------------------------------

    async fn handle_connect(&mut self, connect: ConnectPacket) -> Result<(), EngineError> {
        self.proto_version = connect.protocol;
        self.proto_name = connect.protocol_name.clone();
        self.client_id = connect.client_id.clone();
        self.clean_start = connect.clean_start;
        self.keepalive = connect.keep_alive;
        self.is_bridge = connect.is_bridge;
        self.conn_props = connect.properties.clone();
        if let Some(user) = &connect.username {
            self.username = Some(user.clone());
        }
        self.will_message = connect.will.as_ref().map(|will| Message {
            topic: will.topic.clone(),
            payload: will.payload.clone(),
            qos: will.qos,
            retain: will.retain,
            headers: MessageHeaders::default(),
            publisher: None,
        });
        self.connected = true;
        self.connected_at = Some(self.ctx.clock.now());

        let checks: &[CheckFn<ConnectPacket, Self>] =
            &[Self::check_proto_version, Self::check_client_id];
        if let Err(code) = run_checks(checks, &connect, self) {
            tracing::warn!(
                "connect refused zone={} client_id={} reason={}",
                self.zone,
                self.client_id,
                code.reason_string()
            );
            return self.refuse_connect(code).await;
        }

        let credentials = self.credentials();
        match self
            .ctx
            .auth
            .authenticate(&credentials, connect.password.as_deref())
            .await
        {
            Ok(AuthDecision::Allow { superuser }) => {
                self.is_super = superuser;
            }
            Ok(AuthDecision::Deny(code)) => {
                tracing::warn!(
                    "authentication denied zone={} client_id={} reason={}",
                    self.zone,
                    self.client_id,
                    code.reason_string()
                );
                return self.refuse_connect(code).await;
            }
            Err(err) => {
                tracing::warn!(
                    "authentication backend failed zone={} client_id={} err={err:?}",
                    self.zone,
                    self.client_id
                );
                return self.refuse_connect(ReasonCode::UnspecifiedError).await;
            }
        }

        if self.client_id.is_empty() {
            let generated = format!("stratus-{}", Uuid::new_v4());
            tracing::info!(
                "assigning client_id zone={} assigned={}",
                self.zone,
                generated
            );
            self.ack_props.assigned_client_identifier = Some(generated.clone());
            self.client_id = generated;
        }

        let open = match self.ctx.sessions.open(self.session_params()).await {
            Ok(open) => open,
            Err(err) => {
                tracing::warn!(
                    "session open failed zone={} client_id={} err={err:?}",
                    self.zone,
                    self.client_id
                );
                return self.refuse_connect(ReasonCode::UnspecifiedError).await;
            }
        };
        let SessionOpen { session, present } = open;
        self.session = Some(session);

        if let Err(err) = self.ctx.registry.register(&self.client_id, self.info()).await {
            tracing::warn!(
                "registry rejected connection zone={} client_id={} err={err:?}",
                self.zone,
                self.client_id
            );
            return self.refuse_connect(ReasonCode::UnspecifiedError).await;
        }

        if self.keepalive > 0 {
            let interval = f64::from(self.keepalive) * self.cfg.keepalive_backoff;
            self.timer.arm(Duration::from_secs(interval.round() as u64));
        }

        let hook_ctx = HookContext {
            zone: &self.zone,
            client_id: &self.client_id,
            username: self.username.as_deref(),
        };
        self.ctx.hooks.run(
            CLIENT_CONNECTED,
            &hook_ctx,
            HookPayload::Connected {
                reason: ReasonCode::Success,
            },
        );

        if let Some(template) = self.cfg.mountpoint.clone() {
            let expanded =
                topic::expand_mountpoint(&template, &self.client_id, self.username.as_deref());
            self.mountpoint = Some(expanded);
        }
        if let Some(will) = self.will_message.as_mut() {
            will.topic = topic::mount(self.mountpoint.as_deref(), &will.topic);
            will.publisher = Some(self.client_id.clone());
        }

        self.deliver(Delivery::ConnAck {
            reason: ReasonCode::Success,
            session_present: present,
        })
        .await?;
        tracing::info!(
            "mqtt connect accepted zone={} client_id={} proto={:?} clean_start={} keepalive={}",
            self.zone,
            self.client_id,
            self.proto_version,
            self.clean_start,
            self.keepalive
        );
        Ok(())
    }

    fn check_proto_version(connect: &ConnectPacket, _conn: &mut Self) -> Result<(), ReasonCode> {
        match (connect.protocol_name.as_str(), connect.protocol) {
            ("MQIsdp", ProtocolVersion::V3_1)
            | ("MQTT", ProtocolVersion::V3_1_1)
            | ("MQTT", ProtocolVersion::V5) => Ok(()),
            _ => Err(ReasonCode::ProtocolError),
        }
    }

    fn check_client_id(connect: &ConnectPacket, conn: &mut Self) -> Result<(), ReasonCode> {
        if connect.client_id.is_empty() {
            if connect.protocol == ProtocolVersion::V3_1 {
                return Err(ReasonCode::ClientIdentifierNotValid);
            }
            if !connect.clean_start {
                return Err(ReasonCode::ClientIdentifierNotValid);
            }
            return Ok(());
        }
        if connect.client_id.len() > conn.cfg.max_clientid_len {
            return Err(ReasonCode::ClientIdentifierNotValid);
        }
        Ok(())
    }

    async fn refuse_connect(&mut self, code: ReasonCode) -> Result<(), EngineError> {
        self.session = None;
        self.connected = false;
        self.deliver(Delivery::ConnAck {
            reason: code,
            session_present: false,
        })
        .await?;
        Err(match code {
            ReasonCode::ClientIdentifierNotValid => EngineError::ClientIdRejected,
            ReasonCode::NotAuthorized
            | ReasonCode::BadUserNameOrPassword
            | ReasonCode::Banned => EngineError::NotAuthorized,
            other => EngineError::HandshakeRefused(other),
        })
    }

    fn session_params(&self) -> SessionParams {
        SessionParams {
            zone: self.zone.clone(),
            client_id: self.client_id.clone(),
            username: self.username.clone(),
            clean_start: self.clean_start,
            keepalive: self.keepalive,
            proto_version: self.proto_version,
            peer_address: self.peer_address,
            session_expiry_interval: self.conn_props.session_expiry_interval,
        }
    }

    // ------------------------------------------------------------------
    // Publish pipeline
    // ------------------------------------------------------------------

    async fn handle_publish(&mut self, publish: PublishPacket) -> Result<(), EngineError> {
        if let Err(code) = self.check_publish(&publish).await {
            tracing::warn!(
                "publish refused zone={} client_id={} topic={} qos={:?} reason={}",
                self.zone,
                self.client_id,
                publish.topic,
                publish.qos,
                code.reason_string()
            );
            return self.refuse_publish(&publish, code).await;
        }
        let message = Message {
            topic: topic::mount(self.mountpoint.as_deref(), &publish.topic),
            payload: publish.payload.clone(),
            qos: publish.qos,
            retain: publish.retain,
            headers: MessageHeaders {
                retained: false,
                dup: publish.dup,
            },
            publisher: Some(self.client_id.clone()),
        };
        let session = self.session_ref()?.clone();
        if let Err(err) = session.publish(publish.packet_id, message).await {
            tracing::warn!(
                "session publish failed zone={} client_id={} topic={} err={err:?}",
                self.zone,
                self.client_id,
                publish.topic
            );
            return self
                .refuse_publish(&publish, ReasonCode::UnspecifiedError)
                .await;
        }
        match publish.qos {
            Qos::AtMostOnce => Ok(()),
            Qos::AtLeastOnce => {
                self.deliver(Delivery::PubAck {
                    packet_id: publish.packet_id.unwrap_or_default(),
                    reason: ReasonCode::Success,
                })
                .await
            }
            Qos::ExactlyOnce => {
                self.deliver(Delivery::PubRec {
                    packet_id: publish.packet_id.unwrap_or_default(),
                    reason: ReasonCode::Success,
                })
                .await
            }
        }
    }

    async fn check_publish(&self, publish: &PublishPacket) -> Result<(), ReasonCode> {
        self.ctx.caps.check_pub(
            &self.zone,
            PublishFlags {
                qos: publish.qos,
                retain: publish.retain,
            },
        )?;
        if self.acl_enabled() {
            let access = self
                .ctx
                .auth
                .check_acl(&self.credentials(), AclAction::Publish, &publish.topic)
                .await;
            if access == Access::Deny {
                return Err(ReasonCode::NotAuthorized);
            }
        }
        Ok(())
    }

    async fn refuse_publish(
        &mut self,
        publish: &PublishPacket,
        code: ReasonCode,
    ) -> Result<(), EngineError> {
        match publish.qos {
            Qos::AtMostOnce => Ok(()),
            Qos::AtLeastOnce => {
                self.deliver(Delivery::PubAck {
                    packet_id: publish.packet_id.unwrap_or_default(),
                    reason: code,
                })
                .await
            }
            Qos::ExactlyOnce => {
                self.deliver(Delivery::PubRec {
                    packet_id: publish.packet_id.unwrap_or_default(),
                    reason: code,
                })
                .await
            }
        }
    }

    fn acl_enabled(&self) -> bool {
        self.enable_acl && !self.is_super
    }

    // ------------------------------------------------------------------
    // Subscribe / unsubscribe pipeline
    // ------------------------------------------------------------------

    async fn handle_subscribe(&mut self, sub: SubscribePacket) -> Result<(), EngineError> {
        let mut requests: Vec<SubscriptionRequest> = sub
            .filters
            .iter()
            .map(|(raw, opts)| {
                let (filter_topic, opts) = topic::parse_filter(raw, opts);
                SubscriptionRequest {
                    topic: filter_topic,
                    opts,
                    reason: ReasonCode::Success,
                }
            })
            .collect();

        self.ctx.caps.check_sub(&self.zone, &mut requests);

        if self.acl_enabled() {
            let credentials = self.credentials();
            for request in requests.iter_mut() {
                if !request.granted() {
                    continue;
                }
                let access = self
                    .ctx
                    .auth
                    .check_acl(&credentials, AclAction::Subscribe, &request.topic)
                    .await;
                if access == Access::Deny {
                    tracing::warn!(
                        "subscribe denied zone={} client_id={} filter={}",
                        self.zone,
                        self.client_id,
                        request.topic
                    );
                    request.reason = ReasonCode::NotAuthorized;
                }
            }
        }

        let hook_ctx = HookContext {
            zone: &self.zone,
            client_id: &self.client_id,
            username: self.username.as_deref(),
        };
        let run = self.ctx.hooks.run(
            CLIENT_SUBSCRIBE,
            &hook_ctx,
            HookPayload::Subscribe {
                filters: requests.iter().map(|r| r.topic.clone()).collect(),
            },
        );
        if run.stopped {
            let reasons = vec![ReasonCode::ImplementationSpecificError; requests.len()];
            return self
                .deliver(Delivery::SubAck {
                    packet_id: sub.packet_id,
                    reasons,
                })
                .await;
        }

        for request in requests.iter_mut() {
            if request.granted() {
                request.topic = topic::mount(self.mountpoint.as_deref(), &request.topic);
            }
        }

        let reasons: Vec<ReasonCode> = requests.iter().map(|r| r.reason).collect();
        let session = self.session_ref()?.clone();
        if let Err(err) = session
            .subscribe(sub.packet_id, sub.user_properties, requests)
            .await
        {
            tracing::warn!(
                "session subscribe failed zone={} client_id={} err={err:?}",
                self.zone,
                self.client_id
            );
            let reasons = vec![ReasonCode::UnspecifiedError; reasons.len()];
            return self
                .deliver(Delivery::SubAck {
                    packet_id: sub.packet_id,
                    reasons,
                })
                .await;
        }
        self.deliver(Delivery::SubAck {
            packet_id: sub.packet_id,
            reasons,
        })
        .await
    }

    async fn handle_unsubscribe(&mut self, unsub: UnsubscribePacket) -> Result<(), EngineError> {
        let topics: Vec<String> = unsub
            .topics
            .iter()
            .map(|raw| topic::parse_filter(raw, &Default::default()).0)
            .collect();

        let hook_ctx = HookContext {
            zone: &self.zone,
            client_id: &self.client_id,
            username: self.username.as_deref(),
        };
        let run = self.ctx.hooks.run(
            CLIENT_UNSUBSCRIBE,
            &hook_ctx,
            HookPayload::Unsubscribe {
                topics: topics.clone(),
            },
        );
        if run.stopped {
            let reasons = vec![ReasonCode::ImplementationSpecificError; topics.len()];
            return self
                .deliver(Delivery::UnsubAck {
                    packet_id: unsub.packet_id,
                    reasons,
                })
                .await;
        }

        let mounted: Vec<String> = topics
            .iter()
            .map(|t| topic::mount(self.mountpoint.as_deref(), t))
            .collect();
        let count = mounted.len();
        let session = self.session_ref()?.clone();
        if let Err(err) = session.unsubscribe(unsub.packet_id, mounted).await {
            tracing::warn!(
                "session unsubscribe failed zone={} client_id={} err={err:?}",
                self.zone,
                self.client_id
            );
            let reasons = vec![ReasonCode::UnspecifiedError; count];
            return self
                .deliver(Delivery::UnsubAck {
                    packet_id: unsub.packet_id,
                    reasons,
                })
                .await;
        }
        self.deliver(Delivery::UnsubAck {
            packet_id: unsub.packet_id,
            reasons: vec![ReasonCode::Success; count],
        })
        .await
    }

    fn session_ref(&self) -> Result<&Arc<dyn Session>, EngineError> {
        self.session.as_ref().ok_or(EngineError::NotConnected)
    }

    // ------------------------------------------------------------------
    // Entry point: outbound event
    // ------------------------------------------------------------------

    pub async fn deliver(&mut self, event: Delivery) -> Result<(), EngineError> {
        match event {
            Delivery::Publish { packet_id, message } => {
                self.deliver_publish(packet_id, message).await
            }
            Delivery::ConnAck {
                reason,
                session_present,
            } => {
                let frame = encode::connack(
                    self.proto_version,
                    session_present,
                    reason,
                    &self.ack_props,
                );
                self.send_frame(frame, false).await
            }
            Delivery::PubAck { packet_id, reason } => {
                let frame = encode::puback(self.proto_version, packet_id, reason);
                self.send_frame(frame, false).await
            }
            Delivery::PubRec { packet_id, reason } => {
                let frame = encode::pubrec(self.proto_version, packet_id, reason);
                self.send_frame(frame, false).await
            }
            Delivery::PubRel { packet_id, reason } => {
                let frame = encode::pubrel(self.proto_version, packet_id, reason);
                self.send_frame(frame, false).await
            }
            Delivery::PubComp { packet_id, reason } => {
                let frame = encode::pubcomp(self.proto_version, packet_id, reason);
                self.send_frame(frame, false).await
            }
            Delivery::SubAck { packet_id, reasons } => {
                let frame = encode::suback(self.proto_version, packet_id, &reasons);
                self.send_frame(frame, false).await
            }
            Delivery::UnsubAck { packet_id, reasons } => {
                let frame = encode::unsuback(self.proto_version, packet_id, &reasons);
                self.send_frame(frame, false).await
            }
            Delivery::PingResp => self.send_frame(encode::pingresp(), false).await,
            Delivery::Disconnect { reason } => {
                if self.proto_version != ProtocolVersion::V5 {
                    tracing::debug!(
                        "suppressing disconnect for pre-v5 peer client_id={} reason={}",
                        self.client_id,
                        reason.reason_string()
                    );
                    return Ok(());
                }
                self.send_frame(encode::disconnect(reason), false).await
            }
        }
    }

    async fn deliver_publish(
        &mut self,
        packet_id: Option<u16>,
        message: Message,
    ) -> Result<(), EngineError> {
        let hook_ctx = HookContext {
            zone: &self.zone,
            client_id: &self.client_id,
            username: self.username.as_deref(),
        };
        let run = self.ctx.hooks.run(
            MESSAGE_DELIVERED,
            &hook_ctx,
            HookPayload::Delivered { message },
        );
        let mut message = match run.payload {
            HookPayload::Delivered { message } => message,
            _ => return Ok(()),
        };
        if run.stopped {
            tracing::debug!(
                "delivery stopped by hook client_id={} topic={}",
                self.client_id,
                message.topic
            );
            return Ok(());
        }
        if !self.is_bridge && message.retain && !message.headers.retained {
            message.retain = false;
        }
        let wire_topic = topic::unmount(self.mountpoint.as_deref(), &message.topic);
        let frame = encode::publish(
            self.proto_version,
            &wire_topic,
            &message.payload,
            message.qos,
            message.retain,
            message.headers.dup,
            packet_id,
        );
        self.send_frame(frame, true).await
    }

    async fn send_frame(&mut self, frame: Bytes, is_message: bool) -> Result<(), EngineError> {
        self.sink.send(frame).await?;
        self.send_stats.pkt += 1;
        self.ctx.metrics.incr(metrics::PACKETS_SENT);
        if is_message {
            self.send_stats.msg += 1;
            self.ctx.metrics.incr(metrics::MESSAGES_SENT);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Entry point: terminal cleanup
    // ------------------------------------------------------------------

    pub async fn shutdown(&mut self, reason: ShutdownReason) {
        if self.client_id.is_empty() {
            return;
        }
        self.connected = false;
        if reason == ShutdownReason::Conflict {
            self.ctx.registry.unregister(&self.client_id).await;
            return;
        }
        if reason != ShutdownReason::AuthFailure {
            if let Some(will) = self.will_message.take() {
                tracing::debug!(
                    "publishing will client_id={} topic={}",
                    self.client_id,
                    will.topic
                );
                if let Err(err) = self.ctx.broker.publish(will).await {
                    tracing::warn!(
                        "will publish failed zone={} client_id={} err={err:?}",
                        self.zone,
                        self.client_id
                    );
                }
            }
        }
        let hook_ctx = HookContext {
            zone: &self.zone,
            client_id: &self.client_id,
            username: self.username.as_deref(),
        };
        self.ctx.hooks.run(
            CLIENT_DISCONNECTED,
            &hook_ctx,
            HookPayload::Disconnected {
                reason: reason.label().to_string(),
            },
        );
        self.ctx.registry.unregister(&self.client_id).await;
        tracing::info!(
            "connection closed zone={} client_id={} reason={}",
            self.zone,
            self.client_id,
            reason.label()
        );
    }
}
