use anyhow::bail;
use serde::Deserialize;
use std::str::FromStr;

fn default_max_packet_size() -> u32 {
    1024 * 1024
}

fn default_enable_acl() -> bool {
    true
}

fn default_max_clientid_len() -> usize {
    65535
}

fn default_keepalive_backoff() -> f64 {
    0.75
}

fn default_max_qos() -> u8 {
    2
}

fn default_retain_available() -> bool {
    true
}

/// Per-zone policy applied to every connection admitted under that zone.
///
/// A zone is a named policy bucket; the engine snapshots the zone's
/// settings at init and never re-reads them for the lifetime of the
/// connection.
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneConfig {
    /// Largest packet the framer will accept, in bytes.
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: u32,
    /// Topic prefix template; `%c` and `%u` are substituted at handshake.
    #[serde(default)]
    pub mountpoint: Option<String>,
    /// When false, publish/subscribe ACL checks are skipped entirely.
    #[serde(default = "default_enable_acl")]
    pub enable_acl: bool,
    #[serde(default = "default_max_clientid_len")]
    pub max_clientid_len: usize,
    /// Fraction of the negotiated keepalive after which the wakeup fires.
    #[serde(default = "default_keepalive_backoff")]
    pub keepalive_backoff: f64,
    #[serde(default)]
    pub peer_cert_as_username: PeerCertAsUsername,
    /// Highest QoS the zone grants to publishers and subscribers.
    #[serde(default = "default_max_qos")]
    pub max_qos_allowed: u8,
    #[serde(default = "default_retain_available")]
    pub retain_available: bool,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            max_packet_size: default_max_packet_size(),
            mountpoint: None,
            enable_acl: default_enable_acl(),
            max_clientid_len: default_max_clientid_len(),
            keepalive_backoff: default_keepalive_backoff(),
            peer_cert_as_username: PeerCertAsUsername::None,
            max_qos_allowed: default_max_qos(),
            retain_available: default_retain_available(),
        }
    }
}

/// How to seed the username from a client certificate before CONNECT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerCertAsUsername {
    /// Certificate common name.
    Cn,
    /// Full subject distinguished name.
    Dn,
    #[default]
    None,
}

impl FromStr for PeerCertAsUsername {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cn" => Ok(Self::Cn),
            "dn" => Ok(Self::Dn),
            "none" => Ok(Self::None),
            other => bail!("invalid peer_cert_as_username {}", other),
        }
    }
}
