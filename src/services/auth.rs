use crate::protocol::ReasonCode;
use async_trait::async_trait;
use std::net::SocketAddr;

/// Client certificate fields surfaced by the TLS terminator.
#[derive(Debug, Clone)]
pub struct PeerCertificate {
    pub common_name: String,
    pub subject_dn: String,
}

/// Identity tuple handed to authentication and ACL checks.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub zone: String,
    pub client_id: String,
    pub username: Option<String>,
    pub peer_address: SocketAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    /// Authenticated; superusers bypass ACL checks.
    Allow { superuser: bool },
    Deny(ReasonCode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclAction {
    Publish,
    Subscribe,
}

/// Authentication and per-topic authorization back end.
///
/// `authenticate` separates infrastructure failure (the back end is
/// unreachable) from denial; the engine treats the former as an
/// unspecified handshake error and the latter as a negative CONNACK.
#[async_trait]
pub trait AccessControl: Send + Sync {
    async fn authenticate(
        &self,
        credentials: &Credentials,
        password: Option<&[u8]>,
    ) -> anyhow::Result<AuthDecision>;

    async fn check_acl(&self, credentials: &Credentials, action: AclAction, topic: &str) -> Access;
}

/// Access control that admits everyone; the zone's `enable_acl = false`
/// equivalent for embedded and test setups.
#[derive(Debug, Default)]
pub struct AllowAll;

#[async_trait]
impl AccessControl for AllowAll {
    async fn authenticate(
        &self,
        _credentials: &Credentials,
        _password: Option<&[u8]>,
    ) -> anyhow::Result<AuthDecision> {
        Ok(AuthDecision::Allow { superuser: false })
    }

    async fn check_acl(
        &self,
        _credentials: &Credentials,
        _action: AclAction,
        _topic: &str,
    ) -> Access {
        Access::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allow_all_admits_without_superuser() {
        let acl = AllowAll;
        let credentials = Credentials {
            zone: "default".to_string(),
            client_id: "c1".to_string(),
            username: None,
            peer_address: "127.0.0.1:1883".parse().unwrap(),
        };
        let decision = acl.authenticate(&credentials, None).await.unwrap();
        assert_eq!(decision, AuthDecision::Allow { superuser: false });
        assert_eq!(
            acl.check_acl(&credentials, AclAction::Publish, "t").await,
            Access::Allow
        );
    }
}
