use std::fmt;
use std::net::IpAddr;

/// Who a request is counted against.
///
/// Users and addresses live in separate namespaces (`user:` / `ip:`) so a
/// user id can never collide with an address string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientIdentity {
    User(String),
    Ip(String),
}

impl ClientIdentity {
    /// Placeholder address used when the peer cannot be determined.
    pub const UNKNOWN: &'static str = "unknown";

    /// Resolve an identity with priority: authenticated user id, first hop
    /// of `X-Forwarded-For`, direct peer address, then `"unknown"`.
    pub fn resolve(
        user_id: Option<&str>,
        forwarded_for: Option<&str>,
        peer_ip: Option<IpAddr>,
    ) -> Self {
        if let Some(id) = user_id.map(str::trim).filter(|id| !id.is_empty()) {
            return ClientIdentity::User(id.to_string());
        }

        let forwarded = forwarded_for
            .and_then(|chain| chain.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return ClientIdentity::Ip(ip.to_string());
        }

        match peer_ip {
            Some(ip) => ClientIdentity::Ip(ip.to_string()),
            None => ClientIdentity::Ip(Self::UNKNOWN.to_string()),
        }
    }

    /// Counter key for this identity, e.g. `user:42` or `ip:10.0.0.1`.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientIdentity::User(id) => write!(f, "user:{}", id),
            ClientIdentity::Ip(addr) => write!(f, "ip:{}", addr),
        }
    }
}
