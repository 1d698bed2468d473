use super::L7Rules;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport protocols a port rule may apply to.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum L4Proto {
    Tcp,
    Udp,
    Sctp,
    #[default]
    Any,
}

/// A port, by number or IANA service name, and its protocol.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct PortProtocol {
    pub port: String,

    #[serde(default)]
    pub protocol: L4Proto,
}

/// Allows traffic to a set of ports, optionally constrained by L7 rules.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortRule {
    #[serde(default)]
    pub ports: Vec<PortProtocol>,

    /// Terminates TLS for traffic arriving on these ports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminating_tls: Option<TlsContext>,

    /// Originates TLS for traffic leaving on these ports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub originating_tls: Option<TlsContext>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<L7Rules>,
}

/// References TLS material held in a secret.
///
/// The optional fields name the keys within the secret; when unset, the standard `ca.crt`,
/// `tls.crt` and `tls.key` keys are used.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsContext {
    pub secret: Option<Secret>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trusted_ca: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Secret {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

// === impl L4Proto ===

impl L4Proto {
    /// The concrete protocols a rule for this protocol applies to. `ANY` covers TCP and UDP.
    pub fn expand(self) -> &'static [L4Proto] {
        match self {
            Self::Tcp => &[Self::Tcp],
            Self::Udp => &[Self::Udp],
            Self::Sctp => &[Self::Sctp],
            Self::Any => &[Self::Tcp, Self::Udp],
        }
    }
}

impl fmt::Display for L4Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Sctp => "SCTP",
            Self::Any => "ANY",
        })
    }
}

// === impl PortProtocol ===

impl PortProtocol {
    pub fn new(port: impl ToString, protocol: L4Proto) -> Self {
        Self {
            port: port.to_string(),
            protocol,
        }
    }
}

// === impl PortRule ===

impl PortRule {
    pub fn has_l7(&self) -> bool {
        self.rules.as_ref().map(|r| !r.is_empty()).unwrap_or(false)
    }
}

// === impl TlsContext ===

impl TlsContext {
    pub fn from_secret(name: impl ToString) -> Self {
        Self {
            secret: Some(Secret {
                namespace: None,
                name: name.to_string(),
            }),
            ..Default::default()
        }
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}
