use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Layer-7 rules attached to a port. At most one kind of rule may be set.
///
/// The field order is the serialization order of the exported policy model.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct L7Rules {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http: Vec<PortRuleHttp>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kafka: Vec<PortRuleKafka>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns: Vec<PortRuleDns>,

    /// Names the proxy-library parser that interprets `l7`.
    #[serde(default, rename = "l7proto", skip_serializing_if = "Option::is_none")]
    pub l7_proto: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub l7: Vec<PortRuleL7>,
}

/// Matches HTTP requests. Empty fields match anything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct PortRuleHttp {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct PortRuleKafka {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,

    #[serde(default, rename = "apiKey", skip_serializing_if = "String::is_empty")]
    pub api_key: String,

    #[serde(default, rename = "apiVersion", skip_serializing_if = "String::is_empty")]
    pub api_version: String,

    #[serde(default, rename = "clientID", skip_serializing_if = "String::is_empty")]
    pub client_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub topic: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortRuleDns {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub match_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub match_pattern: String,
}

/// A generic key/value rule interpreted by a proxy-library parser.
pub type PortRuleL7 = BTreeMap<String, String>;

// === impl L7Rules ===

impl L7Rules {
    pub fn is_empty(&self) -> bool {
        self.http.is_empty()
            && self.kafka.is_empty()
            && self.dns.is_empty()
            && self.l7_proto.is_none()
            && self.l7.is_empty()
    }

    /// Returns the number of distinct rule kinds that are set.
    pub(crate) fn kinds(&self) -> usize {
        [
            !self.http.is_empty(),
            !self.kafka.is_empty(),
            !self.dns.is_empty(),
            self.l7_proto.is_some() || !self.l7.is_empty(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }
}
