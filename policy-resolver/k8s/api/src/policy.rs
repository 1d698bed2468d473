pub mod l7;
pub mod network_policy;
pub mod port;
pub mod rule;

pub use self::{
    l7::{L7Rules, PortRuleDns, PortRuleHttp, PortRuleKafka, PortRuleL7},
    network_policy::{NetworkPolicy, NetworkPolicySpec},
    port::{L4Proto, PortProtocol, PortRule, Secret, TlsContext},
    rule::{EgressRule, IngressRule, InvalidRule, Rule},
};
