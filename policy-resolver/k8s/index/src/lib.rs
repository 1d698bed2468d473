//! Kubernetes-backed inputs and outputs for policy resolution.
//!
//! - A [`Lister`] reads cached objects, e.g. `Secret`s and `NetworkPolicy` resources, from a
//!   reflector store that its caller populates.
//! - A [`SecretContext`] resolves the TLS material that port rules reference from cached secrets.
//! - An [`EndpointPolicy`] resolves the rules that select an endpoint and publishes the result on
//!   a watch so that readers always see a complete policy.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod endpoint;
mod lister;
pub mod secrets;


pub use self::{
    endpoint::{EndpointPolicy, PolicyRx},
    lister::{Lister, NamespaceLister, NotFound},
    secrets::SecretContext,
};
use netpol_policy_k8s_api::{
    policy::{NetworkPolicy, Rule},
    Selector,
};

/// Converts every cached policy resource into a rule, ordered by namespace and name.
pub fn policy_rules(policies: &Lister<NetworkPolicy>) -> Vec<Rule> {
    let mut policies = policies.list(&Selector::wildcard());
    policies.sort_by(|a, b| {
        (&a.metadata.namespace, &a.metadata.name).cmp(&(&b.metadata.namespace, &b.metadata.name))
    });
    policies.iter().map(|p| p.to_rule()).collect()
}
