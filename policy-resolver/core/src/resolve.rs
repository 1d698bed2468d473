use crate::{port_key, Error, L4Filter, L4Policy, L4PolicyMap, PolicyContext};
use ahash::AHashSet as HashSet;
use netpol_policy_k8s_api::{
    policy::{L4Proto, PortProtocol, PortRule, Rule},
    LabelArray, Labels,
};
use tracing::{debug, trace, warn};

/// The outcome of resolving a set of rules for one endpoint.
///
/// A failure on one port only removes that port's filter; everything else that resolved is kept.
#[derive(Debug, Default)]
pub struct Resolution {
    pub policy: L4Policy,
    pub errors: Vec<Error>,
}

/// Accumulates the filters for one direction.
struct Direction<'e> {
    map: L4PolicyMap,
    failed: HashSet<String>,
    errors: &'e mut Vec<Error>,
}

/// Computes the L4 policy of the endpoint with `labels` from all `rules`.
pub fn resolve<C: PolicyContext + ?Sized>(ctx: &C, rules: &[Rule], labels: &Labels) -> Resolution {
    let mut errors = Vec::new();

    let mut selected = Vec::with_capacity(rules.len());
    for rule in rules {
        if !rule.endpoint_selector.matches(labels) {
            trace!(selector = %rule.endpoint_selector, "Rule does not select endpoint");
            continue;
        }
        if let Err(error) = rule.validate() {
            warn!(labels = ?rule.labels.to_strings(), %error, "Skipping invalid rule");
            errors.push(error.into());
            continue;
        }
        selected.push(rule);
    }

    let mut ingress = Direction::new(&mut errors);
    for rule in &selected {
        for ir in &rule.ingress {
            for port_rule in &ir.to_ports {
                ingress.add(port_rule, &rule.labels, |tuple, proto| {
                    L4Filter::ingress(
                        ctx,
                        &ir.from_endpoints,
                        &[],
                        port_rule,
                        tuple,
                        proto,
                        &rule.labels,
                    )
                });
            }
        }
    }
    let ingress = ingress.into_map();

    let mut egress = Direction::new(&mut errors);
    for rule in &selected {
        for er in &rule.egress {
            for port_rule in &er.to_ports {
                egress.add(port_rule, &rule.labels, |tuple, proto| {
                    L4Filter::egress(ctx, &er.to_endpoints, port_rule, tuple, proto, &rule.labels)
                });
            }
        }
    }
    let egress = egress.into_map();

    debug!(
        rules = selected.len(),
        ingress = ingress.len(),
        egress = egress.len(),
        errors = errors.len(),
        "Resolved policy"
    );
    Resolution {
        policy: L4Policy { ingress, egress },
        errors,
    }
}

// === impl Direction ===

impl<'e> Direction<'e> {
    fn new(errors: &'e mut Vec<Error>) -> Self {
        Self {
            map: L4PolicyMap::default(),
            failed: HashSet::default(),
            errors,
        }
    }

    fn add(
        &mut self,
        port_rule: &PortRule,
        rule_labels: &LabelArray,
        mut build: impl FnMut(&PortProtocol, L4Proto) -> Result<L4Filter, Error>,
    ) {
        for tuple in &port_rule.ports {
            for &proto in tuple.protocol.expand() {
                let key = port_key(&tuple.port, proto);
                if self.failed.contains(&key) {
                    trace!(%key, "Skipping failed port");
                    continue;
                }

                let res = build(tuple, proto).and_then(|filter| self.map.insert(filter));
                if let Err(error) = res {
                    warn!(%key, labels = ?rule_labels.to_strings(), %error, "Dropping port");
                    self.map.remove(&key);
                    self.failed.insert(key.clone());
                    self.errors.push(Error::port(key, error));
                }
            }
        }
    }

    fn into_map(self) -> L4PolicyMap {
        self.map
    }
}
