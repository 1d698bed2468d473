use crate::{CachedSelector, Error};
use ahash::AHashMap as HashMap;
use netpol_policy_k8s_api::policy::L7Rules;
use serde::Serialize;

/// Resolved TLS material for terminating or originating TLS on a port.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TlsContext {
    pub trusted_ca: String,
    pub certificate_chain: String,
    pub private_key: String,
}

/// The L7 policy that applies to traffic from (or to) one selector.
///
/// Serializes as its L7 rules; TLS material never appears in the exported model.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PerSelectorPolicy {
    #[serde(skip)]
    pub terminating_tls: Option<TlsContext>,

    #[serde(skip)]
    pub originating_tls: Option<TlsContext>,

    #[serde(flatten)]
    pub l7_rules: L7Rules,
}

/// Per-selector L7 policies for one filter.
///
/// A `None` policy allows all L7 traffic for the selector, i.e. the selector is allowed at L3/L4
/// only.
pub type L7DataMap = HashMap<CachedSelector, Option<PerSelectorPolicy>>;

#[derive(PartialEq, Eq)]
enum RuleKind<'r> {
    Http,
    Kafka,
    Dns,
    L7(Option<&'r str>),
}

// === impl PerSelectorPolicy ===

impl PerSelectorPolicy {
    pub fn is_empty(&self) -> bool {
        self.terminating_tls.is_none() && self.originating_tls.is_none() && self.l7_rules.is_empty()
    }

    /// Unions `other` into this policy.
    ///
    /// Both policies must use the same TLS contexts and the same kind of L7 rules. Duplicate
    /// rules are dropped; the order in which rules were first seen is kept.
    pub(crate) fn merge(
        &mut self,
        other: PerSelectorPolicy,
        selector: &CachedSelector,
    ) -> Result<(), Error> {
        if self.terminating_tls != other.terminating_tls {
            return Err(Error::TlsConflict {
                kind: "terminating",
                selector: selector.to_string(),
            });
        }
        if self.originating_tls != other.originating_tls {
            return Err(Error::TlsConflict {
                kind: "originating",
                selector: selector.to_string(),
            });
        }

        match (kind(&self.l7_rules), kind(&other.l7_rules)) {
            (_, None) => return Ok(()),
            (None, Some(_)) => {}
            (Some(a), Some(b)) if a == b => {}
            _ => {
                return Err(Error::RuleConflict {
                    selector: selector.to_string(),
                })
            }
        }

        let L7Rules {
            http,
            kafka,
            dns,
            l7_proto,
            l7,
        } = other.l7_rules;
        union(&mut self.l7_rules.http, http);
        union(&mut self.l7_rules.kafka, kafka);
        union(&mut self.l7_rules.dns, dns);
        union(&mut self.l7_rules.l7, l7);
        if self.l7_rules.l7_proto.is_none() {
            self.l7_rules.l7_proto = l7_proto;
        }

        Ok(())
    }
}

/// Merges the policy for a selector that two filters both carry.
///
/// A `None` policy on either side allows everything at L7, so it absorbs the other.
pub(crate) fn merge_selector_policy(
    existing: &mut Option<PerSelectorPolicy>,
    new: Option<PerSelectorPolicy>,
    selector: &CachedSelector,
) -> Result<(), Error> {
    let Some(current) = existing else {
        return Ok(());
    };

    match new {
        Some(new) => current.merge(new, selector),
        None => {
            *existing = None;
            Ok(())
        }
    }
}

fn kind(rules: &L7Rules) -> Option<RuleKind<'_>> {
    if !rules.http.is_empty() {
        Some(RuleKind::Http)
    } else if !rules.kafka.is_empty() {
        Some(RuleKind::Kafka)
    } else if !rules.dns.is_empty() {
        Some(RuleKind::Dns)
    } else if rules.l7_proto.is_some() || !rules.l7.is_empty() {
        Some(RuleKind::L7(rules.l7_proto.as_deref()))
    } else {
        None
    }
}

fn union<T: PartialEq>(into: &mut Vec<T>, from: Vec<T>) {
    for rule in from {
        if !into.contains(&rule) {
            into.push(rule);
        }
    }
}
