//! The externally consumed representation of an endpoint's L4 policy.

use crate::{CachedSelector, L4Filter, L4PolicyMap, PerSelectorPolicy};
use netpol_policy_k8s_api::policy::L4Proto;
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct L4Policy {
    #[serde(default)]
    pub ingress: Vec<PolicyRule>,

    #[serde(default)]
    pub egress: Vec<PolicyRule>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PolicyRule {
    /// The filter, encoded as compact JSON.
    pub rule: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived_from_rules: Vec<Vec<String>>,
}

#[derive(Serialize)]
struct RuleRepr<'f> {
    port: u16,

    #[serde(rename = "port-name", skip_serializing_if = "Option::is_none")]
    port_name: Option<&'f str>,

    protocol: L4Proto,

    #[serde(rename = "l7-rules", skip_serializing_if = "Option::is_none")]
    l7_rules: Option<Vec<SelectorRules<'f>>>,
}

/// Serializes as `{"<selector>": <rules>}`.
struct SelectorRules<'f> {
    selector: &'f CachedSelector,
    policy: Option<&'f PerSelectorPolicy>,
}

// === impl L4Policy ===

impl crate::L4Policy {
    /// Renders the policy for introspection. Rules in each direction are sorted by their encoded
    /// form.
    pub fn model(&self) -> L4Policy {
        L4Policy {
            ingress: rules(&self.ingress),
            egress: rules(&self.egress),
        }
    }
}

fn rules(map: &L4PolicyMap) -> Vec<PolicyRule> {
    let mut rules = map
        .filters()
        .map(|filter| PolicyRule {
            rule: filter.to_json(),
            derived_from_rules: filter
                .derived_from_rules
                .iter()
                .map(|labels| labels.to_strings())
                .collect(),
        })
        .collect::<Vec<_>>();
    rules.sort_by(|a, b| a.rule.cmp(&b.rule));
    rules
}

// === impl L4Filter ===

impl L4Filter {
    /// Encodes the filter as compact JSON with fields `port`, `port-name`, `protocol`, and
    /// `l7-rules`.
    ///
    /// `l7-rules` is only present when a selector carries L7 rules; its entries are sorted by
    /// selector.
    pub fn to_json(&self) -> String {
        let l7_rules = self
            .l7_rules_per_selector
            .values()
            .any(Option::is_some)
            .then(|| {
                let mut entries = self
                    .l7_rules_per_selector
                    .iter()
                    .map(|(selector, policy)| SelectorRules {
                        selector,
                        policy: policy.as_ref(),
                    })
                    .collect::<Vec<_>>();
                entries.sort_by(|a, b| a.selector.as_str().cmp(b.selector.as_str()));
                entries
            });

        let repr = RuleRepr {
            port: self.port,
            port_name: self.port_name.as_deref(),
            protocol: self.protocol,
            l7_rules,
        };

        match serde_json::to_string(&repr) {
            Ok(json) => escape_html(json),
            Err(error) => {
                tracing::warn!(key = %self.key(), %error, "Failed to encode filter");
                error.to_string()
            }
        }
    }
}

impl Serialize for SelectorRules<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.selector.as_str(), &self.policy)?;
        map.end()
    }
}

/// Escapes `<`, `>`, `&`, U+2028 and U+2029 as `\u` sequences so that the encoded rule is safe to
/// embed in HTML. These characters can only occur inside JSON strings.
fn escape_html(json: String) -> String {
    if !json.contains(['<', '>', '&', '\u{2028}', '\u{2029}']) {
        return json;
    }

    let mut escaped = String::with_capacity(json.len() + 16);
    for c in json.chars() {
        match c {
            '<' => escaped.push_str("\\u003c"),
            '>' => escaped.push_str("\\u003e"),
            '&' => escaped.push_str("\\u0026"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            c => escaped.push(c),
        }
    }
    escaped
}
