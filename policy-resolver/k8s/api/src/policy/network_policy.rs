use super::{EgressRule, IngressRule, Rule};
use crate::labels::{Label, LabelArray, Selector, SOURCE_K8S};
use kube::CustomResource;
use serde::{Deserialize, Serialize};

pub const POLICY_NAME_LABEL: &str = "io.netpol.policy.name";
pub const POLICY_NAMESPACE_LABEL: &str = "io.netpol.policy.namespace";

/// Describes the traffic allowed to and from a set of endpoints.
#[derive(Clone, Debug, Default, PartialEq, Eq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "netpol.io",
    version = "v1",
    kind = "NetworkPolicy",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicySpec {
    #[serde(default)]
    pub endpoint_selector: Selector,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingress: Vec<IngressRule>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub egress: Vec<EgressRule>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// === impl NetworkPolicy ===

impl NetworkPolicy {
    /// Converts the resource into a rule.
    ///
    /// A namespaced policy only selects endpoints in its own namespace, and its peer selectors
    /// are scoped to that namespace unless they name a namespace themselves. An empty peer list
    /// still allows any peer.
    pub fn to_rule(&self) -> Rule {
        let ns = self.metadata.namespace.as_deref();
        let scope = |selector: &Selector| match ns {
            Some(ns) => selector.clone().with_namespace(ns),
            None => selector.clone(),
        };

        let name = self.metadata.name.as_deref().unwrap_or_default();
        let labels = Some(Label::new(SOURCE_K8S, POLICY_NAME_LABEL, name))
            .into_iter()
            .chain(ns.map(|ns| Label::new(SOURCE_K8S, POLICY_NAMESPACE_LABEL, ns)))
            .collect::<LabelArray>();

        Rule {
            endpoint_selector: scope(&self.spec.endpoint_selector),
            ingress: self
                .spec
                .ingress
                .iter()
                .map(|rule| IngressRule {
                    from_endpoints: rule.from_endpoints.iter().map(scope).collect(),
                    to_ports: rule.to_ports.clone(),
                })
                .collect(),
            egress: self
                .spec
                .egress
                .iter()
                .map(|rule| EgressRule {
                    to_endpoints: rule.to_endpoints.iter().map(scope).collect(),
                    to_ports: rule.to_ports.clone(),
                })
                .collect(),
            labels,
            description: self.spec.description.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::{Labels, NAMESPACE_LABEL};

    #[test]
    fn scopes_selectors_to_namespace() {
        let policy: NetworkPolicy = serde_yaml::from_str(
            r#"
apiVersion: netpol.io/v1
kind: NetworkPolicy
metadata:
  name: web
  namespace: shop
spec:
  endpointSelector:
    matchLabels:
      app: web
  ingress:
    - fromEndpoints:
        - matchLabels:
            role: frontend
        - matchLabels:
            k8s:io.kubernetes.pod.namespace: monitoring
      toPorts:
        - ports:
            - port: "8080"
"#,
        )
        .unwrap();

        let rule = policy.to_rule();
        assert_eq!(
            rule.labels.to_strings(),
            vec![
                "k8s:io.netpol.policy.name=web".to_string(),
                "k8s:io.netpol.policy.namespace=shop".to_string(),
            ]
        );

        let in_shop = Labels::from_iter(vec![
            ("k8s:app", "web"),
            ("k8s:role", "frontend"),
            ("k8s:io.kubernetes.pod.namespace", "shop"),
        ]);
        let elsewhere = in_shop
            .clone()
            .with(Label::new(SOURCE_K8S, NAMESPACE_LABEL, "other"));

        assert!(rule.endpoint_selector.matches(&in_shop));
        assert!(!rule.endpoint_selector.matches(&elsewhere));

        let peers = &rule.ingress[0].from_endpoints;
        assert!(peers[0].matches(&in_shop));
        assert!(!peers[0].matches(&elsewhere));
        assert!(peers[1].matches(&Labels::from_iter(Some((
            "k8s:io.kubernetes.pod.namespace",
            "monitoring"
        )))));
    }
}
