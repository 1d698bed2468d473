use super::PortRule;
use crate::labels::{LabelArray, Selector};
use serde::{Deserialize, Serialize};

/// A policy rule: the endpoints it applies to and the traffic it allows.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(default)]
    pub endpoint_selector: Selector,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingress: Vec<IngressRule>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub egress: Vec<EgressRule>,

    /// Identifies the rule, e.g. the name and namespace of the object it was read from.
    #[serde(default, skip_serializing_if = "LabelArray::is_empty")]
    pub labels: LabelArray,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Allows traffic from the selected peers to the listed ports.
///
/// An empty `from_endpoints` list allows any peer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub from_endpoints: Vec<Selector>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to_ports: Vec<PortRule>,
}

/// Allows traffic to the selected peers on the listed ports.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EgressRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to_endpoints: Vec<Selector>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to_ports: Vec<PortRule>,
}

#[derive(Clone, Debug, thiserror::Error, Eq, PartialEq)]
pub enum InvalidRule {
    #[error("DNS rules are not allowed on ingress")]
    IngressDns,

    #[error("multiple L7 protocol rule types specified in a single port rule")]
    MultipleL7Kinds,

    #[error("l7 rules require an l7proto")]
    MissingL7Proto,

    #[error("L7 rules require at least one port")]
    NoPorts,
}

// === impl Rule ===

impl Rule {
    /// Checks the rule for combinations that cannot be enforced.
    pub fn validate(&self) -> Result<(), InvalidRule> {
        for port_rule in self.ingress.iter().flat_map(|r| r.to_ports.iter()) {
            if port_rule.rules.as_ref().map(|r| !r.dns.is_empty()).unwrap_or(false) {
                return Err(InvalidRule::IngressDns);
            }
            validate_port_rule(port_rule)?;
        }

        for port_rule in self.egress.iter().flat_map(|r| r.to_ports.iter()) {
            validate_port_rule(port_rule)?;
        }

        Ok(())
    }
}

fn validate_port_rule(port_rule: &PortRule) -> Result<(), InvalidRule> {
    let Some(rules) = port_rule.rules.as_ref() else {
        return Ok(());
    };

    if rules.kinds() > 1 {
        return Err(InvalidRule::MultipleL7Kinds);
    }
    if !rules.l7.is_empty() && rules.l7_proto.is_none() {
        return Err(InvalidRule::MissingL7Proto);
    }
    if port_rule.has_l7() && port_rule.ports.is_empty() {
        return Err(InvalidRule::NoPorts);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{L7Rules, PortProtocol, PortRuleDns, PortRuleHttp, PortRuleL7};

    fn port_rule(rules: L7Rules) -> PortRule {
        PortRule {
            ports: vec![PortProtocol::new(53, Default::default())],
            rules: Some(rules),
            ..Default::default()
        }
    }

    #[test]
    fn rejects_ingress_dns() {
        let dns = L7Rules {
            dns: vec![PortRuleDns {
                match_name: "example.com".into(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let ingress = Rule {
            ingress: vec![IngressRule {
                from_endpoints: vec![],
                to_ports: vec![port_rule(dns.clone())],
            }],
            ..Default::default()
        };
        assert_eq!(ingress.validate(), Err(InvalidRule::IngressDns));

        let egress = Rule {
            egress: vec![EgressRule {
                to_endpoints: vec![],
                to_ports: vec![port_rule(dns)],
            }],
            ..Default::default()
        };
        assert_eq!(egress.validate(), Ok(()));
    }

    #[test]
    fn rejects_mixed_rules() {
        let mixed = L7Rules {
            http: vec![PortRuleHttp {
                path: "/".into(),
                ..Default::default()
            }],
            l7_proto: Some("tester".into()),
            l7: vec![PortRuleL7::new()],
            ..Default::default()
        };
        let rule = Rule {
            egress: vec![EgressRule {
                to_endpoints: vec![],
                to_ports: vec![port_rule(mixed)],
            }],
            ..Default::default()
        };
        assert_eq!(rule.validate(), Err(InvalidRule::MultipleL7Kinds));

        let unnamed = L7Rules {
            l7: vec![PortRuleL7::new()],
            ..Default::default()
        };
        let rule = Rule {
            egress: vec![EgressRule {
                to_endpoints: vec![],
                to_ports: vec![port_rule(unnamed)],
            }],
            ..Default::default()
        };
        assert_eq!(rule.validate(), Err(InvalidRule::MissingL7Proto));
    }

    #[test]
    fn deserialize_rule() {
        let rule: Rule = serde_yaml::from_str(
            r#"
endpointSelector:
  matchLabels:
    app: web
ingress:
  - fromEndpoints:
      - matchLabels:
          k8s:role: frontend
    toPorts:
      - ports:
          - port: "80"
            protocol: TCP
        rules:
          http:
            - method: GET
              path: /public
labels:
  - k8s:policy=web
"#,
        )
        .unwrap();

        assert_eq!(
            rule.endpoint_selector,
            Selector::from_iter(Some(("app", "web")))
        );
        let port_rule = &rule.ingress[0].to_ports[0];
        assert_eq!(
            port_rule.ports,
            vec![PortProtocol::new("80", crate::policy::L4Proto::Tcp)]
        );
        assert_eq!(
            port_rule.rules.as_ref().unwrap().http,
            vec![PortRuleHttp {
                path: "/public".into(),
                method: "GET".into(),
                ..Default::default()
            }]
        );
        assert_eq!(rule.labels.to_strings(), vec!["k8s:policy=web".to_string()]);
        assert_eq!(rule.validate(), Ok(()));
    }
}
