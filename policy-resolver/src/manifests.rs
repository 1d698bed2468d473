use anyhow::{bail, Context, Result};
use netpol_policy_k8s_api::{policy::NetworkPolicy, Secret};
use serde::Deserialize;
use std::path::PathBuf;

/// The resources read from a set of YAML manifests.
#[derive(Debug, Default)]
pub struct Manifests {
    pub policies: Vec<NetworkPolicy>,
    pub secrets: Vec<Secret>,
}

#[derive(Deserialize)]
struct TypeMeta {
    #[serde(default)]
    kind: Option<String>,
}

// === impl Manifests ===

impl Manifests {
    /// Reads every file in `paths`. Objects without a namespace are placed in `namespace`.
    pub fn read(paths: &[PathBuf], namespace: &str) -> Result<Self> {
        let mut manifests = Self::default();
        for path in paths {
            let yaml = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            manifests
                .parse(&yaml, namespace)
                .with_context(|| format!("failed to parse {}", path.display()))?;
        }
        Ok(manifests)
    }

    /// Adds the objects in a (possibly multi-document) YAML string.
    pub fn parse(&mut self, yaml: &str, namespace: &str) -> Result<()> {
        for doc in serde_yaml::Deserializer::from_str(yaml) {
            let value = serde_yaml::Value::deserialize(doc)?;
            if value.is_null() {
                continue;
            }

            let TypeMeta { kind } = serde_yaml::from_value(value.clone())?;
            match kind.as_deref() {
                Some("NetworkPolicy") => {
                    let mut policy: NetworkPolicy = serde_yaml::from_value(value)?;
                    policy
                        .metadata
                        .namespace
                        .get_or_insert_with(|| namespace.to_string());
                    tracing::debug!(name = ?policy.metadata.name, "Read policy");
                    self.policies.push(policy);
                }
                Some("Secret") => {
                    let mut secret: Secret = serde_yaml::from_value(value)?;
                    secret
                        .metadata
                        .namespace
                        .get_or_insert_with(|| namespace.to_string());
                    tracing::debug!(name = ?secret.metadata.name, "Read secret");
                    self.secrets.push(secret);
                }
                Some(kind) => bail!("unsupported kind {kind}"),
                None => bail!("manifest is missing a kind"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_documents() {
        let mut manifests = Manifests::default();
        manifests
            .parse(
                r#"
apiVersion: netpol.io/v1
kind: NetworkPolicy
metadata:
  name: web
spec:
  endpointSelector:
    matchLabels:
      app: web
  ingress:
    - toPorts:
        - ports:
            - port: "80"
              protocol: TCP
---
apiVersion: v1
kind: Secret
metadata:
  name: tls-cert
  namespace: certs
stringData:
  tls.crt: cert
---
"#,
                "shop",
            )
            .unwrap();

        assert_eq!(manifests.policies.len(), 1);
        assert_eq!(
            manifests.policies[0].metadata.namespace.as_deref(),
            Some("shop")
        );
        assert_eq!(manifests.secrets.len(), 1);
        assert_eq!(
            manifests.secrets[0].metadata.namespace.as_deref(),
            Some("certs")
        );
    }

    #[test]
    fn rejects_unknown_kinds() {
        let err = Manifests::default()
            .parse("apiVersion: v1\nkind: Pod\nmetadata:\n  name: web\n", "default")
            .unwrap_err();
        assert_eq!(err.to_string(), "unsupported kind Pod");
    }
}
