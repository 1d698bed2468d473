use crate::Lister;
use netpol_policy_core::{PolicyContext, SecretError, SelectorCache, TlsContext};
use netpol_policy_k8s_api::{policy, Secret, Selector};
use tracing::debug;

pub const DEFAULT_CA_KEY: &str = "ca.crt";
pub const DEFAULT_CERT_KEY: &str = "tls.crt";
pub const DEFAULT_PRIVATE_KEY: &str = "tls.key";

/// Resolves TLS contexts from cached Kubernetes secrets.
///
/// Secret references without a namespace are looked up in the context's default namespace.
#[derive(Debug)]
pub struct SecretContext {
    secrets: Lister<Secret>,
    namespace: String,
    selectors: SelectorCache,
    l7_bypass: Vec<Selector>,
}

// === impl SecretContext ===

impl SecretContext {
    pub fn new(secrets: Lister<Secret>, namespace: impl ToString) -> Self {
        Self {
            secrets,
            namespace: namespace.to_string(),
            selectors: SelectorCache::default(),
            l7_bypass: Vec::new(),
        }
    }

    /// Sets the peers whose ingress traffic bypasses L7 inspection.
    pub fn with_l7_bypass(mut self, selectors: impl IntoIterator<Item = Selector>) -> Self {
        self.l7_bypass = selectors.into_iter().collect();
        self
    }
}

impl PolicyContext for SecretContext {
    fn selector_cache(&self) -> &SelectorCache {
        &self.selectors
    }

    fn tls_context(&self, tls: &policy::TlsContext) -> Result<TlsContext, SecretError> {
        let secret_ref = tls.secret.as_ref().ok_or(SecretError::NoSecret)?;
        let ns = secret_ref.namespace.as_deref().unwrap_or(&self.namespace);
        let secret = self
            .secrets
            .namespaced(ns)
            .get(&secret_ref.name)
            .map_err(|error| SecretError::NotFound(Box::new(error)))?;

        let ca_key = tls.trusted_ca.as_deref().unwrap_or(DEFAULT_CA_KEY);
        let cert_key = tls.certificate.as_deref().unwrap_or(DEFAULT_CERT_KEY);
        let private_key = tls.private_key.as_deref().unwrap_or(DEFAULT_PRIVATE_KEY);

        let ctx = TlsContext {
            trusted_ca: value(&secret, ca_key).unwrap_or_default(),
            certificate_chain: value(&secret, cert_key).unwrap_or_default(),
            private_key: value(&secret, private_key).unwrap_or_default(),
        };
        if ctx == TlsContext::default() {
            return Err(SecretError::MissingKeys {
                secret: format!("{ns}/{}", secret_ref.name),
                keys: vec![
                    ca_key.to_string(),
                    cert_key.to_string(),
                    private_key.to_string(),
                ],
            });
        }

        debug!(secret = %format_args!("{ns}/{}", secret_ref.name), "Resolved TLS context");
        Ok(ctx)
    }

    fn l7_bypass_selectors(&self) -> &[Selector] {
        &self.l7_bypass
    }
}

/// Reads a key from the secret's `data`, falling back to `stringData`.
fn value(secret: &Secret, key: &str) -> Option<String> {
    if let Some(bytes) = secret.data.as_ref().and_then(|data| data.get(key)) {
        return Some(String::from_utf8_lossy(&bytes.0).into_owned());
    }
    secret
        .string_data
        .as_ref()
        .and_then(|data| data.get(key))
        .cloned()
}
