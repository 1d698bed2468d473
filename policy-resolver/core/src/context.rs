use crate::{SecretError, SelectorCache, TlsContext};
use netpol_policy_k8s_api::{policy, Selector};

/// The capabilities a policy computation needs from its environment.
///
/// A context is passed explicitly into every filter build so that computations for independent
/// endpoints can run in parallel without shared builder state. Implementations must not hold
/// internal locks while resolving secrets.
pub trait PolicyContext {
    fn selector_cache(&self) -> &SelectorCache;

    /// Resolves the certificate material referenced by a rule's TLS context.
    fn tls_context(&self, tls: &policy::TlsContext) -> Result<TlsContext, SecretError>;

    /// Peers whose ingress traffic is never redirected for L7 inspection, e.g. the local host
    /// when it is always allowed.
    fn l7_bypass_selectors(&self) -> &[Selector] {
        &[]
    }
}
