use netpol_policy_core::{resolve, Error, L4Policy, PolicyContext, Resolution};
use netpol_policy_k8s_api::{policy::Rule, Labels};
use std::sync::Arc;
use tokio::sync::watch;

/// Watches an endpoint's resolved policy.
pub type PolicyRx = watch::Receiver<Arc<L4Policy>>;

/// Publishes the resolved policy of one endpoint.
///
/// Each recomputation builds a new policy and replaces the published one atomically; readers
/// never observe a partially built policy.
#[derive(Debug)]
pub struct EndpointPolicy {
    labels: Labels,
    tx: watch::Sender<Arc<L4Policy>>,
}

// === impl EndpointPolicy ===

impl EndpointPolicy {
    pub fn new(labels: Labels) -> (Self, PolicyRx) {
        let (tx, rx) = watch::channel(Arc::new(L4Policy::default()));
        (Self { labels, tx }, rx)
    }

    /// Resolves `rules` for this endpoint and publishes the result.
    ///
    /// Ports that failed to resolve are left out of the published policy; their errors are
    /// returned. Selectors that only the replaced policy referenced are released from the
    /// context's cache.
    pub fn recompute<C: PolicyContext + ?Sized>(&self, ctx: &C, rules: &[Rule]) -> Vec<Error> {
        let Resolution { policy, errors } = resolve(ctx, rules, &self.labels);
        tracing::debug!(
            ingress = policy.ingress.len(),
            egress = policy.egress.len(),
            errors = errors.len(),
            receivers = self.tx.receiver_count(),
            "Publishing policy"
        );
        drop(self.tx.send_replace(Arc::new(policy)));

        let released = ctx.selector_cache().release_unused();
        if released > 0 {
            tracing::trace!(released, "Released unused selectors");
        }
        errors
    }

    pub fn subscribe(&self) -> PolicyRx {
        self.tx.subscribe()
    }

    /// Returns the currently published policy.
    pub fn current(&self) -> Arc<L4Policy> {
        self.tx.borrow().clone()
    }
}
