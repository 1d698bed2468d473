use ahash::AHashMap as HashMap;
use netpol_policy_k8s_api::Selector;
use parking_lot::RwLock;
use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

/// A selector interned by a [`SelectorCache`].
///
/// Identity is the selector's match criteria: two textually identical selectors from different
/// rules are the same key. The string rendering is computed once, when the selector is cached.
#[derive(Clone)]
pub struct CachedSelector(Arc<Inner>);

struct Inner {
    selector: Selector,
    rendered: String,
}

/// Interns the selectors used by policy filters.
///
/// The cache is shared by every computation that uses the same [`PolicyContext`]; lookups take a
/// read lock and only the first use of a selector takes the write lock.
///
/// [`PolicyContext`]: crate::PolicyContext
#[derive(Debug, Default)]
pub struct SelectorCache {
    selectors: RwLock<HashMap<Selector, CachedSelector>>,
}

// === impl CachedSelector ===

impl CachedSelector {
    fn new(selector: Selector) -> Self {
        let rendered = selector.to_string();
        Self(Arc::new(Inner { selector, rendered }))
    }

    pub fn selector(&self) -> &Selector {
        &self.0.selector
    }

    /// The deterministic string rendering used in the exported policy model.
    pub fn as_str(&self) -> &str {
        &self.0.rendered
    }

    pub fn is_wildcard(&self) -> bool {
        self.0.selector.is_wildcard()
    }
}

impl PartialEq for CachedSelector {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.selector == other.0.selector
    }
}

impl Eq for CachedSelector {}

impl Hash for CachedSelector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.selector.hash(state)
    }
}

impl fmt::Debug for CachedSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for CachedSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl SelectorCache ===

impl SelectorCache {
    /// Returns the cached form of `selector`, caching it if necessary.
    pub fn add(&self, selector: &Selector) -> CachedSelector {
        if let Some(cached) = self.selectors.read().get(selector) {
            return cached.clone();
        }

        self.selectors
            .write()
            .entry(selector.clone())
            .or_insert_with(|| {
                tracing::trace!(%selector, "Caching selector");
                CachedSelector::new(selector.clone())
            })
            .clone()
    }

    pub fn wildcard(&self) -> CachedSelector {
        self.add(&Selector::wildcard())
    }

    pub fn len(&self) -> usize {
        self.selectors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.read().is_empty()
    }

    /// Drops selectors that are no longer referenced by any filter, returning how many were
    /// removed.
    pub fn release_unused(&self) -> usize {
        let mut selectors = self.selectors.write();
        let before = selectors.len();
        selectors.retain(|_, cached| Arc::strong_count(&cached.0) > 1);
        before - selectors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netpol_policy_k8s_api::Label;

    #[test]
    fn interns_by_content() {
        let cache = SelectorCache::default();
        let a = cache.add(&Selector::from_labels(Some(Label::parse_select("foo"))));
        let b = cache.add(&Selector::from_iter(Some(("foo", ""))));
        assert_eq!(a, b);
        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert_eq!(cache.len(), 1);

        let wildcard = cache.wildcard();
        assert!(wildcard.is_wildcard());
        assert_ne!(a, wildcard);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn releases_unused() {
        let cache = SelectorCache::default();
        let kept = cache.add(&Selector::from_iter(Some(("app", "web"))));
        drop(cache.add(&Selector::from_iter(Some(("app", "db")))));

        assert_eq!(cache.release_unused(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.add(kept.selector()), kept);
    }
}
