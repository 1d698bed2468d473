use crate::{Error, L4Filter, Redirect};
use ahash::AHashMap as HashMap;
use std::collections::hash_map::Entry;

/// The filters for one direction, keyed by `port/PROTOCOL`.
#[derive(Clone, Debug, Default)]
pub struct L4PolicyMap(HashMap<String, L4Filter>);

/// The ingress and egress filters that apply to an endpoint.
///
/// A policy is built once and never modified after it is published; recomputation builds a new
/// policy.
#[derive(Clone, Debug, Default)]
pub struct L4Policy {
    pub ingress: L4PolicyMap,
    pub egress: L4PolicyMap,
}

// === impl L4PolicyMap ===

impl L4PolicyMap {
    /// Adds a filter, merging it into any existing filter for the same port and protocol.
    ///
    /// On error the existing filter is unchanged.
    pub fn insert(&mut self, filter: L4Filter) -> Result<(), Error> {
        match self.0.entry(filter.key()) {
            Entry::Vacant(entry) => {
                entry.insert(filter);
                Ok(())
            }
            Entry::Occupied(mut entry) => {
                let key = entry.key().clone();
                entry
                    .get_mut()
                    .merge(filter)
                    .map_err(|error| Error::port(key, error))
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&L4Filter> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<L4Filter> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &L4Filter)> {
        self.0.iter()
    }

    pub fn filters(&self) -> impl Iterator<Item = &L4Filter> {
        self.0.values()
    }

    fn has_redirect(&self, redirect: Redirect) -> bool {
        self.filters().any(|f| f.redirect() == Some(redirect))
    }
}

// === impl L4Policy ===

impl L4Policy {
    pub fn has_redirect(&self) -> bool {
        self.ingress
            .filters()
            .chain(self.egress.filters())
            .any(L4Filter::is_redirect)
    }

    /// Indicates whether any port in either direction redirects to the general-purpose proxy.
    pub fn has_envoy_redirect(&self) -> bool {
        self.ingress.has_redirect(Redirect::Envoy) || self.egress.has_redirect(Redirect::Envoy)
    }

    /// Indicates whether any port in either direction redirects to a proxy-library parser.
    pub fn has_proxylib_redirect(&self) -> bool {
        self.ingress.has_redirect(Redirect::Proxylib)
            || self.egress.has_redirect(Redirect::Proxylib)
    }

    pub fn has_dns_redirect(&self) -> bool {
        self.ingress.has_redirect(Redirect::Dns) || self.egress.has_redirect(Redirect::Dns)
    }
}
