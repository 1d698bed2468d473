use crate::{
    l7::merge_selector_policy, CachedSelector, Error, L7DataMap, L7ParserType, PerSelectorPolicy,
    PolicyContext, Redirect, TlsContext,
};
use netpol_policy_k8s_api::{
    policy::{self, L4Proto, PortProtocol, PortRule},
    LabelArray, Selector,
};
use regex::Regex;
use std::{collections::hash_map::Entry, sync::LazyLock};
use tracing::{debug, warn};

/// IANA service names: up to 15 lowercase alphanumerics or dashes, starting and ending with an
/// alphanumeric.
static SERVICE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]{0,13}[a-z0-9])?$").expect("service name regex must compile")
});

/// The resolved policy for one port, protocol, and direction.
#[derive(Clone, Debug)]
pub struct L4Filter {
    /// The port number; `0` for a named port or for all ports.
    pub port: u16,

    pub port_name: Option<String>,

    pub protocol: L4Proto,

    pub ingress: bool,

    /// The parser that all traffic on this port is redirected through.
    pub l7_parser: L7ParserType,

    pub l7_rules_per_selector: L7DataMap,

    /// The labels of every rule that contributed to this filter.
    pub derived_from_rules: Vec<LabelArray>,
}

/// Builds the map key for a port and protocol, e.g. `80/TCP` or `http-alt/TCP`.
pub fn port_key(port: &str, protocol: L4Proto) -> String {
    match port.parse::<u16>() {
        Ok(number) => format!("{number}/{protocol}"),
        Err(_) => format!("{port}/{protocol}"),
    }
}

// === impl L4Filter ===

impl L4Filter {
    /// Builds the filter for traffic from `selectors` to a port.
    ///
    /// When the filter redirects to a proxy, each bypass selector (and each bypass selector of the
    /// context) is added without L7 rules, so its traffic is allowed without inspection.
    pub fn ingress<C: PolicyContext + ?Sized>(
        ctx: &C,
        selectors: &[Selector],
        bypass: &[Selector],
        rule: &PortRule,
        tuple: &PortProtocol,
        protocol: L4Proto,
        rule_labels: &LabelArray,
    ) -> Result<Self, Error> {
        let mut filter = Self::build(ctx, selectors, rule, tuple, protocol, rule_labels, true)?;

        if filter.is_redirect() {
            let cache = ctx.selector_cache();
            for selector in bypass.iter().chain(ctx.l7_bypass_selectors()) {
                filter
                    .l7_rules_per_selector
                    .entry(cache.add(selector))
                    .or_insert(None);
            }
        }

        Ok(filter)
    }

    /// Builds the filter for traffic to `selectors` on a port.
    pub fn egress<C: PolicyContext + ?Sized>(
        ctx: &C,
        selectors: &[Selector],
        rule: &PortRule,
        tuple: &PortProtocol,
        protocol: L4Proto,
        rule_labels: &LabelArray,
    ) -> Result<Self, Error> {
        Self::build(ctx, selectors, rule, tuple, protocol, rule_labels, false)
    }

    fn build<C: PolicyContext + ?Sized>(
        ctx: &C,
        selectors: &[Selector],
        rule: &PortRule,
        tuple: &PortProtocol,
        protocol: L4Proto,
        rule_labels: &LabelArray,
        ingress: bool,
    ) -> Result<Self, Error> {
        let (port, port_name) = parse_port(&tuple.port)?;

        let mut l7_parser = rule
            .rules
            .as_ref()
            .map(L7ParserType::from)
            .unwrap_or_default();

        let terminating_tls = resolve_tls(ctx, rule.terminating_tls.as_ref(), "terminating")?;
        let originating_tls = resolve_tls(ctx, rule.originating_tls.as_ref(), "originating")?;
        let has_tls = terminating_tls.is_some() || originating_tls.is_some();
        if has_tls && l7_parser == L7ParserType::None {
            l7_parser = L7ParserType::Tls;
        }

        let l7_rules = rule.rules.clone().unwrap_or_default();
        let policy = (has_tls || !l7_rules.is_empty()).then(|| PerSelectorPolicy {
            terminating_tls,
            originating_tls,
            l7_rules,
        });

        let cache = ctx.selector_cache();
        let mut l7_rules_per_selector = L7DataMap::default();
        if selectors.is_empty() {
            l7_rules_per_selector.insert(cache.wildcard(), policy);
        } else {
            for selector in selectors {
                l7_rules_per_selector.insert(cache.add(selector), policy.clone());
            }
        }

        debug!(
            port = %tuple.port,
            %protocol,
            ingress,
            parser = %l7_parser,
            selectors = l7_rules_per_selector.len(),
            "Built filter"
        );

        Ok(Self {
            port,
            port_name,
            protocol,
            ingress,
            l7_parser,
            l7_rules_per_selector,
            derived_from_rules: vec![rule_labels.clone()],
        })
    }

    pub fn key(&self) -> String {
        match &self.port_name {
            Some(name) => format!("{name}/{}", self.protocol),
            None => format!("{}/{}", self.port, self.protocol),
        }
    }

    pub fn redirect(&self) -> Option<Redirect> {
        self.l7_parser.redirect()
    }

    pub fn is_redirect(&self) -> bool {
        self.redirect().is_some()
    }

    /// Indicates whether traffic on this port must be redirected to the general-purpose proxy.
    pub fn is_envoy_redirect(&self) -> bool {
        self.redirect() == Some(Redirect::Envoy)
    }

    /// Indicates whether traffic on this port must be redirected to a proxy-library parser.
    pub fn is_proxylib_redirect(&self) -> bool {
        self.redirect() == Some(Redirect::Proxylib)
    }

    pub fn is_dns_redirect(&self) -> bool {
        self.redirect() == Some(Redirect::Dns)
    }

    /// Indicates whether the filter allows traffic from (or to) any peer.
    pub fn allows_all_at_l3(&self) -> bool {
        self.l7_rules_per_selector.keys().any(CachedSelector::is_wildcard)
    }

    /// Merges another filter for the same port into this one.
    ///
    /// The merge is staged: if the parsers or any selector's rules conflict, this filter is left
    /// unchanged.
    pub(crate) fn merge(&mut self, other: L4Filter) -> Result<(), Error> {
        let l7_parser = self.l7_parser.merge(&other.l7_parser)?;

        let mut merged = self.l7_rules_per_selector.clone();
        for (selector, policy) in other.l7_rules_per_selector {
            match merged.entry(selector) {
                Entry::Vacant(entry) => {
                    entry.insert(policy);
                }
                Entry::Occupied(mut entry) => {
                    let selector = entry.key().clone();
                    merge_selector_policy(entry.get_mut(), policy, &selector)?;
                }
            }
        }

        debug!(
            key = %self.key(),
            parser = %l7_parser,
            selectors = merged.len(),
            "Merged filter"
        );
        self.l7_parser = l7_parser;
        self.l7_rules_per_selector = merged;
        self.derived_from_rules.extend(other.derived_from_rules);
        Ok(())
    }
}

fn parse_port(port: &str) -> Result<(u16, Option<String>), Error> {
    if let Ok(port) = port.parse::<u16>() {
        return Ok((port, None));
    }

    let is_name = SERVICE_NAME.is_match(port)
        && port.chars().any(|c| c.is_ascii_lowercase())
        && !port.contains("--");
    if is_name {
        return Ok((0, Some(port.to_string())));
    }

    Err(Error::InvalidPort(port.to_string()))
}

fn resolve_tls<C: PolicyContext + ?Sized>(
    ctx: &C,
    tls: Option<&policy::TlsContext>,
    kind: &'static str,
) -> Result<Option<TlsContext>, Error> {
    let Some(tls) = tls else {
        return Ok(None);
    };

    match ctx.tls_context(tls) {
        Ok(resolved) => Ok(Some(resolved)),
        Err(source) => {
            let secret = tls.secret.as_ref().map(ToString::to_string);
            warn!(?secret, %kind, error = %source, "Failed to resolve TLS secret");
            Err(Error::MissingSecret { kind, source })
        }
    }
}
