use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};

/// Labels that were not qualified with a source match labels from any source.
pub const SOURCE_ANY: &str = "any";

/// Labels derived from Kubernetes object metadata.
pub const SOURCE_K8S: &str = "k8s";

/// Labels reserved for special endpoints such as the host.
pub const SOURCE_RESERVED: &str = "reserved";

/// Labels parsed without an explicit source.
pub const SOURCE_UNSPEC: &str = "unspec";

/// The label carrying an endpoint's namespace.
pub const NAMESPACE_LABEL: &str = "io.kubernetes.pod.namespace";

/// Maps extended keys (`source.key`) to label values.
pub type Map = BTreeMap<String, String>;

pub type Expressions = Vec<Expression>;

/// A single label, qualified by the source that attached it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    pub source: String,
    pub key: String,
    pub value: String,
}

/// A sorted list of labels, e.g. the labels identifying a policy rule.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct LabelArray(Vec<Label>);

/// The labels of an endpoint, indexed by extended key.
#[derive(Clone, Debug, Eq, Default)]
pub struct Labels(Arc<Map>);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(from = "RawExpression", into = "RawExpression")]
pub struct Expression {
    key: String,
    operator: Operator,
    values: BTreeSet<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// Selects a set of endpoints by their labels.
///
/// Keys are stored in their extended form (`source.key`) and expressions are kept sorted. Two
/// selectors with the same match criteria are equal and hash identically, regardless of where
/// they were parsed from or the order their expressions were listed in.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Default, Deserialize, Serialize)]
#[serde(from = "RawSelector", into = "RawSelector")]
pub struct Selector {
    match_labels: Map,
    match_expressions: Expressions,
}

/// The wire form of a selector, with keys written as `source:key`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct RawSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    match_labels: Option<Map>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    match_expressions: Option<Vec<RawExpression>>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct RawExpression {
    key: String,
    operator: Operator,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    values: BTreeSet<String>,
}

/// Converts a `source:key` (or bare `key`) label name into its extended `source.key` form.
pub fn extended_key(name: &str) -> String {
    let (source, key) = split_source(name, SOURCE_ANY);
    let key = key.split_once('=').map(|(k, _)| k).unwrap_or(key);
    format!("{source}.{key}")
}

/// Converts an extended `source.key` into the `source:key` form used on the wire.
fn wire_key(extended: &str) -> String {
    match extended.split_once('.') {
        Some((source, key)) => format!("{source}:{key}"),
        None => extended.to_string(),
    }
}

fn sorted(mut exprs: Expressions) -> Expressions {
    exprs.sort();
    exprs.dedup();
    exprs
}

fn split_source<'s>(s: &'s str, default: &'s str) -> (&'s str, &'s str) {
    if let Some(key) = s.strip_prefix('$') {
        return (SOURCE_RESERVED, key);
    }
    match s.find([':', '=']) {
        Some(i) if s.as_bytes()[i] == b':' => (&s[..i], &s[i + 1..]),
        _ => (default, s),
    }
}

// === impl Label ===

impl Label {
    pub fn new(source: impl ToString, key: impl ToString, value: impl ToString) -> Self {
        Self {
            source: source.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    /// Parses `source:key=value`; the source defaults to `unspec`.
    pub fn parse(s: &str) -> Self {
        Self::parse_with_default(s, SOURCE_UNSPEC)
    }

    /// Parses a label used for selection; the source defaults to `any`.
    pub fn parse_select(s: &str) -> Self {
        Self::parse_with_default(s, SOURCE_ANY)
    }

    fn parse_with_default(s: &str, default: &str) -> Self {
        let (source, rest) = split_source(s, default);
        let (key, value) = rest.split_once('=').unwrap_or((rest, ""));
        Self::new(source, key, value)
    }

    pub fn extended_key(&self) -> String {
        format!("{}.{}", self.source, self.key)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.is_empty() {
            write!(f, "{}:{}", self.source, self.key)
        } else {
            write!(f, "{}:{}={}", self.source, self.key, self.value)
        }
    }
}

// === impl LabelArray ===

impl LabelArray {
    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders each label as `source:key=value`.
    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl std::iter::FromIterator<Label> for LabelArray {
    fn from_iter<T: IntoIterator<Item = Label>>(iter: T) -> Self {
        let mut labels = iter.into_iter().collect::<Vec<_>>();
        labels.sort();
        labels.dedup();
        Self(labels)
    }
}

impl From<Vec<String>> for LabelArray {
    fn from(labels: Vec<String>) -> Self {
        labels.iter().map(|l| Label::parse(l)).collect()
    }
}

impl From<LabelArray> for Vec<String> {
    fn from(labels: LabelArray) -> Self {
        labels.to_strings()
    }
}

// === Selector ===

impl Selector {
    /// A selector that matches every endpoint.
    pub fn wildcard() -> Self {
        Self::default()
    }

    pub fn from_expressions(exprs: Expressions) -> Self {
        Self {
            match_labels: Map::new(),
            match_expressions: sorted(exprs),
        }
    }

    /// Builds a selector from a map whose keys are already in extended form.
    pub fn from_map(map: Map) -> Self {
        Self {
            match_labels: map,
            match_expressions: vec![],
        }
    }

    pub fn from_labels(labels: impl IntoIterator<Item = Label>) -> Self {
        Self::from_map(
            labels
                .into_iter()
                .map(|l| (l.extended_key(), l.value))
                .collect(),
        )
    }

    pub fn is_wildcard(&self) -> bool {
        self.match_labels.is_empty() && self.match_expressions.is_empty()
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.match_labels.contains_key(key) || self.match_expressions.iter().any(|e| e.key == key)
    }

    /// Restricts the selector to endpoints in `ns`, unless it already constrains the namespace.
    pub fn with_namespace(mut self, ns: &str) -> Self {
        let key = format!("{SOURCE_K8S}.{NAMESPACE_LABEL}");
        if !self.has_key(&key) {
            self.match_labels.insert(key, ns.to_string());
        }
        self
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        for expr in self.match_expressions.iter() {
            if !expr.matches(labels) {
                return false;
            }
        }

        for (k, v) in self.match_labels.iter() {
            if labels.get(k) != Some(v.as_str()) {
                return false;
            }
        }

        true
    }
}

/// Renders the selector as `&LabelSelector{MatchLabels:map[string]string{k: v,},...}`.
///
/// This format is part of the exported policy model and must stay stable.
impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("&LabelSelector{MatchLabels:map[string]string{")?;
        for (k, v) in self.match_labels.iter() {
            write!(f, "{k}: {v},")?;
        }
        f.write_str("},MatchExpressions:[]LabelSelectorRequirement{")?;
        for expr in self.match_expressions.iter() {
            write!(f, "{expr},")?;
        }
        f.write_str("},}")
    }
}

impl std::iter::FromIterator<(String, String)> for Selector {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self::from_map(
            iter.into_iter()
                .map(|(k, v)| (extended_key(&k), v))
                .collect(),
        )
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Selector {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        iter.into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

impl std::iter::FromIterator<Expression> for Selector {
    fn from_iter<T: IntoIterator<Item = Expression>>(iter: T) -> Self {
        Self::from_expressions(iter.into_iter().collect())
    }
}

impl From<RawSelector> for Selector {
    fn from(raw: RawSelector) -> Self {
        Self {
            match_labels: raw
                .match_labels
                .into_iter()
                .flatten()
                .map(|(k, v)| (extended_key(&k), v))
                .collect(),
            match_expressions: sorted(
                raw.match_expressions
                    .into_iter()
                    .flatten()
                    .map(Expression::from)
                    .collect(),
            ),
        }
    }
}

impl From<Selector> for RawSelector {
    fn from(selector: Selector) -> Self {
        let match_labels = (!selector.match_labels.is_empty()).then(|| {
            selector
                .match_labels
                .iter()
                .map(|(k, v)| (wire_key(k), v.clone()))
                .collect()
        });
        let match_expressions = (!selector.match_expressions.is_empty())
            .then(|| selector.match_expressions.into_iter().map(Into::into).collect());
        Self {
            match_labels,
            match_expressions,
        }
    }
}

// === Labels ===

impl Labels {
    /// Builds labels from Kubernetes object metadata labels.
    pub fn from_k8s(labels: &BTreeMap<String, String>) -> Self {
        labels
            .iter()
            .map(|(k, v)| Label::new(SOURCE_K8S, k, v))
            .collect()
    }

    /// Parses a comma-separated list of `source:key=value` labels.
    pub fn parse_list(s: &str) -> Self {
        s.split(',')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(Label::parse)
            .collect()
    }

    /// Looks up a label by extended key. Keys in the `any` source match a label with the same
    /// key from any source.
    pub fn get(&self, key: &str) -> Option<&str> {
        if let Some(key) = key.strip_prefix("any.") {
            return self
                .0
                .iter()
                .find(|(k, _)| k.split_once('.').map(|(_, k)| k == key).unwrap_or(false))
                .map(|(_, v)| v.as_str());
        }
        self.0.get(key).map(String::as_str)
    }

    pub fn with(self, label: Label) -> Self {
        let mut map = (*self.0).clone();
        map.insert(label.extended_key(), label.value);
        Self::from(map)
    }
}

impl From<Map> for Labels {
    #[inline]
    fn from(labels: Map) -> Self {
        Self(Arc::new(labels))
    }
}

impl AsRef<Map> for Labels {
    #[inline]
    fn as_ref(&self) -> &Map {
        self.0.as_ref()
    }
}

impl<T: AsRef<Map>> std::cmp::PartialEq<T> for Labels {
    #[inline]
    fn eq(&self, t: &T) -> bool {
        self.0.as_ref().eq(t.as_ref())
    }
}

impl std::iter::FromIterator<Label> for Labels {
    fn from_iter<T: IntoIterator<Item = Label>>(iter: T) -> Self {
        Self(Arc::new(
            iter.into_iter()
                .map(|l| (l.extended_key(), l.value))
                .collect(),
        ))
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Labels {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        iter.into_iter()
            .map(|(k, v)| Label::parse(&format!("{k}={v}")))
            .collect()
    }
}

// === Expression ===

impl Expression {
    pub fn new(key: &str, operator: Operator, values: impl IntoIterator<Item = String>) -> Self {
        Self {
            key: extended_key(key),
            operator,
            values: values.into_iter().collect(),
        }
    }

    fn matches(&self, labels: &Labels) -> bool {
        match self.operator {
            Operator::In => match labels.get(&self.key) {
                Some(v) => self.values.contains(v),
                None => false,
            },
            Operator::NotIn => match labels.get(&self.key) {
                Some(v) => !self.values.contains(v),
                None => true,
            },
            Operator::Exists => labels.get(&self.key).is_some(),
            Operator::DoesNotExist => labels.get(&self.key).is_none(),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.values.iter().cloned().collect::<Vec<_>>().join(" ");
        write!(
            f,
            "LabelSelectorRequirement{{Key:{},Operator:{:?},Values:[{}],}}",
            self.key, self.operator, values
        )
    }
}

impl From<RawExpression> for Expression {
    fn from(raw: RawExpression) -> Self {
        Self {
            key: extended_key(&raw.key),
            operator: raw.operator,
            values: raw.values,
        }
    }
}

impl From<Expression> for RawExpression {
    fn from(expr: Expression) -> Self {
        Self {
            key: wire_key(&expr.key),
            operator: expr.operator,
            values: expr.values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{hash::BuildHasher, iter::FromIterator};

    #[test]
    fn test_matches() {
        for (selector, labels, matches, msg) in &[
            (Selector::default(), Labels::default(), true, "empty match"),
            (
                Selector::from_iter(Some(("foo", "bar"))),
                Labels::from_iter(Some(("k8s:foo", "bar"))),
                true,
                "any-source label match",
            ),
            (
                Selector::from_iter(Some(("k8s:foo", "bar"))),
                Labels::from_iter(vec![("k8s:foo", "bar"), ("k8s:bah", "baz")]),
                true,
                "sufficient label match",
            ),
            (
                Selector::from_iter(Some(("k8s:foo", "bar"))),
                Labels::from_iter(Some(("container:foo", "bar"))),
                false,
                "source mismatch",
            ),
            (
                Selector::from_iter(Some(Expression::new(
                    "foo",
                    Operator::In,
                    Some("bar".to_string()),
                ))),
                Labels::from_iter(vec![("k8s:foo", "bar"), ("k8s:bah", "baz")]),
                true,
                "expression match",
            ),
            (
                Selector::from_iter(Some(Expression::new(
                    "foo",
                    Operator::NotIn,
                    Some("bar".to_string()),
                ))),
                Labels::from_iter(Some(("k8s:foo", "bar"))),
                false,
                "not-in excludes value",
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", Operator::DoesNotExist, None))),
                Labels::from_iter(Some(("k8s:bah", "baz"))),
                true,
                "does-not-exist",
            ),
        ] {
            assert_eq!(selector.matches(labels), *matches, "{}", msg);
        }
    }

    #[test]
    fn parse_labels() {
        assert_eq!(Label::parse_select("foo"), Label::new("any", "foo", ""));
        assert_eq!(Label::parse("k8s:app=web"), Label::new("k8s", "app", "web"));
        assert_eq!(Label::parse("app=a:b"), Label::new("unspec", "app", "a:b"));
        assert_eq!(Label::parse("$host"), Label::new("reserved", "host", ""));
        assert_eq!(Label::parse("k8s:app=web").to_string(), "k8s:app=web");
        assert_eq!(Label::parse_select("foo").to_string(), "any:foo");
    }

    #[test]
    fn render_selector() {
        assert_eq!(
            Selector::wildcard().to_string(),
            "&LabelSelector{MatchLabels:map[string]string{},MatchExpressions:[]LabelSelectorRequirement{},}"
        );
        assert_eq!(
            Selector::from_labels(Some(Label::parse_select("foo"))).to_string(),
            "&LabelSelector{MatchLabels:map[string]string{any.foo: ,},MatchExpressions:[]LabelSelectorRequirement{},}"
        );
        let selector = Selector::from_iter(Some(Expression::new(
            "k8s:tier",
            Operator::In,
            vec!["db".to_string(), "cache".to_string()],
        )));
        assert_eq!(
            selector.to_string(),
            "&LabelSelector{MatchLabels:map[string]string{},MatchExpressions:[]LabelSelectorRequirement{LabelSelectorRequirement{Key:k8s.tier,Operator:In,Values:[cache db],},},}"
        );
    }

    #[test]
    fn selector_wire_keys() {
        let selector: Selector =
            serde_json::from_str(r#"{"matchLabels":{"app":"web","k8s:tier":"db"}}"#).unwrap();
        assert_eq!(
            selector,
            Selector::from_map(maplit::btreemap! {
                "any.app".to_string() => "web".to_string(),
                "k8s.tier".to_string() => "db".to_string(),
            })
        );
        assert_eq!(
            serde_json::to_string(&selector).unwrap(),
            r#"{"matchLabels":{"any:app":"web","k8s:tier":"db"}}"#
        );

        let empty: Selector = serde_json::from_str("{}").unwrap();
        assert!(empty.is_wildcard());
        assert_eq!(empty, Selector::wildcard());
    }

    #[test]
    fn expression_order_is_ignored() {
        let a: Selector = serde_json::from_str(
            r#"{"matchExpressions":[
                {"key":"tier","operator":"In","values":["db"]},
                {"key":"k8s:app","operator":"Exists"}
            ]}"#,
        )
        .unwrap();
        let b: Selector = serde_json::from_str(
            r#"{"matchExpressions":[
                {"key":"k8s:app","operator":"Exists"},
                {"key":"tier","operator":"In","values":["db"]},
                {"key":"k8s:app","operator":"Exists"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());

        let state = std::collections::hash_map::RandomState::new();
        assert_eq!(state.hash_one(&a), state.hash_one(&b));

        let c = Selector::from_iter(vec![
            Expression::new("tier", Operator::In, Some("db".to_string())),
            Expression::new("k8s:app", Operator::Exists, None),
        ]);
        assert_eq!(a, c);
    }
}
