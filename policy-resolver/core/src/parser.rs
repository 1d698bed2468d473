use crate::Error;
use netpol_policy_k8s_api::policy::L7Rules;
use std::{fmt, hash::Hash};

/// Identifies how L7 traffic on a port must be parsed.
///
/// Any name other than the reserved ones names a proxy-library parser. Parser types compare by
/// their exact string form.
#[derive(Clone, Debug, Default)]
pub enum L7ParserType {
    /// No L7 inspection.
    #[default]
    None,
    Http,
    Kafka,
    Dns,
    Tls,
    Proxylib(String),
}

/// The enforcement engine that traffic on a port must be redirected to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Redirect {
    /// The general-purpose L7 proxy.
    Envoy,
    /// A protocol-specific proxy-library parser.
    Proxylib,
    /// The DNS proxy.
    Dns,
}

// === impl L7ParserType ===

impl L7ParserType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::None => "",
            Self::Http => "http",
            Self::Kafka => "kafka",
            Self::Dns => "dns",
            Self::Tls => "tls",
            Self::Proxylib(name) => name,
        }
    }

    /// Merges the parser types of two rules on the same port.
    ///
    /// `None` is promoted to any other type; `Tls` is promoted to any type except `Dns`. All
    /// other distinct types conflict.
    pub fn merge(&self, other: &Self) -> Result<Self, Error> {
        match (self.normalize(), other.normalize()) {
            (a, b) if a == b => Ok(a),
            (Self::None, b) | (b, Self::None) => Ok(b),
            (Self::Tls, b) | (b, Self::Tls) if b != Self::Dns => Ok(b),
            (a, b) => Err(Error::ParserConflict { a, b }),
        }
    }

    pub fn redirect(&self) -> Option<Redirect> {
        match self.normalize() {
            Self::None => None,
            Self::Http | Self::Kafka | Self::Tls => Some(Redirect::Envoy),
            Self::Dns => Some(Redirect::Dns),
            Self::Proxylib(_) => Some(Redirect::Proxylib),
        }
    }

    /// A proxy-library name that spells a reserved parser is that parser.
    fn normalize(&self) -> Self {
        Self::from(self.as_str())
    }
}

impl From<&str> for L7ParserType {
    fn from(s: &str) -> Self {
        match s {
            "" => Self::None,
            "http" => Self::Http,
            "kafka" => Self::Kafka,
            "dns" => Self::Dns,
            "tls" => Self::Tls,
            name => Self::Proxylib(name.to_string()),
        }
    }
}

/// Determines the parser required by a set of L7 rules.
impl From<&L7Rules> for L7ParserType {
    fn from(rules: &L7Rules) -> Self {
        if !rules.http.is_empty() {
            Self::Http
        } else if !rules.kafka.is_empty() {
            Self::Kafka
        } else if !rules.dns.is_empty() {
            Self::Dns
        } else if let Some(proto) = rules.l7_proto.as_deref() {
            Self::from(proto)
        } else {
            Self::None
        }
    }
}

impl PartialEq for L7ParserType {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for L7ParserType {}

impl Hash for L7ParserType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_str().hash(state)
    }
}

impl fmt::Display for L7ParserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all() -> Vec<L7ParserType> {
        vec![
            L7ParserType::None,
            L7ParserType::Http,
            L7ParserType::Kafka,
            L7ParserType::Dns,
            L7ParserType::Tls,
            L7ParserType::from("foo"),
            L7ParserType::from("bar"),
            L7ParserType::Proxylib(String::new()),
            L7ParserType::Proxylib("tls".to_string()),
            L7ParserType::Proxylib("dns".to_string()),
            L7ParserType::Proxylib("http".to_string()),
        ]
    }

    #[test]
    fn merge_is_symmetric() {
        for a in all() {
            for b in all() {
                match (a.merge(&b), b.merge(&a)) {
                    (Ok(ab), Ok(ba)) => assert_eq!(ab, ba, "{a:?}/{b:?}"),
                    (Err(_), Err(_)) => {}
                    (ab, ba) => panic!("asymmetric merge of {a:?}/{b:?}: {ab:?} {ba:?}"),
                }
            }
        }
    }

    #[test]
    fn none_is_identity() {
        for x in all() {
            assert_eq!(L7ParserType::None.merge(&x).unwrap(), x);
        }
    }

    #[test]
    fn exact_string_equality() {
        assert_eq!(L7ParserType::from("http"), L7ParserType::Http);
        assert_eq!(
            L7ParserType::Proxylib("http".to_string()),
            L7ParserType::Http
        );
        assert_eq!(
            L7ParserType::Proxylib("http".to_string()).redirect(),
            Some(Redirect::Envoy)
        );
        assert_ne!(L7ParserType::from("HTTP"), L7ParserType::Http);
        assert_eq!(
            L7ParserType::from("HTTP").redirect(),
            Some(Redirect::Proxylib)
        );
    }

    #[test]
    fn reserved_spellings_merge_as_reserved() {
        let tls = L7ParserType::Proxylib("tls".to_string());
        assert_eq!(tls.merge(&L7ParserType::Http).unwrap(), L7ParserType::Http);
        assert!(tls.merge(&L7ParserType::Dns).is_err());

        let none = L7ParserType::Proxylib(String::new());
        assert_eq!(none.merge(&L7ParserType::Kafka).unwrap(), L7ParserType::Kafka);
        assert_eq!(
            L7ParserType::Proxylib("http".to_string())
                .merge(&L7ParserType::Tls)
                .unwrap(),
            L7ParserType::Http
        );
        assert!(L7ParserType::from("foo")
            .merge(&L7ParserType::Proxylib("kafka".to_string()))
            .is_err());
    }
}
