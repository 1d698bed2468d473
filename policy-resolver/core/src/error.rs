use crate::L7ParserType;
use netpol_policy_k8s_api::policy::InvalidRule;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Two rules on the same port require incompatible L7 parsers.
    #[error("cannot merge conflicting L7 parsers ({a}/{b})")]
    ParserConflict { a: L7ParserType, b: L7ParserType },

    /// Two rules for the same selector carry different kinds of L7 rules.
    #[error("cannot merge conflicting L7 rule types for selector {selector}")]
    RuleConflict { selector: String },

    #[error("cannot merge conflicting {kind} TLS contexts for selector {selector}")]
    TlsConflict {
        kind: &'static str,
        selector: String,
    },

    /// A TLS context references a secret that could not be resolved.
    #[error("failed to resolve {kind} TLS secret: {source}")]
    MissingSecret {
        kind: &'static str,
        #[source]
        source: SecretError,
    },

    #[error("invalid port {0:?}")]
    InvalidPort(String),

    #[error("invalid rule: {0}")]
    InvalidRule(#[from] InvalidRule),

    /// Wraps a failure to build or merge the filter for one port.
    #[error("port {key}: {source}")]
    Port {
        key: String,
        #[source]
        source: Box<Error>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("TLS context does not reference a secret")]
    NoSecret,

    /// The referenced secret does not exist. Carries the lookup's own error.
    #[error("{0}")]
    NotFound(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error("secret {secret} has none of the keys {keys:?}")]
    MissingKeys { secret: String, keys: Vec<String> },
}

// === impl Error ===

impl Error {
    pub(crate) fn port(key: impl ToString, error: Error) -> Self {
        match error {
            error @ Self::Port { .. } => error,
            error => Self::Port {
                key: key.to_string(),
                source: Box::new(error),
            },
        }
    }

    /// Strips the port context, if any, returning the underlying error.
    pub fn root(&self) -> &Self {
        match self {
            Self::Port { source, .. } => source.root(),
            error => error,
        }
    }
}
