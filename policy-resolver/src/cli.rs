use crate::{logging, Manifests};
use anyhow::{bail, Result};
use clap::Parser;
use netpol_policy_k8s_api::{
    labels::{NAMESPACE_LABEL, SOURCE_K8S},
    Label, Labels, Selector,
};
use netpol_policy_k8s_index::{policy_rules, EndpointPolicy, Lister, SecretContext};
use std::{io::Write, path::PathBuf};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[clap(
    name = "netpol-policy",
    about = "Resolves the L4/L7 policy that applies to an endpoint"
)]
pub struct Args {
    #[clap(long, default_value = "netpol=info,warn", env = "NETPOL_POLICY_LOG")]
    log_level: String,

    #[clap(long, value_enum, default_value = "plain")]
    log_format: logging::LogFormat,

    /// YAML manifests holding `NetworkPolicy` and `Secret` resources.
    #[clap(short = 'f', long = "filename", required = true)]
    manifests: Vec<PathBuf>,

    /// The endpoint's labels, e.g. `k8s:app=web,k8s:tier=frontend`.
    #[clap(long, default_value = "")]
    endpoint_labels: String,

    /// The endpoint's namespace. Also used for manifests and secret references that do not name
    /// a namespace.
    #[clap(long, short = 'n', default_value = "default")]
    namespace: String,

    /// Peers whose ingress traffic is never redirected for L7 inspection, e.g.
    /// `reserved:host`.
    #[clap(long)]
    l7_bypass: Vec<String>,

    #[clap(long)]
    pretty: bool,
}

// === impl Args ===

impl Args {
    pub fn parse_and_run() -> Result<()> {
        Self::parse().run(std::io::stdout().lock())
    }

    /// Resolves the endpoint's policy and writes its model to `out`.
    ///
    /// The model is written even if some ports failed to resolve; the failures are then
    /// reported as an error.
    pub fn run(self, mut out: impl Write) -> Result<()> {
        logging::init(&self.log_level, self.log_format)?;

        let Manifests { policies, secrets } = Manifests::read(&self.manifests, &self.namespace)?;
        info!(
            policies = policies.len(),
            secrets = secrets.len(),
            "Read manifests"
        );

        let labels = Labels::parse_list(&self.endpoint_labels).with(Label::new(
            SOURCE_K8S,
            NAMESPACE_LABEL,
            &self.namespace,
        ));
        let bypass = self
            .l7_bypass
            .iter()
            .map(|l| Selector::from_labels(Some(Label::parse_select(l))));

        let ctx = SecretContext::new(secrets.into_iter().collect(), &self.namespace)
            .with_l7_bypass(bypass);
        let rules = policy_rules(&policies.into_iter().collect::<Lister<_>>());

        let (endpoint, _rx) = EndpointPolicy::new(labels);
        let errors = endpoint.recompute(&ctx, &rules);
        let model = endpoint.current().model();

        if self.pretty {
            serde_json::to_writer_pretty(&mut out, &model)?;
        } else {
            serde_json::to_writer(&mut out, &model)?;
        }
        writeln!(out)?;

        for error in &errors {
            error!(%error, "Failed to resolve policy");
        }
        if !errors.is_empty() {
            bail!("{} errors while resolving policy", errors.len());
        }
        Ok(())
    }
}
