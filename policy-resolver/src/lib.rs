#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod cli;
pub mod logging;
mod manifests;

pub use self::{cli::Args, manifests::Manifests};
pub use netpol_policy_core as resolver;
pub use netpol_policy_k8s_api as k8s;
pub use netpol_policy_k8s_index as index;
