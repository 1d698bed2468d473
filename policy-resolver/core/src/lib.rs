#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod context;
mod error;
pub mod filter;
pub mod l4;
mod l7;
pub mod model;
mod parser;
pub mod resolve;
mod selector;


pub use self::{
    context::PolicyContext,
    error::{Error, SecretError},
    filter::{port_key, L4Filter},
    l4::{L4Policy, L4PolicyMap},
    l7::{L7DataMap, PerSelectorPolicy, TlsContext},
    parser::{L7ParserType, Redirect},
    resolve::{resolve, Resolution},
    selector::{CachedSelector, SelectorCache},
};
