//! Secret reference resolution for baokit
//!
//! [`SecretInjector`] turns a mapping of names to references such as
//! `bao:secret/data/app#password` into resolved values, backed by the client from
//! `baokit-client`. Parsing lives in [`reference`], transit decryption in
//! [`transit`], path reads and writes in [`store`], and both caches in [`cache`].

pub mod cache;
pub mod cast;
pub mod config;
pub mod engine;
pub mod reference;
pub mod renewer;
pub mod store;
pub mod template;
pub mod transit;

pub use cache::ResolutionCache;
pub use config::InjectorConfig;
pub use engine::SecretInjector;
pub use reference::{parse, InlineSpan, Mode, Reference, SecretReference};
pub use renewer::LeaseRenewer;
pub use store::{kv2_payload, SecretPathStore, SecretRenewer};
pub use template::{DelimitedTemplater, TemplateRenderer};
pub use transit::TransitDecryptor;
