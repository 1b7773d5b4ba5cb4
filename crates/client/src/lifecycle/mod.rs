//! Lifecycle of the vault credential: bootstrap, renewal, trust-root reload and close

mod manager;
mod token;
mod trust;

#[cfg(test)]
mod tests;

pub use manager::{CredentialHandle, CredentialManager, LifecyclePhase};
