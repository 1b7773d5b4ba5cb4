//! Vault client and credential lifecycle for baokit
//!
//! ## Key Components
//!
//! - **`api`**: The [`VaultClient`] trait every consumer talks to.
//! - **`http`**: [`HttpVaultClient`], the `reqwest` implementation.
//! - **`auth`**: Login strategies per auth method.
//! - **`renewal`**: [`LifetimeWatcher`], background renewal of tokens and leases.
//! - **`lifecycle`**: [`CredentialManager`], which bootstraps the token, keeps it
//!   alive, reloads trust roots and tears everything down on close.

pub mod api;
pub mod auth;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod renewal;

pub use api::{LoginRequest, VaultClient};
pub use auth::{ec2_nonce, AuthStrategy, IdentityProvider, NoCloudIdentity};
pub use config::{AuthMethod, ClientConfig};
pub use http::HttpVaultClient;
pub use lifecycle::{CredentialHandle, CredentialManager, LifecyclePhase};
pub use renewal::{LifetimeWatcher, RenewTarget, RenewalEvent, WatcherOptions};
