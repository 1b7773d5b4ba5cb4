//! Core domain types for baokit.
//!
//! ## Organization
//!
//! - **`credential`**: The token held by the credential lifecycle manager
//! - **`secret`**: Vault response envelopes and decoded secret attribute maps

pub mod credential;
pub mod secret;

// Re-export all public types for convenient access
pub use credential::*;
pub use secret::*;
