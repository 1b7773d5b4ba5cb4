//! Network-related utilities.
//!
//! ## Key Components
//!
//! - **`retry`**: Exponential backoff for transient vault transport failures
//!   (connection errors and 5xx answers), limited to requests that are safe to repeat.

pub mod retry;

pub use retry::{is_transient, retry_async, RequestKind, RetryConfig};
