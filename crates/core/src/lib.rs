//! Core domain types, errors, and constants for baokit.
//!
//! ## Key Components
//!
//! - **`errors`**: Defines the primary `Error` enum and `Result` type alias,
//!   centralizing all failure modes of credential bootstrap and secret resolution.
//! - **`types`**: Credentials and vault response envelopes shared by the client
//!   and the injector.
//! - **`constants`**: Reference grammar markers, defaults and environment
//!   variable names.

pub mod constants;
pub mod errors;
pub mod types;

pub use self::{
    constants::*,
    errors::{Error, Result, ResultExt},
    types::*,
};
