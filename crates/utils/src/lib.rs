//! Shared utilities for baokit
//!
//! This crate provides the ambient pieces used across the workspace:
//! tracing setup, retry with backoff, duration parsing and filesystem
//! change streams.

pub mod duration;
pub mod network;
pub mod tracing;
pub mod watch;

pub use duration::*;
pub use network::*;
pub use watch::*;
