//! HTTP transport implementation
//!
//! Provides a `reqwest` client that implements the [`Transport`](crate::Transport)
//! trait. Bodies are streamed back to the caller chunk by chunk.

pub mod client;

pub use client::{HttpTransport, HttpTransportConfig};
