#![deny(missing_docs)]
//! Anthropic Messages API provider for quill.
//!
//! [`AnthropicTransform`] maps the canonical model to the Messages API wire
//! format (including ephemeral prompt-cache annotation), and [`Anthropic`]
//! is the HTTP+SSE transport implementing the provider facade.
//!
//! Reference: <https://docs.anthropic.com/en/api/messages>

mod client;
mod error;
mod streaming;
mod transform;

pub use client::Anthropic;
pub use transform::AnthropicTransform;
