#![deny(missing_docs)]
//! OpenAI Chat Completions provider for quill.
//!
//! [`OpenAiTransform`] maps the canonical model to the Chat Completions
//! wire format, [`OpenAi`] is the HTTP+SSE transport, and [`compat`]
//! carries the table of OpenAI-compatible vendors (Ollama, LM Studio,
//! Groq, Mistral, …) that reuse the same transform with a vendor base URL.
//!
//! Reference: <https://platform.openai.com/docs/api-reference/chat>

mod client;
pub mod compat;
mod error;
mod streaming;
mod transform;

pub use client::OpenAi;
pub use compat::CompatVendor;
pub use transform::OpenAiTransform;
