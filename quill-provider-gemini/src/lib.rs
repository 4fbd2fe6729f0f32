#![deny(missing_docs)]
//! Google Gemini generateContent provider for quill.
//!
//! [`GeminiTransform`] maps the canonical model to the Gemini wire format:
//! `user`/`model` roles, system instructions extracted to a top-level
//! field, tool results correlated by function name, function-declaration
//! schema sanitization, and thought signatures for thinking models.
//! [`Gemini`] is the HTTP+SSE transport.
//!
//! Reference: <https://ai.google.dev/api/generate-content>

mod client;
mod error;
mod streaming;
mod transform;

pub use client::Gemini;
pub use transform::{GeminiTransform, SKIP_THOUGHT_SIGNATURE, is_thinking_model};
