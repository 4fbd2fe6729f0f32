#![deny(missing_docs)]
//! Canonical types for the quill coding assistant.
//!
//! Everything here is transform-layer independent: providers convert to and
//! from these types, the tool dispatcher produces them, and the evidence and
//! compaction subsystems consume them. No I/O happens in this crate.

pub mod error;
pub mod image;
pub mod schema;
pub mod stream;
pub mod traits;
pub mod transform;
pub mod types;

pub use error::*;
pub use image::*;
pub use schema::*;
pub use stream::*;
pub use traits::*;
pub use transform::*;
pub use types::*;
