//! af-core: shared types, IDs, errors, configuration and the audio format
//! table.
//!
//! This crate is the foundational dependency for the other af-* crates. It
//! owns no I/O beyond reading a config file.

pub mod config;
pub mod error;
pub mod format;
pub mod ids;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, ErrorKind, Result};
pub use format::{resolve_format, AudioFormat};
pub use ids::JobId;
