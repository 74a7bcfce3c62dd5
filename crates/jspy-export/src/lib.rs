//! Output for captured messages
//!
//! Captured messages are written as one JSON array that grows while the
//! capture runs. See [`json_array::JsonArrayWriter`].

pub mod json_array;
pub mod output;

pub use json_array::{JsonArrayWriter, WriterError, WriterResult};
pub use output::{Output, SharedBuffer};
