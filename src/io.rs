//! Byte-level plumbing under the table readers and writers.

pub mod compression;
pub mod source;

pub use source::Source;
