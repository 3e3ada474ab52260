#![warn(rust_2018_idioms)]

//! Zero-copy reading of OpenType layout and character mapping tables.
//!
//! Every table is a view over a caller supplied byte slice. Offsets and counts are checked as
//! they are followed, so malformed data produces a `ParseError` rather than a panic.

/// Reading of binary data.
pub mod binary;
pub mod context;
pub mod error;
pub mod gdef;
pub mod gpos;
pub mod gsub;
pub mod layout;
pub mod size;
pub mod tables;
pub mod tag;
/// Shared test code.
#[cfg(test)]
pub mod tests;
