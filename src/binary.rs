//! Marker types naming the encodings of the primitive values in font data.
//!
//! These are never constructed. They select a `ReadUnchecked` implementation, as in
//! `ctxt.read::<U16Be>()` or `ctxt.read_array::<U16Be>(count)`.

pub mod read;

/// Unsigned byte.
#[derive(Copy, Clone)]
pub enum U8 {}

/// Signed byte.
#[derive(Copy, Clone)]
pub enum I8 {}

/// Big-endian `uint16`, also used for `Offset16` and glyph ids.
#[derive(Copy, Clone)]
pub enum U16Be {}

/// Big-endian `int16`, also used for `FWORD` values.
#[derive(Copy, Clone)]
pub enum I16Be {}

/// Big-endian `uint24`, read as a `u32`.
#[derive(Copy, Clone)]
pub enum U24Be {}

/// Big-endian `uint32`, also used for `Offset32`.
#[derive(Copy, Clone)]
pub enum U32Be {}

#[derive(Copy, Clone)]
pub enum I32Be {}

#[derive(Copy, Clone)]
pub enum U64Be {}

#[derive(Copy, Clone)]
pub enum I64Be {}
