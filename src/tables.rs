//! Fixed-point scalar types and the character to glyph mapping table.

pub mod cmap;

use crate::binary::read::ReadFrom;
use crate::binary::{I32Be, U16Be};

/// 32-bit signed fixed-point number (16.16)
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Fixed(i32);

/// The F2DOT14 format consists of a signed, 2’s complement integer and an unsigned fraction.
///
/// To compute the actual value, take the integer and add the fraction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct F2Dot14(u16);

impl Fixed {
    pub const fn new(value: i32) -> Fixed {
        Fixed(value)
    }

    pub const fn raw_value(self) -> i32 {
        self.0
    }

    /// The integer part, `major` in a version number such as 1.1 (`0x00010001`).
    pub const fn major(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub const fn minor(self) -> u16 {
        self.0 as u16
    }
}

impl ReadFrom for Fixed {
    type ReadType = I32Be;

    fn read_from(value: i32) -> Self {
        Fixed(value)
    }
}

impl From<Fixed> for f32 {
    fn from(value: Fixed) -> f32 {
        (f64::from(value.0) / 65536.0) as f32
    }
}

impl From<Fixed> for f64 {
    fn from(value: Fixed) -> f64 {
        f64::from(value.0) / 65536.0
    }
}

impl F2Dot14 {
    pub const fn new(value: u16) -> Self {
        F2Dot14(value)
    }

    pub const fn raw_value(self) -> u16 {
        self.0
    }
}

impl ReadFrom for F2Dot14 {
    type ReadType = U16Be;

    fn read_from(value: u16) -> Self {
        F2Dot14(value)
    }
}

impl From<F2Dot14> for f32 {
    fn from(value: F2Dot14) -> Self {
        // Reinterpreting as i16 gives the 2's complement integer part in the top two bits.
        f32::from(value.0 as i16) / 16384.
    }
}
