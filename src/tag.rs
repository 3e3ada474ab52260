//! Four byte tags identifying tables, scripts, language systems, features and axes.

use crate::error::ParseError;
use std::fmt;

/// Generate a 4-byte tag from a byte string
///
/// Example:
///
/// ```ignore
/// assert_eq!(tag!(b"GSUB"), 0x47535542);
/// ```
macro_rules! tag {
    ($w:expr) => {
        from_bytes(*$w)
    };
}

/// Wrapper that displays a tag as its four characters, or as hex when it is not printable.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct DisplayTag(pub u32);

pub const fn from_bytes(chars: [u8; 4]) -> u32 {
    u32::from_be_bytes(chars)
}

/// Parse a tag from a string of up to four printable ASCII characters, padding with spaces.
pub fn from_string(s: &str) -> Result<u32, ParseError> {
    if s.len() > 4 {
        return Err(ParseError::BadValue);
    }

    let mut tag: u32 = 0;
    let mut count = 0;

    for c in s.chars() {
        if !c.is_ascii() || c.is_ascii_control() {
            return Err(ParseError::BadValue);
        }

        tag = (tag << 8) | (c as u32);
        count += 1;
    }

    while count < 4 {
        tag = (tag << 8) | (' ' as u32);
        count += 1;
    }

    Ok(tag)
}

impl fmt::Display for DisplayTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_be_bytes();
        if bytes.iter().all(|b| b.is_ascii() && !b.is_ascii_control()) {
            let s: String = bytes.iter().map(|&b| char::from(b)).collect();
            f.pad(&s)
        } else {
            write!(f, "0x{:08x}", self.0)
        }
    }
}

impl fmt::Debug for DisplayTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

pub const CCMP: u32 = tag!(b"ccmp");
/// Default script
pub const DFLT: u32 = tag!(b"DFLT");
pub const GPOS: u32 = tag!(b"GPOS");
pub const GSUB: u32 = tag!(b"GSUB");
pub const LATN: u32 = tag!(b"latn");
pub const LIGA: u32 = tag!(b"liga");
pub const LOCL: u32 = tag!(b"locl");
pub const SMCP: u32 = tag!(b"smcp");

#[cfg(test)]
mod tests {
    use super::*;

    mod from_string {
        use super::*;

        #[test]
        fn test_four_chars() {
            let tag = from_string("latn").expect("invalid tag");

            assert_eq!(tag, LATN);
        }

        #[test]
        fn test_three_chars() {
            let tag = from_string("BEN").expect("invalid tag");

            assert_eq!(tag, 1111838240);
        }

        #[test]
        fn test_layout_tags() {
            assert_eq!(from_string("DFLT"), Ok(DFLT));
            assert_eq!(from_string("smcp"), Ok(SMCP));
            assert_eq!(from_string("GPOS"), Ok(GPOS));
        }

        #[test]
        fn test_too_long() {
            assert_eq!(from_string("kerns"), Err(ParseError::BadValue));
        }
    }

    mod display_tag {
        use crate::tag::{DisplayTag, DFLT, GSUB};
        use regex::Regex;

        #[test]
        fn test_ascii() {
            assert_eq!(DisplayTag(GSUB).to_string(), "GSUB".to_string());
            assert_eq!(DisplayTag(DFLT).to_string(), "DFLT".to_string());
        }

        #[test]
        fn test_non_ascii() {
            let re = Regex::new(r"^0x[0-9a-f]{8}$").unwrap();
            assert!(re.is_match(&DisplayTag(0x12345678).to_string()));
            assert!(re.is_match(&DisplayTag(0xFF00FF00).to_string()));
        }
    }
}
