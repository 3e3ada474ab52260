//! Error types

use crate::binary::read::ReadEof;
use std::fmt;

/// Errors that originate when parsing binary data
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum ParseError {
    BadEof,
    BadValue,
    BadVersion,
    BadOffset,
    BadIndex,
    LimitExceeded,
    MissingValue,
    UnsuitableCmap,
}

impl From<ReadEof> for ParseError {
    fn from(_error: ReadEof) -> Self {
        ParseError::BadEof
    }
}

impl From<std::num::TryFromIntError> for ParseError {
    fn from(_error: std::num::TryFromIntError) -> Self {
        ParseError::BadValue
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::BadEof => write!(f, "end of data reached unexpectedly"),
            ParseError::BadValue => write!(f, "invalid value"),
            ParseError::BadVersion => write!(f, "unexpected data version"),
            ParseError::BadOffset => write!(f, "invalid data offset"),
            ParseError::BadIndex => write!(f, "invalid data index"),
            ParseError::LimitExceeded => write!(f, "limit exceeded"),
            ParseError::MissingValue => write!(f, "an expected data value was missing"),
            ParseError::UnsuitableCmap => write!(f, "unsuitable cmap subtable"),
        }
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn display_is_lowercase_sentence() {
        let re = Regex::new(r"^[a-z][a-z ]+$").unwrap();
        for err in [
            ParseError::BadEof,
            ParseError::BadValue,
            ParseError::BadVersion,
            ParseError::BadOffset,
            ParseError::BadIndex,
            ParseError::LimitExceeded,
            ParseError::MissingValue,
            ParseError::UnsuitableCmap,
        ] {
            let message = err.to_string();
            assert!(re.is_match(&message), "unexpected message: {}", message);
        }
    }

    #[test]
    fn from_read_eof() {
        assert_eq!(ParseError::from(ReadEof {}), ParseError::BadEof);
    }
}
