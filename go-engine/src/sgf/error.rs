use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum SgfError {
    Empty,
    UnexpectedEof,
    UnexpectedChar {
        expected: &'static str,
        found: char,
        pos: usize,
    },
    InvalidPropertyValue {
        property: String,
        value: String,
    },
    InvalidCoordinate(String),
}

impl fmt::Display for SgfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SgfError::Empty => write!(f, "empty record"),
            SgfError::UnexpectedEof => write!(f, "unexpected end of input"),
            SgfError::UnexpectedChar {
                expected,
                found,
                pos,
            } => write!(f, "expected {expected}, found '{found}' at byte {pos}"),
            SgfError::InvalidPropertyValue { property, value } => {
                write!(f, "invalid value for {property}: {value:?}")
            }
            SgfError::InvalidCoordinate(s) => write!(f, "invalid coordinate {s:?}"),
        }
    }
}

impl std::error::Error for SgfError {}
