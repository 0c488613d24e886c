use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoError {
    NotOnBoard,
    Occupied,
    Suicide,
    KoViolation,
}

impl fmt::Display for GoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoError::NotOnBoard => write!(f, "not on board"),
            GoError::Occupied => write!(f, "point already occupied"),
            GoError::Suicide => write!(f, "suicide"),
            GoError::KoViolation => write!(f, "ko"),
        }
    }
}

impl std::error::Error for GoError {}
