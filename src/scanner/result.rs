use std::fmt;

use super::location::Location;

pub type ScanResult = Result<Vec<super::token::TokenWithLocation>, ScanErr>;

#[derive(Clone, Debug, PartialEq)]
pub struct ScanErr {
    pub kind: ScanErrKind,
    pub location: Location,
}

impl ScanErr {
    pub fn new(kind: ScanErrKind, location: Location) -> Self {
        Self { kind, location }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ScanErrKind {
    UnexpectedCharacter(char),
    UnterminatedString,
    UnmatchedClosingParen,
    UnmatchedOpeningParen,
}

impl fmt::Display for ScanErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scan error at {}: {:?}", self.location, self.kind)
    }
}

impl std::error::Error for ScanErr {}
