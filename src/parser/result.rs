use std::fmt;

use crate::scanner::{ScanErr, Token};

pub type ParseResult = Result<crate::ast::Ast, ParseErr>;

#[derive(Clone, Debug, PartialEq)]
pub struct ParseErr {
    pub kind: ParseErrKind,
}

impl ParseErr {
    pub fn new(kind: ParseErrKind) -> Self {
        Self { kind }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ParseErrKind {
    ScanErr(ScanErr),
    UnexpectedToken(Token),
    UnexpectedEndOfInput,
    EmptyList,
}

impl From<ScanErr> for ParseErr {
    fn from(err: ScanErr) -> Self {
        ParseErr::new(ParseErrKind::ScanErr(err))
    }
}

impl fmt::Display for ParseErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error: {:?}", self.kind)
    }
}

impl std::error::Error for ParseErr {}
