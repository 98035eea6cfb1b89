//! S-expression tokenizer.
use std::iter::Peekable;
use std::str::Chars;

use super::location::Location;
use super::result::{ScanErr, ScanErrKind, ScanResult};
use super::token::{Token, TokenWithLocation};

/// Scan `text` into a flat token list, consuming the entire input.
pub fn scan(text: &str) -> ScanResult {
    Scanner::new(text).scan_all()
}

/// Scan `text`, panicking on error. Handy in tests and in the REPL
/// where a scan error is reported and simply discarded.
#[cfg(test)]
pub fn scan_optimistic(text: &str) -> Vec<TokenWithLocation> {
    scan(text).unwrap_or_else(|err| panic!("scan failed: {err}"))
}

struct Scanner<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    col: usize,
    paren_depth: i32,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self { chars: text.chars().peekable(), line: 1, col: 0, paren_depth: 0 }
    }

    fn location(&self) -> Location {
        Location::new(self.line, self.col)
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.chars.next();
        match c {
            Some('\n') => {
                self.line += 1;
                self.col = 0;
            }
            Some(_) => {
                self.col += 1;
            }
            None => (),
        }
        c
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn scan_all(&mut self) -> ScanResult {
        let mut tokens = vec![];
        loop {
            self.skip_whitespace_and_comments();
            let start = self.location();
            let Some(c) = self.next_char() else {
                tokens.push(TokenWithLocation::new(Token::EndOfInput, start, start));
                break;
            };
            let token = match c {
                '(' => {
                    self.paren_depth += 1;
                    Token::LeftParen
                }
                ')' => {
                    self.paren_depth -= 1;
                    if self.paren_depth < 0 {
                        return Err(ScanErr::new(
                            ScanErrKind::UnmatchedClosingParen,
                            start,
                        ));
                    }
                    Token::RightParen
                }
                '"' => self.scan_string(start)?,
                c if c.is_ascii_digit() || (c == '-' && self.peek_is_digit()) => {
                    self.scan_number(c)
                }
                c if is_symbol_start(c) => self.scan_symbol(c),
                c => return Err(ScanErr::new(ScanErrKind::UnexpectedCharacter(c), start)),
            };
            let end = self.location();
            tokens.push(TokenWithLocation::new(token, start, end));
        }
        if self.paren_depth != 0 {
            return Err(ScanErr::new(
                ScanErrKind::UnmatchedOpeningParen,
                self.location(),
            ));
        }
        Ok(tokens)
    }

    fn peek_is_digit(&mut self) -> bool {
        self.chars.clone().nth(1).map(|c| c.is_ascii_digit()).unwrap_or(false)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.next_char();
                }
                Some(';') => {
                    while !matches!(self.peek_char(), Some('\n') | None) {
                        self.next_char();
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_string(&mut self, start: Location) -> Result<Token, ScanErr> {
        let mut value = String::new();
        loop {
            match self.next_char() {
                Some('"') => break,
                Some('\\') => match self.next_char() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some(c) => value.push(c),
                    None => return Err(ScanErr::new(ScanErrKind::UnterminatedString, start)),
                },
                Some(c) => value.push(c),
                None => return Err(ScanErr::new(ScanErrKind::UnterminatedString, start)),
            }
        }
        Ok(Token::String(value))
    }

    fn scan_number(&mut self, first: char) -> Token {
        let mut text = String::new();
        text.push(first);
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() || c == '.' {
                text.push(c);
                self.next_char();
            } else {
                break;
            }
        }
        // A malformed number (e.g. "3.4.5") is rejected by the parser
        // when it fails to interpret the symbol as an operator or
        // identifier; the scanner only needs to produce a plausible
        // Number token for well-formed input.
        let value: f64 = text.parse().unwrap_or(f64::NAN);
        Token::Number(value)
    }

    fn scan_symbol(&mut self, first: char) -> Token {
        let mut text = String::new();
        text.push(first);
        while let Some(c) = self.peek_char() {
            if is_symbol_char(c) {
                text.push(c);
                self.next_char();
            } else {
                break;
            }
        }
        match text.as_str() {
            "true" => Token::Symbol("true".to_owned()),
            "false" => Token::Symbol("false".to_owned()),
            _ => Token::Symbol(text),
        }
    }
}

fn is_symbol_start(c: char) -> bool {
    !c.is_whitespace() && c != '(' && c != ')' && c != '"' && c != ';'
}

fn is_symbol_char(c: char) -> bool {
    is_symbol_start(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_token(text: &str, expected: Token) {
        let tokens = scan_optimistic(text);
        assert_eq!(tokens[0].token, expected);
    }

    #[test]
    fn scans_parens() {
        let tokens = scan_optimistic("()");
        assert_eq!(tokens[0].token, Token::LeftParen);
        assert_eq!(tokens[1].token, Token::RightParen);
        assert_eq!(tokens[2].token, Token::EndOfInput);
    }

    #[test]
    fn scans_number() {
        check_token("42", Token::Number(42.0));
        check_token("3.14", Token::Number(3.14));
        check_token("-5", Token::Number(-5.0));
    }

    #[test]
    fn scans_string() {
        check_token(r#""foo""#, Token::String("foo".to_owned()));
    }

    #[test]
    fn scans_string_with_escapes() {
        check_token(r#""a\nb""#, Token::String("a\nb".to_owned()));
    }

    #[test]
    fn scans_symbol() {
        check_token("square", Token::Symbol("square".to_owned()));
        check_token("+", Token::Symbol("+".to_owned()));
        check_token(">=", Token::Symbol(">=".to_owned()));
    }

    #[test]
    fn scans_boolean_as_symbol() {
        check_token("true", Token::Symbol("true".to_owned()));
        check_token("false", Token::Symbol("false".to_owned()));
    }

    #[test]
    fn skips_comments() {
        let tokens = scan_optimistic("; comment\n42");
        assert_eq!(tokens[0].token, Token::Number(42.0));
    }

    #[test]
    fn reports_unmatched_closing_paren() {
        let result = scan(")");
        assert!(matches!(
            result,
            Err(ScanErr { kind: ScanErrKind::UnmatchedClosingParen, .. })
        ));
    }

    #[test]
    fn reports_unterminated_string() {
        let result = scan("\"abc");
        assert!(matches!(
            result,
            Err(ScanErr { kind: ScanErrKind::UnterminatedString, .. })
        ));
    }

    #[test]
    fn reports_unmatched_opening_paren() {
        let result = scan("(+ 1 2");
        assert!(matches!(
            result,
            Err(ScanErr { kind: ScanErrKind::UnmatchedOpeningParen, .. })
        ));
    }
}
