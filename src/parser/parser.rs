//! Recursive-descent parser turning a token stream into `Ast` nodes.
use crate::ast::Ast;
use crate::scanner::{self, Token, TokenWithLocation};

use super::result::{ParseErr, ParseErrKind};

/// Parse `text` into the top-level sequence of expressions. A program
/// with more than one top-level expression is later wrapped in an
/// implicit `begin` by the compiler/VM entry point; the parser itself
/// makes no such assumption.
pub fn parse(text: &str) -> Result<Vec<Ast>, ParseErr> {
    let tokens = scanner::scan(text)?;
    Parser::new(tokens).parse_program()
}

#[cfg(test)]
pub fn parse_optimistic(text: &str) -> Vec<Ast> {
    parse(text).unwrap_or_else(|err| panic!("parse failed: {err}"))
}

struct Parser {
    tokens: Vec<TokenWithLocation>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<TokenWithLocation>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].token.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn parse_program(&mut self) -> Result<Vec<Ast>, ParseErr> {
        let mut exprs = vec![];
        while !matches!(self.peek(), Token::EndOfInput) {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    fn parse_expr(&mut self) -> Result<Ast, ParseErr> {
        match self.peek().clone() {
            Token::LeftParen => self.parse_list(),
            Token::Number(n) => {
                self.advance();
                Ok(Ast::Number(n))
            }
            Token::String(s) => {
                self.advance();
                Ok(Ast::String(s))
            }
            Token::Symbol(name) => {
                self.advance();
                Ok(match name.as_str() {
                    "true" => Ast::Boolean(true),
                    "false" => Ast::Boolean(false),
                    _ => Ast::Symbol(name),
                })
            }
            Token::RightParen => {
                Err(ParseErr::new(ParseErrKind::UnexpectedToken(Token::RightParen)))
            }
            Token::EndOfInput => {
                Err(ParseErr::new(ParseErrKind::UnexpectedEndOfInput))
            }
        }
    }

    fn parse_list(&mut self) -> Result<Ast, ParseErr> {
        self.advance(); // consume '('
        let mut items = vec![];
        loop {
            match self.peek() {
                Token::RightParen => {
                    self.advance();
                    break;
                }
                Token::EndOfInput => {
                    return Err(ParseErr::new(ParseErrKind::UnexpectedEndOfInput));
                }
                _ => items.push(self.parse_expr()?),
            }
        }
        Ok(Ast::List(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_number() {
        assert_eq!(parse_optimistic("42"), vec![Ast::Number(42.0)]);
    }

    #[test]
    fn parses_string() {
        assert_eq!(
            parse_optimistic(r#""foo""#),
            vec![Ast::String("foo".to_owned())]
        );
    }

    #[test]
    fn parses_boolean() {
        assert_eq!(parse_optimistic("true"), vec![Ast::Boolean(true)]);
        assert_eq!(parse_optimistic("false"), vec![Ast::Boolean(false)]);
    }

    #[test]
    fn parses_symbol() {
        assert_eq!(parse_optimistic("x"), vec![Ast::Symbol("x".to_owned())]);
    }

    #[test]
    fn parses_nested_list() {
        let ast = parse_optimistic("(+ 2 (* 3 4))");
        assert_eq!(
            ast,
            vec![Ast::List(vec![
                Ast::Symbol("+".to_owned()),
                Ast::Number(2.0),
                Ast::List(vec![
                    Ast::Symbol("*".to_owned()),
                    Ast::Number(3.0),
                    Ast::Number(4.0),
                ]),
            ])]
        );
    }

    #[test]
    fn parses_multiple_top_level_expressions() {
        let ast = parse_optimistic(r#"(var x "foo") x"#);
        assert_eq!(ast.len(), 2);
    }

    #[test]
    fn reports_unmatched_opening_paren() {
        assert!(parse("(+ 1 2").is_err());
    }

    #[test]
    fn reports_unexpected_closing_paren() {
        assert!(parse(")").is_err());
    }
}
