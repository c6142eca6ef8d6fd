//! Recursive-descent expression parser.
//!
//! ```text
//! expr      := text | integer | '$' ident | '*' | ident expr_tail?
//! expr_tail := '(' arglist ')'
//!            | ( '.' ident | '#' ident '(' expr ')' )*
//! arglist   := ε | expr (',' expr)*
//! ```
//!
//! An identifier directly followed by `(` is always a permission instance.

use crate::ast::Expr;
use crate::token::{Token, TokenKind, TokenValue, tokenize};
use crate::{Error, Result};

/// Parse expression text into an [`Expr`].
pub fn parse(input: &str) -> Result<Expr> {
    Parser::new(tokenize(input)).parse()
}

/// One-token-lookahead parser over a token stream.
pub struct Parser<I> {
    tokens: I,
    lookahead: Option<Token>,
}

impl<I> Parser<I>
where
    I: Iterator<Item = Result<Token>>,
{
    pub fn new(tokens: I) -> Self {
        Self {
            tokens,
            lookahead: None,
        }
    }

    /// Parse a complete expression; trailing tokens are an error.
    pub fn parse(mut self) -> Result<Expr> {
        let expr = self.parse_expr()?;
        match self.next()? {
            None => Ok(expr),
            Some(token) => Err(unexpected(Some(token), "end of input")),
        }
    }

    fn next(&mut self) -> Result<Option<Token>> {
        match self.lookahead.take() {
            Some(token) => Ok(Some(token)),
            None => self.tokens.next().transpose(),
        }
    }

    fn peek_kind(&mut self) -> Result<Option<TokenKind>> {
        if self.lookahead.is_none() {
            self.lookahead = self.tokens.next().transpose()?;
        }
        Ok(self.lookahead.as_ref().map(|t| t.kind))
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        match self.next()? {
            Some(token) if token.kind == kind => Ok(token),
            other => Err(unexpected(other, &kind.to_string())),
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        self.expect(TokenKind::Identifier).map(into_text)
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        let Some(token) = self.next()? else {
            return Err(unexpected(None, "an expression"));
        };

        match token.kind {
            TokenKind::Text => Ok(Expr::Text(into_text(token))),
            TokenKind::Parameter => Ok(Expr::Parameter(into_text(token))),
            TokenKind::Wildcard => Ok(Expr::Wildcard),
            TokenKind::Integer => match token.value {
                TokenValue::Integer(value) => Ok(Expr::Integer(value)),
                _ => Err(unexpected(Some(token), "an integer")),
            },
            TokenKind::Identifier => {
                let name = into_text(token);
                if self.peek_kind()? == Some(TokenKind::OpenParenthesis) {
                    self.next()?;
                    let arguments = self.parse_arguments()?;
                    return Ok(Expr::Instance {
                        permission: name,
                        arguments,
                    });
                }
                self.parse_suffixes(Expr::Model(name))
            }
            _ => Err(unexpected(Some(token), "an expression")),
        }
    }

    /// Arguments after an opening parenthesis, through the closing one.
    fn parse_arguments(&mut self) -> Result<Vec<Expr>> {
        let mut arguments = Vec::new();
        if self.peek_kind()? == Some(TokenKind::CloseParenthesis) {
            self.next()?;
            return Ok(arguments);
        }

        loop {
            arguments.push(self.parse_expr()?);
            match self.next()? {
                Some(token) if token.kind == TokenKind::ArgumentSeparator => continue,
                Some(token) if token.kind == TokenKind::CloseParenthesis => return Ok(arguments),
                other => return Err(unexpected(other, "',' or ')'")),
            }
        }
    }

    /// Greedy chain of `.relation` and `#filter(value)` suffixes.
    fn parse_suffixes(&mut self, mut expr: Expr) -> Result<Expr> {
        loop {
            match self.peek_kind()? {
                Some(TokenKind::JoinOperator) => {
                    self.next()?;
                    let relation = self.expect_identifier()?;
                    expr = expr.join(relation);
                }
                Some(TokenKind::FilterOperator) => {
                    self.next()?;
                    let field = self.expect_identifier()?;
                    self.expect(TokenKind::OpenParenthesis)?;
                    let value = self.parse_expr()?;
                    self.expect(TokenKind::CloseParenthesis)?;
                    expr = expr.filter(field, value);
                }
                _ => return Ok(expr),
            }
        }
    }
}

fn into_text(token: Token) -> String {
    match token.value {
        TokenValue::Text(text) => text,
        _ => token.raw,
    }
}

fn unexpected(token: Option<Token>, expected: &str) -> Error {
    Error::Syntax {
        found: token.map(|t| t.to_string()),
        expected: expected.to_string(),
    }
}
