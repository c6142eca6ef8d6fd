//! Expression tokenizer.

use crate::{Error, Result};
use std::fmt;

/// The kind of a lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Text,
    Integer,
    Parameter,
    Identifier,
    JoinOperator,
    FilterOperator,
    OpenParenthesis,
    CloseParenthesis,
    Wildcard,
    ArgumentSeparator,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Text => "a text literal",
            TokenKind::Integer => "an integer",
            TokenKind::Parameter => "a parameter",
            TokenKind::Identifier => "an identifier",
            TokenKind::JoinOperator => "'.'",
            TokenKind::FilterOperator => "'#'",
            TokenKind::OpenParenthesis => "'('",
            TokenKind::CloseParenthesis => "')'",
            TokenKind::Wildcard => "'*'",
            TokenKind::ArgumentSeparator => "','",
        };
        f.write_str(name)
    }
}

/// The decoded value carried by a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenValue {
    /// Operators carry nothing beyond their kind.
    None,
    Integer(i64),
    /// Identifier names, parameter names (without `$`) and unescaped text.
    Text(String),
}

/// A single token with its raw source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub raw: String,
    pub value: TokenValue,
    pub offset: usize,
}

impl Token {
    /// The decoded text of an identifier, parameter or text token.
    pub fn text(&self) -> Option<&str> {
        match &self.value {
            TokenValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}\"", self.kind, self.raw)
    }
}

/// Lazy token stream over an expression string.
///
/// Patterns are tried in a fixed order and the first one that matches wins.
/// The stream ends after the first error.
pub struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    failed: bool,
}

/// Tokenize an expression string.
pub fn tokenize(input: &str) -> Tokenizer<'_> {
    Tokenizer {
        input,
        pos: 0,
        failed: false,
    }
}

impl<'a> Tokenizer<'a> {
    fn next_token(&mut self) -> Option<Result<Token>> {
        let trimmed = self.input[self.pos..].trim_start();
        self.pos = self.input.len() - trimmed.len();

        if trimmed.is_empty() {
            return None;
        }

        let offset = self.pos;
        let result = scan(trimmed).map(|(kind, len, value)| Token {
            kind,
            raw: trimmed[..len].to_string(),
            value,
            offset,
        });

        match &result {
            Ok(token) => self.pos += token.raw.len(),
            Err(_) => self.failed = true,
        }

        Some(result.map_err(|message| Error::Lex {
            position: offset,
            message,
        }))
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        self.next_token()
    }
}

type Scanned = (TokenKind, usize, TokenValue);

fn scan(input: &str) -> std::result::Result<Scanned, String> {
    if let Some(scanned) = scan_text(input) {
        return Ok(scanned);
    }
    if let Some(scanned) = scan_integer(input)? {
        return Ok(scanned);
    }
    if let Some(rest) = input.strip_prefix('$') {
        let len = identifier_len(rest);
        if len > 0 {
            let name = rest[..len].to_string();
            return Ok((TokenKind::Parameter, len + 1, TokenValue::Text(name)));
        }
    }

    let len = identifier_len(input);
    if len > 0 {
        let name = input[..len].to_string();
        return Ok((TokenKind::Identifier, len, TokenValue::Text(name)));
    }

    let kind = match input.chars().next() {
        Some('.') => TokenKind::JoinOperator,
        Some('#') => TokenKind::FilterOperator,
        Some('(') => TokenKind::OpenParenthesis,
        Some(')') => TokenKind::CloseParenthesis,
        Some('*') => TokenKind::Wildcard,
        Some(',') => TokenKind::ArgumentSeparator,
        Some('"') => return Err("unterminated or malformed text literal".to_string()),
        Some(c) => return Err(format!("invalid input starting at '{c}'")),
        None => return Err("unexpected end of input".to_string()),
    };
    Ok((kind, 1, TokenValue::None))
}

/// `"..."` with `\"` and `\\` as the only escapes.
fn scan_text(input: &str) -> Option<Scanned> {
    let body = input.strip_prefix('"')?;
    let mut value = String::new();
    let mut chars = body.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Some((TokenKind::Text, i + 2, TokenValue::Text(value))),
            '\\' => match chars.next() {
                Some((_, escaped @ ('"' | '\\'))) => value.push(escaped),
                _ => return None,
            },
            c => value.push(c),
        }
    }
    None
}

/// `-?[0-9]+`, parsed as an `i64`.
fn scan_integer(input: &str) -> std::result::Result<Option<Scanned>, String> {
    let sign = usize::from(input.starts_with('-'));
    let digits = input[sign..].bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return Ok(None);
    }
    let len = sign + digits;
    let value = input[..len]
        .parse::<i64>()
        .map_err(|_| format!("integer literal '{}' out of range", &input[..len]))?;
    Ok(Some((TokenKind::Integer, len, TokenValue::Integer(value))))
}

/// Length of a `[A-Za-z][A-Za-z0-9_]*` prefix, or 0.
fn identifier_len(input: &str) -> usize {
    let bytes = input.as_bytes();
    match bytes.first() {
        Some(b) if b.is_ascii_alphabetic() => {
            1 + bytes[1..]
                .iter()
                .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
                .count()
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).map(|t| t.unwrap().kind).collect()
    }

    #[test]
    fn test_filter_chain_tokens() {
        assert_eq!(
            kinds("group#id(1).subgroups"),
            vec![
                TokenKind::Identifier,
                TokenKind::FilterOperator,
                TokenKind::Identifier,
                TokenKind::OpenParenthesis,
                TokenKind::Integer,
                TokenKind::CloseParenthesis,
                TokenKind::JoinOperator,
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn test_whitespace_is_skipped() {
        assert_eq!(
            kinds("  create_user ( $me ,\t* )  "),
            vec![
                TokenKind::Identifier,
                TokenKind::OpenParenthesis,
                TokenKind::Parameter,
                TokenKind::ArgumentSeparator,
                TokenKind::Wildcard,
                TokenKind::CloseParenthesis,
            ]
        );
    }

    #[test]
    fn test_negative_integers() {
        let values: Vec<_> = tokenize("-1 0 -9223372036854775808")
            .map(|t| t.unwrap().value)
            .collect();
        assert_eq!(
            values,
            vec![
                TokenValue::Integer(-1),
                TokenValue::Integer(0),
                TokenValue::Integer(i64::MIN),
            ]
        );

        let err = tokenize("-9223372036854775809").next().unwrap().unwrap_err();
        assert!(matches!(err, Error::Lex { position: 0, .. }));
        let err = tokenize("- 1").next().unwrap().unwrap_err();
        assert!(matches!(err, Error::Lex { position: 0, .. }));
    }

    #[test]
    fn test_text_escapes() {
        let token = tokenize(r#""say \"hi\" \\ bye""#).next().unwrap().unwrap();
        assert_eq!(token.kind, TokenKind::Text);
        assert_eq!(token.value, TokenValue::Text(r#"say "hi" \ bye"#.to_string()));
    }

    #[test]
    fn test_unknown_escape_fails() {
        let err = tokenize(r#""a\nb""#).next().unwrap().unwrap_err();
        assert!(matches!(err, Error::Lex { position: 0, .. }));
    }

    #[test]
    fn test_parameter_value_drops_sigil() {
        let token = tokenize("$current_user").next().unwrap().unwrap();
        assert_eq!(token.kind, TokenKind::Parameter);
        assert_eq!(token.text(), Some("current_user"));
        assert_eq!(token.raw, "$current_user");
    }

    #[test]
    fn test_integer_before_identifier() {
        let tokens: Vec<_> = tokenize("12ab").map(|t| t.unwrap()).collect();
        assert_eq!(tokens[0].value, TokenValue::Integer(12));
        assert_eq!(tokens[1].text(), Some("ab"));
    }

    #[test]
    fn test_stream_stops_after_error() {
        let results: Vec<_> = tokenize("user ! group").collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::Lex { position: 5, .. })));
    }
}
