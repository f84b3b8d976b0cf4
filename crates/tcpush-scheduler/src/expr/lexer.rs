//! Tokenizer for the expression language.
//!
//! Tokens are produced on demand so that an expression embedded in a longer
//! string (`${...}`) can be read up to its closing brace without touching the
//! text that follows.

use serde_json::Number;
use tcpush_core::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(Number),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Not,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset just past the last character.
    pub end: usize,
}

pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();
        let start = self.pos;
        let rest = &self.src[start..];

        let Some(c) = rest.chars().next() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                start,
                end: start,
            });
        };

        let kind = match c {
            '0'..='9' => return self.number(start),
            '"' | '\'' => return self.string(start, c),
            c if c.is_ascii_alphabetic() || c == '_' => return Ok(self.ident(start)),
            _ => {
                let two = rest.get(..2).unwrap_or("");
                let (kind, len) = match two {
                    "<=" => (TokenKind::Le, 2),
                    ">=" => (TokenKind::Ge, 2),
                    "==" => (TokenKind::EqEq, 2),
                    "!=" => (TokenKind::NotEq, 2),
                    "&&" => (TokenKind::AndAnd, 2),
                    "||" => (TokenKind::OrOr, 2),
                    _ => (self.single(c, start)?, 1),
                };
                self.pos += len;
                kind
            }
        };

        Ok(Token {
            kind,
            start,
            end: self.pos,
        })
    }

    fn single(&self, c: char, at: usize) -> Result<TokenKind> {
        Ok(match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            '!' => TokenKind::Not,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            other => {
                return Err(Error::Expression(format!(
                    "unexpected character '{}' at {} in \"{}\"",
                    other, at, self.src
                )));
            }
        })
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.src[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn number(&mut self, start: usize) -> Result<Token> {
        let bytes = self.src.as_bytes();
        let mut end = start;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        let mut fractional = false;
        if end + 1 < bytes.len() && bytes[end] == b'.' && bytes[end + 1].is_ascii_digit() {
            fractional = true;
            end += 1;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }

        let text = &self.src[start..end];
        let number = if fractional {
            text.parse::<f64>().ok().and_then(Number::from_f64)
        } else {
            text.parse::<i64>().ok().map(Number::from)
        }
        .ok_or_else(|| Error::Expression(format!("invalid number literal '{}'", text)))?;

        self.pos = end;
        Ok(Token {
            kind: TokenKind::Number(number),
            start,
            end,
        })
    }

    fn string(&mut self, start: usize, quote: char) -> Result<Token> {
        let body_start = start + quote.len_utf8();
        let close = self.src[body_start..].find(quote).ok_or_else(|| {
            Error::Expression(format!("unterminated string at {} in \"{}\"", start, self.src))
        })?;
        let body_end = body_start + close;
        self.pos = body_end + quote.len_utf8();
        Ok(Token {
            kind: TokenKind::Str(self.src[body_start..body_end].to_string()),
            start,
            end: self.pos,
        })
    }

    fn ident(&mut self, start: usize) -> Token {
        let len = self.src[start..]
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(self.src.len() - start);
        let end = start + len;
        let word = &self.src[start..end];
        self.pos = end;

        let kind = match word {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            "in" => TokenKind::In,
            _ => TokenKind::Ident(word.to_string()),
        };
        Token { kind, start, end }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token().unwrap();
            if token.kind == TokenKind::Eof {
                return out;
            }
            out.push(token.kind);
        }
    }

    #[test]
    fn test_membership_condition() {
        assert_eq!(
            kinds(r#""@" in push.owner"#),
            vec![
                TokenKind::Str("@".into()),
                TokenKind::In,
                TokenKind::Ident("push".into()),
                TokenKind::Dot,
                TokenKind::Ident("owner".into()),
            ]
        );
    }

    #[test]
    fn test_call_with_single_quotes() {
        assert_eq!(
            kinds("as_slugid('decision')"),
            vec![
                TokenKind::Ident("as_slugid".into()),
                TokenKind::LParen,
                TokenKind::Str("decision".into()),
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn test_operators_and_numbers() {
        assert_eq!(
            kinds("1.5<=2&&x!=3||!y"),
            vec![
                TokenKind::Number(Number::from_f64(1.5).unwrap()),
                TokenKind::Le,
                TokenKind::Number(2.into()),
                TokenKind::AndAnd,
                TokenKind::Ident("x".into()),
                TokenKind::NotEq,
                TokenKind::Number(3.into()),
                TokenKind::OrOr,
                TokenKind::Not,
                TokenKind::Ident("y".into()),
            ]
        );
    }

    #[test]
    fn test_stops_at_brace() {
        let mut lexer = Lexer::new("a} trailing @ text");
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Ident("a".into()));
        let close = lexer.next_token().unwrap();
        assert_eq!(close.kind, TokenKind::RBrace);
        assert_eq!(close.end, 2);
    }

    #[test]
    fn test_errors() {
        assert!(Lexer::new("'open").next_token().is_err());
        assert!(Lexer::new("@").next_token().is_err());
    }
}
