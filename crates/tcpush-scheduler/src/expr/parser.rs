//! Precedence-climbing parser for the expression language.

use serde_json::Value;
use tcpush_core::{Error, Result};

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::lexer::{Lexer, Token, TokenKind};

/// Deepest nesting of parentheses, brackets and unary operators accepted.
const MAX_DEPTH: usize = 128;

/// Parse a complete expression; trailing input is an error.
pub fn parse_expression(src: &str) -> Result<Expr> {
    let mut parser = Parser::new(src)?;
    let expr = parser.expression(0)?;
    match parser.current.kind {
        TokenKind::Eof => Ok(expr),
        _ => Err(parser.unexpected()),
    }
}

/// Parse an expression terminated by `}`, as found after `${`.
///
/// Returns the expression and the byte offset just past the closing brace.
pub fn parse_embedded(src: &str) -> Result<(Expr, usize)> {
    let mut parser = Parser::new(src)?;
    let expr = parser.expression(0)?;
    match parser.current.kind {
        TokenKind::RBrace => Ok((expr, parser.current.end)),
        TokenKind::Eof => Err(Error::Expression(format!(
            "unterminated interpolation in \"{}\"",
            src
        ))),
        _ => Err(parser.unexpected()),
    }
}

struct Parser<'a> {
    src: &'a str,
    lexer: Lexer<'a>,
    current: Token,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Result<Self> {
        let mut lexer = Lexer::new(src);
        let current = lexer.next_token()?;
        Ok(Self {
            src,
            lexer,
            current,
            depth: 0,
        })
    }

    fn advance(&mut self) -> Result<Token> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn expect(&mut self, kind: TokenKind) -> Result<()> {
        if self.current.kind == kind {
            self.advance()?;
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> Error {
        match &self.current.kind {
            TokenKind::Eof => {
                Error::Expression(format!("unexpected end of expression \"{}\"", self.src))
            }
            _ => Error::Expression(format!(
                "unexpected '{}' at {} in \"{}\"",
                &self.src[self.current.start..self.current.end],
                self.current.start,
                self.src
            )),
        }
    }

    fn expression(&mut self, min_precedence: u8) -> Result<Expr> {
        let mut lhs = self.unary()?;

        while let Some(op) = binary_op(&self.current.kind) {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            self.advance()?;
            let rhs = self.expression(precedence + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }

        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.depth >= MAX_DEPTH {
            return Err(Error::Expression(format!(
                "expression nested deeper than {} levels in \"{}\"",
                MAX_DEPTH,
                truncated(self.src)
            )));
        }
        self.depth += 1;
        let result = self.prefixed();
        self.depth -= 1;
        result
    }

    fn prefixed(&mut self) -> Result<Expr> {
        let op = match self.current.kind {
            TokenKind::Not => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Pos,
            _ => return self.postfix(),
        };
        self.advance()?;
        Ok(Expr::Unary(op, Box::new(self.unary()?)))
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;

        loop {
            match self.current.kind {
                TokenKind::Dot => {
                    self.advance()?;
                    match self.advance()?.kind {
                        TokenKind::Ident(name) => {
                            expr = Expr::Member(Box::new(expr), name);
                        }
                        _ => {
                            return Err(Error::Expression(format!(
                                "expected a property name after '.' in \"{}\"",
                                self.src
                            )));
                        }
                    }
                }
                TokenKind::LBracket => {
                    self.advance()?;
                    let index = self.expression(0)?;
                    self.expect(TokenKind::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                TokenKind::LParen => {
                    let Expr::Ident(name) = expr else {
                        return Err(Error::Expression(format!(
                            "only named functions can be called in \"{}\"",
                            self.src
                        )));
                    };
                    self.advance()?;
                    let args = self.list(TokenKind::RParen)?;
                    expr = Expr::Call(name, args);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        let token = self.advance()?;
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::String(s))),
            TokenKind::True => Ok(Expr::Literal(Value::Bool(true))),
            TokenKind::False => Ok(Expr::Literal(Value::Bool(false))),
            TokenKind::Null => Ok(Expr::Literal(Value::Null)),
            TokenKind::Ident(name) => Ok(Expr::Ident(name)),
            TokenKind::LParen => {
                let inner = self.expression(0)?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => Ok(Expr::Array(self.list(TokenKind::RBracket)?)),
            TokenKind::LBrace => self.object(),
            _ => {
                self.current = token;
                Err(self.unexpected())
            }
        }
    }

    /// Comma separated expressions up to `close`, which is consumed.
    fn list(&mut self, close: TokenKind) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        if self.current.kind == close {
            self.advance()?;
            return Ok(items);
        }
        loop {
            items.push(self.expression(0)?);
            if self.current.kind == TokenKind::Comma {
                self.advance()?;
                continue;
            }
            self.expect(close)?;
            return Ok(items);
        }
    }

    fn object(&mut self) -> Result<Expr> {
        let mut entries = Vec::new();
        if self.current.kind == TokenKind::RBrace {
            self.advance()?;
            return Ok(Expr::Object(entries));
        }
        loop {
            let key = match self.advance()?.kind {
                TokenKind::Ident(name) | TokenKind::Str(name) => name,
                _ => {
                    return Err(Error::Expression(format!(
                        "object keys must be names or strings in \"{}\"",
                        self.src
                    )));
                }
            };
            self.expect(TokenKind::Colon)?;
            entries.push((key, self.expression(0)?));
            if self.current.kind == TokenKind::Comma {
                self.advance()?;
                continue;
            }
            self.expect(TokenKind::RBrace)?;
            return Ok(Expr::Object(entries));
        }
    }
}

fn truncated(src: &str) -> &str {
    match src.char_indices().nth(40) {
        Some((end, _)) => &src[..end],
        None => src,
    }
}

fn binary_op(kind: &TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::OrOr => BinaryOp::Or,
        TokenKind::AndAnd => BinaryOp::And,
        TokenKind::In => BinaryOp::In,
        TokenKind::EqEq => BinaryOp::Eq,
        TokenKind::NotEq => BinaryOp::NotEq,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Le => BinaryOp::Le,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::Ge => BinaryOp::Ge,
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Mod,
        _ => return None,
    })
}
