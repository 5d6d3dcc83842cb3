//! Token definitions for Purr
//!
//! The token layer is deliberately small: the surface syntax is brackets,
//! quoted strings, and bare words. Everything else (type prefixes, member
//! access, literal classification) happens during atom construction.

use crate::span::Span;
use logos::Logos;
use std::fmt;

/// A token produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Get the text of this token from source
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        self.span.text(source)
    }
}

/// All possible token types in Purr
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")] // Skip whitespace
pub enum TokenKind {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    /// String literal: "hello" (no escape sequences; the quote ends it)
    #[regex(r#""[^"]*""#)]
    StringLiteral,

    /// A bare word: identifier, number, operator, keyword, `Type:name`,
    /// `owner>field` — anything up to whitespace, a bracket, or a quote
    #[regex(r#"[^ \t\r\n\f()\[\]{}"]+"#)]
    Word,

    /// End of input
    Eof,
}

impl TokenKind {
    /// Is this one of the three opening brackets?
    pub fn is_open(self) -> bool {
        matches!(
            self,
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace
        )
    }

    /// Is this one of the three closing brackets?
    pub fn is_close(self) -> bool {
        matches!(
            self,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::StringLiteral => "string literal",
            TokenKind::Word => "word",
            TokenKind::Eof => "end of input",
        };
        write!(f, "{}", s)
    }
}
