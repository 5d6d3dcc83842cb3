//! Lexer for Purr
//!
//! The lexer converts preprocessed source into a stream of tokens.
//! It uses the `logos` crate for the actual scanning.

use crate::span::Span;
use crate::token::{Token, TokenKind};
use logos::Logos;
use thiserror::Error;

/// Lexer errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexerError {
    #[error("unexpected character at position {0}")]
    UnexpectedChar(usize),
}

/// The lexer for Purr
pub struct Lexer<'src> {
    source: &'src str,
    inner: logos::Lexer<'src, TokenKind>,
    peeked: Option<Token>,
    errors: Vec<LexerError>,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source code
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            inner: TokenKind::lexer(source),
            peeked: None,
            errors: Vec::new(),
        }
    }

    /// Get the source code
    pub fn source(&self) -> &'src str {
        self.source
    }

    /// Get any errors that occurred during lexing
    pub fn errors(&self) -> &[LexerError] {
        &self.errors
    }

    /// Peek at the next token without consuming it
    pub fn peek(&mut self) -> &Token {
        if self.peeked.is_none() {
            self.peeked = Some(self.advance());
        }
        self.peeked.as_ref().unwrap()
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Token {
        if let Some(token) = self.peeked.take() {
            return token;
        }
        self.advance()
    }

    fn advance(&mut self) -> Token {
        loop {
            match self.inner.next() {
                Some(Ok(kind)) => {
                    let span = self.inner.span();
                    return Token::new(kind, Span::new(span.start, span.end));
                }
                Some(Err(())) => {
                    // Skip invalid input and record the error
                    let span = self.inner.span();
                    self.errors.push(LexerError::UnexpectedChar(span.start));
                    continue;
                }
                None => {
                    let pos = self.source.len();
                    return Token::new(TokenKind::Eof, Span::new(pos, pos));
                }
            }
        }
    }

    /// Collect all tokens into a vector
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<LexerError>) {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        (tokens, self.errors)
    }
}

/// Helper function to lex source code
pub fn lex(source: &str) -> (Vec<Token>, Vec<LexerError>) {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, _) = lex(source);
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_empty_source() {
        assert_eq!(token_kinds(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_brackets() {
        assert_eq!(
            token_kinds("( ) [ ] { }"),
            vec![
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_words_and_strings() {
        assert_eq!(
            token_kinds(r#"(meow "hello world")"#),
            vec![
                TokenKind::LParen,
                TokenKind::Word,
                TokenKind::StringLiteral,
                TokenKind::RParen,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_word_splits_at_bracket() {
        // A form with no whitespace before the close still yields a clean
        // word + bracket pair.
        assert_eq!(
            token_kinds("(+ x y)"),
            vec![
                TokenKind::LParen,
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::RParen,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_typed_prefix_is_one_word() {
        let (tokens, _) = lex("Int:x");
        assert_eq!(tokens[0].kind, TokenKind::Word);
        assert_eq!(tokens[0].text("Int:x"), "Int:x");
    }

    #[test]
    fn test_typed_subexpression_adjacency() {
        // `Person:[` lexes as a word ending in `:` directly followed by `[`;
        // the parser relies on the spans touching.
        let source = "Person:[1 2]";
        let (tokens, _) = lex(source);
        assert_eq!(tokens[0].kind, TokenKind::Word);
        assert_eq!(tokens[0].text(source), "Person:");
        assert_eq!(tokens[1].kind, TokenKind::LBracket);
        assert_eq!(tokens[0].span.end, tokens[1].span.start);
    }

    #[test]
    fn test_span_tracking() {
        let source = "(def Int:x 5)";
        let (tokens, _) = lex(source);
        assert_eq!(tokens[1].span.text(source), "def");
        assert_eq!(tokens[2].span.text(source), "Int:x");
        assert_eq!(tokens[3].span.text(source), "5");
    }
}
