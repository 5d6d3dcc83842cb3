//! Parser for Purr
//!
//! A recursive descent parser over the token stream. The grammar is tiny:
//! `(op ...)` forms, `{ ... }` blocks (subject atom `block` injected),
//! `[ ... ]` array literals (subject atom `array` injected), quoted strings,
//! bare words, and `Type:(...)` / `Type:[...]` typed sub-expressions.
//!
//! Any closing bracket terminates the current molecule; bracket kinds are
//! not matched pairwise. Running out of input inside a molecule truncates
//! parsing: the partial tree is returned together with a truncation error.

use crate::ast::{Atom, Molecule, NodeId, Particle};
use crate::lexer::Lexer;
use crate::span::Span;
use crate::token::TokenKind;
use thiserror::Error;

/// Parser errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("unmatched bracket: input ended inside a form")]
    Truncated { span: Span },
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::Truncated { span } => *span,
        }
    }
}

/// The parser for Purr
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    next_id: u32,
    errors: Vec<ParseError>,
    truncated: bool,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            lexer: Lexer::new(source),
            next_id: 0,
            errors: Vec::new(),
            truncated: false,
        }
    }

    fn fresh_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Parse one molecule from the source: skip ahead to the first opening
    /// bracket and consume the form it opens. With no opening bracket at all
    /// the result is an empty molecule, which callers treat as a no-op.
    pub fn parse(mut self) -> (Molecule, Vec<ParseError>) {
        loop {
            let token = self.lexer.next_token();
            if token.kind == TokenKind::Eof {
                let molecule = Molecule::new(self.fresh_id(), token.span);
                return (molecule, self.errors);
            }
            if token.kind.is_open() {
                let molecule = self.parse_molecule(token.kind, token.span);
                return (molecule, self.errors);
            }
        }
    }

    /// Parse the body of a molecule whose opening bracket has been consumed.
    fn parse_molecule(&mut self, open: TokenKind, open_span: Span) -> Molecule {
        let mut molecule = Molecule::new(self.fresh_id(), open_span);

        match open {
            TokenKind::LBrace => {
                let id = self.fresh_id();
                molecule
                    .children
                    .push(Particle::Atom(Atom::marker(id, "block", open_span)));
            }
            TokenKind::LBracket => {
                let id = self.fresh_id();
                molecule
                    .children
                    .push(Particle::Atom(Atom::marker(id, "array", open_span)));
            }
            _ => {}
        }

        loop {
            let token = self.lexer.peek().clone();
            match token.kind {
                TokenKind::Eof => {
                    if !self.truncated {
                        self.truncated = true;
                        self.errors.push(ParseError::Truncated { span: token.span });
                    }
                    break;
                }
                kind if kind.is_close() => {
                    self.lexer.next_token();
                    molecule.span = molecule.span.merge(token.span);
                    break;
                }
                kind if kind.is_open() => {
                    self.lexer.next_token();
                    let child = self.parse_molecule(kind, token.span);
                    molecule.span = molecule.span.merge(child.span);
                    molecule.children.push(Particle::Molecule(child));
                }
                TokenKind::StringLiteral => {
                    self.lexer.next_token();
                    let id = self.fresh_id();
                    let text = token.span.text(self.lexer.source()).to_string();
                    molecule.span = molecule.span.merge(token.span);
                    molecule
                        .children
                        .push(Particle::Atom(Atom::from_string_literal(
                            id, &text, token.span,
                        )));
                }
                TokenKind::Word => {
                    self.lexer.next_token();
                    let text = token.span.text(self.lexer.source()).to_string();

                    // Type:(...) / Type:[...] — a word ending in `:` with an
                    // opening bracket directly adjacent is a typed
                    // sub-expression; the prefix becomes the child's type.
                    let next = self.lexer.peek().clone();
                    let adjacent = next.span.start == token.span.end;
                    let typed_open = matches!(next.kind, TokenKind::LParen | TokenKind::LBracket);
                    if text.len() > 1 && text.ends_with(':') && adjacent && typed_open {
                        self.lexer.next_token();
                        let mut child = self.parse_molecule(next.kind, next.span);
                        child.ty = Some(text[..text.len() - 1].to_string());
                        molecule.span = molecule.span.merge(child.span);
                        molecule.children.push(Particle::Molecule(child));
                        continue;
                    }

                    let id = self.fresh_id();
                    molecule.span = molecule.span.merge(token.span);
                    molecule
                        .children
                        .push(Particle::Atom(Atom::from_word(id, &text, token.span)));
                }
                _ => {
                    // Eof handled above; nothing else is produced
                    self.lexer.next_token();
                }
            }
        }

        molecule
    }
}

/// Parse source into a molecule tree, collecting errors along the way
pub fn parse(source: &str) -> (Molecule, Vec<ParseError>) {
    Parser::new(source).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flatten a tree into a comparable shape: subject/atom names with
    /// nesting, ignoring node ids and spans.
    fn shape(m: &Molecule) -> String {
        let mut out = String::from("(");
        for (i, child) in m.children.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            match child {
                Particle::Atom(a) => out.push_str(&a.identifier),
                Particle::Molecule(child) => out.push_str(&shape(child)),
            }
        }
        out.push(')');
        out
    }

    #[test]
    fn test_empty_input_is_noop_molecule() {
        let (m, errors) = parse("no brackets here");
        assert!(m.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn test_simple_form() {
        let (m, errors) = parse("(+ 1 2)");
        assert!(errors.is_empty());
        assert_eq!(shape(&m), "(+ 1 2)");
    }

    #[test]
    fn test_block_subject_injected() {
        let (m, _) = parse("{ (meow \"hi\") }");
        assert_eq!(m.subject_name(), Some("block"));
        assert_eq!(shape(&m), "(block (meow hi))");
    }

    #[test]
    fn test_array_subject_injected() {
        let (m, _) = parse("[1 2 3]");
        assert_eq!(m.subject_name(), Some("array"));
        assert_eq!(shape(&m), "(array 1 2 3)");
    }

    #[test]
    fn test_nesting() {
        let (m, errors) = parse("{ (def Int:x (+ 1 (* 2 3))) }");
        assert!(errors.is_empty());
        assert_eq!(shape(&m), "(block (def x (+ 1 (* 2 3))))");
    }

    #[test]
    fn test_typed_atom() {
        let (m, _) = parse("(def Int:x 5)");
        let atom = m.children[1].as_atom().unwrap();
        assert_eq!(atom.identifier, "x");
        assert_eq!(atom.ty.as_deref(), Some("Int"));
    }

    #[test]
    fn test_typed_subexpression() {
        let (m, _) = parse("(def Person:bob Person:[\"bob\" 30 true])");
        let lit = m.children[2].as_molecule().unwrap();
        assert_eq!(lit.ty.as_deref(), Some("Person"));
        assert_eq!(lit.subject_name(), Some("array"));
    }

    #[test]
    fn test_typed_subexpression_requires_adjacency() {
        // With whitespace between `Person:` and `[`, the word is a plain
        // atom and the bracket opens an untyped array literal.
        let (m, _) = parse("(def x Person: [1])");
        let lit = m.children[3].as_molecule().unwrap();
        assert_eq!(lit.ty, None);
    }

    #[test]
    fn test_typed_fun_signature() {
        let (m, _) = parse("(fun Int:(addInts Int:a Int:b) { (return (+ a b)) })");
        let sig = m.children[1].as_molecule().unwrap();
        assert_eq!(sig.ty.as_deref(), Some("Int"));
        assert_eq!(sig.subject_name(), Some("addInts"));
    }

    #[test]
    fn test_member_access_atom() {
        let (m, _) = parse("(meow bob>name)");
        let atom = m.children[1].as_atom().unwrap();
        assert_eq!(atom.identifier, "bob");
        assert_eq!(atom.member_access.as_deref(), Some("name"));
    }

    #[test]
    fn test_string_literal_keeps_spaces() {
        let (m, _) = parse("(meow \"hello world\")");
        let atom = m.children[1].as_atom().unwrap();
        assert_eq!(atom.identifier, "hello world");
        assert!(atom.quoted);
    }

    #[test]
    fn test_parse_is_idempotent_on_balanced_subspans() {
        // Parsing a balanced sub-span in isolation yields the same shape as
        // parsing it in place.
        let source = "{ (def Int:x (+ 1 2)) }";
        let (whole, _) = parse(source);
        let inner = whole.children[1].as_molecule().unwrap();

        let (isolated, errors) = parse("(def Int:x (+ 1 2))");
        assert!(errors.is_empty());
        assert_eq!(shape(inner), shape(&isolated));
    }

    #[test]
    fn test_unmatched_bracket_truncates() {
        let (m, errors) = parse("{ (def Int:x 5 }");
        // The partial tree is still produced...
        assert_eq!(m.subject_name(), Some("block"));
        // ...and exactly one truncation error is recorded.
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ParseError::Truncated { .. }));
    }

    #[test]
    fn test_any_closer_terminates() {
        // Bracket kinds are counted together, not matched pairwise.
        let (m, errors) = parse("(+ 1 2]");
        assert!(errors.is_empty());
        assert_eq!(shape(&m), "(+ 1 2)");
    }
}
