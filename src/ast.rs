//! Abstract Syntax Tree (AST) for Purr
//!
//! The whole tree is built from a single node abstraction: a [`Particle`] is
//! either an [`Atom`] (one token) or a [`Molecule`] (an ordered list of
//! particles whose first element, the subject, names an operation). The tree
//! is immutable after parsing; inferred types and generated values live in
//! side tables keyed by [`NodeId`], not on the nodes themselves.

use crate::span::Span;

/// Identifies one AST node; assigned sequentially by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// Either an atom or a molecule
#[derive(Debug, Clone, PartialEq)]
pub enum Particle {
    Atom(Atom),
    Molecule(Molecule),
}

impl Particle {
    pub fn id(&self) -> NodeId {
        match self {
            Particle::Atom(a) => a.id,
            Particle::Molecule(m) => m.id,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Particle::Atom(a) => a.span,
            Particle::Molecule(m) => m.span,
        }
    }

    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            Particle::Atom(a) => Some(a),
            Particle::Molecule(_) => None,
        }
    }

    pub fn as_molecule(&self) -> Option<&Molecule> {
        match self {
            Particle::Molecule(m) => Some(m),
            Particle::Atom(_) => None,
        }
    }
}

/// A leaf node wrapping one token.
///
/// Construction splits the raw word into its parts: a `Type:` prefix
/// (uppercase first letter) becomes the explicit annotation, an
/// `owner>field` arrow (lowercase first letter) becomes the member-access
/// field. Quoted strings arrive with quotes already stripped and `quoted`
/// set, which is what routes them down the string-literal path instead of a
/// variable lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub id: NodeId,
    /// The literal text (quotes stripped for string literals)
    pub identifier: String,
    /// Explicit type annotation from a `Type:` prefix, if any
    pub ty: Option<String>,
    /// Field name from `owner>field` syntax, if any
    pub member_access: Option<String>,
    /// True for string literals; distinguishes `"x"` from `Str:x`
    pub quoted: bool,
    pub span: Span,
}

impl Atom {
    /// Build an atom from a bare word, splitting type prefix and member
    /// access.
    pub fn from_word(id: NodeId, word: &str, span: Span) -> Self {
        let mut identifier = word.to_string();
        let mut ty = None;
        let mut member_access = None;

        // Type:object syntax (e.g. Int:b, Char:33)
        if let Some(colon) = identifier.find(':') {
            if colon > 0 && identifier.chars().next().is_some_and(|c| c.is_uppercase()) {
                ty = Some(identifier[..colon].to_string());
                identifier = identifier[colon + 1..].to_string();
            }
        }

        // Member access syntax (e.g. bob>name). Only when the word starts
        // with a lowercase letter, so operators like -> are left alone.
        if let Some(arrow) = identifier.find('>') {
            if arrow > 0 && identifier.chars().next().is_some_and(|c| c.is_lowercase()) {
                member_access = Some(identifier[arrow + 1..].to_string());
                identifier = identifier[..arrow].to_string();
            }
        }

        Self {
            id,
            identifier,
            ty,
            member_access,
            quoted: false,
            span,
        }
    }

    /// Build a string-literal atom from quoted text (quotes included).
    pub fn from_string_literal(id: NodeId, text: &str, span: Span) -> Self {
        let inner = text
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(text);
        Self {
            id,
            identifier: inner.to_string(),
            ty: Some("Str".to_string()),
            member_access: None,
            quoted: true,
            span,
        }
    }

    /// Build a bare marker atom (the injected `block` / `array` subjects).
    pub fn marker(id: NodeId, word: &str, span: Span) -> Self {
        Self {
            id,
            identifier: word.to_string(),
            ty: None,
            member_access: None,
            quoted: false,
            span,
        }
    }
}

/// An interior node: subject (child 0) plus predicate (the rest).
#[derive(Debug, Clone, PartialEq)]
pub struct Molecule {
    pub id: NodeId,
    pub children: Vec<Particle>,
    /// Explicit type annotation from `Type:(...)` / `Type:[...]` syntax
    pub ty: Option<String>,
    /// Whether this molecule is executed (vs. treated as a literal list)
    pub eval: bool,
    pub span: Span,
}

impl Molecule {
    pub fn new(id: NodeId, span: Span) -> Self {
        Self {
            id,
            children: Vec::new(),
            ty: None,
            eval: true,
            span,
        }
    }

    /// The operation/marker naming child, if the molecule is non-empty.
    pub fn subject(&self) -> Option<&Particle> {
        self.children.first()
    }

    /// The subject's identifier when the subject is an atom.
    pub fn subject_name(&self) -> Option<&str> {
        self.subject()
            .and_then(|p| p.as_atom())
            .map(|a| a.identifier.as_str())
    }

    /// The operand nodes (everything after the subject).
    pub fn predicate(&self) -> &[Particle] {
        if self.children.len() <= 1 {
            &[]
        } else {
            &self.children[1..]
        }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}
