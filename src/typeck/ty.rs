//! Logical types
//!
//! The language-level type vocabulary. Every type also has a fixed native
//! lowering tag ([`Ty::native`]) used only for backend emission: scalars map
//! to machine scalars, and everything else — strings, arrays, structs, the
//! unknown placeholder — is pointer-shaped.

use crate::ir::IrType;
use std::fmt;

/// A logical type name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    Int,
    Float,
    Bool,
    Char,
    Str,
    Nil,
    /// Unknown/dynamic placeholder
    Var,
    /// Growable array of elements
    Array(Box<Ty>),
    /// A struct name (or an annotation we don't recognize)
    Named(String),
}

impl Ty {
    pub fn array(element: Ty) -> Self {
        Ty::Array(Box::new(element))
    }

    /// Parse a type annotation as written in source
    pub fn from_name(name: &str) -> Ty {
        match name {
            "Int" => Ty::Int,
            "Float" => Ty::Float,
            "Bool" => Ty::Bool,
            "Char" => Ty::Char,
            "Str" => Ty::Str,
            "Nil" => Ty::Nil,
            "Var" => Ty::Var,
            _ => {
                if let Some(inner) = name
                    .strip_prefix("Array<")
                    .and_then(|s| s.strip_suffix('>'))
                {
                    Ty::array(Ty::from_name(inner))
                } else {
                    Ty::Named(name.to_string())
                }
            }
        }
    }

    /// The fixed low-level representation tag for backend lowering
    pub fn native(&self) -> IrType {
        match self {
            Ty::Int => IrType::I32,
            Ty::Float => IrType::F32,
            Ty::Bool => IrType::Bool,
            Ty::Char => IrType::I8,
            Ty::Nil => IrType::Void,
            Ty::Str | Ty::Var | Ty::Array(_) | Ty::Named(_) => IrType::Ptr,
        }
    }

    /// Element type for indexing: `Str` is an array of chars, `Array<T>`
    /// yields `T`, anything else degrades to the unknown placeholder.
    pub fn element(&self) -> Ty {
        match self {
            Ty::Str => Ty::Char,
            Ty::Array(inner) => (**inner).clone(),
            _ => Ty::Var,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Ty::Int | Ty::Float)
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Int => write!(f, "Int"),
            Ty::Float => write!(f, "Float"),
            Ty::Bool => write!(f, "Bool"),
            Ty::Char => write!(f, "Char"),
            Ty::Str => write!(f, "Str"),
            Ty::Nil => write!(f, "Nil"),
            Ty::Var => write!(f, "Var"),
            Ty::Array(inner) => write!(f, "Array<{}>", inner),
            Ty::Named(name) => write!(f, "{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for name in ["Int", "Float", "Bool", "Char", "Str", "Nil", "Var"] {
            assert_eq!(Ty::from_name(name).to_string(), name);
        }
    }

    #[test]
    fn test_array_parsing() {
        assert_eq!(Ty::from_name("Array<Int>"), Ty::array(Ty::Int));
        assert_eq!(
            Ty::from_name("Array<Array<Char>>"),
            Ty::array(Ty::array(Ty::Char))
        );
    }

    #[test]
    fn test_unknown_names_stay_named() {
        assert_eq!(Ty::from_name("Person"), Ty::Named("Person".to_string()));
    }

    #[test]
    fn test_native_tags() {
        assert_eq!(Ty::Int.native(), IrType::I32);
        assert_eq!(Ty::Float.native(), IrType::F32);
        assert_eq!(Ty::Bool.native(), IrType::Bool);
        assert_eq!(Ty::Char.native(), IrType::I8);
        assert_eq!(Ty::Nil.native(), IrType::Void);
        assert_eq!(Ty::Str.native(), IrType::Ptr);
        assert_eq!(Ty::array(Ty::Int).native(), IrType::Ptr);
        assert_eq!(Ty::from_name("Person").native(), IrType::Ptr);
    }

    #[test]
    fn test_element_types() {
        assert_eq!(Ty::Str.element(), Ty::Char);
        assert_eq!(Ty::array(Ty::Int).element(), Ty::Int);
        assert_eq!(Ty::Int.element(), Ty::Var);
    }
}
