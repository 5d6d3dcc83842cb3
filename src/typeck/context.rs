//! Compilation context
//!
//! One [`Context`] value owns every registry the passes share: the variable
//! table, struct registry, overload candidate lists, the operation table,
//! the per-node side tables for inferred types and generated values, and
//! the diagnostics sink. It is threaded explicitly through every pass; there
//! is no global mutable state, so independent compilations never interfere.

use crate::ast::NodeId;
use crate::diag::Diagnostics;
use crate::ir::{CmpOp, VReg};
use crate::typeck::Ty;
use std::collections::HashMap;

/// A variable table entry: declared type plus, once storage exists, the
/// register holding the variable's storage location.
#[derive(Debug, Clone)]
pub struct VarEntry {
    pub ty: Ty,
    pub slot: Option<VReg>,
}

/// A struct definition: ordered fields plus the extern flag that switches
/// between value semantics (C-compatible) and reference semantics.
#[derive(Debug, Clone)]
pub struct StructInfo {
    pub name: String,
    pub field_names: Vec<String>,
    pub field_types: Vec<Ty>,
    pub is_extern: bool,
}

impl StructInfo {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_names.iter().position(|f| f == name)
    }

    /// Total byte size under the extern-struct ABI approximation: 1 byte for
    /// Char/Bool, 4 for Int/Float, 8 for anything pointer-shaped. Alignment
    /// and padding are ignored (known limitation).
    pub fn abi_byte_size(&self) -> usize {
        self.field_types
            .iter()
            .map(|ty| match ty {
                Ty::Char | Ty::Bool => 1,
                Ty::Int | Ty::Float => 4,
                _ => 8,
            })
            .sum()
    }
}

/// Arithmetic selector shared by `+ - * / %` and the compound forms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Compound (mutating) arithmetic forms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundOp {
    /// `++` (and its alias `eat`): unary, adds one
    Incr,
    /// `--` (and its alias `exercise`): unary, subtracts one
    Decr,
    /// `+=`: binary
    AddAssign,
    /// `-=`: binary
    SubAssign,
}

/// What an operation does. Code generation and type inference both dispatch
/// on this; `fun`/`extern` declarations insert the two function-shaped kinds
/// at compile time.
#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    Arith(ArithOp),
    Compound(CompoundOp),
    Compare(CmpOp),
    LogicAnd,
    LogicOr,
    LogicNot,
    Def,
    Assign,
    /// `meow`: the print primitive
    Print,
    Return,
    /// `->S`
    ConvToStr,
    /// `->I`
    ConvToInt,
    ArrayLit,
    ArrayLen,
    ArrayGet,
    ArraySet,
    ArrayAppend,
    ArrayInsert,
    ArrayRemove,
    ArrayPopBack,
    /// A function declared with `fun`
    UserFn { func: String, ret: Ty },
    /// A foreign function declared with `extern`
    ExternFn { func: String, ret: Ty },
}

/// An entry in the operation table: the dispatch kind plus the
/// parameter-type signature used for overload matching (empty for
/// built-ins, which never participate as overload candidates).
#[derive(Debug, Clone, PartialEq)]
pub struct Op {
    pub kind: OpKind,
    pub params: Vec<Ty>,
}

impl Op {
    pub fn builtin(kind: OpKind) -> Self {
        Self {
            kind,
            params: Vec::new(),
        }
    }
}

/// The compilation context threaded through every pass
pub struct Context {
    /// Variable table: name -> (declared type, storage location)
    pub vars: HashMap<String, VarEntry>,
    /// Struct registry: name -> definition
    pub structs: HashMap<String, StructInfo>,
    /// Overload registry: operator name -> ordered candidate names
    pub overloads: HashMap<String, Vec<String>>,
    /// Operation table: built-ins plus user/extern functions
    pub ops: HashMap<String, Op>,
    /// Inferred types, memoized per node
    pub node_types: HashMap<NodeId, Ty>,
    /// Generated value handles per node
    pub node_values: HashMap<NodeId, VReg>,
    /// Collected diagnostics
    pub diags: Diagnostics,
}

impl Context {
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
            structs: HashMap::new(),
            overloads: HashMap::new(),
            ops: builtin_ops(),
            node_types: HashMap::new(),
            node_values: HashMap::new(),
            diags: Diagnostics::new(),
        }
    }

    /// Is this logical type a registered struct?
    pub fn struct_of(&self, ty: &Ty) -> Option<&StructInfo> {
        match ty {
            Ty::Named(name) => self.structs.get(name),
            _ => None,
        }
    }

    pub fn is_extern_struct(&self, ty: &Ty) -> bool {
        self.struct_of(ty).is_some_and(|s| s.is_extern)
    }

    /// Pointer-shaped field types (Str or a registered struct) get re-wrapped
    /// in a fresh indirection cell on field access.
    pub fn is_pointer_field(&self, ty: &Ty) -> bool {
        matches!(ty, Ty::Str) || self.struct_of(ty).is_some()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// The built-in operation table, installed once per context
fn builtin_ops() -> HashMap<String, Op> {
    let mut ops = HashMap::new();
    let mut add = |name: &str, kind: OpKind| {
        ops.insert(name.to_string(), Op::builtin(kind));
    };

    // arithmetic
    add("+", OpKind::Arith(ArithOp::Add));
    add("-", OpKind::Arith(ArithOp::Sub));
    add("*", OpKind::Arith(ArithOp::Mul));
    add("/", OpKind::Arith(ArithOp::Div));
    add("%", OpKind::Arith(ArithOp::Rem));

    // mutating arithmetic
    add("++", OpKind::Compound(CompoundOp::Incr));
    add("eat", OpKind::Compound(CompoundOp::Incr));
    add("--", OpKind::Compound(CompoundOp::Decr));
    add("exercise", OpKind::Compound(CompoundOp::Decr));
    add("+=", OpKind::Compound(CompoundOp::AddAssign));
    add("-=", OpKind::Compound(CompoundOp::SubAssign));

    // comparison
    add("==", OpKind::Compare(CmpOp::Eq));
    add("!=", OpKind::Compare(CmpOp::Ne));
    add(">", OpKind::Compare(CmpOp::Sgt));
    add(">=", OpKind::Compare(CmpOp::Sge));
    add("<", OpKind::Compare(CmpOp::Slt));
    add("<=", OpKind::Compare(CmpOp::Sle));

    // logic
    add("!", OpKind::LogicNot);
    add("&&", OpKind::LogicAnd);
    add("||", OpKind::LogicOr);

    // declaration and reassignment
    add("def", OpKind::Def);
    add("=", OpKind::Assign);

    // output
    add("meow", OpKind::Print);

    add("return", OpKind::Return);

    // typecasts
    add("->S", OpKind::ConvToStr);
    add("->I", OpKind::ConvToInt);

    // arrays and strings
    add("array", OpKind::ArrayLit);
    add("len", OpKind::ArrayLen);
    add("get", OpKind::ArrayGet);
    add("set", OpKind::ArraySet);
    add("append", OpKind::ArrayAppend);
    add("insert", OpKind::ArrayInsert);
    add("remove", OpKind::ArrayRemove);
    add("pop_back", OpKind::ArrayPopBack);

    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_installed() {
        let ctx = Context::new();
        for name in ["+", "==", "def", "=", "meow", "array", "append", "->S"] {
            assert!(ctx.ops.contains_key(name), "missing builtin `{}`", name);
        }
        assert_eq!(
            ctx.ops["exercise"].kind,
            OpKind::Compound(CompoundOp::Decr)
        );
    }

    #[test]
    fn test_abi_byte_size() {
        // (extern-struct Color [Char:r Char:g Char:b Char:a]) -> 4 bytes
        let color = StructInfo {
            name: "Color".to_string(),
            field_names: vec!["r".into(), "g".into(), "b".into(), "a".into()],
            field_types: vec![Ty::Char, Ty::Char, Ty::Char, Ty::Char],
            is_extern: true,
        };
        assert_eq!(color.abi_byte_size(), 4);

        let mixed = StructInfo {
            name: "Mixed".to_string(),
            field_names: vec!["a".into(), "b".into(), "s".into()],
            field_types: vec![Ty::Int, Ty::Bool, Ty::Str],
            is_extern: true,
        };
        assert_eq!(mixed.abi_byte_size(), 13);
    }

    #[test]
    fn test_field_index() {
        let person = StructInfo {
            name: "Person".to_string(),
            field_names: vec!["name".into(), "age".into()],
            field_types: vec![Ty::Str, Ty::Int],
            is_extern: false,
        };
        assert_eq!(person.field_index("age"), Some(1));
        assert_eq!(person.field_index("height"), None);
    }
}
