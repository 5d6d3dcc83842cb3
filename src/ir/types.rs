//! IR Types
//!
//! Type representations for the Purr IR.

use std::fmt;

/// A virtual register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VReg(pub u32);

impl fmt::Display for VReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A basic block label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// IR types (the fixed low-level representation tags)
#[derive(Debug, Clone, PartialEq)]
pub enum IrType {
    /// Void/unit type
    Void,
    /// Boolean (1 bit)
    Bool,
    /// 8-bit integer (chars, string bytes)
    I8,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer (byte counts, sizes)
    I64,
    /// 32-bit float
    F32,
    /// 64-bit float (C varargs promotion)
    F64,
    /// Opaque pointer
    Ptr,
    /// Fixed-size array of elements
    Array(Box<IrType>, usize),
    /// Anonymous struct
    Struct(Vec<IrType>),
    /// Named aggregate declared on the module
    Named(String),
}

impl IrType {
    pub fn array(element: IrType, size: usize) -> Self {
        IrType::Array(Box::new(element), size)
    }

    /// Size in bytes. Named aggregates are not sized here; the ABI byte
    /// size of extern structs is computed from their logical field types.
    pub fn size(&self) -> usize {
        match self {
            IrType::Void => 0,
            IrType::Bool | IrType::I8 => 1,
            IrType::I32 | IrType::F32 => 4,
            IrType::I64 | IrType::F64 => 8,
            IrType::Ptr => 8,
            IrType::Array(elem, size) => elem.size() * size,
            IrType::Struct(fields) => fields.iter().map(|f| f.size()).sum(),
            IrType::Named(_) => 0,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, IrType::Void)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, IrType::F32 | IrType::F64)
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::Bool => write!(f, "i1"),
            IrType::I8 => write!(f, "i8"),
            IrType::I32 => write!(f, "i32"),
            IrType::I64 => write!(f, "i64"),
            IrType::F32 => write!(f, "f32"),
            IrType::F64 => write!(f, "f64"),
            IrType::Ptr => write!(f, "ptr"),
            IrType::Array(elem, size) => write!(f, "[{} x {}]", size, elem),
            IrType::Struct(fields) => {
                write!(f, "{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, "}}")
            }
            IrType::Named(name) => write!(f, "%{}", name),
        }
    }
}

/// The `{size, capacity, data}` header type shared by every growable array
/// and string value.
pub fn array_header_type() -> IrType {
    IrType::Struct(vec![IrType::I32, IrType::I32, IrType::Ptr])
}

/// A module contains functions, globals and aggregate definitions
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
    pub structs: Vec<StructDef>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            globals: Vec::new(),
            structs: Vec::new(),
        }
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// A function in the IR
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<(VReg, IrType)>,
    pub ret_type: IrType,
    pub blocks: Vec<BasicBlock>,
    pub is_external: bool,
    pub is_vararg: bool,
}

impl Function {
    pub fn new(name: impl Into<String>, params: Vec<(VReg, IrType)>, ret_type: IrType) -> Self {
        Self {
            name: name.into(),
            params,
            ret_type,
            blocks: Vec::new(),
            is_external: false,
            is_vararg: false,
        }
    }

    pub fn entry_block(&self) -> Option<&BasicBlock> {
        self.blocks.first()
    }
}

/// A basic block contains a sequence of instructions and one terminator
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub instructions: Vec<super::Instruction>,
    pub terminator: Option<super::Terminator>,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            instructions: Vec::new(),
            terminator: None,
        }
    }
}

/// A global variable or constant
#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub ty: IrType,
    pub init: Option<Constant>,
    pub is_const: bool,
}

/// A named aggregate definition
#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<(String, IrType)>,
}

/// A constant value
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// 32-bit signed integer (the language's Int)
    Int(i32),
    /// 64-bit signed integer (byte counts)
    Int64(i64),
    /// 32-bit float (the language's Float)
    Float(f32),
    Bool(bool),
    /// 8-bit character
    Char(u8),
    /// Null pointer
    Null,
    /// NUL-terminated bytes of a global string
    Str(String),
}

impl Constant {
    pub fn ty(&self) -> IrType {
        match self {
            Constant::Int(_) => IrType::I32,
            Constant::Int64(_) => IrType::I64,
            Constant::Float(_) => IrType::F32,
            Constant::Bool(_) => IrType::Bool,
            Constant::Char(_) => IrType::I8,
            Constant::Null => IrType::Ptr,
            Constant::Str(s) => IrType::array(IrType::I8, s.len() + 1),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "i32 {}", v),
            Constant::Int64(v) => write!(f, "i64 {}", v),
            Constant::Float(v) => write!(f, "f32 {}", v),
            Constant::Bool(v) => write!(f, "i1 {}", if *v { 1 } else { 0 }),
            Constant::Char(v) => write!(f, "i8 {}", v),
            Constant::Null => write!(f, "ptr null"),
            Constant::Str(s) => write!(f, "c{:?}", s),
        }
    }
}
