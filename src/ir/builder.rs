//! IR Builder
//!
//! Helper for constructing IR instructions and basic blocks. The builder
//! owns the module under construction and an insertion cursor (current
//! function + current block). Nested function compilation saves the cursor,
//! builds the inner function, then restores — the same discipline the
//! symbol table uses around function bodies.

use super::instr::{CmpOp, Instruction, InstrKind, Terminator};
use super::types::{BasicBlock, BlockId, Constant, Function, Global, IrType, Module, VReg};

/// A suspended insertion point, produced by [`IrBuilder::save_cursor`].
pub struct Cursor {
    func: Option<Function>,
    block: Option<BasicBlock>,
}

/// Builder for constructing IR
pub struct IrBuilder {
    /// Next virtual register ID
    next_vreg: u32,
    /// Next block ID
    next_block: u32,
    /// Next string constant ID
    next_string: u32,
    /// Current module being built
    module: Module,
    /// Current function being built
    current_fn: Option<Function>,
    /// Current block being built
    current_block: Option<BasicBlock>,
}

impl IrBuilder {
    /// Create a new IR builder
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            next_vreg: 0,
            next_block: 0,
            next_string: 0,
            module: Module::new(module_name),
            current_fn: None,
            current_block: None,
        }
    }

    /// Finish building and return the module
    pub fn finish(mut self) -> Module {
        self.finish_function();
        self.module
    }

    /// Create a fresh virtual register
    pub fn fresh_vreg(&mut self) -> VReg {
        let vreg = VReg(self.next_vreg);
        self.next_vreg += 1;
        vreg
    }

    /// Create a fresh block ID
    pub fn fresh_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        id
    }

    // ============ Function building ============

    /// Start building a new function; returns the parameter registers.
    /// Any function previously under construction is finalized first, so
    /// callers that need to come back must [`Self::save_cursor`] instead.
    pub fn start_function(
        &mut self,
        name: impl Into<String>,
        params: Vec<IrType>,
        ret_type: IrType,
    ) -> Vec<VReg> {
        self.finish_function();

        let param_vregs: Vec<(VReg, IrType)> = params
            .into_iter()
            .map(|ty| (self.fresh_vreg(), ty))
            .collect();
        let vregs: Vec<VReg> = param_vregs.iter().map(|(v, _)| *v).collect();

        self.current_fn = Some(Function::new(name, param_vregs, ret_type));

        let entry = self.fresh_block();
        self.current_block = Some(BasicBlock::new(entry));

        vregs
    }

    /// Finish the current function and push it onto the module
    pub fn finish_function(&mut self) {
        if let Some(block) = self.current_block.take() {
            if let Some(ref mut func) = self.current_fn {
                func.blocks.push(block);
            }
        }
        if let Some(func) = self.current_fn.take() {
            self.module.functions.push(func);
        }
    }

    /// Suspend the current insertion point so a nested function can be
    /// built. The matching [`Self::restore_cursor`] finalizes whatever was
    /// built in between and resumes exactly where compilation left off.
    pub fn save_cursor(&mut self) -> Cursor {
        Cursor {
            func: self.current_fn.take(),
            block: self.current_block.take(),
        }
    }

    /// Restore a saved insertion point (finishing any nested function)
    pub fn restore_cursor(&mut self, cursor: Cursor) {
        self.finish_function();
        self.current_fn = cursor.func;
        self.current_block = cursor.block;
    }

    /// Declare an external function (idempotent by name)
    pub fn declare_external(
        &mut self,
        name: impl Into<String>,
        params: Vec<IrType>,
        ret_type: IrType,
    ) {
        let name = name.into();
        if self.module.function(&name).is_some() {
            return;
        }
        let mut func = Function::new(name, vec![], ret_type);
        func.is_external = true;
        // Store param types without meaningful vregs for external functions
        func.params = params.into_iter().map(|ty| (VReg(0), ty)).collect();
        self.module.functions.push(func);
    }

    /// Declare an external variadic function (idempotent by name)
    pub fn declare_external_vararg(
        &mut self,
        name: impl Into<String>,
        params: Vec<IrType>,
        ret_type: IrType,
    ) {
        let name = name.into();
        if self.module.function(&name).is_some() {
            return;
        }
        let mut func = Function::new(name, vec![], ret_type);
        func.is_external = true;
        func.is_vararg = true;
        func.params = params.into_iter().map(|ty| (VReg(0), ty)).collect();
        self.module.functions.push(func);
    }

    /// Record a named aggregate definition on the module (idempotent by name)
    pub fn define_struct(&mut self, name: impl Into<String>, fields: Vec<(String, IrType)>) {
        let name = name.into();
        if self.module.structs.iter().any(|s| s.name == name) {
            return;
        }
        self.module.structs.push(super::StructDef { name, fields });
    }

    // ============ Globals ============

    /// Add a global string constant and return its name
    pub fn add_string_constant(&mut self, value: &str) -> String {
        let name = format!(".str.{}", self.next_string);
        self.next_string += 1;

        self.module.globals.push(Global {
            name: name.clone(),
            ty: IrType::array(IrType::I8, value.len() + 1), // +1 for NUL
            init: Some(Constant::Str(value.to_string())),
            is_const: true,
        });

        name
    }

    /// Emit a reference to a global (pointer to its first byte)
    pub fn global_ref(&mut self, name: &str) -> VReg {
        self.emit_with_result(InstrKind::GlobalRef(name.to_string()))
    }

    // ============ Block building ============

    /// Create a new block id without entering it
    pub fn create_block(&mut self) -> BlockId {
        self.fresh_block()
    }

    /// Start building a block (finishes the current block first)
    pub fn start_block(&mut self, id: BlockId) {
        if let Some(block) = self.current_block.take() {
            if let Some(ref mut func) = self.current_fn {
                func.blocks.push(block);
            }
        }
        self.current_block = Some(BasicBlock::new(id));
    }

    /// Get the current block ID
    pub fn current_block_id(&self) -> Option<BlockId> {
        self.current_block.as_ref().map(|b| b.id)
    }

    /// Does the current block already end in a terminator?
    pub fn has_terminator(&self) -> bool {
        self.current_block
            .as_ref()
            .is_some_and(|b| b.terminator.is_some())
    }

    // ============ Instruction emission ============

    fn emit(&mut self, result: Option<VReg>, kind: InstrKind) -> Option<VReg> {
        if let Some(ref mut block) = self.current_block {
            // Code after a terminator is unreachable; drop it
            if block.terminator.is_none() {
                block.instructions.push(Instruction::new(result, kind));
            }
        }
        result
    }

    fn emit_with_result(&mut self, kind: InstrKind) -> VReg {
        let result = self.fresh_vreg();
        self.emit(Some(result), kind);
        result
    }

    // ============ Constants ============

    /// Emit an i32 constant (the language's Int)
    pub fn const_int(&mut self, value: i32) -> VReg {
        self.emit_with_result(InstrKind::Const(Constant::Int(value)))
    }

    /// Emit an i64 constant (byte counts)
    pub fn const_i64(&mut self, value: i64) -> VReg {
        self.emit_with_result(InstrKind::Const(Constant::Int64(value)))
    }

    /// Emit an f32 constant (the language's Float)
    pub fn const_float(&mut self, value: f32) -> VReg {
        self.emit_with_result(InstrKind::Const(Constant::Float(value)))
    }

    /// Emit a boolean constant
    pub fn const_bool(&mut self, value: bool) -> VReg {
        self.emit_with_result(InstrKind::Const(Constant::Bool(value)))
    }

    /// Emit a char constant
    pub fn const_char(&mut self, value: u8) -> VReg {
        self.emit_with_result(InstrKind::Const(Constant::Char(value)))
    }

    /// Emit a null pointer constant
    pub fn const_null(&mut self) -> VReg {
        self.emit_with_result(InstrKind::Const(Constant::Null))
    }

    // ============ Arithmetic ============

    pub fn add(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::Add(a, b))
    }

    pub fn sub(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::Sub(a, b))
    }

    pub fn mul(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::Mul(a, b))
    }

    pub fn sdiv(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::SDiv(a, b))
    }

    pub fn srem(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::SRem(a, b))
    }

    pub fn fadd(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::FAdd(a, b))
    }

    pub fn fsub(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::FSub(a, b))
    }

    pub fn fmul(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::FMul(a, b))
    }

    pub fn fdiv(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::FDiv(a, b))
    }

    pub fn frem(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::FRem(a, b))
    }

    // ============ Logic ============

    pub fn and(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::And(a, b))
    }

    pub fn or(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::Or(a, b))
    }

    pub fn not(&mut self, v: VReg) -> VReg {
        self.emit_with_result(InstrKind::Not(v))
    }

    // ============ Comparison ============

    pub fn icmp(&mut self, op: CmpOp, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::ICmp(op, a, b))
    }

    pub fn fcmp(&mut self, op: CmpOp, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::FCmp(op, a, b))
    }

    // ============ Conversions ============

    pub fn zext(&mut self, v: VReg, ty: IrType) -> VReg {
        self.emit_with_result(InstrKind::ZExt(v, ty))
    }

    pub fn fpext(&mut self, v: VReg, ty: IrType) -> VReg {
        self.emit_with_result(InstrKind::FPExt(v, ty))
    }

    // ============ Memory ============

    pub fn alloca(&mut self, ty: IrType) -> VReg {
        self.emit_with_result(InstrKind::Alloca(ty))
    }

    /// Allocate heap memory by byte count
    pub fn malloc_bytes(&mut self, size: VReg) -> VReg {
        self.emit_with_result(InstrKind::MallocBytes(size))
    }

    pub fn memcpy(&mut self, dst: VReg, src: VReg, len: VReg) {
        self.emit(None, InstrKind::Memcpy { dst, src, len });
    }

    pub fn memmove(&mut self, dst: VReg, src: VReg, len: VReg) {
        self.emit(None, InstrKind::Memmove { dst, src, len });
    }

    pub fn load(&mut self, ptr: VReg, ty: IrType) -> VReg {
        self.emit_with_result(InstrKind::Load { ptr, ty })
    }

    pub fn store(&mut self, ptr: VReg, value: VReg) {
        self.emit(None, InstrKind::Store { ptr, value });
    }

    pub fn get_field_ptr(&mut self, base: VReg, agg: IrType, index: u32) -> VReg {
        self.emit_with_result(InstrKind::GetFieldPtr { base, agg, index })
    }

    pub fn get_element_ptr(&mut self, base: VReg, elem: IrType, index: VReg) -> VReg {
        self.emit_with_result(InstrKind::GetElementPtr { base, elem, index })
    }

    // ============ Calls ============

    pub fn call(&mut self, func: impl Into<String>, args: Vec<VReg>) -> VReg {
        self.emit_with_result(InstrKind::Call {
            func: func.into(),
            args,
        })
    }

    pub fn call_void(&mut self, func: impl Into<String>, args: Vec<VReg>) {
        self.emit(
            None,
            InstrKind::Call {
                func: func.into(),
                args,
            },
        );
    }

    /// Get a function pointer
    pub fn func_ref(&mut self, name: impl Into<String>) -> VReg {
        self.emit_with_result(InstrKind::FuncRef(name.into()))
    }

    // ============ Misc ============

    pub fn select(&mut self, cond: VReg, then_val: VReg, else_val: VReg) -> VReg {
        self.emit_with_result(InstrKind::Select(cond, then_val, else_val))
    }

    // ============ Terminators ============

    pub fn ret(&mut self, value: Option<VReg>) {
        self.terminate(Terminator::Ret(value));
    }

    pub fn br(&mut self, target: BlockId) {
        self.terminate(Terminator::Br(target));
    }

    pub fn cond_br(&mut self, cond: VReg, then_block: BlockId, else_block: BlockId) {
        self.terminate(Terminator::CondBr {
            cond,
            then_block,
            else_block,
        });
    }

    fn terminate(&mut self, terminator: Terminator) {
        if let Some(ref mut block) = self.current_block {
            if block.terminator.is_none() {
                block.terminator = Some(terminator);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_building() {
        let mut b = IrBuilder::new("test");
        let params = b.start_function("add2", vec![IrType::I32, IrType::I32], IrType::I32);
        assert_eq!(params.len(), 2);
        let sum = b.add(params[0], params[1]);
        b.ret(Some(sum));
        let module = b.finish();

        let f = module.function("add2").unwrap();
        assert_eq!(f.blocks.len(), 1);
        assert!(matches!(
            f.blocks[0].terminator,
            Some(Terminator::Ret(Some(_)))
        ));
    }

    #[test]
    fn test_cursor_save_restore() {
        let mut b = IrBuilder::new("test");
        b.start_function("outer", vec![], IrType::Void);
        let x = b.const_int(1);

        // Build a nested function without losing the outer insertion point
        let cursor = b.save_cursor();
        b.start_function("inner", vec![], IrType::Void);
        b.ret(None);
        b.restore_cursor(cursor);

        // Emission resumes in `outer`
        let slot = b.alloca(IrType::I32);
        b.store(slot, x);
        b.ret(None);
        let module = b.finish();

        assert!(module.function("inner").is_some());
        let outer = module.function("outer").unwrap();
        assert_eq!(outer.blocks.len(), 1);
        // const + alloca + store
        assert_eq!(outer.blocks[0].instructions.len(), 3);
    }

    #[test]
    fn test_emit_after_terminator_is_dropped() {
        let mut b = IrBuilder::new("test");
        b.start_function("f", vec![], IrType::Void);
        b.ret(None);
        b.const_int(42); // unreachable, must not land in the block
        let module = b.finish();

        let f = module.function("f").unwrap();
        assert!(f.blocks[0].instructions.is_empty());
    }

    #[test]
    fn test_declare_external_is_idempotent() {
        let mut b = IrBuilder::new("test");
        b.declare_external("puts", vec![IrType::Ptr], IrType::I32);
        b.declare_external("puts", vec![IrType::Ptr], IrType::I32);
        let module = b.finish();
        assert_eq!(module.functions.len(), 1);
        assert!(module.functions[0].is_external);
    }

    #[test]
    fn test_string_constants_get_unique_names() {
        let mut b = IrBuilder::new("test");
        let a = b.add_string_constant("%d");
        let c = b.add_string_constant("true");
        assert_ne!(a, c);
        let module = b.finish();
        assert_eq!(module.globals.len(), 2);
        assert_eq!(module.globals[0].ty, IrType::array(IrType::I8, 3));
    }
}
