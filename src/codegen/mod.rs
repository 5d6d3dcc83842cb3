//! Code generation
//!
//! Walks the annotated AST post-order and lowers it onto the IR builder.
//! Each node resolves to a *handle*: a register holding the address of the
//! node's value (one level of indirection everywhere, so variables,
//! temporaries and literals all look alike to the operations consuming
//! them). Handles are memoized per node; a node already evaluated in the
//! current pass is never re-evaluated.
//!
//! Control flow, function declaration and overload resolution live here;
//! leaf operations are in [`intrinsics`], the container/struct runtime
//! layout in [`layout`].

mod intrinsics;
mod layout;

use crate::ast::{Atom, Molecule, Particle};
use crate::diag::DiagKind;
use crate::ir::{array_header_type, IrBuilder, IrType, Module, VReg};
use crate::typeck::{
    self, atom_ty, check_program, collect_struct_declarations, hoist_variables, particle_ty,
    Context, Op, OpKind, Ty, VarEntry,
};
use log::debug;

/// The code generator: one per compiled module
pub struct Compiler {
    pub ctx: Context,
    pub(crate) builder: IrBuilder,
    stdio_declared: bool,
}

impl Compiler {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            ctx: Context::new(),
            builder: IrBuilder::new(module_name),
            stdio_declared: false,
        }
    }

    /// Run the full pipeline over a parsed program: type-check pass, struct
    /// collection, variable hoisting, then code generation into `main`.
    /// Returns the finished module together with the context (registries
    /// and collected diagnostics).
    pub fn compile_program(mut self, root: &Molecule) -> (Module, Context) {
        debug!("pass 1: type check");
        check_program(&mut self.ctx, root);

        debug!("pass 1.5: struct collection");
        for form in root.predicate() {
            collect_struct_declarations(&mut self.ctx, form);
        }

        debug!("pass 2: variable hoisting");
        let mut hoisted = Vec::new();
        for form in root.predicate() {
            hoist_variables(form, &mut hoisted);
        }

        self.builder.start_function("main", vec![], IrType::I32);
        self.allocate_hoisted(&hoisted);

        debug!("pass 3: code generation ({} hoisted slots)", hoisted.len());
        for form in root.predicate() {
            self.compile_particle(form);
        }

        let zero = self.builder.const_int(0);
        self.builder.ret(Some(zero));

        (self.builder.finish(), self.ctx)
    }

    /// Pre-allocate entry-block storage for hoisted variables. Extern
    /// structs get the aggregate itself; everything else its native tag.
    fn allocate_hoisted(&mut self, hoisted: &[(String, Ty)]) {
        for (name, ty) in hoisted {
            if self.ctx.vars.get(name).is_some_and(|v| v.slot.is_some()) {
                continue;
            }
            let ir_ty = self.storage_type(ty);
            let slot = self.builder.alloca(ir_ty);
            self.ctx.vars.insert(
                name.clone(),
                VarEntry {
                    ty: ty.clone(),
                    slot: Some(slot),
                },
            );
        }
    }

    /// Storage type for a declared variable
    pub(crate) fn storage_type(&self, ty: &Ty) -> IrType {
        match ty {
            Ty::Named(name) if self.ctx.is_extern_struct(ty) => IrType::Named(name.clone()),
            _ => ty.native(),
        }
    }

    /// Run `f` with the variable table snapshotted; the table is restored
    /// on the way out no matter how `f` exits.
    fn with_var_scope<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.ctx.vars.clone();
        let result = f(self);
        self.ctx.vars = saved;
        result
    }

    /// The memoized handle of an already-evaluated node
    pub(crate) fn value_of(&self, particle: &Particle) -> Option<VReg> {
        self.ctx.node_values.get(&particle.id()).copied()
    }

    // ============ Tree walk ============

    pub(crate) fn compile_particle(&mut self, particle: &Particle) {
        match particle {
            Particle::Molecule(molecule) => self.compile_molecule(molecule),
            Particle::Atom(atom) => {
                self.eval_atom(atom);
            }
        }
    }

    fn compile_molecule(&mut self, molecule: &Molecule) {
        if molecule.is_empty() {
            return;
        }

        match molecule.subject_name() {
            Some("block") => return self.compile_block(molecule),
            Some("if") => return self.compile_if(molecule),
            Some("while") => return self.compile_while(molecule),
            Some("web-loop") => return self.compile_web_loop(molecule),
            Some("fun") => return self.compile_fun(molecule),
            Some("extern") => return self.compile_extern(molecule),
            Some("overload") => return self.compile_overload(molecule),
            Some("struct") | Some("extern-struct") => {
                return self.compile_struct_decl(molecule);
            }
            Some("array") => {
                // A typed array literal naming a registered struct is a
                // struct literal, not a growable array
                let is_struct = molecule
                    .ty
                    .as_deref()
                    .is_some_and(|name| self.ctx.structs.contains_key(name));
                if is_struct {
                    self.struct_literal(molecule);
                    return;
                }
            }
            _ => {}
        }

        // Generic form: evaluate operands that don't have a value yet,
        // then the molecule itself
        for child in molecule.predicate() {
            if self.value_of(child).is_none() {
                self.compile_particle(child);
            }
        }
        self.eval_molecule(molecule);
    }

    // ============ Atom evaluation ============

    /// Resolve an atom to a handle: member access, string literal, variable
    /// storage, or a freshly stored constant.
    pub(crate) fn eval_atom(&mut self, atom: &Atom) -> Option<VReg> {
        if let Some(handle) = self.ctx.node_values.get(&atom.id) {
            return Some(*handle);
        }

        // owner>field member access
        if atom.member_access.is_some() && self.ctx.vars.contains_key(&atom.identifier) {
            if let Some(handle) = self.member_access(atom) {
                self.ctx.node_values.insert(atom.id, handle);
                return Some(handle);
            }
        }

        // String literals build their header before any variable lookup:
        // the quoted text is the identifier
        if atom.quoted {
            let handle = self.string_literal(&atom.identifier);
            self.ctx.node_values.insert(atom.id, handle);
            return Some(handle);
        }

        if let Some(entry) = self.ctx.vars.get(&atom.identifier) {
            if let Some(slot) = entry.slot {
                self.ctx.node_values.insert(atom.id, slot);
                return Some(slot);
            }
        }

        let handle = self.constant_atom(atom)?;
        self.ctx.node_values.insert(atom.id, handle);
        Some(handle)
    }

    /// Literal constants get a stack slot so they look like every other
    /// handle
    fn constant_atom(&mut self, atom: &Atom) -> Option<VReg> {
        let ident = atom.identifier.as_str();
        let value = match atom_ty(&self.ctx, atom) {
            Ty::Int => {
                let v: i32 = ident.parse().ok()?;
                self.builder.const_int(v)
            }
            Ty::Float => {
                let v: f32 = ident.parse().ok()?;
                self.builder.const_float(v)
            }
            Ty::Char => {
                let v: u8 = ident.parse().ok()?;
                self.builder.const_char(v)
            }
            Ty::Bool => self.builder.const_bool(ident == "true"),
            _ => return None,
        };
        let ty = atom_ty(&self.ctx, atom).native();
        let slot = self.builder.alloca(ty);
        self.builder.store(slot, value);
        Some(slot)
    }

    /// `owner>field`: locate the field through the struct's layout. Fields
    /// that are themselves pointer-shaped (Str or a struct) are re-wrapped
    /// in a fresh indirection cell so every downstream handle has the same
    /// shape.
    fn member_access(&mut self, atom: &Atom) -> Option<VReg> {
        let field_name = atom.member_access.as_deref()?;
        let entry = self.ctx.vars.get(&atom.identifier)?;
        let slot = entry.slot?;
        let def = self.ctx.struct_of(&entry.ty)?.clone();
        let field_idx = def.field_index(field_name)?;
        let field_ty = def.field_types[field_idx].clone();

        let agg = IrType::Named(def.name.clone());
        let struct_ptr = self.builder.load(slot, IrType::Ptr);
        let field_ptr = self
            .builder
            .get_field_ptr(struct_ptr, agg, field_idx as u32);

        let handle = if self.ctx.is_pointer_field(&field_ty) {
            let field_val = self.builder.load(field_ptr, IrType::Ptr);
            let cell = self.builder.alloca(IrType::Ptr);
            self.builder.store(cell, field_val);
            cell
        } else {
            field_ptr
        };

        self.ctx.node_types.insert(atom.id, field_ty);
        Some(handle)
    }

    // ============ Molecule evaluation ============

    /// Dispatch a generic form through overload resolution and the
    /// operation table.
    fn eval_molecule(&mut self, molecule: &Molecule) -> Option<VReg> {
        let name = molecule
            .subject()
            .and_then(|p| p.as_atom())
            .map(|a| a.identifier.clone())?;

        let args: Vec<VReg> = molecule
            .predicate()
            .iter()
            .filter_map(|child| self.value_of(child))
            .collect();

        // Overload resolution: first candidate with equal arity and
        // pairwise-equal argument types wins
        if self.ctx.overloads.contains_key(&name) {
            let arg_types: Vec<Ty> = molecule
                .predicate()
                .iter()
                .map(|p| particle_ty(&mut self.ctx, p))
                .collect();

            let candidates = self.ctx.overloads[&name].clone();
            for candidate in candidates {
                let Some(op) = self.ctx.ops.get(&candidate) else {
                    continue;
                };
                if op.params == arg_types {
                    let op = op.clone();
                    if let OpKind::UserFn { ret, .. } | OpKind::ExternFn { ret, .. } = &op.kind {
                        self.ctx.node_types.insert(molecule.id, ret.clone());
                    }
                    let result = self.dispatch(&op, molecule, &args);
                    if let Some(value) = result {
                        self.ctx.node_values.insert(molecule.id, value);
                    }
                    return result;
                }
            }

            if !self.ctx.ops.contains_key(&name) {
                let arg_types = arg_types
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                self.ctx.diags.error(
                    DiagKind::UnresolvedOverload { name, arg_types },
                    Some(molecule.span),
                );
                return None;
            }
        }

        // Fall back to the base operation
        let Some(op) = self.ctx.ops.get(&name).cloned() else {
            self.ctx.diags.error(
                DiagKind::UnknownOperation { name },
                Some(molecule.span),
            );
            return None;
        };
        let result = self.dispatch(&op, molecule, &args);
        if let Some(value) = result {
            self.ctx.node_values.insert(molecule.id, value);
        }
        result
    }

    fn dispatch(&mut self, op: &Op, molecule: &Molecule, args: &[VReg]) -> Option<VReg> {
        match &op.kind {
            OpKind::Arith(arith) => self.lower_arith(*arith, molecule, args),
            OpKind::Compound(compound) => self.lower_compound(*compound, molecule, args),
            OpKind::Compare(cmp) => self.lower_compare(*cmp, molecule, args),
            OpKind::LogicAnd => self.lower_logic_binary(true, args),
            OpKind::LogicOr => self.lower_logic_binary(false, args),
            OpKind::LogicNot => self.lower_logic_not(args),
            OpKind::Def => self.lower_def(molecule),
            OpKind::Assign => self.lower_assign(molecule),
            OpKind::Print => self.lower_print(molecule, args),
            OpKind::Return => self.lower_return(molecule, args),
            OpKind::ConvToStr => self.lower_conv_to_str(molecule, args),
            OpKind::ConvToInt => self.lower_conv_to_int(molecule, args),
            OpKind::ArrayLit => self.array_literal(molecule, args),
            OpKind::ArrayLen => self.array_len(args),
            OpKind::ArrayGet => self.array_get(molecule, args),
            OpKind::ArraySet => self.array_set(molecule, args),
            OpKind::ArrayAppend => self.array_grow_insert(molecule, args, layout::GrowKind::Append),
            OpKind::ArrayInsert => self.array_grow_insert(molecule, args, layout::GrowKind::Insert),
            OpKind::ArrayRemove => self.array_remove(molecule, args),
            OpKind::ArrayPopBack => self.array_pop_back(molecule, args),
            OpKind::UserFn { func, ret } => self.call_user(func.clone(), &op.params, ret, args),
            OpKind::ExternFn { func, ret } => self.call_extern(func.clone(), &op.params, ret, args),
        }
    }

    // ============ Control flow ============

    /// `{ ... }`: open a fresh block, enter it unconditionally, compile the
    /// children in order. The cursor is left inside — callers that need a
    /// merge create their own.
    fn compile_block(&mut self, molecule: &Molecule) {
        let target = self.builder.create_block();
        self.builder.br(target);
        self.builder.start_block(target);

        for child in molecule.predicate() {
            self.compile_particle(child);
        }
    }

    /// `(if cond then)` / `(if cond then else)`
    fn compile_if(&mut self, molecule: &Molecule) {
        let args = molecule.predicate();
        if args.len() < 2 {
            return;
        }

        self.compile_particle(&args[0]);
        let Some(cond_ptr) = self.value_of(&args[0]) else {
            return;
        };
        let cond = self.builder.load(cond_ptr, IrType::Bool);

        let has_else = args.len() >= 3;
        let then_block = self.builder.create_block();
        let else_block = has_else.then(|| self.builder.create_block());
        let merge_block = self.builder.create_block();

        let mut merge_preds = 0u32;
        match else_block {
            Some(else_block) => self.builder.cond_br(cond, then_block, else_block),
            None => {
                self.builder.cond_br(cond, then_block, merge_block);
                merge_preds += 1;
            }
        }

        self.builder.start_block(then_block);
        self.compile_particle(&args[1]);
        if !self.builder.has_terminator() {
            self.builder.br(merge_block);
            merge_preds += 1;
        }

        if let Some(else_block) = else_block {
            self.builder.start_block(else_block);
            self.compile_particle(&args[2]);
            if !self.builder.has_terminator() {
                self.builder.br(merge_block);
                merge_preds += 1;
            }
        }

        // A merge no arm reaches would be dead code; never materialize it
        if merge_preds > 0 {
            self.builder.start_block(merge_block);
        }
    }

    /// `(while cond body)`: cond block re-entered after the body unless the
    /// body already terminated
    fn compile_while(&mut self, molecule: &Molecule) {
        let args = molecule.predicate();
        if args.len() < 2 {
            return;
        }

        let cond_block = self.builder.create_block();
        let loop_block = self.builder.create_block();
        let merge_block = self.builder.create_block();

        self.builder.br(cond_block);
        self.builder.start_block(cond_block);
        self.compile_particle(&args[0]);
        let Some(cond_ptr) = self.value_of(&args[0]) else {
            return;
        };
        let cond = self.builder.load(cond_ptr, IrType::Bool);
        self.builder.cond_br(cond, loop_block, merge_block);

        self.builder.start_block(loop_block);
        self.compile_particle(&args[1]);
        if !self.builder.has_terminator() {
            self.builder.br(cond_block);
        }

        self.builder.start_block(merge_block);
    }

    /// `(web-loop fps body)`: the body becomes a freestanding zero-argument
    /// callback registered with the external frame scheduler at the
    /// original cursor.
    fn compile_web_loop(&mut self, molecule: &Molecule) {
        let args = molecule.predicate();
        if args.len() < 2 {
            return;
        }

        self.compile_particle(&args[0]);
        let Some(fps_ptr) = self.value_of(&args[0]) else {
            return;
        };
        let fps = self.builder.load(fps_ptr, IrType::I32);

        let Some(body) = args[1].as_molecule() else {
            return;
        };

        let cursor = self.builder.save_cursor();
        self.with_var_scope(|c| {
            c.builder
                .start_function("UpdateFrame", vec![], IrType::Void);

            let mut hoisted = Vec::new();
            hoist_variables(&args[1], &mut hoisted);
            c.allocate_hoisted(&hoisted);

            for child in body.predicate() {
                c.compile_particle(child);
            }
            if !c.builder.has_terminator() {
                c.builder.ret(None);
            }
        });
        self.builder.restore_cursor(cursor);

        self.builder.declare_external(
            "emscripten_set_main_loop",
            vec![IrType::Ptr, IrType::I32, IrType::I32],
            IrType::Void,
        );
        let callback = self.builder.func_ref("UpdateFrame");
        let simulate_infinite = self.builder.const_int(1);
        self.builder.call_void(
            "emscripten_set_main_loop",
            vec![callback, fps, simulate_infinite],
        );
    }

    // ============ Functions ============

    /// `(fun RetType:(name ParamType:p ...) { body })`
    fn compile_fun(&mut self, molecule: &Molecule) {
        let args = molecule.predicate();
        let Some(sig) = args.first().and_then(|p| p.as_molecule()) else {
            return;
        };
        let Some(func_name) = sig.subject_name().map(String::from) else {
            return;
        };
        let ret = sig.ty.as_deref().map(Ty::from_name).unwrap_or(Ty::Nil);

        let mut param_names = Vec::new();
        let mut param_types = Vec::new();
        for param in sig.predicate() {
            let Some(atom) = param.as_atom() else { continue };
            param_names.push(atom.identifier.clone());
            param_types.push(atom.ty.as_deref().map(Ty::from_name).unwrap_or(Ty::Var));
        }
        let param_irs: Vec<IrType> = param_types.iter().map(|t| t.native()).collect();

        let Some(body) = args.get(1).and_then(|p| p.as_molecule()) else {
            return;
        };

        let cursor = self.builder.save_cursor();
        let missing_return = self.with_var_scope(|c| {
            let param_vregs =
                c.builder
                    .start_function(func_name.clone(), param_irs.clone(), ret.native());

            // Bind parameters to fresh entry-block slots
            for ((name, ty), vreg) in param_names.iter().zip(&param_types).zip(param_vregs) {
                let slot = c.builder.alloca(ty.native());
                c.builder.store(slot, vreg);
                c.ctx.vars.insert(
                    name.clone(),
                    VarEntry {
                        ty: ty.clone(),
                        slot: Some(slot),
                    },
                );
            }

            // This function's own hoistable locals
            let mut hoisted = Vec::new();
            for child in body.predicate() {
                hoist_variables(child, &mut hoisted);
            }
            c.allocate_hoisted(&hoisted);

            for child in body.predicate() {
                c.compile_particle(child);
            }

            // Fell off the end: synthesize the default return
            if !c.builder.has_terminator() {
                if ret == Ty::Nil {
                    c.builder.ret(None);
                    false
                } else {
                    let zero = c.zero_value(&ret);
                    c.builder.ret(Some(zero));
                    true
                }
            } else {
                false
            }
        });
        self.builder.restore_cursor(cursor);

        if missing_return {
            self.ctx.diags.warning(
                DiagKind::MissingReturn {
                    name: func_name.clone(),
                },
                Some(molecule.span),
            );
        }

        // Register as a callable operation; later forms may call it
        self.ctx.ops.insert(
            func_name.clone(),
            Op {
                kind: OpKind::UserFn {
                    func: func_name,
                    ret,
                },
                params: param_types,
            },
        );
    }

    /// `(extern RetType:(name ParamType:p ...))`
    fn compile_extern(&mut self, molecule: &Molecule) {
        let args = molecule.predicate();
        let Some(sig) = args.first().and_then(|p| p.as_molecule()) else {
            return;
        };
        let Some(func_name) = sig.subject_name().map(String::from) else {
            return;
        };
        let ret = sig.ty.as_deref().map(Ty::from_name).unwrap_or(Ty::Nil);

        let mut param_types = Vec::new();
        for param in sig.predicate() {
            let Some(atom) = param.as_atom() else { continue };
            param_types.push(atom.ty.as_deref().map(Ty::from_name).unwrap_or(Ty::Var));
        }

        // Declared parameter types follow the call-boundary coercion rules
        let param_irs: Vec<IrType> = param_types
            .iter()
            .map(|ty| self.extern_param_type(ty))
            .collect();

        self.builder
            .declare_external(func_name.clone(), param_irs, ret.native());

        self.ctx.ops.insert(
            func_name.clone(),
            Op {
                kind: OpKind::ExternFn {
                    func: func_name,
                    ret,
                },
                params: param_types,
            },
        );
    }

    /// The declared C-side type for one extern parameter
    fn extern_param_type(&self, ty: &Ty) -> IrType {
        if *ty == Ty::Str {
            return IrType::Ptr;
        }
        if let Some(def) = self.ctx.struct_of(ty) {
            if def.is_extern {
                let size = def.abi_byte_size();
                return if size <= 4 {
                    IrType::I32
                } else if size <= 8 {
                    IrType::I64
                } else {
                    IrType::Ptr
                };
            }
        }
        ty.native()
    }

    /// Call a `fun`-declared function: arguments load as their native
    /// values, a non-void result lands in a fresh slot.
    fn call_user(
        &mut self,
        func: String,
        params: &[Ty],
        ret: &Ty,
        args: &[VReg],
    ) -> Option<VReg> {
        let mut call_args = Vec::new();
        for (i, handle) in args.iter().enumerate() {
            let ty = params.get(i).map(|t| t.native()).unwrap_or(IrType::Ptr);
            call_args.push(self.builder.load(*handle, ty));
        }

        let ret_ir = ret.native();
        if ret_ir.is_void() {
            self.builder.call_void(func, call_args);
            return None;
        }
        let result = self.builder.call(func, call_args);
        let slot = self.builder.alloca(ret_ir);
        self.builder.store(slot, result);
        Some(slot)
    }

    /// Call an `extern`-declared function with C-ABI marshaling: strings
    /// unwrap to their character buffer, extern structs coerce by byte
    /// size, everything else loads as its native value.
    fn call_extern(
        &mut self,
        func: String,
        params: &[Ty],
        ret: &Ty,
        args: &[VReg],
    ) -> Option<VReg> {
        let mut call_args = Vec::new();
        for (i, handle) in args.iter().enumerate() {
            let Some(ty) = params.get(i) else {
                call_args.push(self.builder.load(*handle, IrType::Ptr));
                continue;
            };

            if *ty == Ty::Str {
                call_args.push(self.cstring_data(*handle));
                continue;
            }

            if let Some(def) = self.ctx.struct_of(ty).filter(|d| d.is_extern).cloned() {
                let size = def.abi_byte_size();
                let arg = if size <= 4 {
                    self.builder.load(*handle, IrType::I32)
                } else if size <= 8 {
                    self.builder.load(*handle, IrType::I64)
                } else {
                    *handle
                };
                call_args.push(arg);
                continue;
            }

            call_args.push(self.builder.load(*handle, ty.native()));
        }

        let ret_ir = ret.native();
        if ret_ir.is_void() {
            self.builder.call_void(func, call_args);
            return None;
        }
        let result = self.builder.call(func, call_args);
        let slot = self.builder.alloca(ret_ir);
        self.builder.store(slot, result);
        Some(slot)
    }

    // ============ Declarations ============

    /// `(overload name impl)` / `(overload name [i1 i2 ...])`
    fn compile_overload(&mut self, molecule: &Molecule) {
        let args = molecule.predicate();
        let Some(op_name) = args.first().and_then(|p| p.as_atom()) else {
            return;
        };
        let list = self
            .ctx
            .overloads
            .entry(op_name.identifier.clone())
            .or_default();

        match args.get(1) {
            Some(Particle::Atom(single)) => list.push(single.identifier.clone()),
            Some(Particle::Molecule(methods)) => {
                for method in methods.predicate() {
                    if let Some(atom) = method.as_atom() {
                        list.push(atom.identifier.clone());
                    }
                }
            }
            None => {}
        }
    }

    /// `struct` / `extern-struct` forms: the registry was filled by the
    /// collection pass; here the aggregate is recorded on the module.
    fn compile_struct_decl(&mut self, molecule: &Molecule) {
        let Some((name, _)) = typeck::struct_decl_parts(molecule) else {
            return;
        };
        let Some(def) = self.ctx.structs.get(&name) else {
            return;
        };
        let fields: Vec<(String, IrType)> = def
            .field_names
            .iter()
            .cloned()
            .zip(def.field_types.iter().map(|t| t.native()))
            .collect();
        self.builder.define_struct(name, fields);
    }

    // ============ Helpers ============

    /// A zero value of the given logical type (default-return synthesis)
    fn zero_value(&mut self, ty: &Ty) -> VReg {
        match ty.native() {
            IrType::F32 | IrType::F64 => self.builder.const_float(0.0),
            IrType::Bool => self.builder.const_bool(false),
            IrType::I8 => self.builder.const_char(0),
            IrType::Ptr => self.builder.const_null(),
            _ => self.builder.const_int(0),
        }
    }

    /// Logical type of the first operand (the usual operand-type probe)
    pub(crate) fn first_arg_ty(&mut self, molecule: &Molecule) -> Ty {
        match molecule.predicate().first() {
            Some(first) => particle_ty(&mut self.ctx, first),
            None => Ty::Nil,
        }
    }

    /// Declare the C runtime symbols emitted code leans on (lazily, once)
    pub(crate) fn declare_stdio(&mut self) {
        if self.stdio_declared {
            return;
        }
        self.stdio_declared = true;

        // int puts(const char *s)
        self.builder
            .declare_external("puts", vec![IrType::Ptr], IrType::I32);

        // int sprintf(char *buf, const char *fmt, ...)
        self.builder.declare_external_vararg(
            "sprintf",
            vec![IrType::Ptr, IrType::Ptr],
            IrType::I32,
        );

        // int sscanf(const char *s, const char *fmt, ...)
        self.builder.declare_external_vararg(
            "sscanf",
            vec![IrType::Ptr, IrType::Ptr],
            IrType::I32,
        );
    }

    /// Unwrap a Str handle to its raw character-buffer pointer
    pub(crate) fn cstring_data(&mut self, handle: VReg) -> VReg {
        let header = array_header_type();
        let str_ptr = self.builder.load(handle, IrType::Ptr);
        let data_ptr_ptr = self.builder.get_field_ptr(str_ptr, header, 2);
        self.builder.load(data_ptr_ptr, IrType::Ptr)
    }
}

#[cfg(test)]
mod tests {
    use crate::compile_source;
    use crate::ir::{verify_module, Constant, Function, InstrKind, Module, Terminator};

    fn compile(source: &str) -> (Module, crate::typeck::Context) {
        compile_source("test", source)
    }

    fn function<'m>(module: &'m Module, name: &str) -> &'m Function {
        module
            .function(name)
            .unwrap_or_else(|| panic!("no function `{}`", name))
    }

    fn instructions(func: &Function) -> Vec<&InstrKind> {
        func.blocks
            .iter()
            .flat_map(|b| b.instructions.iter().map(|i| &i.kind))
            .collect()
    }

    fn calls_to(func: &Function, callee: &str) -> usize {
        instructions(func)
            .iter()
            .filter(|kind| matches!(kind, InstrKind::Call { func, .. } if func == callee))
            .count()
    }

    fn has_const_int(func: &Function, value: i32) -> bool {
        instructions(func)
            .iter()
            .any(|kind| matches!(kind, InstrKind::Const(Constant::Int(v)) if *v == value))
    }

    #[test]
    fn test_def_assign_read() {
        let (module, ctx) = compile("{ (def Int:x 5) (= x 6) (def Int:y x) }");
        assert!(!ctx.diags.has_errors());
        assert!(verify_module(&module).is_ok());

        let main = function(&module, "main");
        let stores = instructions(main)
            .iter()
            .filter(|k| matches!(k, InstrKind::Store { .. }))
            .count();
        // x <- 5, x <- 6, y <- x, plus the constant slots
        assert!(stores >= 3);
        assert!(has_const_int(main, 5));
        assert!(has_const_int(main, 6));
    }

    #[test]
    fn test_undeclared_assignment_reports_and_survives() {
        let (module, ctx) = compile("{ (= ghost 6) }");
        assert!(ctx.diags.has_errors());
        assert!(verify_module(&module).is_ok());
    }

    #[test]
    fn test_array_literal_capacity_and_growth_shape() {
        let (module, ctx) = compile("{ (def Array<Int>:a [1]) (append a 2) }");
        assert!(!ctx.diags.has_errors());
        assert!(verify_module(&module).is_ok());

        let main = function(&module, "main");
        // literal: size 1, capacity 1
        assert!(has_const_int(main, 1));
        // growth path: doubling select, heap allocation, copy of the live
        // prefix — and the old buffer is never freed
        let kinds = instructions(main);
        assert!(kinds.iter().any(|k| matches!(k, InstrKind::Select(..))));
        assert!(kinds.iter().any(|k| matches!(k, InstrKind::MallocBytes(_))));
        assert!(kinds.iter().any(|k| matches!(k, InstrKind::Memcpy { .. })));
        // append branches: grow + continue blocks on top of entry
        assert!(main.blocks.len() >= 3);
    }

    #[test]
    fn test_string_literal_is_null_terminated() {
        let (module, _) = compile("{ (def Str:s \"bob\") }");
        let main = function(&module, "main");

        let char_consts: Vec<u8> = instructions(main)
            .iter()
            .filter_map(|k| match k {
                InstrKind::Const(Constant::Char(v)) => Some(*v),
                _ => None,
            })
            .collect();
        assert_eq!(char_consts, vec![b'b', b'o', b'b', 0]);
        // "bob" -> size 3, capacity next_pow2(3+1) = 4
        assert!(has_const_int(main, 3));
        assert!(has_const_int(main, 4));
    }

    #[test]
    fn test_string_append_reterminates() {
        let (module, ctx) = compile("{ (def Str:s \"hi\") (append s Char:33) }");
        assert!(!ctx.diags.has_errors());
        let main = function(&module, "main");
        let kinds = instructions(main);
        // appended char present, and a fresh NUL written after the append
        assert!(kinds
            .iter()
            .any(|k| matches!(k, InstrKind::Const(Constant::Char(33)))));
        let nul_stores = kinds
            .iter()
            .filter(|k| matches!(k, InstrKind::Const(Constant::Char(0))))
            .count();
        assert!(nul_stores >= 2); // literal terminator + re-termination
    }

    #[test]
    fn test_struct_field_round_trip() {
        let source = r#"{
            (struct Person:[Str:name Int:age Bool:friend])
            (def Person:bob Person:["bob" 30 true])
            (def Int:a bob>age)
            (meow bob>name)
        }"#;
        let (module, ctx) = compile(source);
        assert!(!ctx.diags.has_errors());
        assert!(verify_module(&module).is_ok());

        // the aggregate is on the module
        assert!(module.structs.iter().any(|s| s.name == "Person"));

        let main = function(&module, "main");
        let field_indices: Vec<u32> = instructions(main)
            .iter()
            .filter_map(|k| match k {
                InstrKind::GetFieldPtr { agg, index, .. }
                    if matches!(agg, crate::ir::IrType::Named(n) if n == "Person") =>
                {
                    Some(*index)
                }
                _ => None,
            })
            .collect();
        // literal writes fields 0..3, reads hit age (1) and name (0)
        assert!(field_indices.contains(&0));
        assert!(field_indices.contains(&1));
        assert!(field_indices.contains(&2));
        // name is a pointer-shaped field, so meow sees a Str and prints
        assert_eq!(calls_to(main, "puts"), 1);
    }

    #[test]
    fn test_overload_picks_exact_match() {
        let source = r#"{
            (fun Int:(addInts Int:a Int:b) { (return (+ a b)) })
            (fun Float:(addFloats Float:a Float:b) { (return (+ a b)) })
            (overload + [addInts addFloats])
            (def Float:r (+ 1.5 2.5))
        }"#;
        let (module, ctx) = compile(source);
        assert!(!ctx.diags.has_errors());
        assert!(verify_module(&module).is_ok());

        let main = function(&module, "main");
        assert_eq!(calls_to(main, "addFloats"), 1);
        assert_eq!(calls_to(main, "addInts"), 0);
    }

    #[test]
    fn test_overload_falls_back_to_builtin() {
        let source = r#"{
            (fun Float:(addFloats Float:a Float:b) { (return (+ a b)) })
            (overload + addFloats)
            (def Int:r (+ 1 2))
        }"#;
        let (module, ctx) = compile(source);
        assert!(!ctx.diags.has_errors());

        let main = function(&module, "main");
        assert_eq!(calls_to(main, "addFloats"), 0);
        assert!(instructions(main)
            .iter()
            .any(|k| matches!(k, InstrKind::Add(..))));
    }

    #[test]
    fn test_unresolved_overload_reports() {
        // `twice` has a candidate list but no arity/type match, and no
        // built-in of that name to fall back to
        let source = r#"{
            (fun Int:(double Int:a) { (return (+ a a)) })
            (overload twice [double])
            (twice 1.5)
        }"#;
        let (_, ctx) = compile(source);
        assert!(ctx.diags.has_errors());
    }

    #[test]
    fn test_if_with_both_arms_returning_has_no_merge() {
        let source = r#"{
            (fun Int:(pick Bool:b) {
                (if b { (return 1) } { (return 2) })
            })
        }"#;
        let (module, ctx) = compile(source);
        assert!(!ctx.diags.has_errors());
        assert!(verify_module(&module).is_ok());

        let pick = function(&module, "pick");
        // every block is terminated and reachable; no dangling merge
        for block in &pick.blocks {
            assert!(block.terminator.is_some());
        }
        let ret_count = pick
            .blocks
            .iter()
            .filter(|b| matches!(b.terminator, Some(Terminator::Ret(_))))
            .count();
        assert_eq!(ret_count, 2);
    }

    #[test]
    fn test_while_structure() {
        let source = r#"{
            (def Int:i 0)
            (while (< i 10) { (++ i) })
        }"#;
        let (module, ctx) = compile(source);
        assert!(!ctx.diags.has_errors());
        assert!(verify_module(&module).is_ok());

        let main = function(&module, "main");
        // entry + cond + loop + inner body block + merge
        assert!(main.blocks.len() >= 4);
        let cond_branches = main
            .blocks
            .iter()
            .filter(|b| matches!(b.terminator, Some(Terminator::CondBr { .. })))
            .count();
        assert_eq!(cond_branches, 1);
    }

    #[test]
    fn test_missing_return_synthesizes_default_and_warns() {
        let source = "{ (fun Int:(f) { (def Int:x 1) }) }";
        let (module, ctx) = compile(source);
        assert!(verify_module(&module).is_ok());
        assert!(!ctx.diags.has_errors()); // warning only
        assert_eq!(ctx.diags.len(), 1);

        let f = function(&module, "f");
        assert!(f
            .blocks
            .iter()
            .any(|b| matches!(b.terminator, Some(Terminator::Ret(Some(_))))));
    }

    #[test]
    fn test_extern_struct_marshaling() {
        let source = r#"{
            (extern-struct Color [Char:r Char:g Char:b Char:a])
            (extern Nil:(SetColor Color:c))
            (def Color:col Color:[Char:1 Char:2 Char:3 Char:4])
            (SetColor col)
        }"#;
        let (module, ctx) = compile(source);
        assert!(!ctx.diags.has_errors());
        assert!(verify_module(&module).is_ok());

        // a 4-byte extern struct declares and passes as i32
        let set_color = function(&module, "SetColor");
        assert!(set_color.is_external);
        assert_eq!(set_color.params[0].1, crate::ir::IrType::I32);

        let main = function(&module, "main");
        assert_eq!(calls_to(main, "SetColor"), 1);
        assert!(instructions(main).iter().any(|k| matches!(
            k,
            InstrKind::Load { ty: crate::ir::IrType::I32, .. }
        )));
    }

    #[test]
    fn test_extern_str_unwraps_to_buffer() {
        let source = r#"{
            (extern Int:(putstr Str:s))
            (putstr "hello")
        }"#;
        let (module, ctx) = compile(source);
        assert!(!ctx.diags.has_errors());
        assert!(verify_module(&module).is_ok());

        let main = function(&module, "main");
        // the call receives the data pointer (header field 2), not the
        // handle
        assert!(instructions(main)
            .iter()
            .any(|k| matches!(k, InstrKind::GetFieldPtr { index: 2, .. })));
        assert_eq!(calls_to(main, "putstr"), 1);
    }

    #[test]
    fn test_web_loop_builds_callback() {
        let source = "{ (web-loop 60 { (meow \"tick\") }) }";
        let (module, ctx) = compile(source);
        assert!(!ctx.diags.has_errors());
        assert!(verify_module(&module).is_ok());

        let update = function(&module, "UpdateFrame");
        assert!(!update.is_external);
        assert!(update
            .blocks
            .iter()
            .any(|b| matches!(b.terminator, Some(Terminator::Ret(None)))));
        assert_eq!(calls_to(update, "puts"), 1);

        let main = function(&module, "main");
        assert_eq!(calls_to(main, "emscripten_set_main_loop"), 1);
    }

    #[test]
    fn test_function_scope_is_restored() {
        let source = r#"{
            (fun Int:(f Int:p) { (return p) })
            (def Int:x 1)
        }"#;
        let (_, ctx) = compile(source);
        // the parameter went out of scope with the function body
        assert!(!ctx.vars.contains_key("p"));
        assert!(ctx.vars.contains_key("x"));
    }

    #[test]
    fn test_conversions() {
        let source = r#"{
            (def Int:n 7)
            (def Str:s (->S n))
            (def Int:back (->I s))
        }"#;
        let (module, ctx) = compile(source);
        assert!(!ctx.diags.has_errors());
        assert!(verify_module(&module).is_ok());

        let main = function(&module, "main");
        assert_eq!(calls_to(main, "sprintf"), 1);
        assert_eq!(calls_to(main, "sscanf"), 1);
    }

    #[test]
    fn test_truncated_input_still_compiles_partially() {
        let (module, ctx) = compile("{ (def Int:x 5) ");
        assert!(ctx.diags.has_errors());
        // the partial tree still produced a verifiable module
        assert!(verify_module(&module).is_ok());
        assert!(has_const_int(function(&module, "main"), 5));
    }

    #[test]
    fn test_meow_prints_strings_only() {
        let (module, ctx) = compile("{ (meow \"hi\") (meow 42) }");
        assert!(!ctx.diags.has_errors());
        let main = function(&module, "main");
        // the Int argument prints nothing (convert first)
        assert_eq!(calls_to(main, "puts"), 1);
    }
}
