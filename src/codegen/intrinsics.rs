//! Leaf operations
//!
//! Lowering for the built-in scalar operations: arithmetic, comparison,
//! logic, declaration/assignment, printing, return, and the `->S` / `->I`
//! conversions. Every routine takes the handles its operands resolved to
//! and hands back a handle for the result (or `None` for void operations).

use super::Compiler;
use crate::ast::Molecule;
use crate::diag::DiagKind;
use crate::ir::{array_header_type, CmpOp, IrType, VReg};
use crate::typeck::{ArithOp, CompoundOp, Ty, VarEntry};

impl Compiler {
    // ============ Arithmetic ============

    /// `+ - * / %` on Int or Float, selected by the first operand's type
    pub(crate) fn lower_arith(
        &mut self,
        op: ArithOp,
        molecule: &Molecule,
        args: &[VReg],
    ) -> Option<VReg> {
        let &[lhs_ptr, rhs_ptr] = args else {
            return None;
        };
        let ty = self.first_arg_ty(molecule);
        let native = ty.native();

        let lhs = self.builder.load(lhs_ptr, native.clone());
        let rhs = self.builder.load(rhs_ptr, native.clone());

        let result = match ty {
            Ty::Int => match op {
                ArithOp::Add => self.builder.add(lhs, rhs),
                ArithOp::Sub => self.builder.sub(lhs, rhs),
                ArithOp::Mul => self.builder.mul(lhs, rhs),
                ArithOp::Div => self.builder.sdiv(lhs, rhs),
                ArithOp::Rem => self.builder.srem(lhs, rhs),
            },
            Ty::Float => match op {
                ArithOp::Add => self.builder.fadd(lhs, rhs),
                ArithOp::Sub => self.builder.fsub(lhs, rhs),
                ArithOp::Mul => self.builder.fmul(lhs, rhs),
                ArithOp::Div => self.builder.fdiv(lhs, rhs),
                ArithOp::Rem => self.builder.frem(lhs, rhs),
            },
            other => {
                self.unsupported_operands(op_symbol(op), &other, molecule);
                return None;
            }
        };

        let slot = self.builder.alloca(native);
        self.builder.store(slot, result);
        Some(slot)
    }

    /// `++ -- += -=` (and the `eat`/`exercise` aliases): compute through
    /// the first operand's storage and write the result back.
    pub(crate) fn lower_compound(
        &mut self,
        op: CompoundOp,
        molecule: &Molecule,
        args: &[VReg],
    ) -> Option<VReg> {
        let ty = self.first_arg_ty(molecule);
        let native = ty.native();

        let result = match (op, args) {
            (CompoundOp::Incr | CompoundOp::Decr, &[target]) => {
                let value = self.builder.load(target, native.clone());
                match ty {
                    Ty::Int => {
                        let one = self.builder.const_int(1);
                        if op == CompoundOp::Incr {
                            self.builder.add(value, one)
                        } else {
                            self.builder.sub(value, one)
                        }
                    }
                    Ty::Float => {
                        let one = self.builder.const_float(1.0);
                        if op == CompoundOp::Incr {
                            self.builder.fadd(value, one)
                        } else {
                            self.builder.fsub(value, one)
                        }
                    }
                    other => {
                        self.unsupported_operands(compound_symbol(op), &other, molecule);
                        return None;
                    }
                }
            }
            (CompoundOp::AddAssign | CompoundOp::SubAssign, &[lhs_ptr, rhs_ptr]) => {
                let lhs = self.builder.load(lhs_ptr, native.clone());
                let rhs = self.builder.load(rhs_ptr, native.clone());
                match ty {
                    Ty::Int => {
                        if op == CompoundOp::AddAssign {
                            self.builder.add(lhs, rhs)
                        } else {
                            self.builder.sub(lhs, rhs)
                        }
                    }
                    Ty::Float => {
                        if op == CompoundOp::AddAssign {
                            self.builder.fadd(lhs, rhs)
                        } else {
                            self.builder.fsub(lhs, rhs)
                        }
                    }
                    other => {
                        self.unsupported_operands(compound_symbol(op), &other, molecule);
                        return None;
                    }
                }
            }
            _ => return None,
        };

        let slot = self.builder.alloca(native);
        self.builder.store(slot, result);
        self.builder.store(args[0], result);
        Some(slot)
    }

    // ============ Comparison and logic ============

    pub(crate) fn lower_compare(
        &mut self,
        op: CmpOp,
        molecule: &Molecule,
        args: &[VReg],
    ) -> Option<VReg> {
        let &[lhs_ptr, rhs_ptr] = args else {
            return None;
        };
        let ty = self.first_arg_ty(molecule);
        let native = ty.native();

        let lhs = self.builder.load(lhs_ptr, native.clone());
        let rhs = self.builder.load(rhs_ptr, native.clone());

        let result = match ty {
            Ty::Int => self.builder.icmp(op, lhs, rhs),
            Ty::Float => self.builder.fcmp(op, lhs, rhs),
            other => {
                self.unsupported_operands("comparison", &other, molecule);
                return None;
            }
        };

        let slot = self.builder.alloca(IrType::Bool);
        self.builder.store(slot, result);
        Some(slot)
    }

    pub(crate) fn lower_logic_binary(&mut self, is_and: bool, args: &[VReg]) -> Option<VReg> {
        let &[lhs_ptr, rhs_ptr] = args else {
            return None;
        };
        let lhs = self.builder.load(lhs_ptr, IrType::Bool);
        let rhs = self.builder.load(rhs_ptr, IrType::Bool);
        let result = if is_and {
            self.builder.and(lhs, rhs)
        } else {
            self.builder.or(lhs, rhs)
        };
        let slot = self.builder.alloca(IrType::Bool);
        self.builder.store(slot, result);
        Some(slot)
    }

    pub(crate) fn lower_logic_not(&mut self, args: &[VReg]) -> Option<VReg> {
        let &[value_ptr] = args else {
            return None;
        };
        let value = self.builder.load(value_ptr, IrType::Bool);
        let result = self.builder.not(value);
        let slot = self.builder.alloca(IrType::Bool);
        self.builder.store(slot, result);
        Some(slot)
    }

    // ============ Declaration and assignment ============

    /// `def`: declaration with a required type annotation and an optional
    /// initial value. Storage comes from the hoisted slot when one exists,
    /// otherwise it is created here (always here for `Str`).
    pub(crate) fn lower_def(&mut self, molecule: &Molecule) -> Option<VReg> {
        let args = molecule.predicate();
        let var_atom = args.first().and_then(|p| p.as_atom())?;

        let Some(annotation) = &var_atom.ty else {
            // Top-level defs were already reported during the type-check
            // pass; only function-local ones surface here
            if !self.ctx.node_types.contains_key(&molecule.id) {
                self.ctx.diags.error(
                    DiagKind::MissingTypeAnnotation {
                        name: var_atom.identifier.clone(),
                    },
                    Some(var_atom.span),
                );
            }
            return None;
        };

        let ty = Ty::from_name(annotation);
        let storage = self.storage_type(&ty);

        let slot = match self
            .ctx
            .vars
            .get(&var_atom.identifier)
            .and_then(|entry| entry.slot)
        {
            Some(hoisted) => hoisted,
            None => {
                let slot = self.builder.alloca(storage.clone());
                self.ctx.vars.insert(
                    var_atom.identifier.clone(),
                    VarEntry {
                        ty: ty.clone(),
                        slot: Some(slot),
                    },
                );
                slot
            }
        };

        if args.len() >= 2 {
            if let Some(value_ptr) = self.value_of(&args[1]) {
                // Extern structs copy the whole aggregate; everything else
                // copies the native value (struct handles alias on purpose)
                let load_ty = if self.ctx.is_extern_struct(&ty) {
                    storage
                } else {
                    ty.native()
                };
                let value = self.builder.load(value_ptr, load_ty);
                self.builder.store(slot, value);
            }
        }

        Some(slot)
    }

    /// `=`: reassignment of an existing variable only
    pub(crate) fn lower_assign(&mut self, molecule: &Molecule) -> Option<VReg> {
        let args = molecule.predicate();
        if args.len() < 2 {
            return None;
        }
        let var_atom = args.first().and_then(|p| p.as_atom())?;

        let entry = self.ctx.vars.get(&var_atom.identifier);
        let Some((ty, slot)) = entry.and_then(|e| e.slot.map(|s| (e.ty.clone(), s))) else {
            self.ctx.diags.error(
                DiagKind::UndeclaredAssignment {
                    name: var_atom.identifier.clone(),
                },
                Some(var_atom.span),
            );
            return None;
        };

        let value_ptr = self.value_of(&args[1])?;
        let value = self.builder.load(value_ptr, ty.native());
        self.builder.store(slot, value);
        Some(slot)
    }

    // ============ Output ============

    /// `meow`: print a Str through `puts`. Other types print nothing —
    /// convert first.
    pub(crate) fn lower_print(&mut self, molecule: &Molecule, args: &[VReg]) -> Option<VReg> {
        let &[handle, ..] = args else {
            return None;
        };
        if self.first_arg_ty(molecule) == Ty::Str {
            self.declare_stdio();
            let data = self.cstring_data(handle);
            self.builder.call("puts", vec![data]);
        }
        None
    }

    // ============ Return ============

    pub(crate) fn lower_return(&mut self, molecule: &Molecule, args: &[VReg]) -> Option<VReg> {
        match args.first() {
            None => self.builder.ret(None),
            Some(&handle) => {
                let ty = self.first_arg_ty(molecule);
                let value = self.builder.load(handle, ty.native());
                self.builder.ret(Some(value));
            }
        }
        None
    }

    // ============ Conversions ============

    /// `->S`: convert Char/Int/Float/Bool to a fresh growable string
    pub(crate) fn lower_conv_to_str(&mut self, molecule: &Molecule, args: &[VReg]) -> Option<VReg> {
        let &[handle, ..] = args else {
            return None;
        };
        let ty = self.first_arg_ty(molecule);
        let value = self.builder.load(handle, ty.native());

        match ty {
            Ty::Char => {
                // A two-byte buffer: the char and its terminator
                let buffer = self.builder.alloca(IrType::array(IrType::I8, 2));
                let idx0 = self.builder.const_int(0);
                let char_ptr = self.builder.get_element_ptr(buffer, IrType::I8, idx0);
                self.builder.store(char_ptr, value);
                let idx1 = self.builder.const_int(1);
                let nul_ptr = self.builder.get_element_ptr(buffer, IrType::I8, idx1);
                let nul = self.builder.const_char(0);
                self.builder.store(nul_ptr, nul);

                let size = self.builder.const_int(1);
                let capacity = self.builder.const_int(2);
                let header = self.build_header(size, capacity, buffer);
                Some(self.wrap_handle(header))
            }
            Ty::Int => {
                self.declare_stdio();
                let buffer = self.builder.alloca(IrType::array(IrType::I8, 12));
                let format = self.builder.add_string_constant("%d");
                let format_ptr = self.builder.global_ref(&format);
                let written = self.builder.call("sprintf", vec![buffer, format_ptr, value]);

                let capacity = self.builder.const_int(12);
                let header = self.build_header(written, capacity, buffer);
                Some(self.wrap_handle(header))
            }
            Ty::Float => {
                self.declare_stdio();
                let buffer = self.builder.alloca(IrType::array(IrType::I8, 32));
                let format = self.builder.add_string_constant("%f");
                let format_ptr = self.builder.global_ref(&format);
                // C varargs promote float to double
                let promoted = self.builder.fpext(value, IrType::F64);
                let written = self
                    .builder
                    .call("sprintf", vec![buffer, format_ptr, promoted]);

                let capacity = self.builder.const_int(32);
                let header = self.build_header(written, capacity, buffer);
                Some(self.wrap_handle(header))
            }
            Ty::Bool => {
                let true_name = self.builder.add_string_constant("true");
                let false_name = self.builder.add_string_constant("false");
                let true_ptr = self.builder.global_ref(&true_name);
                let false_ptr = self.builder.global_ref(&false_name);

                let data = self.builder.select(value, true_ptr, false_ptr);
                let four = self.builder.const_int(4);
                let five = self.builder.const_int(5);
                let size = self.builder.select(value, four, five);
                let capacity = self.builder.const_int(6);
                let header = self.build_header(size, capacity, data);
                Some(self.wrap_handle(header))
            }
            _ => None,
        }
    }

    /// `->I`: parse a Str into an Int via `sscanf`
    pub(crate) fn lower_conv_to_int(&mut self, molecule: &Molecule, args: &[VReg]) -> Option<VReg> {
        let &[handle, ..] = args else {
            return None;
        };
        if self.first_arg_ty(molecule) != Ty::Str {
            return None;
        }

        self.declare_stdio();
        let header = array_header_type();
        let str_ptr = self.builder.load(handle, IrType::Ptr);
        let data_ptr_ptr = self.builder.get_field_ptr(str_ptr, header, 2);
        let data = self.builder.load(data_ptr_ptr, IrType::Ptr);

        let format = self.builder.add_string_constant("%d");
        let format_ptr = self.builder.global_ref(&format);
        let result = self.builder.alloca(IrType::I32);
        self.builder
            .call("sscanf", vec![data, format_ptr, result]);
        Some(result)
    }

    // ============ Diagnostics ============

    fn unsupported_operands(&mut self, op: &str, ty: &Ty, molecule: &Molecule) {
        self.ctx.diags.error(
            DiagKind::UnsupportedOperands {
                op: op.to_string(),
                ty: ty.to_string(),
            },
            Some(molecule.span),
        );
    }
}

fn op_symbol(op: ArithOp) -> &'static str {
    match op {
        ArithOp::Add => "+",
        ArithOp::Sub => "-",
        ArithOp::Mul => "*",
        ArithOp::Div => "/",
        ArithOp::Rem => "%",
    }
}

fn compound_symbol(op: CompoundOp) -> &'static str {
    match op {
        CompoundOp::Incr => "++",
        CompoundOp::Decr => "--",
        CompoundOp::AddAssign => "+=",
        CompoundOp::SubAssign => "-=",
    }
}
