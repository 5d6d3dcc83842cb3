//! Runtime layout for growable containers and structs
//!
//! Every array and string value is a handle to a three-word header
//! `{size: i32, capacity: i32, data: ptr}`. Literals size their buffer to
//! the next power of two; mutating operations grow by doubling, copying the
//! live elements into a fresh buffer (the old buffer is not released).
//! Strings keep one extra slot for the NUL terminator and re-terminate
//! after every mutation.
//!
//! Internal struct instances live behind one extra indirection cell so that
//! copying the "value" aliases the same aggregate (reference semantics);
//! extern structs are stored and passed as raw aggregates.

use super::Compiler;
use crate::ast::Molecule;
use crate::ir::{array_header_type, CmpOp, IrType, VReg};
use crate::typeck::Ty;

/// Which of the two growing mutators is being lowered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GrowKind {
    Append,
    Insert,
}

/// Initial capacity for a literal with `len` elements: next power of two,
/// minimum 1. Strings pass `len + 1` to reserve the terminator slot.
pub(crate) fn literal_capacity(len: usize) -> usize {
    len.max(1).next_power_of_two()
}

impl Compiler {
    // ============ Header plumbing ============

    /// Allocate a header and fill in `{size, capacity, data}`
    pub(crate) fn build_header(&mut self, size: VReg, capacity: VReg, data: VReg) -> VReg {
        let header_ty = array_header_type();
        let header = self.builder.alloca(header_ty.clone());

        let size_ptr = self.builder.get_field_ptr(header, header_ty.clone(), 0);
        self.builder.store(size_ptr, size);
        let cap_ptr = self.builder.get_field_ptr(header, header_ty.clone(), 1);
        self.builder.store(cap_ptr, capacity);
        let data_ptr_ptr = self.builder.get_field_ptr(header, header_ty, 2);
        self.builder.store(data_ptr_ptr, data);

        header
    }

    /// Wrap a pointer in a fresh indirection cell — the uniform handle
    /// shape
    pub(crate) fn wrap_handle(&mut self, ptr: VReg) -> VReg {
        let cell = self.builder.alloca(IrType::Ptr);
        self.builder.store(cell, ptr);
        cell
    }

    /// Load the header pointer plus its three fields from a container
    /// handle; returns (header_ptr, size, size_ptr, capacity, cap_ptr,
    /// data, data_ptr_ptr).
    #[allow(clippy::type_complexity)]
    fn load_header(&mut self, handle: VReg) -> (VReg, VReg, VReg, VReg, VReg, VReg, VReg) {
        let header_ty = array_header_type();
        let header = self.builder.load(handle, IrType::Ptr);

        let size_ptr = self.builder.get_field_ptr(header, header_ty.clone(), 0);
        let size = self.builder.load(size_ptr, IrType::I32);
        let cap_ptr = self.builder.get_field_ptr(header, header_ty.clone(), 1);
        let capacity = self.builder.load(cap_ptr, IrType::I32);
        let data_ptr_ptr = self.builder.get_field_ptr(header, header_ty, 2);
        let data = self.builder.load(data_ptr_ptr, IrType::Ptr);

        (header, size, size_ptr, capacity, cap_ptr, data, data_ptr_ptr)
    }

    /// `zext(count) * sizeof(elem)` as an i64 byte count
    fn byte_count(&mut self, count: VReg, elem: &IrType) -> VReg {
        let wide = self.builder.zext(count, IrType::I64);
        let elem_size = self.builder.const_i64(elem.size() as i64);
        self.builder.mul(wide, elem_size)
    }

    // ============ Literals ============

    /// Build a string literal's header and character buffer in place
    pub(crate) fn string_literal(&mut self, text: &str) -> VReg {
        let bytes = text.as_bytes();
        let size = bytes.len();
        let capacity = literal_capacity(size + 1);

        let buffer = self.builder.alloca(IrType::array(IrType::I8, size + 1));
        for (i, &byte) in bytes.iter().enumerate() {
            let idx = self.builder.const_int(i as i32);
            let ptr = self.builder.get_element_ptr(buffer, IrType::I8, idx);
            let value = self.builder.const_char(byte);
            self.builder.store(ptr, value);
        }
        let nul_idx = self.builder.const_int(size as i32);
        let nul_ptr = self.builder.get_element_ptr(buffer, IrType::I8, nul_idx);
        let nul = self.builder.const_char(0);
        self.builder.store(nul_ptr, nul);

        let size_c = self.builder.const_int(size as i32);
        let cap_c = self.builder.const_int(capacity as i32);
        let header = self.build_header(size_c, cap_c, buffer);
        self.wrap_handle(header)
    }

    /// `[e1 e2 ...]`: a growable array literal
    pub(crate) fn array_literal(&mut self, molecule: &Molecule, args: &[VReg]) -> Option<VReg> {
        if args.is_empty() {
            return None;
        }

        let elem_ty = self.first_arg_ty(molecule);
        let elem = elem_ty.native();
        let size = args.len();
        let capacity = literal_capacity(size);

        let buffer = self.builder.alloca(IrType::array(elem.clone(), size));
        for (i, &value_ptr) in args.iter().enumerate() {
            let value = self.builder.load(value_ptr, elem.clone());
            let idx = self.builder.const_int(i as i32);
            let ptr = self.builder.get_element_ptr(buffer, elem.clone(), idx);
            self.builder.store(ptr, value);
        }

        let size_c = self.builder.const_int(size as i32);
        let cap_c = self.builder.const_int(capacity as i32);
        let header = self.build_header(size_c, cap_c, buffer);
        Some(self.wrap_handle(header))
    }

    /// `Person:[...]`: a struct literal. Extern structs hand back the
    /// aggregate's own storage; internal structs go behind an indirection
    /// cell.
    pub(crate) fn struct_literal(&mut self, molecule: &Molecule) -> Option<VReg> {
        let name = molecule.ty.clone()?;
        let def = self.ctx.structs.get(&name)?.clone();

        for child in molecule.predicate() {
            if self.value_of(child).is_none() {
                self.compile_particle(child);
            }
        }

        let agg = IrType::Named(def.name.clone());
        let instance = self.builder.alloca(agg.clone());

        for (i, child) in molecule.predicate().iter().enumerate() {
            let Some(value_ptr) = self.value_of(child) else {
                continue;
            };
            let Some(field_ty) = def.field_types.get(i) else {
                break;
            };
            let value = self.builder.load(value_ptr, field_ty.native());
            let field_ptr = self.builder.get_field_ptr(instance, agg.clone(), i as u32);
            self.builder.store(field_ptr, value);
        }

        let handle = if def.is_extern {
            instance
        } else {
            self.wrap_handle(instance)
        };
        self.ctx.node_values.insert(molecule.id, handle);
        Some(handle)
    }

    // ============ Element access ============

    /// `(len a)`
    pub(crate) fn array_len(&mut self, args: &[VReg]) -> Option<VReg> {
        let &[handle, ..] = args else {
            return None;
        };
        let (_, size, ..) = self.load_header(handle);
        let slot = self.builder.alloca(IrType::I32);
        self.builder.store(slot, size);
        Some(slot)
    }

    /// `(get a i)`: unchecked element read
    pub(crate) fn array_get(&mut self, molecule: &Molecule, args: &[VReg]) -> Option<VReg> {
        let &[handle, index_ptr, ..] = args else {
            return None;
        };
        let elem = self.first_arg_ty(molecule).element().native();

        let (.., data, _) = self.load_header(handle);
        let index = self.builder.load(index_ptr, IrType::I32);
        let elem_ptr = self.builder.get_element_ptr(data, elem.clone(), index);
        let value = self.builder.load(elem_ptr, elem.clone());

        let slot = self.builder.alloca(elem);
        self.builder.store(slot, value);
        Some(slot)
    }

    /// `(set a i v)`: unchecked element write
    pub(crate) fn array_set(&mut self, molecule: &Molecule, args: &[VReg]) -> Option<VReg> {
        let &[handle, index_ptr, value_ptr, ..] = args else {
            return None;
        };
        let elem = self.first_arg_ty(molecule).element().native();

        let (.., data, _) = self.load_header(handle);
        let index = self.builder.load(index_ptr, IrType::I32);
        let elem_ptr = self.builder.get_element_ptr(data, elem.clone(), index);
        let value = self.builder.load(value_ptr, elem);
        self.builder.store(elem_ptr, value);
        None
    }

    // ============ Growing mutators ============

    /// `(append a v)` / `(insert a i v)`: grow by doubling when full, then
    /// write. Insert shifts the tail right with an overlap-safe move.
    pub(crate) fn array_grow_insert(
        &mut self,
        molecule: &Molecule,
        args: &[VReg],
        kind: GrowKind,
    ) -> Option<VReg> {
        let needed = if kind == GrowKind::Append { 2 } else { 3 };
        if args.len() < needed {
            return None;
        }
        let handle = args[0];

        let self_ty = self.first_arg_ty(molecule);
        let is_str = self_ty == Ty::Str;
        let elem = self_ty.element().native();

        let (_, size, size_ptr, capacity, cap_ptr, data, data_ptr_ptr) = self.load_header(handle);

        // Strings reserve a slot for the terminator: grow when size+1
        // reaches capacity. Arrays grow when exactly full.
        let full = if is_str {
            let one = self.builder.const_int(1);
            let size_plus = self.builder.add(size, one);
            self.builder.icmp(CmpOp::Uge, size_plus, capacity)
        } else {
            self.builder.icmp(CmpOp::Eq, size, capacity)
        };

        let grow_block = self.builder.create_block();
        let cont_block = self.builder.create_block();
        self.builder.cond_br(full, grow_block, cont_block);

        // Grow: new buffer of max(1, capacity*2) elements, copy the live
        // prefix, update the header. The old buffer is left behind.
        self.builder.start_block(grow_block);
        let zero = self.builder.const_int(0);
        let cap_is_zero = self.builder.icmp(CmpOp::Eq, capacity, zero);
        let two = self.builder.const_int(2);
        let doubled = self.builder.mul(capacity, two);
        let one = self.builder.const_int(1);
        let new_cap = self.builder.select(cap_is_zero, one, doubled);

        let new_bytes = self.byte_count(new_cap, &elem);
        let new_data = self.builder.malloc_bytes(new_bytes);
        let live_bytes = self.byte_count(size, &elem);
        self.builder.memcpy(new_data, data, live_bytes);

        self.builder.store(cap_ptr, new_cap);
        self.builder.store(data_ptr_ptr, new_data);
        self.builder.br(cont_block);

        self.builder.start_block(cont_block);
        let data = self.builder.load(data_ptr_ptr, IrType::Ptr);

        let (index, value_ptr) = match kind {
            GrowKind::Append => (size, args[1]),
            GrowKind::Insert => {
                let index = self.builder.load(args[1], IrType::I32);
                (index, args[2])
            }
        };
        let value = self.builder.load(value_ptr, elem.clone());

        if kind == GrowKind::Insert {
            // Shift [index, size) one slot right before writing
            let move_count = self.builder.sub(size, index);
            let move_bytes = self.byte_count(move_count, &elem);
            let src = self.builder.get_element_ptr(data, elem.clone(), index);
            let one = self.builder.const_int(1);
            let index_plus = self.builder.add(index, one);
            let dst = self.builder.get_element_ptr(data, elem.clone(), index_plus);
            self.builder.memmove(dst, src, move_bytes);
        }

        let write_ptr = self.builder.get_element_ptr(data, elem.clone(), index);
        self.builder.store(write_ptr, value);

        let one = self.builder.const_int(1);
        let new_size = self.builder.add(size, one);
        self.builder.store(size_ptr, new_size);

        if is_str {
            self.terminate_string(data, &elem, new_size);
        }

        Some(handle)
    }

    /// `(remove a i)`: shift the tail left and shrink
    pub(crate) fn array_remove(&mut self, molecule: &Molecule, args: &[VReg]) -> Option<VReg> {
        let &[handle, index_ptr, ..] = args else {
            return None;
        };
        let self_ty = self.first_arg_ty(molecule);
        let is_str = self_ty == Ty::Str;
        let elem = self_ty.element().native();

        let (_, size, size_ptr, _, _, data, _) = self.load_header(handle);

        let index = self.builder.load(index_ptr, IrType::I32);
        let one = self.builder.const_int(1);
        let after = self.builder.sub(size, index);
        let move_count = self.builder.sub(after, one);
        let move_bytes = self.byte_count(move_count, &elem);

        let dst = self.builder.get_element_ptr(data, elem.clone(), index);
        let index_plus = self.builder.add(index, one);
        let src = self.builder.get_element_ptr(data, elem.clone(), index_plus);
        self.builder.memmove(dst, src, move_bytes);

        let new_size = self.builder.sub(size, one);
        self.builder.store(size_ptr, new_size);

        if is_str {
            self.terminate_string(data, &elem, new_size);
        }

        Some(handle)
    }

    /// `(pop_back a)`: shrink and hand back the element just past the new
    /// size
    pub(crate) fn array_pop_back(&mut self, molecule: &Molecule, args: &[VReg]) -> Option<VReg> {
        let &[handle, ..] = args else {
            return None;
        };
        let self_ty = self.first_arg_ty(molecule);
        let is_str = self_ty == Ty::Str;
        let elem = self_ty.element().native();

        let (_, size, size_ptr, _, _, data, _) = self.load_header(handle);

        let one = self.builder.const_int(1);
        let new_size = self.builder.sub(size, one);
        self.builder.store(size_ptr, new_size);

        let elem_ptr = self.builder.get_element_ptr(data, elem.clone(), new_size);
        let value = self.builder.load(elem_ptr, elem.clone());

        if is_str {
            self.terminate_string(data, &elem, new_size);
        }

        let slot = self.builder.alloca(elem);
        self.builder.store(slot, value);
        Some(slot)
    }

    /// Write the NUL just past `size`
    fn terminate_string(&mut self, data: VReg, elem: &IrType, size: VReg) {
        let nul_ptr = self.builder.get_element_ptr(data, elem.clone(), size);
        let nul = self.builder.const_char(0);
        self.builder.store(nul_ptr, nul);
    }
}

#[cfg(test)]
mod tests {
    use super::literal_capacity;

    #[test]
    fn test_literal_capacity() {
        // arrays: next power of two >= count, minimum 1
        assert_eq!(literal_capacity(0), 1);
        assert_eq!(literal_capacity(1), 1);
        assert_eq!(literal_capacity(2), 2);
        assert_eq!(literal_capacity(3), 4);
        assert_eq!(literal_capacity(5), 8);
        // strings pass len+1: "bob" -> 4, "menu" -> 8
        assert_eq!(literal_capacity(3 + 1), 4);
        assert_eq!(literal_capacity(4 + 1), 8);
    }
}
