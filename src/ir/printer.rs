//! Textual module emission
//!
//! Renders a [`Module`] into the textual form handed to the external
//! backend: aggregate definitions, globals, then declarations and function
//! bodies with labeled blocks.

use super::types::Module;
use std::fmt::Write;

/// Print a module in its textual emission format
pub fn print_module(module: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "module {}\n", module.name);

    for def in &module.structs {
        let _ = write!(out, "type %{} = {{ ", def.name);
        for (i, (name, ty)) in def.fields.iter().enumerate() {
            if i > 0 {
                let _ = write!(out, ", ");
            }
            let _ = write!(out, "{}: {}", name, ty);
        }
        let _ = writeln!(out, " }}");
    }
    if !module.structs.is_empty() {
        let _ = writeln!(out);
    }

    for global in &module.globals {
        let kw = if global.is_const { "const" } else { "global" };
        match &global.init {
            Some(init) => {
                let _ = writeln!(out, "{} @{} : {} = {}", kw, global.name, global.ty, init);
            }
            None => {
                let _ = writeln!(out, "{} @{} : {}", kw, global.name, global.ty);
            }
        }
    }
    if !module.globals.is_empty() {
        let _ = writeln!(out);
    }

    for func in &module.functions {
        if func.is_external {
            let _ = write!(out, "declare @{}(", func.name);
        } else {
            let _ = write!(out, "define @{}(", func.name);
        }

        for (i, (vreg, ty)) in func.params.iter().enumerate() {
            if i > 0 {
                let _ = write!(out, ", ");
            }
            if func.is_external {
                let _ = write!(out, "{}", ty);
            } else {
                let _ = write!(out, "{} {}", ty, vreg);
            }
        }
        if func.is_vararg {
            if !func.params.is_empty() {
                let _ = write!(out, ", ");
            }
            let _ = write!(out, "...");
        }
        let _ = write!(out, ") -> {}", func.ret_type);

        if func.is_external {
            let _ = writeln!(out);
            continue;
        }

        let _ = writeln!(out, " {{");
        for block in &func.blocks {
            let _ = writeln!(out, "  {}:", block.id);
            for instr in &block.instructions {
                let _ = writeln!(out, "    {}", instr);
            }
            if let Some(ref term) = block.terminator {
                let _ = writeln!(out, "    {}", term);
            }
        }
        let _ = writeln!(out, "}}\n");
    }

    out
}

#[cfg(test)]
mod tests {
    use crate::ir::{IrBuilder, IrType};

    #[test]
    fn test_print_shapes() {
        let mut b = IrBuilder::new("demo");
        b.declare_external_vararg("sprintf", vec![IrType::Ptr, IrType::Ptr], IrType::I32);
        b.define_struct(
            "Person",
            vec![
                ("name".to_string(), IrType::Ptr),
                ("age".to_string(), IrType::I32),
            ],
        );
        let name = b.add_string_constant("bob");
        b.start_function("main", vec![], IrType::I32);
        let p = b.global_ref(&name);
        let slot = b.alloca(IrType::Ptr);
        b.store(slot, p);
        let zero = b.const_int(0);
        b.ret(Some(zero));
        let text = super::print_module(&b.finish());

        assert!(text.contains("module demo"));
        assert!(text.contains("type %Person = { name: ptr, age: i32 }"));
        assert!(text.contains("const @.str.0 : [4 x i8] = c\"bob\""));
        assert!(text.contains("declare @sprintf(ptr, ptr, ...) -> i32"));
        assert!(text.contains("define @main() -> i32 {"));
        assert!(text.contains("ret %"));
    }
}
