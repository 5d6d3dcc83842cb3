//! Type checking and registry passes
//!
//! Three passes run over the parsed tree before any code is generated:
//!
//! 1. **Type check** every top-level form. Inference is memoizing and, for
//!    `def`, populates the variable table's type column (see [`infer`]).
//! 2. **Struct collection** walks the whole tree registering `struct` /
//!    `extern-struct` declarations, so field types resolve during hoisting.
//! 3. **Variable hoisting** collects every `def`-declared name with a
//!    non-empty, non-`Str` type so storage can be pre-allocated in the
//!    enclosing function's entry block. `Str` locals are excluded on
//!    purpose: a string's buffer is owned from first assignment, not from
//!    function entry, so its storage is created at the `def` itself.
//!
//! Hoisting is per enclosing function: the program-level walk does not
//! descend into `fun` or `web-loop` bodies — those are compiled as separate
//! functions, which run the same collection over their own body.

mod context;
mod infer;
mod ty;

pub use context::{ArithOp, CompoundOp, Context, Op, OpKind, StructInfo, VarEntry};
pub use infer::{atom_ty, molecule_ty, particle_ty};
pub use ty::Ty;

use crate::ast::{Molecule, Particle};

/// Pass 1: run type inference over every top-level form, populating the
/// variable table's type column and reporting missing annotations.
pub fn check_program(ctx: &mut Context, root: &Molecule) {
    for form in root.predicate() {
        particle_ty(ctx, form);
    }
}

/// Pass 1.5: collect struct declarations ahead of hoisting.
///
/// Both written forms are accepted: `(struct Person:[Str:name Int:age])`
/// (typed-array form) and `(struct Person [Str:name Int:age])` /
/// `(extern-struct Color [Char:r Char:g Char:b Char:a])` (name-atom form).
pub fn collect_struct_declarations(ctx: &mut Context, particle: &Particle) {
    let Particle::Molecule(molecule) = particle else {
        return;
    };
    if molecule.is_empty() {
        return;
    }

    match molecule.subject_name() {
        Some("struct") => {
            if let Some((name, fields)) = struct_decl_parts(molecule) {
                register_struct(ctx, name, fields, false);
            }
            return;
        }
        Some("extern-struct") => {
            if let Some((name, fields)) = struct_decl_parts(molecule) {
                register_struct(ctx, name, fields, true);
            }
            return;
        }
        _ => {}
    }

    for child in molecule.predicate() {
        collect_struct_declarations(ctx, child);
    }
}

/// Pull the struct name and field-list molecule out of either declaration
/// form.
pub fn struct_decl_parts(molecule: &Molecule) -> Option<(String, &Molecule)> {
    let args = molecule.predicate();
    match args.first()? {
        // (struct Person:[...]) — name rides on the typed array literal
        Particle::Molecule(fields) => {
            let name = fields.ty.clone()?;
            Some((name, fields))
        }
        // (struct Person [...]) — name atom, fields follow
        Particle::Atom(name_atom) => {
            let fields = args.get(1)?.as_molecule()?;
            Some((name_atom.identifier.clone(), fields))
        }
    }
}

fn register_struct(ctx: &mut Context, name: String, fields: &Molecule, is_extern: bool) {
    if ctx.structs.contains_key(&name) {
        return;
    }

    let mut field_names = Vec::new();
    let mut field_types = Vec::new();
    for field in fields.predicate() {
        let Some(atom) = field.as_atom() else {
            continue;
        };
        field_names.push(atom.identifier.clone());
        field_types.push(match &atom.ty {
            Some(annotation) => Ty::from_name(annotation),
            None => Ty::Var,
        });
    }

    ctx.structs.insert(
        name.clone(),
        StructInfo {
            name,
            field_names,
            field_types,
            is_extern,
        },
    );
}

/// Pass 2: collect hoistable variables in declaration order.
///
/// Skips `fun` and `web-loop` subtrees — their bodies hoist into their own
/// entry blocks when they are compiled.
pub fn hoist_variables(particle: &Particle, out: &mut Vec<(String, Ty)>) {
    let Particle::Molecule(molecule) = particle else {
        return;
    };
    if molecule.is_empty() {
        return;
    }

    match molecule.subject_name() {
        Some("fun") | Some("web-loop") => return,
        Some("def") => {
            if let Some(atom) = molecule.predicate().first().and_then(|p| p.as_atom()) {
                if let Some(annotation) = &atom.ty {
                    let ty = Ty::from_name(annotation);
                    if ty != Ty::Str && !out.iter().any(|(name, _)| name == &atom.identifier) {
                        out.push((atom.identifier.clone(), ty));
                    }
                }
            }
        }
        _ => {}
    }

    for child in molecule.predicate() {
        hoist_variables(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_struct_collection_name_atom_form() {
        let (root, _) = parse("{ (extern-struct Color [Char:r Char:g Char:b Char:a]) }");
        let mut ctx = Context::new();
        collect_struct_declarations(&mut ctx, &Particle::Molecule(root));

        let color = &ctx.structs["Color"];
        assert!(color.is_extern);
        assert_eq!(color.field_names, vec!["r", "g", "b", "a"]);
        assert_eq!(color.field_types, vec![Ty::Char; 4]);
    }

    #[test]
    fn test_struct_collection_typed_array_form() {
        let (root, _) = parse("{ (struct Person:[Str:name Int:age Bool:friend]) }");
        let mut ctx = Context::new();
        collect_struct_declarations(&mut ctx, &Particle::Molecule(root));

        let person = &ctx.structs["Person"];
        assert!(!person.is_extern);
        assert_eq!(person.field_names, vec!["name", "age", "friend"]);
        assert_eq!(person.field_types, vec![Ty::Str, Ty::Int, Ty::Bool]);
    }

    #[test]
    fn test_struct_collection_recurses() {
        let (root, _) = parse("{ { (struct Inner [Int:x]) } }");
        let mut ctx = Context::new();
        collect_struct_declarations(&mut ctx, &Particle::Molecule(root));
        assert!(ctx.structs.contains_key("Inner"));
    }

    #[test]
    fn test_first_struct_declaration_wins() {
        let (root, _) = parse("{ (struct P [Int:x]) (struct P [Float:y]) }");
        let mut ctx = Context::new();
        collect_struct_declarations(&mut ctx, &Particle::Molecule(root));
        assert_eq!(ctx.structs["P"].field_types, vec![Ty::Int]);
    }

    #[test]
    fn test_hoisting_order_and_exclusions() {
        let source = r#"{
            (def Int:a 1)
            (def Str:greeting "hi")
            { (def Float:b 2.0) (def Int:a 3) }
        }"#;
        let (root, _) = parse(source);
        let mut vars = Vec::new();
        hoist_variables(&Particle::Molecule(root), &mut vars);

        // Str excluded, duplicates collapsed, first-seen order kept
        assert_eq!(
            vars,
            vec![("a".to_string(), Ty::Int), ("b".to_string(), Ty::Float)]
        );
    }

    #[test]
    fn test_hoisting_skips_function_bodies() {
        let source = r#"{
            (def Int:global 1)
            (fun Int:(f Int:p) { (def Int:local 2) (return local) })
        }"#;
        let (root, _) = parse(source);
        let mut vars = Vec::new();
        hoist_variables(&Particle::Molecule(root), &mut vars);
        assert_eq!(vars, vec![("global".to_string(), Ty::Int)]);
    }

    #[test]
    fn test_check_program_populates_types() {
        let (root, _) = parse("{ (def Int:x 1) (= x 2) }");
        let mut ctx = Context::new();
        check_program(&mut ctx, &root);
        assert_eq!(ctx.vars["x"].ty, Ty::Int);
        assert!(!ctx.diags.has_errors());
    }
}
