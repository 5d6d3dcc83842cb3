//! Type inference
//!
//! A recursive, memoizing walk over the AST. Atom types resolve in a fixed
//! order: explicit annotation, literal pattern, variable table, fallback to
//! the unknown placeholder. Molecule types come from the inference rule of
//! the subject's operation and are memoized per node.
//!
//! Inference is not side-effect free: the rule for `def` is the point where
//! a variable's type first enters the variable table, which is why the
//! type-check pass must run over every top-level form before storage is
//! allocated or code is generated.

use crate::ast::{Atom, Molecule, Particle};
use crate::diag::DiagKind;
use crate::typeck::{Context, OpKind, Ty, VarEntry};

/// Infer the logical type of any particle
pub fn particle_ty(ctx: &mut Context, particle: &Particle) -> Ty {
    match particle {
        Particle::Atom(atom) => atom_ty(ctx, atom),
        Particle::Molecule(molecule) => molecule_ty(ctx, molecule),
    }
}

/// Infer the logical type of an atom
pub fn atom_ty(ctx: &Context, atom: &Atom) -> Ty {
    // A type recorded during code generation (member access resolving to
    // the field's type) is authoritative
    if let Some(ty) = ctx.node_types.get(&atom.id) {
        return ty.clone();
    }

    if let Some(annotation) = &atom.ty {
        return Ty::from_name(annotation);
    }

    let ident = atom.identifier.as_str();
    let mut chars = ident.chars();
    let first = chars.next();

    // Numeric literal: digits, or a minus sign followed by a digit
    let is_numeric = match first {
        Some(c) if c.is_ascii_digit() => true,
        Some('-') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    };
    if is_numeric {
        return if ident.contains('.') { Ty::Float } else { Ty::Int };
    }

    match ident {
        "true" | "false" => return Ty::Bool,
        "nil" => return Ty::Nil,
        _ => {}
    }

    if let Some(entry) = ctx.vars.get(ident) {
        return entry.ty.clone();
    }

    Ty::Var
}

/// Infer (and memoize) the logical type of a molecule
pub fn molecule_ty(ctx: &mut Context, molecule: &Molecule) -> Ty {
    if let Some(annotation) = &molecule.ty {
        return Ty::from_name(annotation);
    }
    if let Some(ty) = ctx.node_types.get(&molecule.id) {
        return ty.clone();
    }

    let ty = infer_uncached(ctx, molecule);
    ctx.node_types.insert(molecule.id, ty.clone());
    ty
}

fn infer_uncached(ctx: &mut Context, molecule: &Molecule) -> Ty {
    let Some(name) = molecule.subject_name() else {
        return Ty::Nil;
    };
    let Some(op) = ctx.ops.get(name) else {
        return Ty::Nil;
    };
    let kind = op.kind.clone();
    let args = molecule.predicate();

    match kind {
        OpKind::Arith(_) => {
            if args.len() < 2 {
                return Ty::Nil;
            }
            let t1 = particle_ty(ctx, &args[0]);
            let t2 = particle_ty(ctx, &args[1]);
            match (t1, t2) {
                (Ty::Int, Ty::Int) => Ty::Int,
                (Ty::Float, Ty::Float) => Ty::Float,
                (Ty::Var, _) | (_, Ty::Var) => Ty::Var,
                _ => Ty::Nil,
            }
        }
        OpKind::Compound(_) | OpKind::Return => match args.first() {
            Some(first) => particle_ty(ctx, first),
            None => Ty::Nil,
        },
        OpKind::Compare(_) | OpKind::LogicAnd | OpKind::LogicOr | OpKind::LogicNot => Ty::Bool,
        OpKind::Def => infer_def(ctx, molecule),
        OpKind::Assign => {
            let var = args
                .first()
                .and_then(|p| p.as_atom())
                .map(|a| a.identifier.as_str());
            match var.and_then(|name| ctx.vars.get(name)) {
                Some(entry) if args.len() >= 2 => entry.ty.clone(),
                _ => Ty::Nil,
            }
        }
        OpKind::Print | OpKind::ArraySet => Ty::Nil,
        OpKind::ConvToStr => Ty::Str,
        OpKind::ConvToInt | OpKind::ArrayLen => Ty::Int,
        OpKind::ArrayLit => match args.first() {
            Some(first) => Ty::array(particle_ty(ctx, first)),
            None => Ty::array(Ty::Nil),
        },
        OpKind::ArrayGet | OpKind::ArrayPopBack => match args.first() {
            Some(first) => particle_ty(ctx, first).element(),
            None => Ty::Nil,
        },
        OpKind::ArrayAppend | OpKind::ArrayInsert | OpKind::ArrayRemove => match args.first() {
            Some(first) => particle_ty(ctx, first),
            None => Ty::Nil,
        },
        OpKind::UserFn { ret, .. } | OpKind::ExternFn { ret, .. } => ret,
    }
}

/// `def`'s inference rule doubles as variable registration: the declared
/// type (and only the type — storage comes later) enters the table here.
fn infer_def(ctx: &mut Context, molecule: &Molecule) -> Ty {
    let Some(var_atom) = molecule.predicate().first().and_then(|p| p.as_atom()) else {
        return Ty::Nil;
    };

    let Some(annotation) = &var_atom.ty else {
        ctx.diags.error(
            DiagKind::MissingTypeAnnotation {
                name: var_atom.identifier.clone(),
            },
            Some(var_atom.span),
        );
        return Ty::Nil;
    };

    let ty = Ty::from_name(annotation);
    if !ctx.vars.contains_key(&var_atom.identifier) {
        ctx.vars.insert(
            var_atom.identifier.clone(),
            VarEntry {
                ty: ty.clone(),
                slot: None,
            },
        );
    }
    ty
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn infer(source: &str) -> (Ty, Context) {
        let (molecule, errors) = parse(source);
        assert!(errors.is_empty());
        let mut ctx = Context::new();
        let ty = molecule_ty(&mut ctx, &molecule);
        (ty, ctx)
    }

    #[test]
    fn test_literal_atoms() {
        let ctx = Context::new();
        let (m, _) = parse("(x 42 4.2 true nil \"s\" -3 mystery)");
        let types: Vec<Ty> = m
            .predicate()
            .iter()
            .map(|p| atom_ty(&ctx, p.as_atom().unwrap()))
            .collect();
        assert_eq!(
            types,
            vec![Ty::Int, Ty::Float, Ty::Bool, Ty::Nil, Ty::Str, Ty::Int, Ty::Var]
        );
    }

    #[test]
    fn test_annotation_wins() {
        let ctx = Context::new();
        let (m, _) = parse("(x Char:33)");
        let atom = m.predicate()[0].as_atom().unwrap();
        assert_eq!(atom_ty(&ctx, atom), Ty::Char);
    }

    #[test]
    fn test_arith_inference() {
        assert_eq!(infer("(+ 1 2)").0, Ty::Int);
        assert_eq!(infer("(+ 1.5 2.5)").0, Ty::Float);
        assert_eq!(infer("(+ 1 2.5)").0, Ty::Nil);
        assert_eq!(infer("(+ unknown 2)").0, Ty::Var);
    }

    #[test]
    fn test_comparison_is_bool() {
        assert_eq!(infer("(== 1 2)").0, Ty::Bool);
        assert_eq!(infer("(<= 1.0 2.0)").0, Ty::Bool);
    }

    #[test]
    fn test_def_registers_variable() {
        let (ty, ctx) = infer("(def Int:x 5)");
        assert_eq!(ty, Ty::Int);
        assert_eq!(ctx.vars["x"].ty, Ty::Int);
        assert!(ctx.vars["x"].slot.is_none());
    }

    #[test]
    fn test_def_without_annotation_reports() {
        let (ty, ctx) = infer("(def x 5)");
        assert_eq!(ty, Ty::Nil);
        assert!(ctx.diags.has_errors());
        assert!(!ctx.vars.contains_key("x"));
    }

    #[test]
    fn test_variable_lookup_after_def() {
        let (root, _) = parse("{ (def Int:x 5) (+ x x) }");
        let mut ctx = Context::new();
        let def = root.predicate()[0].as_molecule().unwrap();
        molecule_ty(&mut ctx, def);
        let sum = root.predicate()[1].as_molecule().unwrap();
        assert_eq!(molecule_ty(&mut ctx, sum), Ty::Int);
    }

    #[test]
    fn test_array_literal_type() {
        assert_eq!(infer("[1 2 3]").0, Ty::array(Ty::Int));
        assert_eq!(infer("[]").0, Ty::array(Ty::Nil));
    }

    #[test]
    fn test_array_accessors() {
        let (root, _) = parse("{ (def Str:s) (get s 0) (len s) (pop_back s) }");
        let mut ctx = Context::new();
        let forms: Vec<&Molecule> = root
            .predicate()
            .iter()
            .map(|p| p.as_molecule().unwrap())
            .collect();
        molecule_ty(&mut ctx, forms[0]);
        assert_eq!(molecule_ty(&mut ctx, forms[1]), Ty::Char);
        assert_eq!(molecule_ty(&mut ctx, forms[2]), Ty::Int);
        assert_eq!(molecule_ty(&mut ctx, forms[3]), Ty::Char);
    }

    #[test]
    fn test_memoization() {
        let (m, _) = parse("(+ 1 2)");
        let mut ctx = Context::new();
        assert_eq!(molecule_ty(&mut ctx, &m), Ty::Int);
        // Once memoized the cached type is authoritative
        ctx.node_types.insert(m.id, Ty::Float);
        assert_eq!(molecule_ty(&mut ctx, &m), Ty::Float);
    }

    #[test]
    fn test_explicit_molecule_annotation() {
        let (m, _) = parse("(x Person:[\"bob\" 30])");
        let mut ctx = Context::new();
        let lit = m.predicate()[0].as_molecule().unwrap();
        assert_eq!(molecule_ty(&mut ctx, lit), Ty::Named("Person".to_string()));
    }

    #[test]
    fn test_unknown_subject_is_nil() {
        assert_eq!(infer("(frobnicate 1 2)").0, Ty::Nil);
    }
}
