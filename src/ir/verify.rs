//! Structural module verification
//!
//! The verifier runs over the finished module before it is printed. A
//! failure here means the compiler produced a structurally invalid module
//! and is treated as fatal by the driver — it is a compiler bug, not a
//! user-facing diagnostic.

use super::instr::{InstrKind, Terminator};
use super::types::{BlockId, Function, Module, VReg};
use std::collections::HashSet;
use thiserror::Error;

/// A structural defect in the emitted module
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerifyError {
    #[error("function `{func}` has no basic blocks")]
    EmptyFunction { func: String },

    #[error("external function `{func}` must not have a body")]
    ExternalWithBody { func: String },

    #[error("block {block} in `{func}` has no terminator")]
    MissingTerminator { func: String, block: BlockId },

    #[error("duplicate block {block} in `{func}`")]
    DuplicateBlock { func: String, block: BlockId },

    #[error("block {block} in `{func}` branches to unknown block {target}")]
    UnknownBranchTarget {
        func: String,
        block: BlockId,
        target: BlockId,
    },

    #[error("register {vreg} used in `{func}` but never defined")]
    UndefinedRegister { func: String, vreg: VReg },

    #[error("call to unknown function `{callee}` in `{func}`")]
    UnknownCallee { func: String, callee: String },
}

/// Verify a module; returns every structural defect found.
pub fn verify_module(module: &Module) -> Result<(), Vec<VerifyError>> {
    let mut errors = Vec::new();

    let known_functions: HashSet<&str> = module.functions.iter().map(|f| f.name.as_str()).collect();

    for func in &module.functions {
        if func.is_external {
            if !func.blocks.is_empty() {
                errors.push(VerifyError::ExternalWithBody {
                    func: func.name.clone(),
                });
            }
            continue;
        }
        verify_function(func, &known_functions, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn verify_function(func: &Function, known: &HashSet<&str>, errors: &mut Vec<VerifyError>) {
    if func.blocks.is_empty() {
        errors.push(VerifyError::EmptyFunction {
            func: func.name.clone(),
        });
        return;
    }

    let mut block_ids = HashSet::new();
    for block in &func.blocks {
        if !block_ids.insert(block.id) {
            errors.push(VerifyError::DuplicateBlock {
                func: func.name.clone(),
                block: block.id,
            });
        }
    }

    // Registers defined anywhere in the function (params + results).
    // Dominance is not checked; this is a structural pass only.
    let mut defined: HashSet<VReg> = func.params.iter().map(|(v, _)| *v).collect();
    for block in &func.blocks {
        for instr in &block.instructions {
            if let Some(result) = instr.result {
                defined.insert(result);
            }
        }
    }

    for block in &func.blocks {
        for instr in &block.instructions {
            for vreg in operands(&instr.kind) {
                if !defined.contains(&vreg) {
                    errors.push(VerifyError::UndefinedRegister {
                        func: func.name.clone(),
                        vreg,
                    });
                }
            }
            if let InstrKind::Call { func: callee, .. } = &instr.kind {
                if !known.contains(callee.as_str()) {
                    errors.push(VerifyError::UnknownCallee {
                        func: func.name.clone(),
                        callee: callee.clone(),
                    });
                }
            }
        }

        match &block.terminator {
            None => {
                errors.push(VerifyError::MissingTerminator {
                    func: func.name.clone(),
                    block: block.id,
                });
            }
            Some(term) => {
                if let Terminator::Ret(Some(v)) = term {
                    if !defined.contains(v) {
                        errors.push(VerifyError::UndefinedRegister {
                            func: func.name.clone(),
                            vreg: *v,
                        });
                    }
                }
                if let Terminator::CondBr { cond, .. } = term {
                    if !defined.contains(cond) {
                        errors.push(VerifyError::UndefinedRegister {
                            func: func.name.clone(),
                            vreg: *cond,
                        });
                    }
                }
                for target in term.successors() {
                    if !block_ids.contains(&target) {
                        errors.push(VerifyError::UnknownBranchTarget {
                            func: func.name.clone(),
                            block: block.id,
                            target,
                        });
                    }
                }
            }
        }
    }
}

/// Register operands read by an instruction
fn operands(kind: &InstrKind) -> Vec<VReg> {
    match kind {
        InstrKind::Const(_) | InstrKind::Alloca(_) | InstrKind::GlobalRef(_) | InstrKind::FuncRef(_) => {
            vec![]
        }
        InstrKind::Add(a, b)
        | InstrKind::Sub(a, b)
        | InstrKind::Mul(a, b)
        | InstrKind::SDiv(a, b)
        | InstrKind::SRem(a, b)
        | InstrKind::FAdd(a, b)
        | InstrKind::FSub(a, b)
        | InstrKind::FMul(a, b)
        | InstrKind::FDiv(a, b)
        | InstrKind::FRem(a, b)
        | InstrKind::And(a, b)
        | InstrKind::Or(a, b)
        | InstrKind::ICmp(_, a, b)
        | InstrKind::FCmp(_, a, b) => vec![*a, *b],
        InstrKind::Not(v)
        | InstrKind::ZExt(v, _)
        | InstrKind::FPExt(v, _)
        | InstrKind::MallocBytes(v) => vec![*v],
        InstrKind::Memcpy { dst, src, len } | InstrKind::Memmove { dst, src, len } => {
            vec![*dst, *src, *len]
        }
        InstrKind::Load { ptr, .. } => vec![*ptr],
        InstrKind::Store { ptr, value } => vec![*ptr, *value],
        InstrKind::GetFieldPtr { base, .. } => vec![*base],
        InstrKind::GetElementPtr { base, index, .. } => vec![*base, *index],
        InstrKind::Call { args, .. } => args.clone(),
        InstrKind::Select(c, t, e) => vec![*c, *t, *e],
    }
}
