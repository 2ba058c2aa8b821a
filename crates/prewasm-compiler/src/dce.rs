//! Dead code elimination.
//!
//! Exported functions are roots. A worklist scans each live function body
//! for function references (`GetFunction`, `CallDirect`) and extern
//! references (`GetExtern`, `CallExternal`); newly reached functions are
//! queued, externs are only marked since they have no body. Survivors keep
//! their relative order and get dense indices starting at zero, and every
//! reference is rewritten to the new numbering.

use std::collections::VecDeque;

use prewasm_types::ast::{Expr, ExprKind, ExternId, FuncId, Module, Stmt};
use prewasm_types::{FatalError, FatalResult};

/// Drop unreachable functions and externs from `module`, renumbering the rest.
pub fn eliminate_dead_code(module: &mut Module) -> FatalResult<()> {
    let live = find_live(module)?;

    let func_map = renumber(&live.funcs);
    let extern_map = renumber(&live.externs);
    let (funcs_before, externs_before) = (module.funcs.len(), module.externs.len());

    let mut keep = live.funcs.iter();
    module.funcs.retain(|_| keep.next().copied().unwrap_or(false));
    let mut keep = live.externs.iter();
    module.externs.retain(|_| keep.next().copied().unwrap_or(false));

    for (index, ext) in module.externs.iter_mut().enumerate() {
        ext.index = new_index(index);
    }
    for (index, func) in module.funcs.iter_mut().enumerate() {
        func.index = new_index(index);
        let name = func.name.clone();
        walk_block_mut(&mut func.body, &mut |expr: &mut Expr| match &mut expr.kind {
            ExprKind::GetFunction(id) | ExprKind::CallDirect { func: id, .. } => {
                *id = remap(&func_map, id.index(), &name).map(FuncId)?;
                Ok(())
            }
            ExprKind::GetExtern(id) | ExprKind::CallExternal { func: id, .. } => {
                *id = remap(&extern_map, id.index(), &name).map(ExternId)?;
                Ok(())
            }
            _ => Ok(()),
        })?;
    }

    log::debug!(
        "dead code elimination kept {}/{} functions, {}/{} externs",
        module.funcs.len(),
        funcs_before,
        module.externs.len(),
        externs_before
    );
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Liveness
// ══════════════════════════════════════════════════════════════════════════════

struct Liveness {
    funcs: Vec<bool>,
    externs: Vec<bool>,
    pending: VecDeque<usize>,
}

impl Liveness {
    fn mark_func(&mut self, index: usize) -> FatalResult<()> {
        let slot = self
            .funcs
            .get_mut(index)
            .ok_or_else(|| FatalError::MalformedAst(format!("reference to missing func#{index}")))?;
        if !*slot {
            *slot = true;
            self.pending.push_back(index);
        }
        Ok(())
    }

    fn mark_extern(&mut self, index: usize) -> FatalResult<()> {
        let slot = self.externs.get_mut(index).ok_or_else(|| {
            FatalError::MalformedAst(format!("reference to missing extern#{index}"))
        })?;
        *slot = true;
        Ok(())
    }
}

fn find_live(module: &Module) -> FatalResult<Liveness> {
    let mut live = Liveness {
        funcs: vec![false; module.funcs.len()],
        externs: vec![false; module.externs.len()],
        pending: VecDeque::new(),
    };

    for (index, func) in module.funcs.iter().enumerate() {
        if func.export {
            live.mark_func(index)?;
        }
    }

    while let Some(index) = live.pending.pop_front() {
        let func = &module.funcs[index];
        log::trace!("scanning live function `{}`", func.name);
        walk_block(&func.body, &mut |expr: &Expr| match &expr.kind {
            ExprKind::GetFunction(id) | ExprKind::CallDirect { func: id, .. } => {
                live.mark_func(id.index())
            }
            ExprKind::GetExtern(id) | ExprKind::CallExternal { func: id, .. } => {
                live.mark_extern(id.index())
            }
            _ => Ok(()),
        })?;
    }
    Ok(live)
}

/// Old index → new dense index, for live entries.
fn renumber(live: &[bool]) -> Vec<Option<u32>> {
    let mut next = 0;
    live.iter()
        .map(|&alive| {
            alive.then(|| {
                next += 1;
                next - 1
            })
        })
        .collect()
}

fn remap(map: &[Option<u32>], index: usize, func: &str) -> FatalResult<u32> {
    map.get(index).copied().flatten().ok_or_else(|| {
        FatalError::MalformedAst(format!(
            "`{func}` references entity #{index}, which was not kept alive"
        ))
    })
}

fn new_index(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

// ══════════════════════════════════════════════════════════════════════════════
// Traversal
// ══════════════════════════════════════════════════════════════════════════════

fn walk_block(
    stmts: &[Stmt],
    visit: &mut impl FnMut(&Expr) -> FatalResult<()>,
) -> FatalResult<()> {
    for stmt in stmts {
        match stmt {
            Stmt::Expr(expr)
            | Stmt::SetLocal { value: expr, .. }
            | Stmt::SetTls { value: expr, .. } => walk_expr(expr, visit)?,
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                walk_expr(cond, visit)?;
                walk_block(then_block, visit)?;
                if let Some(else_block) = else_block {
                    walk_block(else_block, visit)?;
                }
            }
            Stmt::While { cond, body } => {
                walk_expr(cond, visit)?;
                walk_block(body, visit)?;
            }
            Stmt::Loop { body } => walk_block(body, visit)?,
            Stmt::Return { expr: Some(expr) } => walk_expr(expr, visit)?,
            Stmt::Return { expr: None } | Stmt::Break { .. } => {}
        }
    }
    Ok(())
}

fn walk_expr(expr: &Expr, visit: &mut impl FnMut(&Expr) -> FatalResult<()>) -> FatalResult<()> {
    visit(expr)?;
    match &expr.kind {
        ExprKind::Load { address, .. } => walk_expr(address, visit),
        ExprKind::Store { address, value, .. } => {
            walk_expr(address, visit)?;
            walk_expr(value, visit)
        }
        ExprKind::UnaryOp { expr, .. } | ExprKind::Coerce { expr } => walk_expr(expr, visit),
        ExprKind::BinaryOp { left, right, .. } => {
            walk_expr(left, visit)?;
            walk_expr(right, visit)
        }
        ExprKind::CallDirect { args, .. } | ExprKind::CallExternal { args, .. } => {
            args.iter().try_for_each(|arg| walk_expr(arg, visit))
        }
        ExprKind::CallIndirect { callee, args, .. } => {
            walk_expr(callee, visit)?;
            args.iter().try_for_each(|arg| walk_expr(arg, visit))
        }
        ExprKind::ConstI32(_)
        | ExprKind::ConstI64(_)
        | ExprKind::ConstF32(_)
        | ExprKind::ConstF64(_)
        | ExprKind::GetLocal(_)
        | ExprKind::GetTls(_)
        | ExprKind::GetFunction(_)
        | ExprKind::GetExtern(_) => Ok(()),
    }
}

fn walk_block_mut(
    stmts: &mut [Stmt],
    visit: &mut impl FnMut(&mut Expr) -> FatalResult<()>,
) -> FatalResult<()> {
    for stmt in stmts {
        match stmt {
            Stmt::Expr(expr)
            | Stmt::SetLocal { value: expr, .. }
            | Stmt::SetTls { value: expr, .. } => walk_expr_mut(expr, visit)?,
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                walk_expr_mut(cond, visit)?;
                walk_block_mut(then_block, visit)?;
                if let Some(else_block) = else_block {
                    walk_block_mut(else_block, visit)?;
                }
            }
            Stmt::While { cond, body } => {
                walk_expr_mut(cond, visit)?;
                walk_block_mut(body, visit)?;
            }
            Stmt::Loop { body } => walk_block_mut(body, visit)?,
            Stmt::Return { expr: Some(expr) } => walk_expr_mut(expr, visit)?,
            Stmt::Return { expr: None } | Stmt::Break { .. } => {}
        }
    }
    Ok(())
}

fn walk_expr_mut(
    expr: &mut Expr,
    visit: &mut impl FnMut(&mut Expr) -> FatalResult<()>,
) -> FatalResult<()> {
    visit(expr)?;
    match &mut expr.kind {
        ExprKind::Load { address, .. } => walk_expr_mut(address, visit),
        ExprKind::Store { address, value, .. } => {
            walk_expr_mut(address, visit)?;
            walk_expr_mut(value, visit)
        }
        ExprKind::UnaryOp { expr, .. } | ExprKind::Coerce { expr } => walk_expr_mut(expr, visit),
        ExprKind::BinaryOp { left, right, .. } => {
            walk_expr_mut(left, visit)?;
            walk_expr_mut(right, visit)
        }
        ExprKind::CallDirect { args, .. } | ExprKind::CallExternal { args, .. } => args
            .iter_mut()
            .try_for_each(|arg| walk_expr_mut(arg, visit)),
        ExprKind::CallIndirect { callee, args, .. } => {
            walk_expr_mut(callee, visit)?;
            args.iter_mut()
                .try_for_each(|arg| walk_expr_mut(arg, visit))
        }
        ExprKind::ConstI32(_)
        | ExprKind::ConstI64(_)
        | ExprKind::ConstF32(_)
        | ExprKind::ConstF64(_)
        | ExprKind::GetLocal(_)
        | ExprKind::GetTls(_)
        | ExprKind::GetFunction(_)
        | ExprKind::GetExtern(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renumber_is_dense() {
        assert_eq!(
            renumber(&[true, false, true, true, false]),
            [Some(0), None, Some(1), Some(2), None]
        );
        assert!(renumber(&[]).is_empty());
    }

    #[test]
    fn test_remap_of_dead_entity_is_fatal() {
        let map = renumber(&[false, true]);
        assert_eq!(remap(&map, 1, "f").unwrap(), 0);
        assert!(matches!(remap(&map, 0, "f"), Err(FatalError::MalformedAst(_))));
        assert!(remap(&map, 9, "f").is_err());
    }
}
