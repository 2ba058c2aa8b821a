//! Lowering to the operator and statement set the encoder understands.
//!
//! Rewrites, applied bottom-up:
//! - `Coerce` to the type its operand already has is dropped
//! - `!x` on `i64`, `f32` and `f64` becomes `x == 0`
//! - integer `-x` becomes `0 - x`
//! - `>`, `>=` and `!=` become `!(<=)`, `!(<)` and `!(==)`
//! - `!!x` becomes `x` when `x` is already 0 or 1
//! - every `i8`/`i16` value is computed in 32 bits and sign-extended
//!   with a `<<` / `>>` pair
//! - `while` becomes `loop { if (!cond) { break 1 } body }`
//!
//! Narrow types disappear from locals, signatures and TLS globals. The pass
//! is idempotent: lowering lowered output changes nothing.

use prewasm_types::ast::{Expr, ExprKind, Function, Module, Stmt};
use prewasm_types::ops::{binary_result, unary_result, BinaryOp, UnaryOp};
use prewasm_types::{FatalError, FatalResult, ValueType};

/// Lower every function of `module` in place.
pub fn desugar(module: &mut Module) -> FatalResult<()> {
    for ext in &mut module.externs {
        ext.ftype = ext.ftype.simplified();
    }
    for tls in &mut module.tls {
        tls.ty = tls.ty.simplified();
    }
    for func in &mut module.funcs {
        desugar_function(func)?;
    }
    log::debug!("lowered {} functions", module.funcs.len());
    Ok(())
}

fn desugar_function(func: &mut Function) -> FatalResult<()> {
    let body = std::mem::take(&mut func.body);
    func.body = lower_block(body)?;
    for local in &mut func.locals {
        local.ty = local.ty.simplified();
    }
    func.return_type = func.return_type.simplified();
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

fn lower_block(stmts: Vec<Stmt>) -> FatalResult<Vec<Stmt>> {
    stmts.into_iter().map(lower_stmt).collect()
}

fn lower_stmt(stmt: Stmt) -> FatalResult<Stmt> {
    Ok(match stmt {
        Stmt::Expr(expr) => Stmt::Expr(lower_expr(expr)?),
        Stmt::SetLocal { local, value } => Stmt::SetLocal {
            local,
            value: lower_expr(value)?,
        },
        Stmt::SetTls { tls, value } => Stmt::SetTls {
            tls,
            value: lower_expr(value)?,
        },
        Stmt::If {
            cond,
            then_block,
            else_block,
        } => Stmt::If {
            cond: lower_expr(cond)?,
            then_block: lower_block(then_block)?,
            else_block: else_block.map(lower_block).transpose()?,
        },
        Stmt::While { cond, body } => {
            let exit = Stmt::If {
                cond: negate(lower_expr(cond)?),
                then_block: vec![Stmt::Break { depth: 1 }],
                else_block: None,
            };
            let mut lowered = Vec::with_capacity(body.len() + 1);
            lowered.push(exit);
            lowered.extend(lower_block(body)?);
            Stmt::Loop { body: lowered }
        }
        Stmt::Loop { body } => Stmt::Loop {
            body: lower_block(body)?,
        },
        Stmt::Break { depth } => Stmt::Break { depth },
        Stmt::Return { expr } => Stmt::Return {
            expr: expr.map(lower_expr).transpose()?,
        },
    })
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

fn lower_expr(expr: Expr) -> FatalResult<Expr> {
    let Expr { kind, etype, span } = expr;
    let kind = lower_children(kind)?;
    let node = rewrite(Expr { kind, etype, span })?;
    Ok(sign_extend_narrow(node))
}

fn lower_boxed(expr: Box<Expr>) -> FatalResult<Box<Expr>> {
    lower_expr(*expr).map(Box::new)
}

fn lower_args(args: Vec<Expr>) -> FatalResult<Vec<Expr>> {
    args.into_iter().map(lower_expr).collect()
}

fn lower_children(kind: ExprKind) -> FatalResult<ExprKind> {
    Ok(match kind {
        ExprKind::Load { mtype, address } => ExprKind::Load {
            mtype,
            address: lower_boxed(address)?,
        },
        ExprKind::Store {
            mtype,
            address,
            value,
        } => ExprKind::Store {
            mtype,
            address: lower_boxed(address)?,
            value: lower_boxed(value)?,
        },
        ExprKind::UnaryOp { optype, op, expr } => ExprKind::UnaryOp {
            optype,
            op,
            expr: lower_boxed(expr)?,
        },
        ExprKind::BinaryOp {
            optype,
            op,
            left,
            right,
        } => ExprKind::BinaryOp {
            optype,
            op,
            left: lower_boxed(left)?,
            right: lower_boxed(right)?,
        },
        ExprKind::Coerce { expr } => ExprKind::Coerce {
            expr: lower_boxed(expr)?,
        },
        ExprKind::CallDirect { func, args } => ExprKind::CallDirect {
            func,
            args: lower_args(args)?,
        },
        ExprKind::CallExternal { func, args } => ExprKind::CallExternal {
            func,
            args: lower_args(args)?,
        },
        ExprKind::CallIndirect {
            ftype,
            callee,
            args,
        } => ExprKind::CallIndirect {
            ftype: ftype.simplified(),
            callee: lower_boxed(callee)?,
            args: lower_args(args)?,
        },
        leaf => leaf,
    })
}

/// Rewrite one node whose children are already lowered.
fn rewrite(node: Expr) -> FatalResult<Expr> {
    let Expr { kind, etype, span } = node;
    let rewritten = match kind {
        ExprKind::Coerce { expr: inner } => {
            if etype.simplified() == inner.etype {
                // Keep the declared type so narrow targets still get extended.
                let mut inner = *inner;
                inner.etype = etype;
                inner.span = inner.span.or(span);
                return Ok(inner);
            }
            Expr::coerce(*inner, etype)
        }

        ExprKind::UnaryOp {
            optype,
            op: UnaryOp::BoolNot,
            expr: inner,
        } => match optype {
            ValueType::I64 | ValueType::F32 | ValueType::F64 => {
                let zero = zero_of(optype);
                checked_binary(optype, BinaryOp::Eq, *inner, zero, ValueType::I32)?
            }
            _ => peel_double_not(Expr::unary(
                optype.simplified(),
                UnaryOp::BoolNot,
                *inner,
                ValueType::I32,
            )),
        },

        ExprKind::UnaryOp {
            optype,
            op: UnaryOp::Neg,
            expr: inner,
        } if optype.is_integer() => {
            let optype = optype.simplified();
            checked_binary(optype, BinaryOp::Sub, zero_of(optype), *inner, etype)?
        }

        ExprKind::UnaryOp { optype, op, expr } => {
            let optype = optype.simplified();
            if unary_result(op, optype).is_none() {
                return Err(unsupported(op.name(), optype));
            }
            Expr::unary(optype, op, *expr, etype)
        }

        ExprKind::BinaryOp {
            optype,
            op,
            left,
            right,
        } => {
            let optype = optype.simplified();
            let complement = match op {
                BinaryOp::Gt => Some(BinaryOp::Le),
                BinaryOp::Ge => Some(BinaryOp::Lt),
                BinaryOp::Ne => Some(BinaryOp::Eq),
                _ => None,
            };
            match complement {
                Some(op) => Expr::not(checked_binary(optype, op, *left, *right, etype)?),
                None => checked_binary(optype, op, *left, *right, etype)?,
            }
        }

        kind => Expr {
            kind,
            etype,
            span: None,
        },
    };
    Ok(rewritten.with_span(span))
}

/// Compute `i8`/`i16` values in 32 bits, then sign-extend.
fn sign_extend_narrow(mut node: Expr) -> Expr {
    let Some(shift) = node.etype.narrow_shift() else {
        return node;
    };
    let span = node.span;
    let word = ValueType::I32;
    node.etype = word;
    let shifted = Expr::binary(word, BinaryOp::Shl, node, Expr::const_i32(shift), word);
    Expr::binary(word, BinaryOp::Shr, shifted, Expr::const_i32(shift), word).with_span(span)
}

/// Boolean negation with the double-negation peephole applied.
fn negate(expr: Expr) -> Expr {
    let span = expr.span;
    peel_double_not(Expr::not(expr)).with_span(span)
}

fn peel_double_not(node: Expr) -> Expr {
    if let ExprKind::UnaryOp {
        op: UnaryOp::BoolNot,
        expr: inner,
        ..
    } = &node.kind
    {
        if let ExprKind::UnaryOp {
            op: UnaryOp::BoolNot,
            expr: innermost,
            ..
        } = &inner.kind
        {
            if innermost.is_naturally_bool() {
                return (**innermost).clone();
            }
        }
    }
    node
}

fn checked_binary(
    optype: ValueType,
    op: BinaryOp,
    left: Expr,
    right: Expr,
    etype: ValueType,
) -> FatalResult<Expr> {
    if binary_result(op, optype).is_none() {
        return Err(unsupported(op.name(), optype));
    }
    Ok(Expr::binary(optype, op, left, right, etype))
}

fn zero_of(ty: ValueType) -> Expr {
    match ty {
        ValueType::I64 => Expr::const_i64(0),
        ValueType::F32 => Expr::const_f32(0.0),
        ValueType::F64 => Expr::const_f64(0.0),
        _ => Expr::const_i32(0),
    }
}

fn unsupported(op: &str, optype: ValueType) -> FatalError {
    FatalError::UnsupportedOperation(format!("`{op}` on {optype} after lowering"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use prewasm_types::ast::LocalId;

    fn local(ty: ValueType) -> Expr {
        Expr::get_local(LocalId(0), ty)
    }

    #[test]
    fn test_gt_becomes_not_le() {
        use ValueType::*;
        let gt = Expr::binary(I32, BinaryOp::Gt, local(I32), Expr::const_i32(1), I32);
        let lowered = lower_expr(gt).unwrap();
        assert_eq!(
            lowered,
            Expr::not(Expr::binary(I32, BinaryOp::Le, local(I32), Expr::const_i32(1), I32))
        );
    }

    #[test]
    fn test_not_of_comparison_is_peeled() {
        use ValueType::*;
        let ne = Expr::binary(F64, BinaryOp::Ne, local(F64), local(F64), I32);
        let lowered = lower_expr(Expr::not(ne)).unwrap();
        assert_eq!(lowered, Expr::binary(F64, BinaryOp::Eq, local(F64), local(F64), I32));
    }

    #[test]
    fn test_float_not_becomes_compare_with_zero() {
        use ValueType::*;
        let not = Expr::unary(F32, UnaryOp::BoolNot, local(F32), I32);
        assert_eq!(
            lower_expr(not).unwrap(),
            Expr::binary(F32, BinaryOp::Eq, local(F32), Expr::const_f32(0.0), I32)
        );
    }

    #[test]
    fn test_integer_negation_becomes_subtraction() {
        use ValueType::*;
        let neg = Expr::unary(I64, UnaryOp::Neg, local(I64), I64);
        assert_eq!(
            lower_expr(neg).unwrap(),
            Expr::binary(I64, BinaryOp::Sub, Expr::const_i64(0), local(I64), I64)
        );
    }

    #[test]
    fn test_float_negation_is_kept() {
        use ValueType::*;
        let neg = Expr::unary(F64, UnaryOp::Neg, local(F64), F64);
        assert_eq!(lower_expr(neg.clone()).unwrap(), neg);
    }

    #[test]
    fn test_narrow_values_are_sign_extended() {
        use ValueType::*;
        let add = Expr::binary(I8, BinaryOp::Add, local(I8), local(I8), I8);
        let lowered = lower_expr(add).unwrap();

        let operand = || {
            let shl = Expr::binary(I32, BinaryOp::Shl, local(I32), Expr::const_i32(24), I32);
            Expr::binary(I32, BinaryOp::Shr, shl, Expr::const_i32(24), I32)
        };
        let sum = Expr::binary(I32, BinaryOp::Add, operand(), operand(), I32);
        let shl = Expr::binary(I32, BinaryOp::Shl, sum, Expr::const_i32(24), I32);
        let expected = Expr::binary(I32, BinaryOp::Shr, shl, Expr::const_i32(24), I32);
        assert_eq!(lowered, expected);
    }

    #[test]
    fn test_identity_coercion_is_dropped() {
        use ValueType::*;
        let coerce = Expr::coerce(local(F32), F32);
        assert_eq!(lower_expr(coerce).unwrap(), local(F32));

        let widen = Expr::coerce(local(I32), I64);
        assert_eq!(lower_expr(widen.clone()).unwrap(), widen);
    }

    #[test]
    fn test_narrowing_coercion_becomes_shift_pair() {
        use ValueType::*;
        let coerce = Expr::coerce(local(I32), I16);
        let shl = Expr::binary(I32, BinaryOp::Shl, local(I32), Expr::const_i32(16), I32);
        let expected = Expr::binary(I32, BinaryOp::Shr, shl, Expr::const_i32(16), I32);
        assert_eq!(lower_expr(coerce).unwrap(), expected);
    }

    #[test]
    fn test_while_becomes_loop() {
        use ValueType::*;
        let cond = Expr::binary(I32, BinaryOp::Lt, local(I32), Expr::const_i32(10), I32);
        let stmt = Stmt::While {
            cond: cond.clone(),
            body: vec![Stmt::Expr(Expr::const_i32(0))],
        };
        assert_eq!(
            lower_stmt(stmt).unwrap(),
            Stmt::Loop {
                body: vec![
                    Stmt::If {
                        cond: Expr::not(cond),
                        then_block: vec![Stmt::Break { depth: 1 }],
                        else_block: None,
                    },
                    Stmt::Expr(Expr::const_i32(0)),
                ]
            }
        );
    }
}
