//! Expression encoding.
//!
//! Every expression is a prefix opcode followed by its operands and
//! sub-expressions. Argument counts are never encoded; the interpreter takes
//! them from the callee's signature.

use prewasm_types::ast::{Expr, ExprKind};

use crate::compiler::{emit_signature, FuncContext};
use crate::error::{CodegenError, CodegenResult};
use crate::opcodes::{binary_op, conversion_op, load_op, mem_type_code, store_op, unary_op, Op};
use crate::writer::BinaryWriter;

/// Emit one expression.
pub fn emit_expr(expr: &Expr, ctx: &FuncContext, w: &mut BinaryWriter) -> CodegenResult<()> {
    match &expr.kind {
        // ── Constants ────────────────────────────────────────────────────
        ExprKind::ConstI32(v) => emit_i32_const(*v, w),
        ExprKind::ConstI64(v) => {
            w.u8(Op::I64Const.byte());
            w.i64(*v);
        }
        ExprKind::ConstF32(v) => {
            w.u8(Op::F32Const.byte());
            w.f32(*v);
        }
        ExprKind::ConstF64(v) => {
            w.u8(Op::F64Const.byte());
            w.f64(*v);
        }

        // ── References ───────────────────────────────────────────────────
        ExprKind::GetLocal(id) => {
            w.u8(Op::GetLocal.byte());
            w.u8(ctx.local_index(*id)?);
        }
        ExprKind::GetTls(_) => return Err(tls_unsupported(ctx)),
        ExprKind::GetFunction(id) => emit_i32_full(i32::from(ctx.func_uid(*id)?), w),
        ExprKind::GetExtern(id) => emit_i32_full(i32::from(ctx.extern_uid(*id)?), w),

        // ── Memory ───────────────────────────────────────────────────────
        ExprKind::Load { mtype, address } => {
            w.u8(load_op(mtype.storage_class()).byte());
            w.u8(mem_type_code(*mtype));
            emit_expr(address, ctx, w)?;
        }
        ExprKind::Store {
            mtype,
            address,
            value,
        } => {
            w.u8(store_op(mtype.storage_class()).byte());
            w.u8(mem_type_code(*mtype));
            emit_expr(address, ctx, w)?;
            emit_expr(value, ctx, w)?;
        }

        // ── Operators ────────────────────────────────────────────────────
        ExprKind::UnaryOp { optype, op, expr } => {
            w.u8(unary_op(*optype, *op)?.byte());
            emit_expr(expr, ctx, w)?;
        }
        ExprKind::BinaryOp {
            optype,
            op,
            left,
            right,
        } => {
            w.u8(binary_op(*optype, *op)?.byte());
            emit_expr(left, ctx, w)?;
            emit_expr(right, ctx, w)?;
        }
        ExprKind::Coerce { expr: inner } => {
            w.u8(conversion_op(expr.etype, inner.etype)?.byte());
            emit_expr(inner, ctx, w)?;
        }

        // ── Calls ────────────────────────────────────────────────────────
        ExprKind::CallDirect { func, args } => {
            w.u8(Op::CallFunc.byte());
            w.u8(ctx.func_uid(*func)?);
            emit_args(args, ctx, w)?;
        }
        ExprKind::CallExternal { func, args } => {
            w.u8(Op::CallFunc.byte());
            w.u8(ctx.extern_uid(*func)?);
            emit_args(args, ctx, w)?;
        }
        ExprKind::CallIndirect {
            ftype,
            callee,
            args,
        } => {
            w.u8(Op::CallIndirect.byte());
            emit_signature(w, &ftype.params, ftype.ret)?;
            emit_expr(callee, ctx, w)?;
            emit_args(args, ctx, w)?;
        }
    }
    Ok(())
}

fn emit_args(args: &[Expr], ctx: &FuncContext, w: &mut BinaryWriter) -> CodegenResult<()> {
    for arg in args {
        emit_expr(arg, ctx, w)?;
    }
    Ok(())
}

/// Small constants use the one-byte-operand form.
fn emit_i32_const(v: i32, w: &mut BinaryWriter) {
    match i8::try_from(v) {
        Ok(small) => {
            w.u8(Op::I8Const.byte());
            w.i8(small);
        }
        Err(_) => emit_i32_full(v, w),
    }
}

fn emit_i32_full(v: i32, w: &mut BinaryWriter) {
    w.u8(Op::I32Const.byte());
    w.i32(v);
}

pub(crate) fn tls_unsupported(ctx: &FuncContext) -> CodegenError {
    CodegenError::Unsupported(format!(
        "thread-local access in `{}`; the binary format declares no globals",
        ctx.name
    ))
}
