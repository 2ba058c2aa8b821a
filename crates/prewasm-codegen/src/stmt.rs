//! Statement and block encoding.

use prewasm_types::ast::Stmt;

use crate::compiler::FuncContext;
use crate::error::{CodegenError, CodegenResult};
use crate::expr::{emit_expr, tls_unsupported};
use crate::opcodes::Op;
use crate::writer::{fit_u8, BinaryWriter};

/// `block u8:count stmt*`
pub fn emit_block(stmts: &[Stmt], ctx: &FuncContext, w: &mut BinaryWriter) -> CodegenResult<()> {
    w.u8(Op::Block.byte());
    emit_stmts(stmts, ctx, w)
}

/// `u8:count stmt*`, without the block opcode.
pub fn emit_stmts(stmts: &[Stmt], ctx: &FuncContext, w: &mut BinaryWriter) -> CodegenResult<()> {
    w.u8(fit_u8("block statement count", stmts.len())?);
    for stmt in stmts {
        emit_stmt(stmt, ctx, w)?;
    }
    Ok(())
}

pub fn emit_stmt(stmt: &Stmt, ctx: &FuncContext, w: &mut BinaryWriter) -> CodegenResult<()> {
    match stmt {
        Stmt::Expr(expr) => emit_expr(expr, ctx, w),
        Stmt::SetLocal { local, value } => {
            w.u8(Op::SetLocal.byte());
            w.u8(ctx.local_index(*local)?);
            emit_expr(value, ctx, w)
        }
        Stmt::SetTls { .. } => Err(tls_unsupported(ctx)),
        Stmt::If {
            cond,
            then_block,
            else_block: None,
        } => {
            w.u8(Op::If1.byte());
            emit_expr(cond, ctx, w)?;
            emit_block(then_block, ctx, w)
        }
        Stmt::If {
            cond,
            then_block,
            else_block: Some(else_block),
        } => {
            w.u8(Op::If2.byte());
            emit_expr(cond, ctx, w)?;
            emit_block(then_block, ctx, w)?;
            emit_block(else_block, ctx, w)
        }
        Stmt::While { .. } => Err(CodegenError::Unsupported(format!(
            "`while` in `{}`; loops must be lowered before encoding",
            ctx.name
        ))),
        // Loops carry an implicit block.
        Stmt::Loop { body } => {
            w.u8(Op::Loop.byte());
            emit_stmts(body, ctx, w)
        }
        Stmt::Break { depth } => {
            w.u8(Op::Break.byte());
            w.u8(fit_u8("break depth", *depth as usize)?);
            Ok(())
        }
        Stmt::Return { expr } => {
            w.u8(Op::Return.byte());
            match expr {
                Some(expr) => emit_expr(expr, ctx, w),
                None => Ok(()),
            }
        }
    }
}
