//! Instruction set of the bytecode interpreter.
//!
//! Typed operations are selected from per-(operand type, operation) tables
//! so that, for example, `i32.add` and `i64.add` are distinct single-byte
//! opcodes. A miss in any table is an [`CodegenError::Unsupported`] error:
//! lowering should have removed every combination the tables lack.

use prewasm_types::ops::{BinaryOp, UnaryOp};
use prewasm_types::{MemType, StorageClass, ValueType};

use crate::error::{CodegenError, CodegenResult};

/// Single-byte opcodes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    // ── Control ──────────────────────────────────────────────────────────
    If1 = 0x01,
    If2 = 0x02,
    Block = 0x03,
    Loop = 0x06,
    Break = 0x08,
    Return = 0x09,

    // ── Constants ────────────────────────────────────────────────────────
    I8Const = 0x10,
    I32Const = 0x11,
    I64Const = 0x12,
    F64Const = 0x13,
    F32Const = 0x14,

    // ── Locals and calls ─────────────────────────────────────────────────
    GetLocal = 0x15,
    SetLocal = 0x16,
    CallFunc = 0x19,
    CallIndirect = 0x1a,

    // ── Memory ───────────────────────────────────────────────────────────
    I32Load = 0x20,
    I64Load = 0x21,
    F32Load = 0x22,
    F64Load = 0x23,
    I32Store = 0x30,
    I64Store = 0x31,
    F32Store = 0x32,
    F64Store = 0x33,

    // ── i32 ──────────────────────────────────────────────────────────────
    I32Add = 0x40,
    I32Sub = 0x41,
    I32Mul = 0x42,
    I32DivS = 0x43,
    I32RemS = 0x45,
    I32And = 0x47,
    I32Or = 0x48,
    I32Xor = 0x49,
    I32Shl = 0x4a,
    I32ShrU = 0x4b,
    I32ShrS = 0x4c,
    I32Eq = 0x4d,
    I32LtS = 0x4e,
    I32LeS = 0x4f,
    I32GtS = 0x52,
    I32GeS = 0x53,
    I32BoolNot = 0x59,

    // ── i64 ──────────────────────────────────────────────────────────────
    I64Add = 0x5a,
    I64Sub = 0x5b,
    I64Mul = 0x5c,
    I64DivS = 0x5d,
    I64RemS = 0x5f,
    I64And = 0x61,
    I64Or = 0x62,
    I64Xor = 0x63,
    I64Shl = 0x64,
    I64ShrU = 0x65,
    I64ShrS = 0x66,
    I64Eq = 0x67,
    I64LtS = 0x68,
    I64LeS = 0x69,
    I64GtS = 0x6c,
    I64GeS = 0x6d,

    // ── f32 ──────────────────────────────────────────────────────────────
    F32Add = 0x73,
    F32Sub = 0x74,
    F32Mul = 0x75,
    F32Div = 0x76,
    F32Min = 0x77,
    F32Max = 0x78,
    F32Neg = 0x7a,
    F32Sqrt = 0x80,
    F32Eq = 0x81,
    F32Lt = 0x82,
    F32Le = 0x83,
    F32Gt = 0x84,
    F32Ge = 0x85,

    // ── f64 ──────────────────────────────────────────────────────────────
    F64Add = 0x86,
    F64Sub = 0x87,
    F64Mul = 0x88,
    F64Div = 0x89,
    F64Min = 0x8a,
    F64Max = 0x8b,
    F64Neg = 0x8d,
    F64Sqrt = 0x93,
    F64Eq = 0x94,
    F64Lt = 0x95,
    F64Le = 0x96,
    F64Gt = 0x97,
    F64Ge = 0x98,

    // ── Conversions ──────────────────────────────────────────────────────
    I32FromF32 = 0x99,
    I32FromF64 = 0x9a,
    I32FromI64 = 0x9d,
    I64FromF32 = 0x9e,
    I64FromF64 = 0x9f,
    I64FromI32 = 0xa2,
    F32FromI32 = 0xa4,
    F32FromI64 = 0xa6,
    F32FromF64 = 0xa8,
    F64FromI32 = 0xaa,
    F64FromI64 = 0xac,
    F64FromF32 = 0xae,
}

impl Op {
    pub fn byte(self) -> u8 {
        self as u8
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Type codes
// ══════════════════════════════════════════════════════════════════════════════

/// Signature type code. Narrow integers must be lowered before encoding.
pub fn type_code(t: ValueType) -> CodegenResult<u8> {
    match t {
        ValueType::Void => Ok(0),
        ValueType::I32 => Ok(1),
        ValueType::I64 => Ok(2),
        ValueType::F32 => Ok(3),
        ValueType::F64 => Ok(4),
        ValueType::I8 | ValueType::I16 => Err(CodegenError::Unsupported(format!(
            "type {t} in signature; narrow types must be lowered"
        ))),
    }
}

/// Inverse of [`type_code`].
pub fn type_from_code(code: u8) -> Option<ValueType> {
    Some(match code {
        0 => ValueType::Void,
        1 => ValueType::I32,
        2 => ValueType::I64,
        3 => ValueType::F32,
        4 => ValueType::F64,
        _ => return None,
    })
}

/// Memory element type enumerant carried by loads and stores.
pub fn mem_type_code(mtype: MemType) -> u8 {
    match mtype {
        MemType::I8 => 0,
        MemType::U8 => 1,
        MemType::I16 => 2,
        MemType::U16 => 3,
        MemType::I32 => 4,
        MemType::U32 => 5,
        MemType::I64 => 6,
        MemType::U64 => 7,
        MemType::F32 => 8,
        MemType::F64 => 9,
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Operation tables
// ══════════════════════════════════════════════════════════════════════════════

use prewasm_types::ops::BinaryOp as B;
use prewasm_types::ValueType::{F32, F64, I32, I64};

static UNARY_OPS: &[(ValueType, UnaryOp, Op)] = &[
    (I32, UnaryOp::BoolNot, Op::I32BoolNot),
    (F32, UnaryOp::Neg, Op::F32Neg),
    (F32, UnaryOp::Sqrt, Op::F32Sqrt),
    (F64, UnaryOp::Neg, Op::F64Neg),
    (F64, UnaryOp::Sqrt, Op::F64Sqrt),
];

static BINARY_OPS: &[(ValueType, BinaryOp, Op)] = &[
    (I32, B::Add, Op::I32Add),
    (I32, B::Sub, Op::I32Sub),
    (I32, B::Mul, Op::I32Mul),
    (I32, B::Div, Op::I32DivS),
    (I32, B::Rem, Op::I32RemS),
    (I32, B::And, Op::I32And),
    (I32, B::Or, Op::I32Or),
    (I32, B::Xor, Op::I32Xor),
    (I32, B::Shl, Op::I32Shl),
    (I32, B::ShrU, Op::I32ShrU),
    (I32, B::Shr, Op::I32ShrS),
    (I32, B::Eq, Op::I32Eq),
    (I32, B::Lt, Op::I32LtS),
    (I32, B::Le, Op::I32LeS),
    (I32, B::Gt, Op::I32GtS),
    (I32, B::Ge, Op::I32GeS),
    (I64, B::Add, Op::I64Add),
    (I64, B::Sub, Op::I64Sub),
    (I64, B::Mul, Op::I64Mul),
    (I64, B::Div, Op::I64DivS),
    (I64, B::Rem, Op::I64RemS),
    (I64, B::And, Op::I64And),
    (I64, B::Or, Op::I64Or),
    (I64, B::Xor, Op::I64Xor),
    (I64, B::Shl, Op::I64Shl),
    (I64, B::ShrU, Op::I64ShrU),
    (I64, B::Shr, Op::I64ShrS),
    (I64, B::Eq, Op::I64Eq),
    (I64, B::Lt, Op::I64LtS),
    (I64, B::Le, Op::I64LeS),
    (I64, B::Gt, Op::I64GtS),
    (I64, B::Ge, Op::I64GeS),
    (F32, B::Add, Op::F32Add),
    (F32, B::Sub, Op::F32Sub),
    (F32, B::Mul, Op::F32Mul),
    (F32, B::Div, Op::F32Div),
    (F32, B::Min, Op::F32Min),
    (F32, B::Max, Op::F32Max),
    (F32, B::Eq, Op::F32Eq),
    (F32, B::Lt, Op::F32Lt),
    (F32, B::Le, Op::F32Le),
    (F32, B::Gt, Op::F32Gt),
    (F32, B::Ge, Op::F32Ge),
    (F64, B::Add, Op::F64Add),
    (F64, B::Sub, Op::F64Sub),
    (F64, B::Mul, Op::F64Mul),
    (F64, B::Div, Op::F64Div),
    (F64, B::Min, Op::F64Min),
    (F64, B::Max, Op::F64Max),
    (F64, B::Eq, Op::F64Eq),
    (F64, B::Lt, Op::F64Lt),
    (F64, B::Le, Op::F64Le),
    (F64, B::Gt, Op::F64Gt),
    (F64, B::Ge, Op::F64Ge),
];

/// (destination, source, opcode)
static CONVERSIONS: &[(ValueType, ValueType, Op)] = &[
    (I32, I64, Op::I32FromI64),
    (I32, F32, Op::I32FromF32),
    (I32, F64, Op::I32FromF64),
    (I64, I32, Op::I64FromI32),
    (I64, F32, Op::I64FromF32),
    (I64, F64, Op::I64FromF64),
    (F32, I32, Op::F32FromI32),
    (F32, I64, Op::F32FromI64),
    (F32, F64, Op::F32FromF64),
    (F64, I32, Op::F64FromI32),
    (F64, I64, Op::F64FromI64),
    (F64, F32, Op::F64FromF32),
];

pub fn unary_op(optype: ValueType, op: UnaryOp) -> CodegenResult<Op> {
    UNARY_OPS
        .iter()
        .find(|(t, o, _)| *t == optype && *o == op)
        .map(|(_, _, code)| *code)
        .ok_or_else(|| CodegenError::Unsupported(format!("unary {op} on {optype}")))
}

pub fn binary_op(optype: ValueType, op: BinaryOp) -> CodegenResult<Op> {
    BINARY_OPS
        .iter()
        .find(|(t, o, _)| *t == optype && *o == op)
        .map(|(_, _, code)| *code)
        .ok_or_else(|| CodegenError::Unsupported(format!("binary {op} on {optype}")))
}

pub fn conversion_op(dst: ValueType, src: ValueType) -> CodegenResult<Op> {
    CONVERSIONS
        .iter()
        .find(|(d, s, _)| *d == dst && *s == src)
        .map(|(_, _, code)| *code)
        .ok_or_else(|| CodegenError::Unsupported(format!("conversion {src} to {dst}")))
}

pub fn load_op(class: StorageClass) -> Op {
    match class {
        StorageClass::I32 => Op::I32Load,
        StorageClass::I64 => Op::I64Load,
        StorageClass::F32 => Op::F32Load,
        StorageClass::F64 => Op::F64Load,
    }
}

pub fn store_op(class: StorageClass) -> Op {
    match class {
        StorageClass::I32 => Op::I32Store,
        StorageClass::I64 => Op::I64Store,
        StorageClass::F32 => Op::F32Store,
        StorageClass::F64 => Op::F64Store,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_distinct_per_type() {
        let codes: Vec<u8> = [I32, I64, F32, F64]
            .iter()
            .map(|t| binary_op(*t, B::Add).unwrap().byte())
            .collect();
        assert_eq!(codes, [0x40, 0x5a, 0x73, 0x86]);
    }

    #[test]
    fn test_shift_directions() {
        assert_eq!(binary_op(I32, B::Shr).unwrap().byte(), 0x4c);
        assert_eq!(binary_op(I32, B::ShrU).unwrap().byte(), 0x4b);
    }

    #[test]
    fn test_lowered_operations_are_missing() {
        assert!(matches!(binary_op(I32, B::Ne), Err(CodegenError::Unsupported(_))));
        assert!(binary_op(F32, B::Rem).is_err());
        assert!(binary_op(ValueType::I8, B::Add).is_err());
        assert!(unary_op(I64, UnaryOp::BoolNot).is_err());
        assert!(unary_op(I32, UnaryOp::Neg).is_err());
        assert!(unary_op(F32, UnaryOp::BoolNot).is_err());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(conversion_op(F64, I32).unwrap().byte(), 0xaa);
        assert_eq!(conversion_op(I32, I64).unwrap().byte(), 0x9d);
        assert!(conversion_op(I32, I32).is_err());
        assert!(conversion_op(ValueType::I8, I32).is_err());
    }

    #[test]
    fn test_type_codes() {
        assert_eq!(type_code(ValueType::Void).unwrap(), 0);
        assert_eq!(type_code(F64).unwrap(), 4);
        assert!(type_code(ValueType::I16).is_err());
        for code in 0..=4 {
            let t = type_from_code(code).unwrap();
            assert_eq!(type_code(t).unwrap(), code);
        }
        assert_eq!(type_from_code(5), None);
    }

    #[test]
    fn test_memory_opcodes() {
        assert_eq!(mem_type_code(MemType::U16), 3);
        assert_eq!(load_op(MemType::U8.storage_class()), Op::I32Load);
        assert_eq!(store_op(StorageClass::F64).byte(), 0x33);
    }
}
