//! Operator classification tables.
//!
//! Source operators are classified by their text and operand type into a
//! typed operation plus a result type. The semantic analyzer uses these
//! tables to type `Infix`/`Prefix` expressions and intrinsic calls; the
//! desugarer uses [`binary_result`] and [`unary_result`] to type the nodes
//! it synthesizes.

use crate::ValueType;
use serde::{Deserialize, Serialize};
use std::fmt;

// ══════════════════════════════════════════════════════════════════════════════
// Operations
// ══════════════════════════════════════════════════════════════════════════════

/// A typed unary operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    BoolNot,
    Neg,
    Sqrt,
}

impl UnaryOp {
    pub fn name(self) -> &'static str {
        match self {
            Self::BoolNot => "boolnot",
            Self::Neg => "neg",
            Self::Sqrt => "sqrt",
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed binary operation.
///
/// Integer division, remainder and ordering comparisons are signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    /// Arithmetic (sign-propagating) right shift.
    Shr,
    /// Logical (zero-filling) right shift.
    ShrU,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Min,
    Max,
}

impl BinaryOp {
    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Rem => "rem",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Shl => "shl",
            Self::Shr => "shr",
            Self::ShrU => "shru",
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Min => "min",
            Self::Max => "max",
        }
    }

    pub fn is_compare(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Declaration tables
// ══════════════════════════════════════════════════════════════════════════════

/// How the result type of an operation is derived from its operand type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResultRule {
    Operand,
    Fixed(ValueType),
}

impl ResultRule {
    fn apply(self, optype: ValueType) -> ValueType {
        match self {
            Self::Operand => optype,
            Self::Fixed(t) => t,
        }
    }
}

struct BinaryDecl {
    text: Option<&'static str>,
    op: BinaryOp,
    types: &'static [ValueType],
    result: ResultRule,
}

struct UnaryDecl {
    prefix: Option<&'static str>,
    op: UnaryOp,
    types: &'static [ValueType],
    result: ResultRule,
}

struct IntrinsicDecl {
    name: &'static str,
    kind: IntrinsicKind,
    optype: ValueType,
}

use crate::ty::ValueType::{F32, F64, I16, I32, I64, I8};

const NUMERIC: &[ValueType] = &[I8, I16, I32, I64, F32, F64];
const INTEGER: &[ValueType] = &[I8, I16, I32, I64];
const FLOAT: &[ValueType] = &[F32, F64];

const fn binary(
    text: &'static str,
    op: BinaryOp,
    types: &'static [ValueType],
    result: ResultRule,
) -> BinaryDecl {
    BinaryDecl {
        text: Some(text),
        op,
        types,
        result,
    }
}

static BINARY_TABLE: &[BinaryDecl] = &[
    binary("+", BinaryOp::Add, NUMERIC, ResultRule::Operand),
    binary("-", BinaryOp::Sub, NUMERIC, ResultRule::Operand),
    binary("*", BinaryOp::Mul, NUMERIC, ResultRule::Operand),
    binary("/", BinaryOp::Div, NUMERIC, ResultRule::Operand),
    binary("%", BinaryOp::Rem, INTEGER, ResultRule::Operand),
    binary("&", BinaryOp::And, INTEGER, ResultRule::Operand),
    binary("|", BinaryOp::Or, INTEGER, ResultRule::Operand),
    binary("^", BinaryOp::Xor, INTEGER, ResultRule::Operand),
    binary("<<", BinaryOp::Shl, INTEGER, ResultRule::Operand),
    binary(">>", BinaryOp::Shr, INTEGER, ResultRule::Operand),
    binary(">>>", BinaryOp::ShrU, INTEGER, ResultRule::Operand),
    binary("==", BinaryOp::Eq, NUMERIC, ResultRule::Fixed(I32)),
    binary("!=", BinaryOp::Ne, NUMERIC, ResultRule::Fixed(I32)),
    binary("<", BinaryOp::Lt, NUMERIC, ResultRule::Fixed(I32)),
    binary("<=", BinaryOp::Le, NUMERIC, ResultRule::Fixed(I32)),
    binary(">", BinaryOp::Gt, NUMERIC, ResultRule::Fixed(I32)),
    binary(">=", BinaryOp::Ge, NUMERIC, ResultRule::Fixed(I32)),
    // Only reachable through intrinsics.
    BinaryDecl {
        text: None,
        op: BinaryOp::Min,
        types: FLOAT,
        result: ResultRule::Operand,
    },
    BinaryDecl {
        text: None,
        op: BinaryOp::Max,
        types: FLOAT,
        result: ResultRule::Operand,
    },
];

static UNARY_TABLE: &[UnaryDecl] = &[
    UnaryDecl {
        prefix: Some("!"),
        op: UnaryOp::BoolNot,
        types: NUMERIC,
        result: ResultRule::Fixed(I32),
    },
    UnaryDecl {
        prefix: Some("-"),
        op: UnaryOp::Neg,
        types: NUMERIC,
        result: ResultRule::Operand,
    },
    UnaryDecl {
        prefix: None,
        op: UnaryOp::Sqrt,
        types: FLOAT,
        result: ResultRule::Operand,
    },
];

static INTRINSIC_TABLE: &[IntrinsicDecl] = &[
    IntrinsicDecl {
        name: "sqrtF32",
        kind: IntrinsicKind::Unary(UnaryOp::Sqrt),
        optype: F32,
    },
    IntrinsicDecl {
        name: "sqrtF64",
        kind: IntrinsicKind::Unary(UnaryOp::Sqrt),
        optype: F64,
    },
    IntrinsicDecl {
        name: "minF32",
        kind: IntrinsicKind::Binary(BinaryOp::Min),
        optype: F32,
    },
    IntrinsicDecl {
        name: "maxF32",
        kind: IntrinsicKind::Binary(BinaryOp::Max),
        optype: F32,
    },
    IntrinsicDecl {
        name: "minF64",
        kind: IntrinsicKind::Binary(BinaryOp::Min),
        optype: F64,
    },
    IntrinsicDecl {
        name: "maxF64",
        kind: IntrinsicKind::Binary(BinaryOp::Max),
        optype: F64,
    },
];

// ══════════════════════════════════════════════════════════════════════════════
// Lookups
// ══════════════════════════════════════════════════════════════════════════════

/// Result of classifying an operator against an operand type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classified<Op> {
    pub op: Op,
    pub result: ValueType,
}

/// Whether `text` names any infix operator, regardless of operand type.
pub fn is_infix_operator(text: &str) -> bool {
    BINARY_TABLE.iter().any(|d| d.text == Some(text))
}

/// Classify an infix operator applied to two operands of type `optype`.
pub fn classify_infix(text: &str, optype: ValueType) -> Option<Classified<BinaryOp>> {
    BINARY_TABLE
        .iter()
        .find(|d| d.text == Some(text) && d.types.contains(&optype))
        .map(|d| Classified {
            op: d.op,
            result: d.result.apply(optype),
        })
}

/// Classify a prefix operator applied to an operand of type `optype`.
pub fn classify_prefix(text: &str, optype: ValueType) -> Option<Classified<UnaryOp>> {
    UNARY_TABLE
        .iter()
        .find(|d| d.prefix == Some(text) && d.types.contains(&optype))
        .map(|d| Classified {
            op: d.op,
            result: d.result.apply(optype),
        })
}

/// Result type of a binary operation, or `None` if the table lacks it.
pub fn binary_result(op: BinaryOp, optype: ValueType) -> Option<ValueType> {
    BINARY_TABLE
        .iter()
        .find(|d| d.op == op && d.types.contains(&optype))
        .map(|d| d.result.apply(optype))
}

/// Result type of a unary operation, or `None` if the table lacks it.
pub fn unary_result(op: UnaryOp, optype: ValueType) -> Option<ValueType> {
    UNARY_TABLE
        .iter()
        .find(|d| d.op == op && d.types.contains(&optype))
        .map(|d| d.result.apply(optype))
}

/// The operation an intrinsic call lowers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrinsicKind {
    Unary(UnaryOp),
    Binary(BinaryOp),
}

/// A resolved intrinsic: its operation, operand type and argument count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intrinsic {
    pub kind: IntrinsicKind,
    pub optype: ValueType,
}

impl Intrinsic {
    pub fn arity(&self) -> usize {
        match self.kind {
            IntrinsicKind::Unary(_) => 1,
            IntrinsicKind::Binary(_) => 2,
        }
    }

    pub fn result(&self) -> ValueType {
        match self.kind {
            IntrinsicKind::Unary(op) => unary_result(op, self.optype),
            IntrinsicKind::Binary(op) => binary_result(op, self.optype),
        }
        .unwrap_or(self.optype)
    }
}

/// Look up an intrinsic by the name it is called with.
pub fn classify_intrinsic(name: &str) -> Option<Intrinsic> {
    INTRINSIC_TABLE
        .iter()
        .find(|d| d.name == name)
        .map(|d| Intrinsic {
            kind: d.kind,
            optype: d.optype,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic_keeps_operand_type() {
        for t in NUMERIC {
            let c = classify_infix("+", *t).unwrap();
            assert_eq!(c.op, BinaryOp::Add);
            assert_eq!(c.result, *t);
        }
    }

    #[test]
    fn test_comparisons_always_produce_i32() {
        for text in ["==", "!=", "<", "<=", ">", ">="] {
            for t in NUMERIC {
                let c = classify_infix(text, *t).unwrap();
                assert!(c.op.is_compare());
                assert_eq!(c.result, ValueType::I32);
            }
        }
    }

    #[test]
    fn test_integer_only_operators_reject_floats() {
        for text in ["%", "&", "|", "^", "<<", ">>", ">>>"] {
            assert!(classify_infix(text, ValueType::I32).is_some());
            assert!(classify_infix(text, ValueType::F32).is_none());
            assert!(classify_infix(text, ValueType::F64).is_none());
        }
    }

    #[test]
    fn test_shift_spellings() {
        assert_eq!(classify_infix(">>", ValueType::I32).unwrap().op, BinaryOp::Shr);
        assert_eq!(classify_infix(">>>", ValueType::I64).unwrap().op, BinaryOp::ShrU);
    }

    #[test]
    fn test_void_is_never_an_operand() {
        assert!(classify_infix("+", ValueType::Void).is_none());
        assert!(classify_prefix("!", ValueType::Void).is_none());
    }

    #[test]
    fn test_unknown_operator_text() {
        assert!(!is_infix_operator("**"));
        assert!(is_infix_operator(">>>"));
        assert!(classify_infix("**", ValueType::I32).is_none());
    }

    #[test]
    fn test_prefix_operators() {
        let not = classify_prefix("!", ValueType::F64).unwrap();
        assert_eq!(not.op, UnaryOp::BoolNot);
        assert_eq!(not.result, ValueType::I32);

        let neg = classify_prefix("-", ValueType::I64).unwrap();
        assert_eq!(neg.op, UnaryOp::Neg);
        assert_eq!(neg.result, ValueType::I64);
    }

    #[test]
    fn test_min_max_have_no_infix_spelling() {
        assert_eq!(binary_result(BinaryOp::Min, ValueType::F32), Some(ValueType::F32));
        assert_eq!(binary_result(BinaryOp::Max, ValueType::I32), None);
    }

    #[test]
    fn test_intrinsics() {
        let sqrt = classify_intrinsic("sqrtF64").unwrap();
        assert_eq!(sqrt.kind, IntrinsicKind::Unary(UnaryOp::Sqrt));
        assert_eq!(sqrt.arity(), 1);
        assert_eq!(sqrt.result(), ValueType::F64);

        let max = classify_intrinsic("maxF32").unwrap();
        assert_eq!(max.kind, IntrinsicKind::Binary(BinaryOp::Max));
        assert_eq!(max.arity(), 2);
        assert_eq!(max.result(), ValueType::F32);

        assert!(classify_intrinsic("sqrt").is_none());
    }
}
