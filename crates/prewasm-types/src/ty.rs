//! Language-level value types and memory element types.
//!
//! [`ValueType`] is what an expression evaluates to (its `etype`).
//! [`MemType`] is the element type of a `Load`/`Store`, which adds the
//! unsigned variants a value type cannot express.

use serde::{Deserialize, Serialize};
use std::fmt;

// ══════════════════════════════════════════════════════════════════════════════
// ValueType
// ══════════════════════════════════════════════════════════════════════════════

/// A language-level type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Void,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl ValueType {
    /// Resolve a type token as written in source.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "void" => Self::Void,
            "i8" => Self::I8,
            "i16" => Self::I16,
            "i32" => Self::I32,
            "i64" => Self::I64,
            "f32" => Self::F32,
            "f64" => Self::F64,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    /// `i8` and `i16`, which are computed with 32-bit operations.
    pub fn is_narrow(self) -> bool {
        matches!(self, Self::I8 | Self::I16)
    }

    /// The type actually used for computation after lowering.
    pub fn simplified(self) -> Self {
        if self.is_narrow() {
            Self::I32
        } else {
            self
        }
    }

    /// Shift amount that sign-extends a narrow value held in 32 bits.
    pub fn narrow_shift(self) -> Option<i32> {
        match self {
            Self::I8 => Some(24),
            Self::I16 => Some(16),
            _ => None,
        }
    }

    pub fn storage_class(self) -> Option<StorageClass> {
        match self {
            Self::Void => None,
            Self::I8 | Self::I16 | Self::I32 => Some(StorageClass::I32),
            Self::I64 => Some(StorageClass::I64),
            Self::F32 => Some(StorageClass::F32),
            Self::F64 => Some(StorageClass::F64),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// StorageClass
// ══════════════════════════════════════════════════════════════════════════════

/// Primitive storage class; the interpreter keeps one local array per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageClass {
    I32,
    I64,
    F32,
    F64,
}

impl StorageClass {
    pub const ALL: [StorageClass; 4] = [Self::I32, Self::I64, Self::F32, Self::F64];

    pub fn value_type(self) -> ValueType {
        match self {
            Self::I32 => ValueType::I32,
            Self::I64 => ValueType::I64,
            Self::F32 => ValueType::F32,
            Self::F64 => ValueType::F64,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// MemType
// ══════════════════════════════════════════════════════════════════════════════

/// Element type of a memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl MemType {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "i8" => Self::I8,
            "u8" => Self::U8,
            "i16" => Self::I16,
            "u16" => Self::U16,
            "i32" => Self::I32,
            "u32" => Self::U32,
            "i64" => Self::I64,
            "u64" => Self::U64,
            "f32" => Self::F32,
            "f64" => Self::F64,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    /// The type of a value loaded from memory with this element type.
    ///
    /// Unsigned narrow values are zero-extended and always fit in `i32`.
    pub fn value_type(self) -> ValueType {
        match self {
            Self::I8 => ValueType::I8,
            Self::I16 => ValueType::I16,
            Self::U8 | Self::U16 | Self::I32 | Self::U32 => ValueType::I32,
            Self::I64 | Self::U64 => ValueType::I64,
            Self::F32 => ValueType::F32,
            Self::F64 => ValueType::F64,
        }
    }

    pub fn storage_class(self) -> StorageClass {
        match self {
            Self::I8 | Self::U8 | Self::I16 | Self::U16 | Self::I32 | Self::U32 => {
                StorageClass::I32
            }
            Self::I64 | Self::U64 => StorageClass::I64,
            Self::F32 => StorageClass::F32,
            Self::F64 => StorageClass::F64,
        }
    }

    /// Width of the element in bytes.
    pub fn size(self) -> u32 {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }
}

impl fmt::Display for MemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// FuncType
// ══════════════════════════════════════════════════════════════════════════════

/// A function signature: ordered parameter types and a return type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuncType {
    pub params: Vec<ValueType>,
    pub ret: ValueType,
}

impl FuncType {
    pub fn new(params: Vec<ValueType>, ret: ValueType) -> Self {
        Self { params, ret }
    }

    /// Same signature with narrow integers widened to `i32`.
    pub fn simplified(&self) -> Self {
        Self {
            params: self.params.iter().map(|t| t.simplified()).collect(),
            ret: self.ret.simplified(),
        }
    }
}

impl fmt::Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, ") {}", self.ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_names_round_trip() {
        for t in [
            ValueType::Void,
            ValueType::I8,
            ValueType::I16,
            ValueType::I32,
            ValueType::I64,
            ValueType::F32,
            ValueType::F64,
        ] {
            assert_eq!(ValueType::from_name(t.name()), Some(t));
        }
        assert_eq!(ValueType::from_name("u8"), None);
    }

    #[test]
    fn test_narrow_types_simplify_to_i32() {
        assert_eq!(ValueType::I8.simplified(), ValueType::I32);
        assert_eq!(ValueType::I16.simplified(), ValueType::I32);
        assert_eq!(ValueType::I64.simplified(), ValueType::I64);
        assert_eq!(ValueType::I8.narrow_shift(), Some(24));
        assert_eq!(ValueType::I16.narrow_shift(), Some(16));
        assert_eq!(ValueType::I32.narrow_shift(), None);
    }

    #[test]
    fn test_mem_type_value_types() {
        assert_eq!(MemType::I8.value_type(), ValueType::I8);
        assert_eq!(MemType::U8.value_type(), ValueType::I32);
        assert_eq!(MemType::U64.value_type(), ValueType::I64);
        assert_eq!(MemType::U16.storage_class(), StorageClass::I32);
        assert_eq!(MemType::F64.size(), 8);
    }

    #[test]
    fn test_func_type_display_and_simplify() {
        let ft = FuncType::new(vec![ValueType::I8, ValueType::F32], ValueType::I16);
        assert_eq!(ft.to_string(), "(i8, f32) i16");
        assert_eq!(
            ft.simplified(),
            FuncType::new(vec![ValueType::I32, ValueType::F32], ValueType::I32)
        );
    }
}
