//! Typed, indexed AST produced by semantic analysis.
//!
//! Every [`Expr`] carries its resolved `etype`; every later pass relies on
//! it. References between entities (`GetLocal`, `CallDirect`, ...) are small
//! integer handles into the owning [`Module`] or [`Function`] and never imply
//! ownership, since dead-code elimination renumbers them.

use crate::ops::{BinaryOp, UnaryOp};
use crate::{Config, FuncType, MemType, Span, ValueType};
use std::fmt;

// ══════════════════════════════════════════════════════════════════════════════
// Handles
// ══════════════════════════════════════════════════════════════════════════════

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

handle!(
    /// Index into [`Module::funcs`].
    FuncId,
    "func#"
);
handle!(
    /// Index into [`Module::externs`].
    ExternId,
    "extern#"
);
handle!(
    /// Index into [`Function::locals`].
    LocalId,
    "local#"
);
handle!(
    /// Index into [`Module::tls`].
    TlsId,
    "tls#"
);

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

/// A typed expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub etype: ValueType,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    ConstI32(i32),
    ConstI64(i64),
    ConstF32(f32),
    ConstF64(f64),
    GetLocal(LocalId),
    GetTls(TlsId),
    /// A function used as a value (its uid once encoded).
    GetFunction(FuncId),
    GetExtern(ExternId),
    Load {
        mtype: MemType,
        address: Box<Expr>,
    },
    Store {
        mtype: MemType,
        address: Box<Expr>,
        value: Box<Expr>,
    },
    UnaryOp {
        optype: ValueType,
        op: UnaryOp,
        expr: Box<Expr>,
    },
    BinaryOp {
        optype: ValueType,
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Conversion of `expr` to this node's `etype`.
    Coerce {
        expr: Box<Expr>,
    },
    CallDirect {
        func: FuncId,
        args: Vec<Expr>,
    },
    CallExternal {
        func: ExternId,
        args: Vec<Expr>,
    },
    CallIndirect {
        ftype: FuncType,
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
}

impl Expr {
    fn new(kind: ExprKind, etype: ValueType) -> Self {
        Self {
            kind,
            etype,
            span: None,
        }
    }

    pub fn with_span(mut self, span: Option<Span>) -> Self {
        self.span = span;
        self
    }

    pub fn const_i32(value: i32) -> Self {
        Self::new(ExprKind::ConstI32(value), ValueType::I32)
    }

    pub fn const_i64(value: i64) -> Self {
        Self::new(ExprKind::ConstI64(value), ValueType::I64)
    }

    pub fn const_f32(value: f32) -> Self {
        Self::new(ExprKind::ConstF32(value), ValueType::F32)
    }

    pub fn const_f64(value: f64) -> Self {
        Self::new(ExprKind::ConstF64(value), ValueType::F64)
    }

    pub fn get_local(local: LocalId, ty: ValueType) -> Self {
        Self::new(ExprKind::GetLocal(local), ty)
    }

    pub fn get_tls(tls: TlsId, ty: ValueType) -> Self {
        Self::new(ExprKind::GetTls(tls), ty)
    }

    pub fn get_function(func: FuncId) -> Self {
        Self::new(ExprKind::GetFunction(func), ValueType::I32)
    }

    pub fn get_extern(func: ExternId) -> Self {
        Self::new(ExprKind::GetExtern(func), ValueType::I32)
    }

    pub fn load(mtype: MemType, address: Expr, etype: ValueType) -> Self {
        Self::new(
            ExprKind::Load {
                mtype,
                address: Box::new(address),
            },
            etype,
        )
    }

    pub fn store(mtype: MemType, address: Expr, value: Expr) -> Self {
        Self::new(
            ExprKind::Store {
                mtype,
                address: Box::new(address),
                value: Box::new(value),
            },
            ValueType::Void,
        )
    }

    pub fn unary(optype: ValueType, op: UnaryOp, expr: Expr, etype: ValueType) -> Self {
        Self::new(
            ExprKind::UnaryOp {
                optype,
                op,
                expr: Box::new(expr),
            },
            etype,
        )
    }

    pub fn binary(
        optype: ValueType,
        op: BinaryOp,
        left: Expr,
        right: Expr,
        etype: ValueType,
    ) -> Self {
        Self::new(
            ExprKind::BinaryOp {
                optype,
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            etype,
        )
    }

    pub fn coerce(expr: Expr, target: ValueType) -> Self {
        Self::new(
            ExprKind::Coerce {
                expr: Box::new(expr),
            },
            target,
        )
    }

    pub fn call_direct(func: FuncId, args: Vec<Expr>, etype: ValueType) -> Self {
        Self::new(ExprKind::CallDirect { func, args }, etype)
    }

    pub fn call_external(func: ExternId, args: Vec<Expr>, etype: ValueType) -> Self {
        Self::new(ExprKind::CallExternal { func, args }, etype)
    }

    pub fn call_indirect(ftype: FuncType, callee: Expr, args: Vec<Expr>) -> Self {
        let etype = ftype.ret;
        Self::new(
            ExprKind::CallIndirect {
                ftype,
                callee: Box::new(callee),
                args,
            },
            etype,
        )
    }

    /// The `i32` boolean negation of `expr`.
    pub fn not(expr: Expr) -> Self {
        Self::unary(ValueType::I32, UnaryOp::BoolNot, expr, ValueType::I32)
    }

    /// Whether this expression can only produce `0` or `1`.
    pub fn is_naturally_bool(&self) -> bool {
        if self.etype != ValueType::I32 {
            return false;
        }
        match &self.kind {
            ExprKind::ConstI32(v) => *v == 0 || *v == 1,
            ExprKind::UnaryOp { op, .. } => *op == UnaryOp::BoolNot,
            ExprKind::BinaryOp { op, .. } => op.is_compare(),
            _ => false,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    SetLocal {
        local: LocalId,
        value: Expr,
    },
    SetTls {
        tls: TlsId,
        value: Expr,
    },
    If {
        cond: Expr,
        then_block: Vec<Stmt>,
        else_block: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    /// Unconditional loop; exits only through `Break` or `Return`.
    Loop {
        body: Vec<Stmt>,
    },
    /// Leave an enclosing block. Depth 0 is the innermost block; a loop
    /// body counts as one block, so `depth` is the number of `If` blocks
    /// between the break and the loop it exits.
    Break {
        depth: u32,
    },
    Return {
        expr: Option<Expr>,
    },
}

// ══════════════════════════════════════════════════════════════════════════════
// Module entities
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    pub name: String,
    pub ty: ValueType,
    /// Position in the function's local list (parameters first).
    pub index: u32,
    /// Position within the encoder's per-storage-class layout.
    pub remapped_index: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub span: Option<Span>,
    pub export: bool,
    /// The first `params.len()` locals, in declaration order.
    pub params: Vec<LocalId>,
    pub locals: Vec<Local>,
    pub return_type: ValueType,
    pub body: Vec<Stmt>,
    pub index: u32,
}

impl Function {
    pub fn local(&self, id: LocalId) -> Option<&Local> {
        self.locals.get(id.index())
    }

    pub fn is_param(&self, id: LocalId) -> bool {
        id.index() < self.params.len()
    }

    pub fn param_types(&self) -> Vec<ValueType> {
        self.params
            .iter()
            .filter_map(|id| self.local(*id).map(|l| l.ty))
            .collect()
    }

    pub fn signature(&self) -> FuncType {
        FuncType::new(self.param_types(), self.return_type)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extern {
    pub name: String,
    pub span: Option<Span>,
    pub ftype: FuncType,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TlsGlobal {
    pub name: String,
    pub ty: ValueType,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryLabel {
    pub name: String,
    pub ptr: u32,
}

/// A laid-out memory block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySegment {
    /// Absolute address of the first byte of `buffer`.
    pub ptr: u32,
    pub buffer: Vec<u8>,
    pub labels: Vec<MemoryLabel>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub config: Config,
    pub externs: Vec<Extern>,
    pub funcs: Vec<Function>,
    pub tls: Vec<TlsGlobal>,
    pub memory: Vec<MemorySegment>,
    /// First free heap address after all memory segments.
    pub top: u32,
}

impl Module {
    pub fn func(&self, id: FuncId) -> Option<&Function> {
        self.funcs.get(id.index())
    }

    pub fn extern_(&self, id: ExternId) -> Option<&Extern> {
        self.externs.get(id.index())
    }

    /// The function named `name`, by its current index.
    pub fn find_func(&self, name: &str) -> Option<FuncId> {
        self.funcs.iter().find(|f| f.name == name).map(|f| FuncId(f.index))
    }

    /// Whether the program targets shared memory with atomics.
    pub fn uses_shared_memory(&self) -> bool {
        self.config.shared_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_etype() {
        assert_eq!(Expr::const_i64(3).etype, ValueType::I64);
        assert_eq!(Expr::get_function(FuncId(2)).etype, ValueType::I32);
        let store = Expr::store(MemType::U8, Expr::const_i32(8), Expr::const_i32(1));
        assert_eq!(store.etype, ValueType::Void);
        let call = Expr::call_indirect(
            FuncType::new(vec![ValueType::F32], ValueType::F64),
            Expr::const_i32(0),
            vec![Expr::const_f32(1.0)],
        );
        assert_eq!(call.etype, ValueType::F64);
    }

    #[test]
    fn test_naturally_bool() {
        assert!(Expr::const_i32(1).is_naturally_bool());
        assert!(!Expr::const_i32(2).is_naturally_bool());
        let cmp = Expr::binary(
            ValueType::F64,
            BinaryOp::Lt,
            Expr::const_f64(1.0),
            Expr::const_f64(2.0),
            ValueType::I32,
        );
        assert!(cmp.is_naturally_bool());
        assert!(Expr::not(cmp).is_naturally_bool());
        assert!(!Expr::get_local(LocalId(0), ValueType::I32).is_naturally_bool());
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(FuncId(3).to_string(), "func#3");
        assert_eq!(LocalId(0).to_string(), "local#0");
    }

    #[test]
    fn test_function_signature() {
        let func = Function {
            name: "f".into(),
            span: None,
            export: false,
            params: vec![LocalId(0)],
            locals: vec![
                Local {
                    name: "a".into(),
                    ty: ValueType::I64,
                    index: 0,
                    remapped_index: None,
                },
                Local {
                    name: "t".into(),
                    ty: ValueType::F32,
                    index: 1,
                    remapped_index: None,
                },
            ],
            return_type: ValueType::Void,
            body: vec![],
            index: 0,
        };
        assert_eq!(func.signature().to_string(), "(i64) void");
        assert!(func.is_param(LocalId(0)));
        assert!(!func.is_param(LocalId(1)));
    }

    #[test]
    fn test_shared_memory_comes_from_config() {
        let mut module = Module {
            config: Config::defaults(),
            ..Module::default()
        };
        assert!(!module.uses_shared_memory());
        module.config.set_shared_memory(true);
        assert!(module.uses_shared_memory());
    }
}
