//! Raw parse tree handed over by the parser.
//!
//! Names and types are still unresolved tokens. Positions are optional so
//! that trees synthesized by tools (and by [`build`]) need not invent them.

use crate::Span;
use serde::{Deserialize, Serialize};

/// A whole source file: its top-level declarations in order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParsedModule {
    pub decls: Vec<Decl>,
}

/// A top-level declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Decl {
    Function(FuncDecl),
    Extern(ExternDecl),
    Memory(MemoryDecl),
    Config(ConfigDecl),
    Tls(TlsDecl),
}

/// An identifier token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ident {
    pub text: String,
    #[serde(default)]
    pub span: Option<Span>,
}

/// A type token such as `i32` or `void`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeName {
    pub text: String,
    #[serde(default)]
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncTypeDecl {
    pub params: Vec<TypeName>,
    pub ret: TypeName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: Ident,
    pub ty: TypeName,
}

/// `[export] func name(params) ret { body }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDecl {
    pub export: bool,
    pub name: Ident,
    pub params: Vec<ParamDecl>,
    pub return_type: TypeName,
    pub body: Vec<RawStmt>,
    #[serde(default)]
    pub span: Option<Span>,
}

/// `import func name(types) ret;`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternDecl {
    pub name: Ident,
    pub ftype: FuncTypeDecl,
    #[serde(default)]
    pub span: Option<Span>,
}

/// `tls name type;`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsDecl {
    pub name: Ident,
    pub ty: TypeName,
}

/// `memory { directive* }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryDecl {
    pub directives: Vec<Directive>,
    #[serde(default)]
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Directive {
    Align {
        size: u32,
        #[serde(default)]
        span: Option<Span>,
    },
    Zero {
        size: u32,
    },
    Hex {
        bytes: Vec<u8>,
    },
    String {
        text: String,
    },
    Label {
        name: Ident,
    },
}

/// `config { a.b = value; ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDecl {
    pub items: Vec<ConfigItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigItem {
    pub path: Vec<Ident>,
    pub value: RawExpr,
    #[serde(default)]
    pub span: Option<Span>,
}

/// An unresolved expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RawExpr {
    ConstI32 {
        value: i32,
        #[serde(default)]
        span: Option<Span>,
    },
    ConstI64 {
        value: i64,
        #[serde(default)]
        span: Option<Span>,
    },
    ConstF32 {
        value: f32,
        #[serde(default)]
        span: Option<Span>,
    },
    ConstF64 {
        value: f64,
        #[serde(default)]
        span: Option<Span>,
    },
    Name(Ident),
    /// `load<mtype>(address)`
    Load {
        mtype: TypeName,
        address: Box<RawExpr>,
        #[serde(default)]
        span: Option<Span>,
    },
    /// `store<mtype>(address, value)`
    Store {
        mtype: TypeName,
        address: Box<RawExpr>,
        value: Box<RawExpr>,
        #[serde(default)]
        span: Option<Span>,
    },
    /// `(type)expr`
    Coerce {
        ty: TypeName,
        expr: Box<RawExpr>,
        #[serde(default)]
        span: Option<Span>,
    },
    Prefix {
        op: Ident,
        expr: Box<RawExpr>,
    },
    Infix {
        left: Box<RawExpr>,
        op: Ident,
        right: Box<RawExpr>,
    },
    Call {
        callee: Box<RawExpr>,
        args: Vec<RawExpr>,
    },
    /// `callIndirect<ftype>(callee, args...)`
    CallIndirect {
        ftype: FuncTypeDecl,
        callee: Box<RawExpr>,
        args: Vec<RawExpr>,
        #[serde(default)]
        span: Option<Span>,
    },
}

impl RawExpr {
    /// The position diagnostics about this expression point at.
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::ConstI32 { span, .. }
            | Self::ConstI64 { span, .. }
            | Self::ConstF32 { span, .. }
            | Self::ConstF64 { span, .. }
            | Self::Load { span, .. }
            | Self::Store { span, .. }
            | Self::Coerce { span, .. }
            | Self::CallIndirect { span, .. } => *span,
            Self::Name(ident) => ident.span,
            Self::Prefix { op, .. } => op.span,
            Self::Infix { left, op, right } => match (left.span(), right.span()) {
                (Some(l), Some(r)) => Some(l.merge(r)),
                (l, r) => l.or(op.span).or(r),
            },
            Self::Call { callee, .. } => callee.span(),
        }
    }
}

/// An unresolved statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RawStmt {
    VarDecl {
        name: Ident,
        ty: TypeName,
        value: Option<RawExpr>,
    },
    Assign {
        name: Ident,
        value: RawExpr,
    },
    Expr {
        expr: RawExpr,
    },
    Return {
        expr: Option<RawExpr>,
        #[serde(default)]
        span: Option<Span>,
    },
    Break {
        #[serde(default)]
        span: Option<Span>,
    },
    If {
        cond: RawExpr,
        then_block: Vec<RawStmt>,
        else_block: Option<Vec<RawStmt>>,
        #[serde(default)]
        span: Option<Span>,
    },
    While {
        cond: RawExpr,
        body: Vec<RawStmt>,
        #[serde(default)]
        span: Option<Span>,
    },
}

// ══════════════════════════════════════════════════════════════════════════════
// Builders
// ══════════════════════════════════════════════════════════════════════════════

/// Terse constructors for raw trees.
///
/// ```
/// use prewasm_types::parsed::build::*;
///
/// let module = module(vec![func("main")
///     .export()
///     .returns("i32")
///     .body(vec![ret(i32c(11))])
///     .into()]);
/// assert_eq!(module.decls.len(), 1);
/// ```
pub mod build {
    use super::*;

    pub fn module(decls: Vec<Decl>) -> ParsedModule {
        ParsedModule { decls }
    }

    pub fn ident(text: &str) -> Ident {
        Ident {
            text: text.to_string(),
            span: None,
        }
    }

    pub fn ident_at(text: &str, span: Span) -> Ident {
        Ident {
            text: text.to_string(),
            span: Some(span),
        }
    }

    pub fn ty(text: &str) -> TypeName {
        TypeName {
            text: text.to_string(),
            span: None,
        }
    }

    pub fn ftype(params: &[&str], ret: &str) -> FuncTypeDecl {
        FuncTypeDecl {
            params: params.iter().map(|p| ty(p)).collect(),
            ret: ty(ret),
        }
    }

    // ── Declarations ──────────────────────────────────────────────────────

    /// Incrementally describes a function declaration.
    pub struct FuncBuilder {
        decl: FuncDecl,
    }

    pub fn func(name: &str) -> FuncBuilder {
        FuncBuilder {
            decl: FuncDecl {
                export: false,
                name: ident(name),
                params: Vec::new(),
                return_type: ty("void"),
                body: Vec::new(),
                span: None,
            },
        }
    }

    impl FuncBuilder {
        pub fn export(mut self) -> Self {
            self.decl.export = true;
            self
        }

        pub fn param(mut self, name: &str, t: &str) -> Self {
            self.decl.params.push(ParamDecl {
                name: ident(name),
                ty: ty(t),
            });
            self
        }

        pub fn returns(mut self, t: &str) -> Self {
            self.decl.return_type = ty(t);
            self
        }

        pub fn body(mut self, body: Vec<RawStmt>) -> Self {
            self.decl.body = body;
            self
        }

        pub fn at(mut self, span: Span) -> Self {
            self.decl.name.span = Some(span);
            self.decl.span = Some(span);
            self
        }

        pub fn build(self) -> FuncDecl {
            self.decl
        }
    }

    impl From<FuncBuilder> for Decl {
        fn from(builder: FuncBuilder) -> Self {
            Decl::Function(builder.decl)
        }
    }

    pub fn extern_(name: &str, params: &[&str], ret: &str) -> Decl {
        Decl::Extern(ExternDecl {
            name: ident(name),
            ftype: ftype(params, ret),
            span: None,
        })
    }

    pub fn tls(name: &str, t: &str) -> Decl {
        Decl::Tls(TlsDecl {
            name: ident(name),
            ty: ty(t),
        })
    }

    pub fn memory(directives: Vec<Directive>) -> Decl {
        Decl::Memory(MemoryDecl {
            directives,
            span: None,
        })
    }

    pub fn align(size: u32) -> Directive {
        Directive::Align { size, span: None }
    }

    pub fn zero(size: u32) -> Directive {
        Directive::Zero { size }
    }

    pub fn hex(bytes: &[u8]) -> Directive {
        Directive::Hex {
            bytes: bytes.to_vec(),
        }
    }

    pub fn string(text: &str) -> Directive {
        Directive::String {
            text: text.to_string(),
        }
    }

    pub fn label(name: &str) -> Directive {
        Directive::Label { name: ident(name) }
    }

    /// A config block from `("a.b", value)` pairs.
    pub fn config(items: &[(&str, RawExpr)]) -> Decl {
        Decl::Config(ConfigDecl {
            items: items
                .iter()
                .map(|(path, value)| ConfigItem {
                    path: path.split('.').map(ident).collect(),
                    value: value.clone(),
                    span: None,
                })
                .collect(),
        })
    }

    // ── Expressions ───────────────────────────────────────────────────────

    pub fn i32c(value: i32) -> RawExpr {
        RawExpr::ConstI32 { value, span: None }
    }

    pub fn i64c(value: i64) -> RawExpr {
        RawExpr::ConstI64 { value, span: None }
    }

    pub fn f32c(value: f32) -> RawExpr {
        RawExpr::ConstF32 { value, span: None }
    }

    pub fn f64c(value: f64) -> RawExpr {
        RawExpr::ConstF64 { value, span: None }
    }

    pub fn name(text: &str) -> RawExpr {
        RawExpr::Name(ident(text))
    }

    pub fn name_at(text: &str, span: Span) -> RawExpr {
        RawExpr::Name(ident_at(text, span))
    }

    pub fn infix(left: RawExpr, op: &str, right: RawExpr) -> RawExpr {
        RawExpr::Infix {
            left: Box::new(left),
            op: ident(op),
            right: Box::new(right),
        }
    }

    pub fn prefix(op: &str, expr: RawExpr) -> RawExpr {
        RawExpr::Prefix {
            op: ident(op),
            expr: Box::new(expr),
        }
    }

    pub fn call(callee: &str, args: Vec<RawExpr>) -> RawExpr {
        RawExpr::Call {
            callee: Box::new(name(callee)),
            args,
        }
    }

    pub fn call_indirect(
        params: &[&str],
        ret: &str,
        callee: RawExpr,
        args: Vec<RawExpr>,
    ) -> RawExpr {
        RawExpr::CallIndirect {
            ftype: ftype(params, ret),
            callee: Box::new(callee),
            args,
            span: None,
        }
    }

    pub fn coerce(t: &str, expr: RawExpr) -> RawExpr {
        RawExpr::Coerce {
            ty: ty(t),
            expr: Box::new(expr),
            span: None,
        }
    }

    pub fn load(mtype: &str, address: RawExpr) -> RawExpr {
        RawExpr::Load {
            mtype: ty(mtype),
            address: Box::new(address),
            span: None,
        }
    }

    pub fn store(mtype: &str, address: RawExpr, value: RawExpr) -> RawExpr {
        RawExpr::Store {
            mtype: ty(mtype),
            address: Box::new(address),
            value: Box::new(value),
            span: None,
        }
    }

    // ── Statements ────────────────────────────────────────────────────────

    pub fn var(name: &str, t: &str) -> RawStmt {
        RawStmt::VarDecl {
            name: ident(name),
            ty: ty(t),
            value: None,
        }
    }

    pub fn var_init(name: &str, t: &str, value: RawExpr) -> RawStmt {
        RawStmt::VarDecl {
            name: ident(name),
            ty: ty(t),
            value: Some(value),
        }
    }

    pub fn assign(name: &str, value: RawExpr) -> RawStmt {
        RawStmt::Assign {
            name: ident(name),
            value,
        }
    }

    pub fn expr(expr: RawExpr) -> RawStmt {
        RawStmt::Expr { expr }
    }

    pub fn ret(expr: RawExpr) -> RawStmt {
        RawStmt::Return {
            expr: Some(expr),
            span: None,
        }
    }

    pub fn ret_void() -> RawStmt {
        RawStmt::Return {
            expr: None,
            span: None,
        }
    }

    pub fn brk() -> RawStmt {
        RawStmt::Break { span: None }
    }

    pub fn if_(cond: RawExpr, then_block: Vec<RawStmt>) -> RawStmt {
        RawStmt::If {
            cond,
            then_block,
            else_block: None,
            span: None,
        }
    }

    pub fn if_else(cond: RawExpr, then_block: Vec<RawStmt>, else_block: Vec<RawStmt>) -> RawStmt {
        RawStmt::If {
            cond,
            then_block,
            else_block: Some(else_block),
            span: None,
        }
    }

    pub fn while_(cond: RawExpr, body: Vec<RawStmt>) -> RawStmt {
        RawStmt::While {
            cond,
            body,
            span: None,
        }
    }
}
