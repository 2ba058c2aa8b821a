//! Semantic analysis: raw parse tree → typed, indexed [`Module`].
//!
//! Entry point: [`analyze`].
//!
//! The pass runs in two phases:
//! 1. **Indexing**: config blocks are merged, externs and functions get
//!    indices in declaration order, memory blocks are laid out and every
//!    top-level name is registered in one module scope.
//! 2. **Bodies**: each function body is resolved and type-checked.
//!
//! User mistakes are reported through [`Diagnostics`] and analysis goes
//! on; an expression whose subtree already failed yields `None`, which
//! suppresses follow-up errors in its parents while siblings are still
//! checked. If indexing reports anything, bodies are skipped entirely.
//! Operator/type pairs missing from the classification tables are
//! [`FatalError`]s.

use prewasm_types::ast::{
    Expr, ExprKind, Extern, ExternId, FuncId, Function, Local, LocalId, Module, Stmt, TlsGlobal,
    TlsId,
};
use prewasm_types::ops::{
    classify_infix, classify_intrinsic, classify_prefix, Intrinsic, IntrinsicKind,
};
use prewasm_types::parsed::{
    ConfigDecl, Decl, Directive, ExternDecl, FuncDecl, FuncTypeDecl, Ident, MemoryDecl,
    ParsedModule, RawExpr, RawStmt, TlsDecl, TypeName,
};
use prewasm_types::{
    Config, DiagnosticKind, Diagnostics, FatalError, FatalResult, FuncType, MemType, Span,
    ValueType,
};

use crate::memory::MemoryLayout;
use crate::scope::{LocalScope, ModuleRef, ModuleScope};

/// Resolve and type-check a parsed module.
///
/// Returns `Err` only for fatal errors. The returned module must not be
/// lowered if `diags` gained any errors.
pub fn analyze(parsed: &ParsedModule, diags: &mut Diagnostics) -> FatalResult<Module> {
    Analyzer::new(diags).analyze_module(parsed)
}

// ══════════════════════════════════════════════════════════════════════════════
// Analyzer state
// ══════════════════════════════════════════════════════════════════════════════

struct Analyzer<'a> {
    diags: &'a mut Diagnostics,
    scope: ModuleScope,
    func_sigs: Vec<FuncType>,
    extern_sigs: Vec<FuncType>,
    tls_types: Vec<ValueType>,
}

/// A function signature resolved during indexing.
struct FuncHeader<'d> {
    params: Vec<(&'d Ident, ValueType)>,
    ret: ValueType,
}

/// Per-function state.
struct FuncState {
    locals: Vec<Local>,
    scope: LocalScope,
    return_type: ValueType,
    /// One entry per enclosing loop: `If` blocks entered since that loop.
    loops: Vec<u32>,
}

impl FuncState {
    fn new(return_type: ValueType) -> Self {
        Self {
            locals: Vec::new(),
            scope: LocalScope::new(),
            return_type,
            loops: Vec::new(),
        }
    }

    fn local_type(&self, id: LocalId) -> ValueType {
        self.locals[id.index()].ty
    }
}

impl<'a> Analyzer<'a> {
    fn new(diags: &'a mut Diagnostics) -> Self {
        Self {
            diags,
            scope: ModuleScope::new(),
            func_sigs: Vec::new(),
            extern_sigs: Vec::new(),
            tls_types: Vec::new(),
        }
    }

    fn error(&mut self, kind: DiagnosticKind, message: impl Into<String>, span: Option<Span>) {
        self.diags.error(kind, message, span);
    }

    // ══════════════════════════════════════════════════════════════════════
    // Indexing
    // ══════════════════════════════════════════════════════════════════════

    fn analyze_module(mut self, parsed: &ParsedModule) -> FatalResult<Module> {
        let errors_before = self.diags.error_count();

        let mut extern_decls: Vec<&ExternDecl> = Vec::new();
        let mut func_decls: Vec<&FuncDecl> = Vec::new();
        let mut memory_decls: Vec<&MemoryDecl> = Vec::new();
        let mut tls_decls: Vec<&TlsDecl> = Vec::new();
        let mut config = Config::new();

        for decl in &parsed.decls {
            match decl {
                Decl::Function(d) => func_decls.push(d),
                Decl::Extern(d) => extern_decls.push(d),
                Decl::Memory(d) => memory_decls.push(d),
                Decl::Config(d) => self.merge_config(&mut config, d),
                Decl::Tls(d) => tls_decls.push(d),
            }
        }
        config.apply_defaults();

        let externs = extern_decls
            .iter()
            .enumerate()
            .map(|(i, d)| self.index_extern(i, d))
            .collect::<Vec<_>>();

        let headers = func_decls
            .iter()
            .enumerate()
            .map(|(i, d)| self.index_function(i, d))
            .collect::<Vec<_>>();

        let mut layout = MemoryLayout::new();
        let mut memory = Vec::with_capacity(memory_decls.len());
        for decl in &memory_decls {
            let segment = layout.place(decl, self.diags);
            let label_names = decl.directives.iter().filter_map(|d| match d {
                Directive::Label { name } => Some(name),
                _ => None,
            });
            for (name, label) in label_names.zip(&segment.labels) {
                self.register(name, ModuleRef::Label(label.ptr));
            }
            memory.push(segment);
        }

        let tls = tls_decls
            .iter()
            .enumerate()
            .map(|(i, d)| self.index_tls(i, d))
            .collect::<Vec<_>>();

        let indexed = self.diags.error_count() == errors_before;
        let mut funcs = Vec::with_capacity(func_decls.len());
        for (i, (decl, header)) in func_decls.iter().zip(&headers).enumerate() {
            let func = if indexed {
                self.analyze_function(i, decl, header)?
            } else {
                unanalyzed_function(i, decl, header)
            };
            funcs.push(func);
        }
        if !indexed {
            log::debug!("indexing failed; function bodies were not analyzed");
        }

        let top = layout.top();
        let fixed = config.fixed_memory_size();
        if i64::from(top) > fixed {
            self.error(
                DiagnosticKind::Layout,
                format!("memory blocks end at {top}, beyond the fixed memory size {fixed}"),
                None,
            );
        }

        log::debug!(
            "analyzed {} externs, {} functions, {} memory blocks, {} tls; top = {top}",
            externs.len(),
            funcs.len(),
            memory.len(),
            tls.len()
        );

        Ok(Module {
            config,
            externs,
            funcs,
            tls,
            memory,
            top,
        })
    }

    fn register(&mut self, name: &Ident, target: ModuleRef) {
        if let Err(existing) = self.scope.define(&name.text, target) {
            self.error(
                DiagnosticKind::NameResolution,
                format!(
                    "attempted to redefine `{}`, already declared as a {}",
                    name.text,
                    existing.describe()
                ),
                name.span,
            );
        }
    }

    fn merge_config(&mut self, config: &mut Config, decl: &ConfigDecl) {
        for item in &decl.items {
            let path: Vec<&str> = item.path.iter().map(|p| p.text.as_str()).collect();
            let value = match &item.value {
                RawExpr::ConstI32 { value, .. } => i64::from(*value),
                RawExpr::ConstI64 { value, .. } => *value,
                other => {
                    self.error(
                        DiagnosticKind::Layout,
                        format!("config value for `{}` must be an integer constant", path.join(".")),
                        item.span.or(other.span()),
                    );
                    continue;
                }
            };
            if let Err(e) = config.set(&path, value) {
                self.error(DiagnosticKind::Layout, e.to_string(), item.span);
            }
        }
    }

    fn index_extern(&mut self, index: usize, decl: &ExternDecl) -> Extern {
        let id = ExternId(position(index));
        self.register(&decl.name, ModuleRef::Extern(id));
        let ftype = self
            .resolve_func_type(&decl.ftype)
            .unwrap_or_else(|| FuncType::new(Vec::new(), ValueType::Void));
        self.extern_sigs.push(ftype.clone());
        Extern {
            name: decl.name.text.clone(),
            span: decl.span.or(decl.name.span),
            ftype,
            index: id.0,
        }
    }

    fn index_function<'d>(&mut self, index: usize, decl: &'d FuncDecl) -> FuncHeader<'d> {
        self.register(&decl.name, ModuleRef::Function(FuncId(position(index))));
        let params = decl
            .params
            .iter()
            .map(|p| {
                let what = format!("parameter `{}`", p.name.text);
                let ty = self.value_type(&p.ty, &what).unwrap_or(ValueType::Void);
                (&p.name, ty)
            })
            .collect::<Vec<_>>();
        let ret = self.resolve_type(&decl.return_type).unwrap_or(ValueType::Void);
        self.func_sigs
            .push(FuncType::new(params.iter().map(|(_, t)| *t).collect(), ret));
        FuncHeader { params, ret }
    }

    fn index_tls(&mut self, index: usize, decl: &TlsDecl) -> TlsGlobal {
        let id = TlsId(position(index));
        self.register(&decl.name, ModuleRef::Tls(id));
        let what = format!("thread-local `{}`", decl.name.text);
        let ty = self.value_type(&decl.ty, &what).unwrap_or(ValueType::Void);
        self.tls_types.push(ty);
        TlsGlobal {
            name: decl.name.text.clone(),
            ty,
            index: id.0,
        }
    }

    // ── Types ────────────────────────────────────────────────────────────

    fn resolve_type(&mut self, name: &TypeName) -> Option<ValueType> {
        let ty = ValueType::from_name(&name.text);
        if ty.is_none() {
            self.error(
                DiagnosticKind::NameResolution,
                format!("unknown type name `{}`", name.text),
                name.span,
            );
        }
        ty
    }

    /// A type that values can have, i.e. anything but `void`.
    fn value_type(&mut self, name: &TypeName, what: &str) -> Option<ValueType> {
        match self.resolve_type(name)? {
            ValueType::Void => {
                self.error(
                    DiagnosticKind::TypeMismatch,
                    format!("{what} cannot have type void"),
                    name.span,
                );
                None
            }
            ty => Some(ty),
        }
    }

    fn resolve_func_type(&mut self, decl: &FuncTypeDecl) -> Option<FuncType> {
        let mut params = Vec::with_capacity(decl.params.len());
        let mut ok = true;
        for (i, p) in decl.params.iter().enumerate() {
            match self.value_type(p, &format!("parameter {i}")) {
                Some(ty) => params.push(ty),
                None => ok = false,
            }
        }
        let ret = self.resolve_type(&decl.ret);
        match ret {
            Some(ret) if ok => Some(FuncType::new(params, ret)),
            _ => None,
        }
    }

    fn resolve_mem_type(&mut self, name: &TypeName) -> Option<MemType> {
        let mtype = MemType::from_name(&name.text);
        if mtype.is_none() {
            self.error(
                DiagnosticKind::NameResolution,
                format!("unknown memory type `{}`", name.text),
                name.span,
            );
        }
        mtype
    }

    // ══════════════════════════════════════════════════════════════════════
    // Functions and statements
    // ══════════════════════════════════════════════════════════════════════

    fn analyze_function(
        &mut self,
        index: usize,
        decl: &FuncDecl,
        header: &FuncHeader<'_>,
    ) -> FatalResult<Function> {
        let mut f = FuncState::new(header.ret);
        let mut params = Vec::with_capacity(header.params.len());
        for (name, ty) in &header.params {
            if let Some(id) = self.declare_local(&mut f, name, *ty) {
                params.push(id);
            }
        }

        let body = self.block(&mut f, &decl.body)?;
        log::trace!(
            "analyzed `{}`: {} locals, {} statements",
            decl.name.text,
            f.locals.len(),
            body.len()
        );

        Ok(Function {
            name: decl.name.text.clone(),
            span: decl.span.or(decl.name.span),
            export: decl.export,
            params,
            locals: f.locals,
            return_type: header.ret,
            body,
            index: position(index),
        })
    }

    fn declare_local(&mut self, f: &mut FuncState, name: &Ident, ty: ValueType) -> Option<LocalId> {
        let id = LocalId(position(f.locals.len()));
        if !f.scope.define(&name.text, id) {
            self.error(
                DiagnosticKind::NameResolution,
                format!("attempted to redeclare `{}`", name.text),
                name.span,
            );
            return None;
        }
        f.locals.push(Local {
            name: name.text.clone(),
            ty,
            index: id.0,
            remapped_index: None,
        });
        Some(id)
    }

    fn block(&mut self, f: &mut FuncState, stmts: &[RawStmt]) -> FatalResult<Vec<Stmt>> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            if let Some(stmt) = self.stmt(f, stmt)? {
                out.push(stmt);
            }
        }
        Ok(out)
    }

    /// Analyze one statement. `None` means it failed or produced no code.
    fn stmt(&mut self, f: &mut FuncState, stmt: &RawStmt) -> FatalResult<Option<Stmt>> {
        match stmt {
            // ── Declarations and assignment ──
            RawStmt::VarDecl { name, ty, value } => {
                let what = format!("local `{}`", name.text);
                let local = self
                    .value_type(ty, &what)
                    .and_then(|ty| self.declare_local(f, name, ty));
                let Some(value) = value else {
                    return Ok(None);
                };
                let value = self.expr(f, value)?;
                match (local, value) {
                    (Some(local), Some(value)) => Ok(self.set_local(f, name, local, value)),
                    _ => Ok(None),
                }
            }

            RawStmt::Assign { name, value } => {
                let value = self.expr(f, value)?;
                if let Some(local) = f.scope.lookup(&name.text) {
                    return Ok(value.and_then(|v| self.set_local(f, name, local, v)));
                }
                match self.scope.lookup(&name.text) {
                    Some(ModuleRef::Tls(tls)) => {
                        let Some(value) = value else {
                            return Ok(None);
                        };
                        let ty = self.tls_types[tls.index()];
                        if !self.check_assign(name, ty, &value) {
                            return Ok(None);
                        }
                        Ok(Some(Stmt::SetTls { tls, value }))
                    }
                    Some(other) => {
                        self.error(
                            DiagnosticKind::NameResolution,
                            format!("cannot assign to {} `{}`", other.describe(), name.text),
                            name.span,
                        );
                        Ok(None)
                    }
                    None => {
                        self.error(
                            DiagnosticKind::NameResolution,
                            format!("assigning to unknown name `{}`", name.text),
                            name.span,
                        );
                        Ok(None)
                    }
                }
            }

            RawStmt::Expr { expr } => Ok(self.expr(f, expr)?.map(Stmt::Expr)),

            // ── Control flow ──
            RawStmt::Return { expr, span } => {
                let value = match expr {
                    Some(raw) => match self.expr(f, raw)? {
                        Some(value) => Some(value),
                        None => return Ok(None),
                    },
                    None => None,
                };
                let actual = value.as_ref().map_or(ValueType::Void, |v| v.etype);
                if actual != f.return_type {
                    let span = span.or_else(|| expr.as_ref().and_then(RawExpr::span));
                    self.error(
                        DiagnosticKind::TypeMismatch,
                        format!(
                            "return type mismatch: got {actual}, expected {}",
                            f.return_type
                        ),
                        span,
                    );
                    return Ok(None);
                }
                Ok(Some(Stmt::Return { expr: value }))
            }

            RawStmt::Break { span } => match f.loops.last() {
                Some(depth) => Ok(Some(Stmt::Break { depth: *depth })),
                None => {
                    self.error(DiagnosticKind::ControlFlow, "break outside of a loop", *span);
                    Ok(None)
                }
            },

            RawStmt::If {
                cond,
                then_block,
                else_block,
                span,
            } => {
                let cond = self.condition(f, cond, *span)?;
                if let Some(depth) = f.loops.last_mut() {
                    *depth += 1;
                }
                let then_block = self.block(f, then_block);
                let else_block = match else_block {
                    Some(stmts) => self.block(f, stmts).map(Some),
                    None => Ok(None),
                };
                if let Some(depth) = f.loops.last_mut() {
                    *depth -= 1;
                }
                let (then_block, else_block) = (then_block?, else_block?);
                Ok(cond.map(|cond| Stmt::If {
                    cond,
                    then_block,
                    else_block,
                }))
            }

            RawStmt::While { cond, body, span } => {
                let cond = self.condition(f, cond, *span)?;
                f.loops.push(0);
                let body = self.block(f, body);
                f.loops.pop();
                let body = body?;
                Ok(cond.map(|cond| Stmt::While { cond, body }))
            }
        }
    }

    fn set_local(&mut self, f: &FuncState, name: &Ident, local: LocalId, value: Expr) -> Option<Stmt> {
        let ty = f.local_type(local);
        self.check_assign(name, ty, &value)
            .then_some(Stmt::SetLocal { local, value })
    }

    fn check_assign(&mut self, name: &Ident, ty: ValueType, value: &Expr) -> bool {
        if value.etype == ty {
            return true;
        }
        self.error(
            DiagnosticKind::TypeMismatch,
            format!(
                "cannot assign {} to `{}` of type {ty}",
                value.etype, name.text
            ),
            value.span.or(name.span),
        );
        false
    }

    /// `If`/`While` conditions use the `i32` boolean representation.
    fn condition(
        &mut self,
        f: &mut FuncState,
        cond: &RawExpr,
        span: Option<Span>,
    ) -> FatalResult<Option<Expr>> {
        let Some(cond) = self.expr(f, cond)? else {
            return Ok(None);
        };
        if cond.etype != ValueType::I32 {
            self.error(
                DiagnosticKind::TypeMismatch,
                format!("condition type mismatch: got {}, expected i32", cond.etype),
                span.or(cond.span),
            );
            return Ok(None);
        }
        Ok(Some(cond))
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════

    /// Resolve and type one expression. `None` means an error was reported
    /// somewhere in its subtree.
    fn expr(&mut self, f: &mut FuncState, raw: &RawExpr) -> FatalResult<Option<Expr>> {
        let expr = match raw {
            // ── Constants ──
            RawExpr::ConstI32 { value, .. } => Some(Expr::const_i32(*value)),
            RawExpr::ConstI64 { value, .. } => Some(Expr::const_i64(*value)),
            RawExpr::ConstF32 { value, .. } => Some(Expr::const_f32(*value)),
            RawExpr::ConstF64 { value, .. } => Some(Expr::const_f64(*value)),

            RawExpr::Name(ident) => self.name(f, ident),

            // ── Memory ──
            RawExpr::Load { mtype, address, .. } => {
                let mtype = self.resolve_mem_type(mtype);
                let address = self.address(f, address)?;
                match (mtype, address) {
                    (Some(mtype), Some(address)) => {
                        Some(Expr::load(mtype, address, mtype.value_type()))
                    }
                    _ => None,
                }
            }
            RawExpr::Store {
                mtype,
                address,
                value,
                span,
            } => {
                let mtype = self.resolve_mem_type(mtype);
                let address = self.address(f, address)?;
                let value = self.expr(f, value)?;
                match (mtype, address, value) {
                    (Some(mtype), Some(address), Some(value)) => {
                        if value.etype.storage_class() == Some(mtype.storage_class()) {
                            Some(Expr::store(mtype, address, value))
                        } else {
                            self.error(
                                DiagnosticKind::TypeMismatch,
                                format!("cannot store {} as {mtype}", value.etype),
                                value.span.or(*span),
                            );
                            None
                        }
                    }
                    _ => None,
                }
            }

            RawExpr::Coerce { ty, expr, span } => {
                let target = self.resolve_type(ty);
                let inner = self.expr(f, expr)?;
                match (target, inner) {
                    (Some(target), Some(inner)) => {
                        if target == ValueType::Void || inner.etype == ValueType::Void {
                            self.error(
                                DiagnosticKind::TypeMismatch,
                                format!("cannot coerce {} to {target}", inner.etype),
                                *span,
                            );
                            None
                        } else {
                            Some(Expr::coerce(inner, target))
                        }
                    }
                    _ => None,
                }
            }

            // ── Operators ──
            RawExpr::Prefix { op, expr } => match self.expr(f, expr)? {
                Some(inner) => {
                    let optype = inner.etype;
                    let c = classify_prefix(&op.text, optype).ok_or_else(|| {
                        FatalError::UnsupportedOperation(format!(
                            "prefix `{}` on {optype}",
                            op.text
                        ))
                    })?;
                    Some(Expr::unary(optype, c.op, inner, c.result))
                }
                None => None,
            },
            RawExpr::Infix { left, op, right } => self.infix(f, left, op, right)?,

            // ── Calls ──
            RawExpr::Call { callee, args } => self.call(f, callee, args, raw.span())?,
            RawExpr::CallIndirect {
                ftype,
                callee,
                args,
                span,
            } => {
                let ftype = self.resolve_func_type(ftype);
                let callee = self.expr(f, callee)?;
                let args = self.args(f, args)?;
                match (ftype, callee, args) {
                    (Some(ftype), Some(callee), Some(args)) => {
                        if callee.etype != ValueType::I32 {
                            self.error(
                                DiagnosticKind::TypeMismatch,
                                format!(
                                    "indirect callee type mismatch: got {}, expected i32",
                                    callee.etype
                                ),
                                callee.span.or(*span),
                            );
                            None
                        } else if self.check_args("indirect call", &ftype.params, &args, *span) {
                            Some(Expr::call_indirect(ftype, callee, args))
                        } else {
                            None
                        }
                    }
                    _ => None,
                }
            }
        };
        Ok(expr.map(|e| e.with_span(raw.span())))
    }

    fn name(&mut self, f: &FuncState, ident: &Ident) -> Option<Expr> {
        if let Some(local) = f.scope.lookup(&ident.text) {
            return Some(Expr::get_local(local, f.local_type(local)));
        }
        match self.scope.lookup(&ident.text) {
            Some(ModuleRef::Function(id)) => Some(Expr::get_function(id)),
            Some(ModuleRef::Extern(id)) => Some(Expr::get_extern(id)),
            Some(ModuleRef::Tls(id)) => Some(Expr::get_tls(id, self.tls_types[id.index()])),
            // Addresses are carried as i32 bit patterns.
            Some(ModuleRef::Label(ptr)) => Some(Expr::const_i32(ptr as i32)),
            None => {
                self.error(
                    DiagnosticKind::NameResolution,
                    format!("cannot resolve name `{}`", ident.text),
                    ident.span,
                );
                None
            }
        }
    }

    fn address(&mut self, f: &mut FuncState, raw: &RawExpr) -> FatalResult<Option<Expr>> {
        let Some(address) = self.expr(f, raw)? else {
            return Ok(None);
        };
        if address.etype != ValueType::I32 {
            self.error(
                DiagnosticKind::TypeMismatch,
                format!("address type mismatch: got {}, expected i32", address.etype),
                address.span,
            );
            return Ok(None);
        }
        Ok(Some(address))
    }

    fn infix(
        &mut self,
        f: &mut FuncState,
        left: &RawExpr,
        op: &Ident,
        right: &RawExpr,
    ) -> FatalResult<Option<Expr>> {
        let left = self.expr(f, left)?;
        let right = self.expr(f, right)?;
        let (Some(left), Some(right)) = (left, right) else {
            return Ok(None);
        };
        let optype = left.etype;
        if optype != right.etype {
            self.error(
                DiagnosticKind::TypeMismatch,
                format!(
                    "binary operator `{}` applied to {optype} and {}",
                    op.text, right.etype
                ),
                op.span.or(left.span),
            );
            return Ok(None);
        }
        let c = classify_infix(&op.text, optype).ok_or_else(|| {
            FatalError::UnsupportedOperation(format!("binary `{}` on {optype}", op.text))
        })?;
        Ok(Some(Expr::binary(optype, c.op, left, right, c.result)))
    }

    fn args(&mut self, f: &mut FuncState, args: &[RawExpr]) -> FatalResult<Option<Vec<Expr>>> {
        let mut out = Vec::with_capacity(args.len());
        let mut ok = true;
        for arg in args {
            match self.expr(f, arg)? {
                Some(arg) => out.push(arg),
                None => ok = false,
            }
        }
        Ok(ok.then_some(out))
    }

    fn call(
        &mut self,
        f: &mut FuncState,
        callee: &RawExpr,
        args: &[RawExpr],
        span: Option<Span>,
    ) -> FatalResult<Option<Expr>> {
        let what = match callee {
            RawExpr::Name(ident) => {
                let unbound = f.scope.lookup(&ident.text).is_none()
                    && self.scope.lookup(&ident.text).is_none();
                if unbound {
                    if let Some(intrinsic) = classify_intrinsic(&ident.text) {
                        return self.intrinsic(f, ident, intrinsic, args, span);
                    }
                }
                format!("`{}`", ident.text)
            }
            _ => "callee".to_string(),
        };

        let target = self.expr(f, callee)?;
        let args = self.args(f, args)?;
        let (Some(target), Some(args)) = (target, args) else {
            return Ok(None);
        };

        match target.kind {
            ExprKind::GetFunction(id) => {
                let sig = self.func_sigs[id.index()].clone();
                Ok(self
                    .check_args(&what, &sig.params, &args, span)
                    .then(|| Expr::call_direct(id, args, sig.ret)))
            }
            ExprKind::GetExtern(id) => {
                let sig = self.extern_sigs[id.index()].clone();
                Ok(self
                    .check_args(&what, &sig.params, &args, span)
                    .then(|| Expr::call_external(id, args, sig.ret)))
            }
            _ => {
                self.error(
                    DiagnosticKind::TypeMismatch,
                    format!(
                        "{what} of type {} is not callable; use callIndirect",
                        target.etype
                    ),
                    span,
                );
                Ok(None)
            }
        }
    }

    fn intrinsic(
        &mut self,
        f: &mut FuncState,
        ident: &Ident,
        intrinsic: Intrinsic,
        args: &[RawExpr],
        span: Option<Span>,
    ) -> FatalResult<Option<Expr>> {
        let Some(args) = self.args(f, args)? else {
            return Ok(None);
        };
        let params = vec![intrinsic.optype; intrinsic.arity()];
        if !self.check_args(&format!("`{}`", ident.text), &params, &args, span) {
            return Ok(None);
        }
        let optype = intrinsic.optype;
        let mut args = args.into_iter();
        let expr = match (intrinsic.kind, args.next(), args.next()) {
            (IntrinsicKind::Unary(op), Some(x), None) => {
                Expr::unary(optype, op, x, intrinsic.result())
            }
            (IntrinsicKind::Binary(op), Some(l), Some(r)) => {
                Expr::binary(optype, op, l, r, intrinsic.result())
            }
            _ => {
                return Err(FatalError::MalformedAst(format!(
                    "intrinsic `{}` built with the wrong arity",
                    ident.text
                )))
            }
        };
        Ok(Some(expr))
    }

    /// Exact arity, then exact per-argument type equality.
    fn check_args(
        &mut self,
        what: &str,
        params: &[ValueType],
        args: &[Expr],
        span: Option<Span>,
    ) -> bool {
        if args.len() != params.len() {
            self.error(
                DiagnosticKind::Arity,
                format!(
                    "argument count mismatch calling {what}: got {}, expected {}",
                    args.len(),
                    params.len()
                ),
                span,
            );
            return false;
        }
        let mut ok = true;
        for (i, (arg, expected)) in args.iter().zip(params).enumerate() {
            if arg.etype != *expected {
                self.error(
                    DiagnosticKind::TypeMismatch,
                    format!(
                        "argument {i} of {what}: got {}, expected {expected}",
                        arg.etype
                    ),
                    arg.span.or(span),
                );
                ok = false;
            }
        }
        ok
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

/// Position in a declaration list, as stored in the AST.
fn position(i: usize) -> u32 {
    // Lists this long cannot be encoded anyway; the encoder range-checks.
    u32::try_from(i).unwrap_or(u32::MAX)
}

/// A function whose body was skipped because indexing failed.
fn unanalyzed_function(index: usize, decl: &FuncDecl, header: &FuncHeader<'_>) -> Function {
    let locals: Vec<Local> = header
        .params
        .iter()
        .enumerate()
        .map(|(i, (name, ty))| Local {
            name: name.text.clone(),
            ty: *ty,
            index: position(i),
            remapped_index: None,
        })
        .collect();
    Function {
        name: decl.name.text.clone(),
        span: decl.span.or(decl.name.span),
        export: decl.export,
        params: (0..locals.len()).map(|i| LocalId(position(i))).collect(),
        locals,
        return_type: header.ret,
        body: Vec::new(),
        index: position(index),
    }
}
