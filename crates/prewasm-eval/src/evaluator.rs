//! Core expression and statement evaluator.

use prewasm_types::ast::{Expr, ExprKind, FuncId, Function, Module, Stmt};
use prewasm_types::ops::{BinaryOp, UnaryOp};
use prewasm_types::{FuncType, ValueType};

use crate::error::{EvalError, EvalResult};
use crate::frame::Frame;
use crate::memory::Memory;
use crate::value::Value;

/// Steps allowed before [`EvalError::GasExhausted`].
pub const DEFAULT_GAS_LIMIT: u64 = 10_000_000;

/// Deepest permitted call nesting.
pub const MAX_CALL_DEPTH: usize = 64;

/// Implements extern functions.
pub trait Host {
    fn call_extern(&mut self, name: &str, args: &[Value]) -> EvalResult<Value>;
}

/// A host with no externs; every extern call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHost;

impl Host for NoHost {
    fn call_extern(&mut self, name: &str, _args: &[Value]) -> EvalResult<Value> {
        Err(EvalError::Host(format!("no host binding for extern `{name}`")))
    }
}

impl<F> Host for F
where
    F: FnMut(&str, &[Value]) -> EvalResult<Value>,
{
    fn call_extern(&mut self, name: &str, args: &[Value]) -> EvalResult<Value> {
        self(name, args)
    }
}

/// How a statement or block finished.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Flow {
    Normal,
    /// Leave `n` more enclosing blocks.
    Break(u32),
    Return(Value),
}

/// Leaving a block consumes one level of a pending break.
fn exit_block(flow: Flow) -> Flow {
    match flow {
        Flow::Break(0) => Flow::Normal,
        Flow::Break(n) => Flow::Break(n - 1),
        other => other,
    }
}

/// Walks a module's AST and produces values.
pub struct Evaluator<'m, H: Host = NoHost> {
    module: &'m Module,
    memory: Memory,
    tls: Vec<Value>,
    host: H,
    /// Steps taken so far.
    pub gas: u64,
    pub gas_limit: u64,
    depth: usize,
}

impl<'m> Evaluator<'m, NoHost> {
    pub fn new(module: &'m Module) -> EvalResult<Self> {
        Self::with_host(module, NoHost)
    }
}

impl<'m, H: Host> Evaluator<'m, H> {
    pub fn with_host(module: &'m Module, host: H) -> EvalResult<Self> {
        Ok(Self {
            module,
            memory: Memory::from_module(module)?,
            tls: module.tls.iter().map(|t| Value::zero(t.ty)).collect(),
            host,
            gas: 0,
            gas_limit: DEFAULT_GAS_LIMIT,
            depth: 0,
        })
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    fn tick(&mut self) -> EvalResult<()> {
        self.gas += 1;
        if self.gas > self.gas_limit {
            Err(EvalError::GasExhausted)
        } else {
            Ok(())
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Calls
    // ══════════════════════════════════════════════════════════════════════

    /// Call the function named `name`.
    pub fn call(&mut self, name: &str, args: &[Value]) -> EvalResult<Value> {
        let id = self
            .module
            .find_func(name)
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;
        self.call_func(id, args)
    }

    pub fn call_func(&mut self, id: FuncId, args: &[Value]) -> EvalResult<Value> {
        let module = self.module;
        let func = module
            .func(id)
            .ok_or_else(|| EvalError::UnknownFunction(id.to_string()))?;
        if self.depth >= MAX_CALL_DEPTH {
            return Err(EvalError::StackOverflow);
        }
        log::trace!("call `{}` with {} argument(s)", func.name, args.len());

        let mut frame = Frame::new(func, args)?;
        self.depth += 1;
        let flow = self.eval_block(&mut frame, &func.body);
        self.depth -= 1;
        finish_call(func, flow?)
    }

    fn call_extern(&mut self, index: usize, args: &[Value]) -> EvalResult<Value> {
        let module = self.module;
        let ext = module
            .externs
            .get(index)
            .ok_or_else(|| EvalError::UnknownFunction(format!("extern#{index}")))?;
        check_args(&ext.name, &ext.ftype, args)?;
        let result = self.host.call_extern(&ext.name, args)?;
        if !result.fits(ext.ftype.ret) {
            return Err(EvalError::TypeMismatch(format!(
                "extern `{}` returned {}, expected {}",
                ext.name,
                result.ty(),
                ext.ftype.ret
            )));
        }
        Ok(result)
    }

    /// Resolve a uid in the shared extern-then-function space.
    fn call_uid(&mut self, uid: i32, ftype: &FuncType, args: &[Value]) -> EvalResult<Value> {
        let module = self.module;
        let uid = usize::try_from(uid)
            .map_err(|_| EvalError::UnknownFunction(format!("uid {uid}")))?;
        let (name, signature) = match uid.checked_sub(module.externs.len()) {
            None => (&module.externs[uid].name, module.externs[uid].ftype.clone()),
            Some(index) => {
                let func = module
                    .funcs
                    .get(index)
                    .ok_or_else(|| EvalError::UnknownFunction(format!("uid {uid}")))?;
                (&func.name, func.signature())
            }
        };
        if signature.simplified() != ftype.simplified() {
            return Err(EvalError::TypeMismatch(format!(
                "indirect call expects {ftype}, `{name}` is {signature}"
            )));
        }
        match uid.checked_sub(module.externs.len()) {
            None => self.call_extern(uid, args),
            Some(index) => self.call_func(FuncId(index as u32), args),
        }
    }

    fn eval_args(&mut self, frame: &mut Frame, args: &[Expr]) -> EvalResult<Vec<Value>> {
        args.iter().map(|arg| self.eval_expr(frame, arg)).collect()
    }

    // ══════════════════════════════════════════════════════════════════════
    // Statements
    // ══════════════════════════════════════════════════════════════════════

    fn eval_block(&mut self, frame: &mut Frame, block: &[Stmt]) -> EvalResult<Flow> {
        for stmt in block {
            match self.eval_stmt(frame, stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn eval_stmt(&mut self, frame: &mut Frame, stmt: &Stmt) -> EvalResult<Flow> {
        self.tick()?;
        match stmt {
            Stmt::Expr(expr) => {
                self.eval_expr(frame, expr)?;
                Ok(Flow::Normal)
            }
            Stmt::SetLocal { local, value } => {
                let value = self.eval_expr(frame, value)?;
                frame.set(*local, value)?;
                Ok(Flow::Normal)
            }
            Stmt::SetTls { tls, value } => {
                let value = self.eval_expr(frame, value)?;
                let slot = self
                    .tls
                    .get_mut(tls.index())
                    .ok_or_else(|| EvalError::Malformed(format!("no {tls}")))?;
                *slot = value;
                Ok(Flow::Normal)
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                let taken = !self.eval_expr(frame, cond)?.is_zero();
                let flow = match (taken, else_block) {
                    (true, _) => self.eval_block(frame, then_block)?,
                    (false, Some(else_block)) => self.eval_block(frame, else_block)?,
                    (false, None) => Flow::Normal,
                };
                Ok(exit_block(flow))
            }
            Stmt::While { cond, body } => loop {
                if self.eval_expr(frame, cond)?.is_zero() {
                    return Ok(Flow::Normal);
                }
                match self.eval_block(frame, body)? {
                    Flow::Normal => {}
                    flow => return Ok(exit_block(flow)),
                }
            },
            Stmt::Loop { body } => loop {
                match self.eval_block(frame, body)? {
                    Flow::Normal => self.tick()?,
                    flow => return Ok(exit_block(flow)),
                }
            },
            Stmt::Break { depth } => Ok(Flow::Break(*depth)),
            Stmt::Return { expr } => {
                let value = match expr {
                    Some(expr) => self.eval_expr(frame, expr)?,
                    None => Value::Void,
                };
                Ok(Flow::Return(value))
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════

    pub fn eval_expr(&mut self, frame: &mut Frame, expr: &Expr) -> EvalResult<Value> {
        self.tick()?;
        match &expr.kind {
            ExprKind::ConstI32(v) => Ok(Value::I32(*v)),
            ExprKind::ConstI64(v) => Ok(Value::I64(*v)),
            ExprKind::ConstF32(v) => Ok(Value::F32(*v)),
            ExprKind::ConstF64(v) => Ok(Value::F64(*v)),
            ExprKind::GetLocal(id) => frame.get(*id),
            ExprKind::GetTls(id) => self
                .tls
                .get(id.index())
                .copied()
                .ok_or_else(|| EvalError::Malformed(format!("no {id}"))),
            ExprKind::GetFunction(id) => Ok(Value::I32(
                (self.module.externs.len() + id.index()) as i32,
            )),
            ExprKind::GetExtern(id) => Ok(Value::I32(id.index() as i32)),

            // ── Memory ──────────────────────────────────────────────────
            ExprKind::Load { mtype, address } => {
                let address = self.eval_address(frame, address)?;
                self.memory.load(*mtype, address)
            }
            ExprKind::Store {
                mtype,
                address,
                value,
            } => {
                let address = self.eval_address(frame, address)?;
                let value = self.eval_expr(frame, value)?;
                self.memory.store(*mtype, address, value)?;
                Ok(Value::Void)
            }

            // ── Operators ───────────────────────────────────────────────
            ExprKind::UnaryOp { op, expr, .. } => {
                let value = self.eval_expr(frame, expr)?;
                unary(*op, value)
            }
            ExprKind::BinaryOp {
                op, left, right, ..
            } => {
                let left = self.eval_expr(frame, left)?;
                let right = self.eval_expr(frame, right)?;
                binary(*op, left, right)
            }
            ExprKind::Coerce { expr: inner } => {
                let value = self.eval_expr(frame, inner)?;
                convert(value, expr.etype)
            }

            // ── Calls ───────────────────────────────────────────────────
            ExprKind::CallDirect { func, args } => {
                let args = self.eval_args(frame, args)?;
                self.call_func(*func, &args)
            }
            ExprKind::CallExternal { func, args } => {
                let args = self.eval_args(frame, args)?;
                self.call_extern(func.index(), &args)
            }
            ExprKind::CallIndirect {
                ftype,
                callee,
                args,
            } => {
                let uid = self.eval_expr(frame, callee)?.as_i32()?;
                let args = self.eval_args(frame, args)?;
                self.call_uid(uid, ftype, &args)
            }
        }
    }

    fn eval_address(&mut self, frame: &mut Frame, address: &Expr) -> EvalResult<u32> {
        Ok(self.eval_expr(frame, address)?.as_i32()? as u32)
    }
}

fn finish_call(func: &Function, flow: Flow) -> EvalResult<Value> {
    let value = match flow {
        Flow::Return(value) => value,
        Flow::Normal if func.return_type == ValueType::Void => Value::Void,
        Flow::Normal => return Err(EvalError::MissingReturn(func.name.clone())),
        Flow::Break(depth) => {
            return Err(EvalError::Malformed(format!(
                "break escapes the body of `{}` with {depth} level(s) left",
                func.name
            )))
        }
    };
    if !value.fits(func.return_type) {
        return Err(EvalError::TypeMismatch(format!(
            "`{}` returned {}, declared {}",
            func.name,
            value.ty(),
            func.return_type
        )));
    }
    Ok(value)
}

fn check_args(name: &str, ftype: &FuncType, args: &[Value]) -> EvalResult<()> {
    let matches = args.len() == ftype.params.len()
        && args.iter().zip(&ftype.params).all(|(arg, ty)| arg.fits(*ty));
    if matches {
        Ok(())
    } else {
        Err(EvalError::TypeMismatch(format!(
            "`{name}` is {ftype}, called with {} argument(s)",
            args.len()
        )))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Operators
// ══════════════════════════════════════════════════════════════════════════════

fn unary(op: UnaryOp, value: Value) -> EvalResult<Value> {
    Ok(match (op, value) {
        (UnaryOp::BoolNot, v) if v != Value::Void => Value::I32(v.is_zero() as i32),
        (UnaryOp::Neg, Value::I32(v)) => Value::I32(v.wrapping_neg()),
        (UnaryOp::Neg, Value::I64(v)) => Value::I64(v.wrapping_neg()),
        (UnaryOp::Neg, Value::F32(v)) => Value::F32(-v),
        (UnaryOp::Neg, Value::F64(v)) => Value::F64(-v),
        (UnaryOp::Sqrt, Value::F32(v)) => Value::F32(v.sqrt()),
        (UnaryOp::Sqrt, Value::F64(v)) => Value::F64(v.sqrt()),
        (op, v) => return Err(unsupported(op.name(), v.ty())),
    })
}

fn binary(op: BinaryOp, left: Value, right: Value) -> EvalResult<Value> {
    match (left, right) {
        (Value::I32(a), Value::I32(b)) => binary_i32(op, a, b),
        (Value::I64(a), Value::I64(b)) => binary_i64(op, a, b),
        (Value::F32(a), Value::F32(b)) => binary_f32(op, a, b),
        (Value::F64(a), Value::F64(b)) => binary_f64(op, a, b),
        (l, r) => Err(EvalError::TypeMismatch(format!(
            "`{}` applied to {} and {}",
            op.name(),
            l.ty(),
            r.ty()
        ))),
    }
}

fn compare<T: PartialOrd>(op: BinaryOp, a: T, b: T) -> Option<Value> {
    let result = match op {
        BinaryOp::Eq => a == b,
        BinaryOp::Ne => a != b,
        BinaryOp::Lt => a < b,
        BinaryOp::Le => a <= b,
        BinaryOp::Gt => a > b,
        BinaryOp::Ge => a >= b,
        _ => return None,
    };
    Some(Value::I32(result as i32))
}

macro_rules! int_binary {
    ($name:ident, $int:ty, $uint:ty, $wrap:path) => {
        fn $name(op: BinaryOp, a: $int, b: $int) -> EvalResult<Value> {
            let value = match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Sub => a.wrapping_sub(b),
                BinaryOp::Mul => a.wrapping_mul(b),
                BinaryOp::Div if b == 0 => return Err(divide_by_zero()),
                BinaryOp::Div => a
                    .checked_div(b)
                    .ok_or_else(|| EvalError::Trap("integer overflow".into()))?,
                BinaryOp::Rem if b == 0 => return Err(divide_by_zero()),
                BinaryOp::Rem => a.wrapping_rem(b),
                BinaryOp::And => a & b,
                BinaryOp::Or => a | b,
                BinaryOp::Xor => a ^ b,
                BinaryOp::Shl => a.wrapping_shl(b as u32),
                BinaryOp::Shr => a.wrapping_shr(b as u32),
                BinaryOp::ShrU => (a as $uint).wrapping_shr(b as u32) as $int,
                BinaryOp::Min => a.min(b),
                BinaryOp::Max => a.max(b),
                _ => {
                    return compare(op, a, b)
                        .ok_or_else(|| unsupported(op.name(), <$int>::value_type()))
                }
            };
            Ok($wrap(value))
        }
    };
}

macro_rules! float_binary {
    ($name:ident, $float:ty, $wrap:path) => {
        fn $name(op: BinaryOp, a: $float, b: $float) -> EvalResult<Value> {
            let value = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Min => a.min(b),
                BinaryOp::Max => a.max(b),
                _ => {
                    return compare(op, a, b)
                        .ok_or_else(|| unsupported(op.name(), <$float>::value_type()))
                }
            };
            Ok($wrap(value))
        }
    };
}

/// Maps a Rust numeric type to the value type it represents.
trait NumericType {
    fn value_type() -> ValueType;
}

impl NumericType for i32 {
    fn value_type() -> ValueType {
        ValueType::I32
    }
}

impl NumericType for i64 {
    fn value_type() -> ValueType {
        ValueType::I64
    }
}

impl NumericType for f32 {
    fn value_type() -> ValueType {
        ValueType::F32
    }
}

impl NumericType for f64 {
    fn value_type() -> ValueType {
        ValueType::F64
    }
}

int_binary!(binary_i32, i32, u32, Value::I32);
int_binary!(binary_i64, i64, u64, Value::I64);
float_binary!(binary_f32, f32, Value::F32);
float_binary!(binary_f64, f64, Value::F64);

fn divide_by_zero() -> EvalError {
    EvalError::Trap("integer divide by zero".into())
}

fn unsupported(op: &str, ty: ValueType) -> EvalError {
    EvalError::TypeMismatch(format!("`{op}` is not defined on {ty}"))
}

/// Convert between value types. Float to integer conversion saturates.
fn convert(value: Value, target: ValueType) -> EvalResult<Value> {
    if let Some(shift) = target.narrow_shift() {
        let word = convert(value, ValueType::I32)?.as_i32()?;
        return Ok(Value::I32(word.wrapping_shl(shift as u32) >> shift));
    }
    Ok(match (value, target) {
        (v, t) if v.ty() == t => v,
        (Value::I32(v), ValueType::I64) => Value::I64(v as i64),
        (Value::I32(v), ValueType::F32) => Value::F32(v as f32),
        (Value::I32(v), ValueType::F64) => Value::F64(v as f64),
        (Value::I64(v), ValueType::I32) => Value::I32(v as i32),
        (Value::I64(v), ValueType::F32) => Value::F32(v as f32),
        (Value::I64(v), ValueType::F64) => Value::F64(v as f64),
        (Value::F32(v), ValueType::I32) => Value::I32(v as i32),
        (Value::F32(v), ValueType::I64) => Value::I64(v as i64),
        (Value::F32(v), ValueType::F64) => Value::F64(v as f64),
        (Value::F64(v), ValueType::I32) => Value::I32(v as i32),
        (Value::F64(v), ValueType::I64) => Value::I64(v as i64),
        (Value::F64(v), ValueType::F32) => Value::F32(v as f32),
        (v, t) => {
            return Err(EvalError::TypeMismatch(format!(
                "cannot convert {} to {t}",
                v.ty()
            )))
        }
    })
}
