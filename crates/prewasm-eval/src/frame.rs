//! Per-call local storage.

use prewasm_types::ast::{Function, LocalId};

use crate::error::{EvalError, EvalResult};
use crate::value::Value;

/// The locals of one active call, indexed by [`LocalId`].
///
/// Parameters occupy the first slots; every other local starts at zero.
#[derive(Debug, Clone)]
pub struct Frame {
    locals: Vec<Value>,
}

impl Frame {
    /// Bind `args` to the parameters of `func`.
    pub fn new(func: &Function, args: &[Value]) -> EvalResult<Self> {
        if args.len() != func.params.len() {
            return Err(EvalError::TypeMismatch(format!(
                "`{}` expects {} argument(s), got {}",
                func.name,
                func.params.len(),
                args.len()
            )));
        }
        let mut locals: Vec<Value> = func.locals.iter().map(|l| Value::zero(l.ty)).collect();
        for (slot, (local, arg)) in locals.iter_mut().zip(func.locals.iter().zip(args)) {
            if !arg.fits(local.ty) {
                return Err(EvalError::TypeMismatch(format!(
                    "argument `{}` of `{}` is {}, got {}",
                    local.name,
                    func.name,
                    local.ty,
                    arg.ty()
                )));
            }
            *slot = *arg;
        }
        Ok(Self { locals })
    }

    pub fn get(&self, id: LocalId) -> EvalResult<Value> {
        self.locals
            .get(id.index())
            .copied()
            .ok_or_else(|| EvalError::Malformed(format!("no {id} in frame")))
    }

    pub fn set(&mut self, id: LocalId, value: Value) -> EvalResult<()> {
        let slot = self
            .locals
            .get_mut(id.index())
            .ok_or_else(|| EvalError::Malformed(format!("no {id} in frame")))?;
        if slot.ty() != value.ty() {
            return Err(EvalError::TypeMismatch(format!(
                "{id} holds {}, assigned {}",
                slot.ty(),
                value.ty()
            )));
        }
        *slot = value;
        Ok(())
    }
}
