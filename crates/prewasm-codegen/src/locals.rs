//! Per-storage-class local layout.
//!
//! The interpreter keeps one backing array per storage class. Parameters
//! keep their positions at the front; the remaining locals follow in four
//! runs (i32, i64, f32, f64) numbered by a single running counter, so the
//! remapped indices of a function are exactly `0..locals.len()`.

use prewasm_types::ast::Function;
use prewasm_types::StorageClass;

use crate::error::{CodegenError, CodegenResult};
use crate::writer::{fit_u16, fit_u8};

/// Non-parameter local counts per storage class, in record order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalLayout {
    pub i32_count: u16,
    pub i64_count: u16,
    pub f32_count: u16,
    pub f64_count: u16,
}

impl LocalLayout {
    pub fn counts(&self) -> [u16; 4] {
        [self.i32_count, self.i64_count, self.f32_count, self.f64_count]
    }

    pub fn total(&self) -> usize {
        self.counts().iter().map(|c| usize::from(*c)).sum()
    }
}

/// Assign `remapped_index` to every local of `func`.
pub fn remap_locals(func: &mut Function) -> CodegenResult<LocalLayout> {
    let param_count = func.params.len();
    let mut buckets: [Vec<usize>; 4] = Default::default();

    for (i, local) in func.locals.iter().enumerate().skip(param_count) {
        let class = local.ty.storage_class().ok_or_else(|| {
            CodegenError::Internal(format!(
                "local `{}` in `{}` has type {}",
                local.name, func.name, local.ty
            ))
        })?;
        let slot = match class {
            StorageClass::I32 => 0,
            StorageClass::I64 => 1,
            StorageClass::F32 => 2,
            StorageClass::F64 => 3,
        };
        buckets[slot].push(i);
    }

    let mut next = 0usize;
    for local in func.locals.iter_mut().take(param_count) {
        local.remapped_index = Some(u32::from(fit_u8("local index", next)?));
        next += 1;
    }
    for bucket in &buckets {
        for &i in bucket {
            func.locals[i].remapped_index = Some(u32::from(fit_u8("local index", next)?));
            next += 1;
        }
    }

    let layout = LocalLayout {
        i32_count: fit_u16("i32 local count", buckets[0].len())?,
        i64_count: fit_u16("i64 local count", buckets[1].len())?,
        f32_count: fit_u16("f32 local count", buckets[2].len())?,
        f64_count: fit_u16("f64 local count", buckets[3].len())?,
    };
    log::trace!(
        "locals of `{}`: {} params, layout {:?}",
        func.name,
        param_count,
        layout.counts()
    );
    Ok(layout)
}
