//! Binary module assembler.
//!
//! Stream layout:
//! 1. Header
//! 2. Extern records, then function records (one shared uid space)
//! 3. Memory segment records
//! 4. Function bodies, backpatching each record's begin/end offsets
//! 5. Memory segment data, backpatching each segment's data offset
//! 6. Name string table, backpatching every name reference

use prewasm_types::ast::{ExternId, FuncId, Function, LocalId, Module};
use prewasm_types::ValueType;

use crate::error::{CodegenError, CodegenResult};
use crate::locals::{remap_locals, LocalLayout};
use crate::opcodes::type_code;
use crate::source_map::{RecordKind, SourceMap, SourceMapEntry};
use crate::stmt::emit_block;
use crate::strings::StringTable;
use crate::writer::{fit_u16, fit_u32, fit_u8, BinaryWriter, Placeholder};

// ══════════════════════════════════════════════════════════════════════════════
// Public API
// ══════════════════════════════════════════════════════════════════════════════

/// Encode a pruned, lowered module.
///
/// Assigns every local its `remapped_index` as a side effect.
pub fn compile(module: &mut Module) -> CodegenResult<Vec<u8>> {
    compile_with_source_map(module).map(|(bytes, _)| bytes)
}

/// Encode a module and report where each record ended up.
pub fn compile_with_source_map(module: &mut Module) -> CodegenResult<(Vec<u8>, SourceMap)> {
    let layouts = module
        .funcs
        .iter_mut()
        .map(remap_locals)
        .collect::<CodegenResult<Vec<_>>>()?;

    let mut compiler = Compiler::new(module, layouts);
    compiler.compile()?;
    let Compiler {
        writer, source_map, ..
    } = compiler;
    let bytes = writer.into_bytes();
    log::debug!(
        "encoded {} externs, {} functions, {} segments into {} bytes",
        module.externs.len(),
        module.funcs.len(),
        module.memory.len(),
        bytes.len()
    );
    Ok((bytes, source_map))
}

/// Address-space size in bits: `ceil(log2(fixed))`.
pub fn address_bits(fixed_memory: i64) -> CodegenResult<u8> {
    if fixed_memory <= 0 {
        return Err(CodegenError::range(
            "memory.fixed",
            fixed_memory.into(),
            1,
            i64::MAX.into(),
        ));
    }
    let bits = 64 - (fixed_memory as u64 - 1).leading_zeros();
    fit_u8("address bits", bits as usize)
}

/// `u8 argc, u8 ret, u8 param*`
pub(crate) fn emit_signature(
    w: &mut BinaryWriter,
    params: &[ValueType],
    ret: ValueType,
) -> CodegenResult<()> {
    w.u8(fit_u8("argument count", params.len())?);
    w.u8(type_code(ret)?);
    for p in params {
        w.u8(type_code(*p)?);
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Function context
// ══════════════════════════════════════════════════════════════════════════════

/// What body emission needs to know about the enclosing module and function.
pub struct FuncContext {
    /// Function name, for error messages.
    pub name: String,
    extern_count: usize,
    func_count: usize,
    /// Remapped index per local, indexed by [`LocalId`].
    locals: Vec<u8>,
}

impl FuncContext {
    fn new(module: &Module, func: &Function) -> CodegenResult<Self> {
        let locals = func
            .locals
            .iter()
            .map(|l| {
                let index = l.remapped_index.ok_or_else(|| {
                    CodegenError::Internal(format!("local `{}` was never remapped", l.name))
                })?;
                fit_u8("local index", index as usize)
            })
            .collect::<CodegenResult<Vec<_>>>()?;
        Ok(Self {
            name: func.name.clone(),
            extern_count: module.externs.len(),
            func_count: module.funcs.len(),
            locals,
        })
    }

    pub fn local_index(&self, id: LocalId) -> CodegenResult<u8> {
        self.locals.get(id.index()).copied().ok_or_else(|| {
            CodegenError::Internal(format!("{id} out of range in `{}`", self.name))
        })
    }

    pub fn extern_uid(&self, id: ExternId) -> CodegenResult<u8> {
        if id.index() >= self.extern_count {
            return Err(CodegenError::Internal(format!(
                "{id} out of range in `{}`",
                self.name
            )));
        }
        fit_u8("uid", id.index())
    }

    pub fn func_uid(&self, id: FuncId) -> CodegenResult<u8> {
        if id.index() >= self.func_count {
            return Err(CodegenError::Internal(format!(
                "{id} out of range in `{}`",
                self.name
            )));
        }
        fit_u8("uid", self.extern_count + id.index())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Compiler
// ══════════════════════════════════════════════════════════════════════════════

struct Compiler<'a> {
    module: &'a Module,
    layouts: Vec<LocalLayout>,
    writer: BinaryWriter,
    strings: StringTable,
    source_map: SourceMap,
}

/// Backpatch slots of one function record.
struct BodySlots {
    begin: Placeholder,
    end: Placeholder,
}

impl<'a> Compiler<'a> {
    fn new(module: &'a Module, layouts: Vec<LocalLayout>) -> Self {
        Self {
            module,
            layouts,
            writer: BinaryWriter::new(),
            strings: StringTable::new(),
            source_map: SourceMap::new(),
        }
    }

    fn compile(&mut self) -> CodegenResult<()> {
        self.emit_header()?;
        self.emit_extern_records()?;
        let bodies = self.emit_function_records()?;
        let data = self.emit_segment_records()?;
        self.emit_bodies(bodies)?;
        self.emit_segment_data(data)?;
        std::mem::take(&mut self.strings).emit(&mut self.writer)
    }

    // ── Header ───────────────────────────────────────────────────────────

    fn emit_header(&mut self) -> CodegenResult<()> {
        let module = self.module;
        let bits = address_bits(module.config.fixed_memory_size())?;
        let records = fit_u16("record count", module.externs.len() + module.funcs.len())?;
        let segments = fit_u16("memory segment count", module.memory.len())?;

        let w = &mut self.writer;
        w.u8(bits);
        w.u8(0); // memory is not exported
        w.u16(0); // no globals
        w.u16(records);
        w.u16(segments);
        Ok(())
    }

    // ── Records ──────────────────────────────────────────────────────────

    fn emit_extern_records(&mut self) -> CodegenResult<()> {
        for (uid, ext) in self.module.externs.iter().enumerate() {
            let w = &mut self.writer;
            emit_signature(w, &ext.ftype.params, ext.ftype.ret)?;
            self.strings.reference(w, &ext.name);
            w.u32(0);
            w.u32(0);
            for _ in 0..4 {
                w.u16(0);
            }
            w.u8(0);
            w.u8(1); // extern
            self.source_map.push(SourceMapEntry {
                uid: fit_u32("uid", uid)?,
                name: ext.name.clone(),
                kind: RecordKind::Extern,
                span: ext.span,
                body_begin: 0,
                body_end: 0,
            });
        }
        Ok(())
    }

    fn emit_function_records(&mut self) -> CodegenResult<Vec<BodySlots>> {
        let mut slots = Vec::with_capacity(self.module.funcs.len());
        for (func, layout) in self.module.funcs.iter().zip(&self.layouts) {
            let w = &mut self.writer;
            emit_signature(w, &func.param_types(), func.return_type)?;
            self.strings.reference(w, &func.name);
            let begin = w.alloc_u32();
            let end = w.alloc_u32();
            for count in layout.counts() {
                w.u16(count);
            }
            w.u8(u8::from(func.export));
            w.u8(0); // not an extern
            slots.push(BodySlots { begin, end });
        }
        Ok(slots)
    }

    fn emit_segment_records(&mut self) -> CodegenResult<Vec<Placeholder>> {
        let mut slots = Vec::with_capacity(self.module.memory.len());
        for segment in &self.module.memory {
            let w = &mut self.writer;
            w.u32(segment.ptr);
            slots.push(w.alloc_u32());
            w.u32(fit_u32("memory segment length", segment.buffer.len())?);
            w.u8(1); // data present
        }
        Ok(slots)
    }

    // ── Bodies ───────────────────────────────────────────────────────────

    fn emit_bodies(&mut self, slots: Vec<BodySlots>) -> CodegenResult<()> {
        let module = self.module;
        for (i, (func, slot)) in module.funcs.iter().zip(slots).enumerate() {
            let ctx = FuncContext::new(module, func)?;
            let begin = self.writer.offset()?;
            self.writer.patch_u32(slot.begin, begin)?;
            emit_block(&func.body, &ctx, &mut self.writer)?;
            let end = self.writer.offset()?;
            self.writer.patch_u32(slot.end, end)?;

            let uid = ctx.func_uid(FuncId(fit_u32("function index", i)?))?;
            log::trace!("body of `{}` (uid {uid}): {} bytes", func.name, end - begin);
            self.source_map.push(SourceMapEntry {
                uid: u32::from(uid),
                name: func.name.clone(),
                kind: if func.export {
                    RecordKind::Export
                } else {
                    RecordKind::Function
                },
                span: func.span,
                body_begin: begin,
                body_end: end,
            });
        }
        Ok(())
    }

    fn emit_segment_data(&mut self, slots: Vec<Placeholder>) -> CodegenResult<()> {
        for (segment, slot) in self.module.memory.iter().zip(slots) {
            self.writer.patch_here(slot)?;
            self.writer.bytes(&segment.buffer);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_bits() {
        assert_eq!(address_bits(65536).unwrap(), 16);
        assert_eq!(address_bits(65537).unwrap(), 17);
        assert_eq!(address_bits(1000).unwrap(), 10);
        assert_eq!(address_bits(1).unwrap(), 0);
        assert!(address_bits(0).is_err());
    }

    #[test]
    fn test_signature_layout() {
        let mut w = BinaryWriter::new();
        emit_signature(&mut w, &[ValueType::I32, ValueType::F64], ValueType::I64).unwrap();
        assert_eq!(w.as_bytes(), [2, 2, 1, 4]);
    }

    #[test]
    fn test_signature_rejects_narrow_types() {
        let mut w = BinaryWriter::new();
        assert!(emit_signature(&mut w, &[ValueType::I8], ValueType::Void).is_err());
    }
}
