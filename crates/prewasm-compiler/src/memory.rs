//! Static memory layout.
//!
//! Memory blocks are placed one after another starting at [`NULL_GUARD`],
//! so that address 0 never holds data. Each block becomes one
//! [`MemorySegment`]; the cursor after the last block is the module's
//! `top`, the first address the runtime allocator may hand out.

use prewasm_types::ast::{MemoryLabel, MemorySegment};
use prewasm_types::parsed::{Directive, MemoryDecl};
use prewasm_types::{DiagnosticKind, Diagnostics};

/// First address available to memory blocks.
pub const NULL_GUARD: u32 = 8;

/// Running byte cursor shared by all memory blocks of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    cursor: u32,
}

impl Default for MemoryLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLayout {
    pub fn new() -> Self {
        Self { cursor: NULL_GUARD }
    }

    /// The next free address.
    pub fn top(&self) -> u32 {
        self.cursor
    }

    /// Lay out one memory block at the current cursor.
    ///
    /// Labels are returned in directive order; registering their names is
    /// left to the caller.
    pub fn place(&mut self, decl: &MemoryDecl, diags: &mut Diagnostics) -> MemorySegment {
        let base = self.cursor;
        let mut buffer = Vec::new();
        let mut labels = Vec::new();

        for directive in &decl.directives {
            let here = base as usize + buffer.len();
            match directive {
                Directive::Align { size, span } => {
                    if *size == 0 {
                        diags.error(DiagnosticKind::Layout, "align size must be positive", *span);
                        continue;
                    }
                    let size = *size as usize;
                    let padding = (size - here % size) % size;
                    buffer.resize(buffer.len() + padding, 0);
                }
                Directive::Zero { size } => buffer.resize(buffer.len() + *size as usize, 0),
                Directive::Hex { bytes } => buffer.extend_from_slice(bytes),
                Directive::String { text } => {
                    buffer.extend_from_slice(text.as_bytes());
                    buffer.push(0);
                }
                Directive::Label { name } => match u32::try_from(here) {
                    Ok(ptr) => labels.push(MemoryLabel {
                        name: name.text.clone(),
                        ptr,
                    }),
                    Err(_) => diags.error(
                        DiagnosticKind::Layout,
                        format!("label `{}` lies outside the 32-bit address space", name.text),
                        name.span,
                    ),
                },
            }
        }

        let end = base as usize + buffer.len();
        self.cursor = match u32::try_from(end) {
            Ok(end) => end,
            Err(_) => {
                diags.error(
                    DiagnosticKind::Layout,
                    "memory blocks exceed the 32-bit address space",
                    decl.span,
                );
                u32::MAX
            }
        };
        log::trace!("memory block at {base}: {} bytes", buffer.len());

        MemorySegment {
            ptr: base,
            buffer,
            labels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prewasm_types::parsed::build::*;
    use prewasm_types::parsed::Decl;

    fn decl(directives: Vec<Directive>) -> MemoryDecl {
        match memory(directives) {
            Decl::Memory(decl) => decl,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_starts_after_null_guard() {
        let mut layout = MemoryLayout::new();
        let mut diags = Diagnostics::with_sink(|_: &str| {});
        let seg = layout.place(&decl(vec![label("first"), zero(4)]), &mut diags);
        assert_eq!(seg.ptr, 8);
        assert_eq!(seg.labels[0].ptr, 8);
        assert_eq!(layout.top(), 12);
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_align_uses_absolute_address() {
        let mut layout = MemoryLayout::new();
        let mut diags = Diagnostics::with_sink(|_: &str| {});
        layout.place(&decl(vec![hex(&[1, 2, 3])]), &mut diags);
        assert_eq!(layout.top(), 11);

        let seg = layout.place(&decl(vec![align(4), label("temp"), zero(4)]), &mut diags);
        assert_eq!(seg.ptr, 11);
        assert_eq!(seg.labels[0].ptr, 12);
        assert_eq!(seg.buffer, [0, 0, 0, 0, 0]);
        assert_eq!(layout.top(), 16);
    }

    #[test]
    fn test_strings_are_nul_terminated() {
        let mut layout = MemoryLayout::new();
        let mut diags = Diagnostics::with_sink(|_: &str| {});
        let seg = layout.place(
            &decl(vec![label("greeting"), string("hi"), label("after")]),
            &mut diags,
        );
        assert_eq!(seg.buffer, b"hi\0");
        assert_eq!(seg.labels[1].ptr, 11);
    }

    #[test]
    fn test_align_zero_is_layout_error() {
        let mut layout = MemoryLayout::new();
        let mut diags = Diagnostics::with_sink(|_: &str| {});
        layout.place(&decl(vec![align(0), zero(1)]), &mut diags);
        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.errors()[0].kind, DiagnosticKind::Layout);
        assert_eq!(layout.top(), 9);
    }

    #[test]
    fn test_aligned_cursor_needs_no_padding() {
        let mut layout = MemoryLayout::new();
        let mut diags = Diagnostics::with_sink(|_: &str| {});
        let seg = layout.place(&decl(vec![align(8), hex(&[0xff])]), &mut diags);
        assert_eq!(seg.buffer, [0xff]);
    }
}
