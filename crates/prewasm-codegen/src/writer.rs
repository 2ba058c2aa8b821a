//! Little-endian byte stream with backpatchable placeholders.

use crate::error::{CodegenError, CodegenResult};

/// A reserved `u32` slot, filled in later with [`BinaryWriter::patch_u32`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a placeholder must be patched"]
pub struct Placeholder(usize);

impl Placeholder {
    pub fn offset(self) -> usize {
        self.0
    }
}

/// Growable output buffer for the binary module.
#[derive(Debug, Default, Clone)]
pub struct BinaryWriter {
    data: Vec<u8>,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stream length, i.e. the offset the next byte lands at.
    pub fn pos(&self) -> usize {
        self.data.len()
    }

    /// Current position as a `u32` offset.
    pub fn offset(&self) -> CodegenResult<u32> {
        fit_u32("stream offset", self.pos())
    }

    pub fn u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn i8(&mut self, value: i8) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn i32(&mut self, value: i32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn i64(&mut self, value: i64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn f32(&mut self, value: f32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn f64(&mut self, value: f64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Write a NUL-terminated ASCII string.
    ///
    /// Non-ASCII text is rejected rather than transcoded.
    pub fn ascii_z(&mut self, text: &str) -> CodegenResult<()> {
        if !text.is_ascii() {
            return Err(CodegenError::Unsupported(format!(
                "non-ASCII name `{text}` in string table"
            )));
        }
        self.data.extend_from_slice(text.as_bytes());
        self.u8(0);
        Ok(())
    }

    /// Reserve four bytes to be patched later.
    pub fn alloc_u32(&mut self) -> Placeholder {
        let slot = Placeholder(self.pos());
        self.u32(0);
        slot
    }

    pub fn patch_u32(&mut self, slot: Placeholder, value: u32) -> CodegenResult<()> {
        let range = slot.0..slot.0 + 4;
        let target = self
            .data
            .get_mut(range)
            .ok_or_else(|| CodegenError::Internal(format!("patch outside stream at {}", slot.0)))?;
        target.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Patch `slot` with the current stream position.
    pub fn patch_here(&mut self, slot: Placeholder) -> CodegenResult<()> {
        let here = self.offset()?;
        self.patch_u32(slot, here)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

// ── Range checks ─────────────────────────────────────────────────────────────

pub fn fit_u8(what: &str, value: usize) -> CodegenResult<u8> {
    u8::try_from(value).map_err(|_| CodegenError::range(what, value as i128, 0, u8::MAX.into()))
}

pub fn fit_u16(what: &str, value: usize) -> CodegenResult<u16> {
    u16::try_from(value).map_err(|_| CodegenError::range(what, value as i128, 0, u16::MAX.into()))
}

pub fn fit_u32(what: &str, value: usize) -> CodegenResult<u32> {
    u32::try_from(value).map_err(|_| CodegenError::range(what, value as i128, 0, u32::MAX.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_scalars() {
        let mut w = BinaryWriter::new();
        w.u16(0x1234);
        w.u32(0xdead_beef);
        w.i8(-1);
        w.i32(-2);
        assert_eq!(
            w.as_bytes(),
            [0x34, 0x12, 0xef, 0xbe, 0xad, 0xde, 0xff, 0xfe, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn test_float_encoding() {
        let mut w = BinaryWriter::new();
        w.f32(1.0);
        w.f64(-2.0);
        assert_eq!(&w.as_bytes()[..4], 1.0f32.to_le_bytes());
        assert_eq!(&w.as_bytes()[4..], (-2.0f64).to_le_bytes());
    }

    #[test]
    fn test_backpatch() {
        let mut w = BinaryWriter::new();
        w.u8(7);
        let slot = w.alloc_u32();
        w.bytes(&[1, 2, 3]);
        w.patch_here(slot).unwrap();
        assert_eq!(w.as_bytes(), [7, 8, 0, 0, 0, 1, 2, 3]);
        assert_eq!(slot.offset(), 1);
    }

    #[test]
    fn test_patch_out_of_bounds_is_internal_error() {
        let mut w = BinaryWriter::new();
        let err = w.patch_u32(Placeholder(10), 1).unwrap_err();
        assert!(matches!(err, CodegenError::Internal(_)));
    }

    #[test]
    fn test_ascii_strings_are_nul_terminated() {
        let mut w = BinaryWriter::new();
        w.ascii_z("main").unwrap();
        assert_eq!(w.as_bytes(), b"main\0");
    }

    #[test]
    fn test_non_ascii_rejected() {
        let mut w = BinaryWriter::new();
        let err = w.ascii_z("naïve").unwrap_err();
        assert!(matches!(err, CodegenError::Unsupported(_)));
        assert!(w.as_bytes().is_empty());
    }

    #[test]
    fn test_range_checks() {
        assert_eq!(fit_u8("argc", 255).unwrap(), 255);
        assert!(matches!(
            fit_u8("argc", 256),
            Err(CodegenError::EncodingRange { value: 256, max: 255, .. })
        ));
        assert_eq!(fit_u16("records", 65535).unwrap(), 65535);
        assert!(fit_u16("records", 65536).is_err());
    }
}
