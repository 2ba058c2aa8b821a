//! Decoder for the header and record tables of an encoded module.
//!
//! Bodies are left as byte ranges; this is enough to check the layout and
//! to locate functions and data for tooling.

use prewasm_types::ValueType;
use serde::Serialize;

use crate::error::ReadError;
use crate::opcodes::type_from_code;

/// Decoded header and records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleInfo {
    pub address_bits: u8,
    pub memory_exported: bool,
    pub global_count: u16,
    pub records: Vec<RecordInfo>,
    pub segments: Vec<SegmentInfo>,
}

impl ModuleInfo {
    pub fn extern_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_extern).count()
    }

    pub fn function_count(&self) -> usize {
        self.records.iter().filter(|r| !r.is_extern).count()
    }

    /// The record at position `uid` in the shared uid space.
    pub fn record(&self, uid: usize) -> Option<&RecordInfo> {
        self.records.get(uid)
    }

    pub fn find(&self, name: &str) -> Option<&RecordInfo> {
        self.records.iter().find(|r| r.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordInfo {
    pub name: String,
    pub params: Vec<ValueType>,
    pub ret: ValueType,
    pub name_offset: u32,
    pub body_begin: u32,
    pub body_end: u32,
    /// Non-parameter locals per storage class: i32, i64, f32, f64.
    pub local_counts: [u16; 4],
    pub exported: bool,
    pub is_extern: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentInfo {
    pub ptr: u32,
    pub data_offset: u32,
    pub len: u32,
    pub data: Vec<u8>,
}

/// Decode the header, records and memory segments of `bytes`.
pub fn read_module(bytes: &[u8]) -> Result<ModuleInfo, ReadError> {
    let mut r = Reader { bytes, pos: 0 };

    let address_bits = r.u8()?;
    let memory_exported = r.u8()? != 0;
    let global_count = r.u16()?;
    let record_count = r.u16()?;
    let segment_count = r.u16()?;

    let mut records = Vec::with_capacity(usize::from(record_count));
    for _ in 0..record_count {
        let argc = r.u8()?;
        let ret = r.value_type()?;
        let params = (0..argc)
            .map(|_| r.value_type())
            .collect::<Result<Vec<_>, _>>()?;
        let name_offset = r.u32()?;
        let body_begin = r.u32()?;
        let body_end = r.u32()?;
        let local_counts = [r.u16()?, r.u16()?, r.u16()?, r.u16()?];
        let exported = r.u8()? != 0;
        let is_extern = r.u8()? != 0;
        records.push(RecordInfo {
            name: read_name(bytes, name_offset)?,
            params,
            ret,
            name_offset,
            body_begin,
            body_end,
            local_counts,
            exported,
            is_extern,
        });
    }

    let mut segments = Vec::with_capacity(usize::from(segment_count));
    for _ in 0..segment_count {
        let ptr = r.u32()?;
        let data_offset = r.u32()?;
        let len = r.u32()?;
        let _present = r.u8()?;
        let start = data_offset as usize;
        let data = bytes
            .get(start..start + len as usize)
            .ok_or(ReadError::BadOffset {
                what: "segment data",
                offset: data_offset,
            })?
            .to_vec();
        segments.push(SegmentInfo {
            ptr,
            data_offset,
            len,
            data,
        });
    }

    Ok(ModuleInfo {
        address_bits,
        memory_exported,
        global_count,
        records,
        segments,
    })
}

fn read_name(bytes: &[u8], offset: u32) -> Result<String, ReadError> {
    let start = offset as usize;
    let tail = bytes.get(start..).ok_or(ReadError::BadOffset {
        what: "name",
        offset,
    })?;
    let len = tail
        .iter()
        .position(|b| *b == 0)
        .ok_or(ReadError::BadString { offset: start })?;
    let text = &tail[..len];
    if !text.is_ascii() {
        return Err(ReadError::BadString { offset: start });
    }
    Ok(text.iter().map(|b| char::from(*b)).collect())
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], ReadError> {
        let chunk = self
            .bytes
            .get(self.pos..self.pos + N)
            .ok_or(ReadError::UnexpectedEof {
                offset: self.pos,
                needed: N,
            })?;
        let mut out = [0u8; N];
        out.copy_from_slice(chunk);
        self.pos += N;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, ReadError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn u32(&mut self) -> Result<u32, ReadError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn value_type(&mut self) -> Result<ValueType, ReadError> {
        let offset = self.pos;
        let code = self.u8()?;
        type_from_code(code).ok_or(ReadError::BadTypeCode { offset, code })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_eof() {
        assert_eq!(
            read_module(&[]),
            Err(ReadError::UnexpectedEof {
                offset: 0,
                needed: 1
            })
        );
    }

    #[test]
    fn test_header_only() {
        let info = read_module(&[16, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(info.address_bits, 16);
        assert!(!info.memory_exported);
        assert!(info.records.is_empty());
        assert!(info.segments.is_empty());
    }

    #[test]
    fn test_truncated_record() {
        // One record announced, only argc present.
        let err = read_module(&[16, 0, 0, 0, 1, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, ReadError::UnexpectedEof { offset: 9, .. }));
    }

    #[test]
    fn test_bad_type_code() {
        let err = read_module(&[16, 0, 0, 0, 1, 0, 0, 0, 0, 9]).unwrap_err();
        assert_eq!(err, ReadError::BadTypeCode { offset: 9, code: 9 });
    }
}
