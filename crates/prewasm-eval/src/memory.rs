//! Linear memory.

use std::ops::Range;

use prewasm_types::ast::Module;
use prewasm_types::MemType;

use crate::error::{EvalError, EvalResult};
use crate::value::Value;

/// Little-endian byte-addressed memory, initialised from a module's segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }

    /// `memory.fixed` bytes (at least `top`) with every segment copied in.
    pub fn from_module(module: &Module) -> EvalResult<Self> {
        let fixed = usize::try_from(module.config.fixed_memory_size()).unwrap_or(0);
        let mut memory = Self::new(fixed.max(module.top as usize));
        for segment in &module.memory {
            let size = u32::try_from(segment.buffer.len()).unwrap_or(u32::MAX);
            let range = memory.range(segment.ptr, size)?;
            memory.bytes[range].copy_from_slice(&segment.buffer);
        }
        Ok(memory)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn range(&self, address: u32, size: u32) -> EvalResult<Range<usize>> {
        let start = address as usize;
        let end = start + size as usize;
        if end > self.bytes.len() {
            return Err(EvalError::OutOfBounds { address, size });
        }
        Ok(start..end)
    }

    fn read<const N: usize>(&self, address: u32) -> EvalResult<[u8; N]> {
        let range = self.range(address, N as u32)?;
        let mut out = [0; N];
        out.copy_from_slice(&self.bytes[range]);
        Ok(out)
    }

    fn write(&mut self, address: u32, data: &[u8]) -> EvalResult<()> {
        let range = self.range(address, data.len() as u32)?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    /// Read one element. Narrow signed types sign-extend, unsigned ones
    /// zero-extend.
    pub fn load(&self, mtype: MemType, address: u32) -> EvalResult<Value> {
        Ok(match mtype {
            MemType::I8 => Value::I32(i8::from_le_bytes(self.read(address)?) as i32),
            MemType::U8 => Value::I32(u8::from_le_bytes(self.read(address)?) as i32),
            MemType::I16 => Value::I32(i16::from_le_bytes(self.read(address)?) as i32),
            MemType::U16 => Value::I32(u16::from_le_bytes(self.read(address)?) as i32),
            MemType::I32 | MemType::U32 => Value::I32(i32::from_le_bytes(self.read(address)?)),
            MemType::I64 | MemType::U64 => Value::I64(i64::from_le_bytes(self.read(address)?)),
            MemType::F32 => Value::F32(f32::from_le_bytes(self.read(address)?)),
            MemType::F64 => Value::F64(f64::from_le_bytes(self.read(address)?)),
        })
    }

    /// Write one element, truncating `i32` values to narrow widths.
    pub fn store(&mut self, mtype: MemType, address: u32, value: Value) -> EvalResult<()> {
        match (mtype, value) {
            (MemType::I8 | MemType::U8, Value::I32(v)) => self.write(address, &[v as u8]),
            (MemType::I16 | MemType::U16, Value::I32(v)) => {
                self.write(address, &(v as u16).to_le_bytes())
            }
            (MemType::I32 | MemType::U32, Value::I32(v)) => self.write(address, &v.to_le_bytes()),
            (MemType::I64 | MemType::U64, Value::I64(v)) => self.write(address, &v.to_le_bytes()),
            (MemType::F32, Value::F32(v)) => self.write(address, &v.to_le_bytes()),
            (MemType::F64, Value::F64(v)) => self.write(address, &v.to_le_bytes()),
            (mtype, value) => Err(EvalError::TypeMismatch(format!(
                "cannot store {} as {mtype}",
                value.ty()
            ))),
        }
    }

    /// The NUL-terminated string starting at `address`.
    pub fn read_c_string(&self, address: u32) -> EvalResult<String> {
        let start = self.range(address, 0)?.start;
        let len = self.bytes[start..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(EvalError::OutOfBounds {
                address,
                size: u32::try_from(self.bytes.len() - start).unwrap_or(u32::MAX),
            })?;
        Ok(String::from_utf8_lossy(&self.bytes[start..start + len]).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrow_loads_extend() {
        let mut memory = Memory::new(16);
        memory.store(MemType::U8, 8, Value::I32(0x1ff)).unwrap();
        assert_eq!(memory.load(MemType::U8, 8).unwrap(), Value::I32(0xff));
        assert_eq!(memory.load(MemType::I8, 8).unwrap(), Value::I32(-1));

        memory.store(MemType::I16, 10, Value::I32(-2)).unwrap();
        assert_eq!(memory.load(MemType::U16, 10).unwrap(), Value::I32(0xfffe));
        assert_eq!(memory.load(MemType::I16, 10).unwrap(), Value::I32(-2));
    }

    #[test]
    fn test_little_endian_layout() {
        let mut memory = Memory::new(8);
        memory.store(MemType::I32, 0, Value::I32(0x0403_0201)).unwrap();
        assert_eq!(&memory.bytes()[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_out_of_bounds() {
        let memory = Memory::new(8);
        assert_eq!(
            memory.load(MemType::I64, 4),
            Err(EvalError::OutOfBounds {
                address: 4,
                size: 8
            })
        );
        assert!(memory.load(MemType::I32, 4).is_ok());
    }

    #[test]
    fn test_store_checks_storage_class() {
        let mut memory = Memory::new(8);
        assert!(matches!(
            memory.store(MemType::F32, 0, Value::I32(1)),
            Err(EvalError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_read_c_string() {
        let mut memory = Memory::new(8);
        for (i, b) in b"hi\0".iter().enumerate() {
            memory.store(MemType::U8, 2 + i as u32, Value::I32(*b as i32)).unwrap();
        }
        assert_eq!(memory.read_c_string(2).unwrap(), "hi");
    }
}
