//! Name string table.
//!
//! Records reference names through `u32` offsets that are only known once
//! the table is written at the end of the stream. Each distinct name is
//! written once, in first-reference order, and every reference site is
//! backpatched to point at it.

use std::collections::HashMap;

use crate::error::CodegenResult;
use crate::writer::{BinaryWriter, Placeholder};

#[derive(Debug, Default)]
pub struct StringTable {
    order: Vec<String>,
    refs: HashMap<String, Vec<Placeholder>>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a placeholder offset for `name` at the current position.
    pub fn reference(&mut self, w: &mut BinaryWriter, name: &str) {
        let slot = w.alloc_u32();
        match self.refs.get_mut(name) {
            Some(sites) => sites.push(slot),
            None => {
                self.order.push(name.to_string());
                self.refs.insert(name.to_string(), vec![slot]);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Append the table and patch every reference.
    pub fn emit(self, w: &mut BinaryWriter) -> CodegenResult<()> {
        for name in &self.order {
            for slot in self.refs.get(name).into_iter().flatten() {
                w.patch_here(*slot)?;
            }
            w.ascii_z(name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_at(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
    }

    #[test]
    fn test_duplicate_names_share_one_entry() {
        let mut w = BinaryWriter::new();
        let mut table = StringTable::new();
        table.reference(&mut w, "main");
        table.reference(&mut w, "helper");
        table.reference(&mut w, "main");
        assert_eq!(table.len(), 2);
        table.emit(&mut w).unwrap();

        let bytes = w.into_bytes();
        assert_eq!(&bytes[12..], b"main\0helper\0");
        assert_eq!(u32_at(&bytes, 0), 12);
        assert_eq!(u32_at(&bytes, 4), 17);
        assert_eq!(u32_at(&bytes, 8), 12);
    }

    #[test]
    fn test_empty_table_writes_nothing() {
        let mut w = BinaryWriter::new();
        let table = StringTable::new();
        assert!(table.is_empty());
        table.emit(&mut w).unwrap();
        assert!(w.as_bytes().is_empty());
    }
}
