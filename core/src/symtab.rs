//! Symbol table: the `symbols` section's decoded form. Grounded on
//! `original_source/include/executable.h`'s `SymbolTable`/`Symbol`.

use crate::error::XvmError;
use crate::executable::{Section, SectionType};

pub mod flags {
    pub const LABEL: u16 = 0x1;
    pub const PROCEDURE: u16 = 0x2;
    pub const VARIABLE: u16 = 0x4;
    pub const ENTRY: u16 = 0x8;
    pub const EXTERN: u16 = 0x10;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    pub address: i32,
    pub flags: u16,
    pub size: u16,
    pub label: String,
}

impl Symbol {
    pub fn is_label(&self) -> bool {
        self.flags & flags::LABEL != 0
    }
    pub fn is_procedure(&self) -> bool {
        self.flags & flags::PROCEDURE != 0
    }
    pub fn is_variable(&self) -> bool {
        self.flags & flags::VARIABLE != 0
    }
    pub fn is_extern(&self) -> bool {
        self.flags & flags::EXTERN != 0
    }
}

#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    pub symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, address: i32, label: impl Into<String>, flags: u16, size: u16) {
        self.symbols.push(Symbol {
            address,
            flags,
            size,
            label: label.into(),
        });
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.symbols.iter().any(|s| s.label == label)
    }

    pub fn by_label(&self, label: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.label == label)
    }

    pub fn by_address(&self, address: i32) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.address == address)
    }

    /// Sorted by address, as spec.md §4.3 requires for exported symbols.
    pub fn to_section(&self, label: &str) -> Section {
        let mut sorted = self.symbols.clone();
        sorted.sort_by_key(|s| s.address);

        let mut data = Vec::new();
        for sym in &sorted {
            data.extend_from_slice(&sym.address.to_le_bytes());
            data.extend_from_slice(&sym.flags.to_le_bytes());
            data.extend_from_slice(&sym.size.to_le_bytes());
            data.extend_from_slice(sym.label.as_bytes());
            data.push(0);
        }
        Section::new(label, SectionType::Symbols, data)
    }

    pub fn from_section(section: &Section) -> Result<Self, XvmError> {
        let buf = &section.data;
        let mut cursor = 0;
        let mut symbols = Vec::new();

        while cursor < buf.len() {
            let address = i32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap());
            cursor += 4;
            let flags = u16::from_le_bytes(buf[cursor..cursor + 2].try_into().unwrap());
            cursor += 2;
            let size = u16::from_le_bytes(buf[cursor..cursor + 2].try_into().unwrap());
            cursor += 2;
            let nul = buf[cursor..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| XvmError::Load("symbol label not NUL-terminated".into()))?;
            let label = String::from_utf8_lossy(&buf[cursor..cursor + nul]).into_owned();
            cursor += nul + 1;

            symbols.push(Symbol {
                address,
                flags,
                size,
                label,
            });
        }

        Ok(Self { symbols })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_table_round_trips_through_section() {
        let mut table = SymbolTable::new();
        table.add(0, "main", flags::LABEL | flags::PROCEDURE | flags::ENTRY, 0);
        table.add(16, "counter", flags::VARIABLE, 4);

        let section = table.to_section("symbols");
        let back = SymbolTable::from_section(&section).unwrap();

        assert_eq!(back.symbols.len(), 2);
        assert_eq!(back.by_label("main").unwrap().address, 0);
        assert_eq!(back.by_label("counter").unwrap().size, 4);
    }
}
