//! Relocation table: the `relocations` section's decoded form. Grounded on
//! `original_source/include/executable.h`'s `RelocationTable`.

use crate::error::XvmError;
use crate::executable::{Section, SectionType};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SymbolMention {
    pub code_offset: i32,
    /// Which argument slot this mention patches; 1 or 2, or 0 when this
    /// patch is part of a compound offset expression and must not rewrite
    /// the addressing-mode flags nibble.
    pub arg_ordinal: u8,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelocationEntry {
    pub label: String,
    pub mentions: Vec<SymbolMention>,
}

#[derive(Clone, Debug, Default)]
pub struct RelocationTable {
    pub relocations: Vec<RelocationEntry>,
}

impl RelocationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_mut(&mut self, label: &str) -> &mut RelocationEntry {
        if let Some(idx) = self.relocations.iter().position(|r| r.label == label) {
            return &mut self.relocations[idx];
        }
        self.relocations.push(RelocationEntry {
            label: label.to_string(),
            mentions: Vec::new(),
        });
        self.relocations.last_mut().unwrap()
    }

    pub fn to_section(&self, label: &str) -> Section {
        let mut data = Vec::new();
        for entry in &self.relocations {
            data.extend_from_slice(entry.label.as_bytes());
            data.push(0);
            data.extend_from_slice(&(entry.mentions.len() as u32).to_le_bytes());
            for mention in &entry.mentions {
                data.extend_from_slice(&mention.code_offset.to_le_bytes());
                data.push(mention.arg_ordinal);
            }
        }
        Section::new(label, SectionType::Relocations, data)
    }

    pub fn from_section(section: &Section) -> Result<Self, XvmError> {
        let buf = &section.data;
        let mut cursor = 0;
        let mut relocations = Vec::new();

        while cursor < buf.len() {
            let nul = buf[cursor..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| XvmError::Load("relocation label not NUL-terminated".into()))?;
            let label = String::from_utf8_lossy(&buf[cursor..cursor + nul]).into_owned();
            cursor += nul + 1;

            let n_mentions =
                u32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap()) as usize;
            cursor += 4;

            let mut mentions = Vec::with_capacity(n_mentions);
            for _ in 0..n_mentions {
                let code_offset = i32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap());
                cursor += 4;
                let arg_ordinal = buf[cursor];
                cursor += 1;
                mentions.push(SymbolMention {
                    code_offset,
                    arg_ordinal,
                });
            }

            relocations.push(RelocationEntry { label, mentions });
        }

        Ok(Self { relocations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relocation_table_round_trips_through_section() {
        let mut table = RelocationTable::new();
        table.entry_mut("target").mentions.push(SymbolMention {
            code_offset: 4,
            arg_ordinal: 1,
        });
        table.entry_mut("target").mentions.push(SymbolMention {
            code_offset: 40,
            arg_ordinal: 0,
        });

        let section = table.to_section("relocations");
        let back = RelocationTable::from_section(&section).unwrap();

        assert_eq!(back.relocations.len(), 1);
        assert_eq!(back.relocations[0].mentions.len(), 2);
        assert_eq!(back.relocations[0].mentions[1].arg_ordinal, 0);
    }
}
