//! The section-oriented binary container. Grounded on
//! `original_source/include/executable.h` / `src/executable.cc`; wire format
//! is spec.md §6, reproduced byte-for-byte.

use crate::error::XvmError;

pub const MAGIC: u32 = 0xDEAD_BEEF;

#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SectionType {
    Code = 1,
    Data = 2,
    Symbols = 3,
    Relocations = 4,
    RunInfo = 5,
}

impl SectionType {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(Self::Code),
            2 => Some(Self::Data),
            3 => Some(Self::Symbols),
            4 => Some(Self::Relocations),
            5 => Some(Self::RunInfo),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    pub label: String,
    pub kind: SectionType,
    pub data: Vec<u8>,
}

impl Section {
    pub fn new(label: impl Into<String>, kind: SectionType, data: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            kind,
            data,
        }
    }

    fn checksum(&self) -> u32 {
        // Simple additive checksum; the field is declared "reserved" in the
        // original wire format and never validated on read.
        self.data.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.label.len() + 1 + 12 + self.data.len());
        out.extend_from_slice(self.label.as_bytes());
        out.push(0);
        out.extend_from_slice(&(self.kind as u32).to_le_bytes());
        out.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.checksum().to_le_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    /// Parse one section starting at `offset`, returning it and the offset
    /// of the next section.
    fn from_buffer(buf: &[u8], offset: usize) -> Result<(Self, usize), XvmError> {
        let nul = buf[offset..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| XvmError::Load("section label is not NUL-terminated".into()))?;
        let label = String::from_utf8_lossy(&buf[offset..offset + nul]).into_owned();
        let mut cursor = offset + nul + 1;

        let kind_raw = u32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap());
        let kind = SectionType::from_u32(kind_raw)
            .ok_or_else(|| XvmError::Load(format!("unknown section type {kind_raw}")))?;
        cursor += 4;

        let size = u32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap()) as usize;
        cursor += 4;

        let _checksum = u32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap());
        cursor += 4;

        let data = buf[cursor..cursor + size].to_vec();
        cursor += size;

        Ok((Self::new(label, kind, data), cursor))
    }
}

#[derive(Clone, Debug, Default)]
pub struct Executable {
    pub magic: u32,
    pub version: u32,
    pub flags: u32,
    pub sections: Vec<Section>,
}

impl Executable {
    pub fn new() -> Self {
        Self {
            magic: MAGIC,
            version: 1,
            flags: 0,
            sections: Vec::new(),
        }
    }

    pub fn has_section(&self, label: &str) -> bool {
        self.sections.iter().any(|s| s.label == label)
    }

    pub fn section(&self, label: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.label == label)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.magic.to_le_bytes());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&(self.sections.len() as u32).to_le_bytes());
        for section in &self.sections {
            out.extend_from_slice(&section.to_bytes());
        }
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, XvmError> {
        if buf.len() < 16 {
            return Err(XvmError::Load("truncated executable header".into()));
        }
        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let version = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let flags = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let count = u32::from_le_bytes(buf[12..16].try_into().unwrap());

        let mut sections = Vec::with_capacity(count as usize);
        let mut cursor = 16;
        for _ in 0..count {
            let (section, next) = Section::from_buffer(buf, cursor)?;
            sections.push(section);
            cursor = next;
        }

        Ok(Self {
            magic,
            version,
            flags,
            sections,
        })
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executable_round_trips_through_bytes() {
        let mut exe = Executable::new();
        exe.sections.push(Section::new(
            "code",
            SectionType::Code,
            vec![0x00, 0x00, 0x01, 0x02, 0x03, 0x04],
        ));
        exe.sections
            .push(Section::new("symbols", SectionType::Symbols, vec![]));

        let bytes = exe.to_bytes();
        let back = Executable::from_bytes(&bytes).unwrap();

        assert_eq!(back.magic, exe.magic);
        assert_eq!(back.version, exe.version);
        assert_eq!(back.flags, exe.flags);
        assert_eq!(back.sections.len(), exe.sections.len());
        for (a, b) in exe.sections.iter().zip(back.sections.iter()) {
            assert_eq!(a.label, b.label);
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.data, b.data);
        }
    }

    #[test]
    fn bad_magic_is_preserved_not_normalized() {
        let mut exe = Executable::new();
        exe.magic = 0;
        let bytes = exe.to_bytes();
        let back = Executable::from_bytes(&bytes).unwrap();
        assert_eq!(back.magic, 0);
    }
}
