//! Instruction encoding: the 2-byte header (addressing-mode flags + opcode),
//! argument sizing, and disassembly. This is the binary contract every other
//! layer (assembler, linker, interpreter) agrees on bit-for-bit.

use std::fmt;

/// How an instruction argument is located.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AddressingMode {
    None = 0,
    Stk = 1,
    Imm = 2,
    Abs = 3,
    Pro = 4,
    Nro = 5,
}

impl AddressingMode {
    #[inline]
    pub fn from_nibble(n: u8) -> Self {
        match n & 0xF {
            0 => Self::None,
            1 => Self::Stk,
            2 => Self::Imm,
            3 => Self::Abs,
            4 => Self::Pro,
            5 => Self::Nro,
            other => panic!("invalid addressing mode nibble 0x{other:x}"),
        }
    }

    /// Whether this mode reads a 4-byte argument inline in the code stream.
    #[inline]
    pub fn has_inline_arg(self) -> bool {
        !matches!(self, Self::None | Self::Stk)
    }
}

macro_rules! opcodes {
    ($($name:ident = $val:expr),+ $(,)?) => {
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, PartialEq, Eq)]
        pub enum OpCode {
            $($name = $val),+
        }

        impl OpCode {
            pub fn from_u8(b: u8) -> Option<Self> {
                match b {
                    $($val => Some(Self::$name),)+
                    _ => None,
                }
            }

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name)),+
                }
            }
        }
    };
}

opcodes! {
    Nop = 0,
    Halt = 1,
    Reset = 2,
    Ret = 3,
    Push = 4,
    Pop = 5,
    Dup = 6,
    Rol = 7,
    Rol3 = 8,
    Deref8 = 9,
    Deref16 = 10,
    Deref32 = 11,
    Load8 = 12,
    Load16 = 13,
    Load32 = 14,
    Store8 = 15,
    Store16 = 16,
    Store32 = 17,
    Add = 18,
    Sub = 19,
    Mul = 20,
    Div = 21,
    Equ = 22,
    Lt = 23,
    Gt = 24,
    And = 25,
    Or = 26,
    Shl = 27,
    Shr = 28,
    Inc = 29,
    Dec = 30,
    Jump = 31,
    Jumpt = 32,
    Jumpf = 33,
    Call = 34,
    Syscall = 35,
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic().to_ascii_lowercase())
    }
}

/// Pack two addressing-mode nibbles into the header's flags byte.
#[inline]
pub fn encode_flags(mode1: AddressingMode, mode2: AddressingMode) -> u8 {
    ((mode1 as u8) << 4) | (mode2 as u8)
}

#[inline]
pub fn extract_mode1(flags: u8) -> AddressingMode {
    AddressingMode::from_nibble(flags >> 4)
}

#[inline]
pub fn extract_mode2(flags: u8) -> AddressingMode {
    AddressingMode::from_nibble(flags)
}

/// Pack a full 2-byte instruction header.
#[inline]
pub fn encode_header(mode1: AddressingMode, mode2: AddressingMode, op: OpCode) -> [u8; 2] {
    [encode_flags(mode1, mode2), op as u8]
}

#[inline]
pub fn decode_header(bytes: [u8; 2]) -> (AddressingMode, AddressingMode, u8) {
    (extract_mode1(bytes[0]), extract_mode2(bytes[0]), bytes[1])
}

/// Little-endian byte-pack helpers, replacing the union-based reinterpretation
/// the original source used for 32-bit values.
#[inline]
pub fn read_i32_le(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[inline]
pub fn write_i32_le(out: &mut [u8], value: i32) {
    out[..4].copy_from_slice(&value.to_le_bytes());
}

/// Disassemble one instruction starting at `offset`, returning the offset of
/// the next instruction. Unknown opcodes print `<?>` and advance by a single
/// byte rather than aborting.
pub fn disassemble_one(code: &[u8], offset: usize) -> (String, usize) {
    if offset + 2 > code.len() {
        return (format!("{offset:04x}: <truncated>"), code.len());
    }

    let (mode1, mode2, raw_op) = decode_header([code[offset], code[offset + 1]]);
    let Some(op) = OpCode::from_u8(raw_op) else {
        return (format!("{offset:04x}: <?>"), offset + 1);
    };

    let mut cursor = offset + 2;
    let mut text = format!("{offset:04x}: {op}");

    for (i, mode) in [mode1, mode2].into_iter().enumerate() {
        if !mode.has_inline_arg() {
            continue;
        }
        if cursor + 4 > code.len() {
            text.push_str(" <truncated-arg>");
            cursor = code.len();
            continue;
        }
        let arg = read_i32_le(&code[cursor..cursor + 4]);
        match mode {
            AddressingMode::Imm | AddressingMode::Abs => {
                text.push_str(&format!(" 0x{arg:x}"));
            }
            AddressingMode::Pro => {
                let target = (cursor as i64) + (arg as i64) - 4 + 4;
                text.push_str(&format!(" +0x{arg:x} (-> 0x{target:04x})"));
            }
            AddressingMode::Nro => {
                let target = (cursor as i64) - (arg as i64) - 4 + 4;
                text.push_str(&format!(" -0x{arg:x} (-> 0x{target:04x})"));
            }
            _ => unreachable!(),
        }
        cursor += 4;
        let _ = i;
    }

    (text, cursor)
}

/// Disassemble an entire code section into one line per instruction.
pub fn disassemble(code: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut offset = 0;
    while offset < code.len() {
        let (line, next) = disassemble_one(code, offset);
        lines.push(line);
        offset = next;
    }
    lines
}

/// Byte length of an instruction given its two addressing modes: 2 bytes for
/// the header plus 4 for each inline argument.
#[inline]
pub fn instruction_len(mode1: AddressingMode, mode2: AddressingMode) -> usize {
    2 + (mode1.has_inline_arg() as usize) * 4 + (mode2.has_inline_arg() as usize) * 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_for_every_mode_and_opcode() {
        let modes = [
            AddressingMode::None,
            AddressingMode::Stk,
            AddressingMode::Imm,
            AddressingMode::Abs,
            AddressingMode::Pro,
            AddressingMode::Nro,
        ];
        for &m1 in &modes {
            for &m2 in &modes {
                for raw in 0..=35u8 {
                    let op = OpCode::from_u8(raw).unwrap();
                    let header = encode_header(m1, m2, op);
                    let (d1, d2, dop) = decode_header(header);
                    assert_eq!(d1, m1);
                    assert_eq!(d2, m2);
                    assert_eq!(dop, raw);
                }
            }
        }
    }

    #[test]
    fn byte_pack_round_trips() {
        let mut buf = [0u8; 4];
        write_i32_le(&mut buf, -123456);
        assert_eq!(read_i32_le(&buf), -123456);
    }

    #[test]
    fn unknown_opcode_disassembles_as_placeholder_and_advances_one_byte() {
        let code = [0x00u8, 0xFFu8, 0x11u8, 0x01u8];
        let (line, next) = disassemble_one(&code, 0);
        assert!(line.contains("<?>"));
        assert_eq!(next, 1);
    }
}
