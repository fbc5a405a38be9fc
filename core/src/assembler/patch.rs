//! The two patch passes that run after parsing: resolve label references
//! (with optional PIC rewriting) and variable references (with the
//! `push $var` auto-deref rewrite). Grounded on
//! `Assembler::patchLabels`/`patchVariables`/`patchAddressingMode` in
//! `original_source/src/assembler.cc`.
//!
//! Both passes are additive: a mention's slot may already hold a
//! constant-folded `+expr`/`-expr` offset recorded at parse time by
//! `Parser::get_address`, so the resolved value is added onto whatever is
//! already there rather than overwriting it outright (contrast with the
//! linker's cross-object patch, which overwrites — see `crate::linker`).
//!
//! Under `pic`, the value added is not the resolved address itself but its
//! signed distance from the argument slot (`address - arg_offset`, stored as
//! its absolute value with the sign recorded in the PRO/NRO nibble instead) —
//! `Vm::fetch_address` reads PRO/NRO args as a displacement from `ip`, not an
//! absolute address.

use super::parser::Parser;
use super::VarType;
use crate::error::XvmError;
use crate::isa::{self, AddressingMode, OpCode};

fn patch_addressing_mode(code: &mut [u8], header_offset: usize, arg_ordinal: u8, mode: AddressingMode) {
    let flags_byte = code[header_offset];
    code[header_offset] = match arg_ordinal {
        1 => (flags_byte & 0x0F) | ((mode as u8) << 4),
        2 => (flags_byte & 0xF0) | (mode as u8),
        _ => flags_byte,
    };
}

pub(super) fn patch_labels(p: &mut Parser<'_>, pic: bool) -> Result<(), XvmError> {
    let names: Vec<String> = p.labels.keys().cloned().collect();

    for name in names {
        let (address, mentions, is_extern) = {
            let label = &p.labels[&name];
            (label.address, label.mentions.clone(), p.externs.iter().any(|e| e == &name))
        };

        if address == -1 && !is_extern {
            return Err(XvmError::Resolve(format!("unknown label '{name}'")));
        }
        // Externs are left as unresolved placeholders for the linker; the
        // mention bytes are already zeroed by the parser, which is exactly
        // what the linker's overwrite-based patch expects to find.
        if is_extern {
            continue;
        }

        for mention in mentions {
            let arg_offset = mention.code_offset as usize;
            let delta = address - arg_offset as i32;
            let value = if pic { delta.abs() } else { address };
            let existing = isa::read_i32_le(&p.code[arg_offset..arg_offset + 4]);
            isa::write_i32_le(&mut p.code[arg_offset..arg_offset + 4], existing + value);

            if mention.arg_ordinal == 0 {
                continue;
            }
            let header_offset = if mention.arg_ordinal == 2 {
                arg_offset - 6
            } else {
                arg_offset - 2
            };
            let mode = if !pic {
                AddressingMode::Abs
            } else if delta >= 0 {
                AddressingMode::Pro
            } else {
                AddressingMode::Nro
            };
            patch_addressing_mode(&mut p.code, header_offset, mention.arg_ordinal, mode);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::{IncludeResolver, Label, LabelMention, NoIncludes};
    use crate::isa::{AddressingMode as M, OpCode as O, encode_header};

    fn parser_with_forward_call() -> Parser<'static> {
        // call target; halt; target: halt  (target at code offset 8)
        let mut code = Vec::new();
        code.extend_from_slice(&encode_header(M::Imm, M::None, O::Call));
        code.extend_from_slice(&[0, 0, 0, 0]);
        code.extend_from_slice(&encode_header(M::None, M::None, O::Halt));
        code.extend_from_slice(&encode_header(M::None, M::None, O::Halt));

        let includes: &'static mut dyn IncludeResolver = Box::leak(Box::new(NoIncludes));
        let mut p = Parser::new(Vec::new(), "t", includes);
        p.code = code;
        p.labels.insert(
            "target".to_string(),
            Label {
                address: 8,
                is_procedure: false,
                mentions: vec![LabelMention { code_offset: 2, arg_ordinal: 1 }],
            },
        );
        p
    }

    #[test]
    fn pic_patch_writes_a_relative_delta_not_the_absolute_address() {
        let mut p = parser_with_forward_call();
        patch_labels(&mut p, true).unwrap();

        let (mode1, _, _) = isa::decode_header([p.code[0], p.code[1]]);
        assert_eq!(mode1, AddressingMode::Pro);
        assert_eq!(isa::read_i32_le(&p.code[2..6]), 6); // 8 - 2, not 8
    }

    #[test]
    fn non_pic_patch_writes_the_absolute_address() {
        let mut p = parser_with_forward_call();
        patch_labels(&mut p, false).unwrap();

        let (mode1, _, _) = isa::decode_header([p.code[0], p.code[1]]);
        assert_eq!(mode1, AddressingMode::Abs);
        assert_eq!(isa::read_i32_le(&p.code[2..6]), 8);
    }
}

pub(super) fn patch_variables(p: &mut Parser<'_>, pic: bool) -> Result<(), XvmError> {
    let names: Vec<String> = p.variables.keys().cloned().collect();

    for name in names {
        let (address, kind, mentions) = {
            let var = &p.variables[&name];
            (var.address, var.kind, var.mentions.clone())
        };

        for mention in mentions {
            let arg_offset = mention.code_offset as usize;

            if mention.is_deref {
                // Parser emitted `push <addr-placeholder>; push_byte(0);
                // push_byte(NOP)` — the two trailing bytes form a dummy
                // header that becomes the real DEREFn instruction's header.
                isa::write_i32_le(&mut p.code[arg_offset..arg_offset + 4], address);
                let header_offset = arg_offset + 4;
                let op = match kind {
                    VarType::I8 => OpCode::Deref8,
                    VarType::I16 => OpCode::Deref16,
                    VarType::I32 => OpCode::Deref32,
                    VarType::Str => {
                        return Err(XvmError::Resolve(format!(
                            "'{name}' is a string; cannot be dereferenced with push $"
                        )));
                    }
                };
                let header = isa::encode_header(AddressingMode::Stk, AddressingMode::None, op);
                p.code[header_offset] = header[0];
                p.code[header_offset + 1] = header[1];
                continue;
            }

            let delta = address - arg_offset as i32;
            let value = if pic { delta.abs() } else { address };
            let existing = isa::read_i32_le(&p.code[arg_offset..arg_offset + 4]);
            isa::write_i32_le(&mut p.code[arg_offset..arg_offset + 4], existing + value);

            if mention.arg_ordinal == 0 {
                continue;
            }
            let header_offset = if mention.arg_ordinal == 2 {
                arg_offset - 6
            } else {
                arg_offset - 2
            };
            let mode = if !pic {
                AddressingMode::Abs
            } else if delta >= 0 {
                AddressingMode::Pro
            } else {
                AddressingMode::Nro
            };
            patch_addressing_mode(&mut p.code, header_offset, mention.arg_ordinal, mode);
        }
    }

    Ok(())
}
