//! Multi-object linking: concatenate code sections, rebase symbols and
//! relocations, and resolve cross-object references. Grounded on
//! `original_source/src/linker.cc`.
//!
//! [`crate::reloc::SymbolMention::code_offset`] is the offset of the 4-byte
//! argument slot itself (not the instruction header); the header sits 2
//! bytes before that slot when `arg_ordinal == 1`, 6 bytes before it when
//! `arg_ordinal == 2` (the original hardcodes these same offsets — a
//! two-immediate instruction's first argument is always 4 bytes). Unlike the
//! assembler's own label/variable patch passes, which add onto a
//! constant-folded `+expr`/`-expr` already sitting in the slot, the linker
//! overwrites the slot outright: at link time it holds only the assembler's
//! placeholder bytes for an as-yet-unresolved extern. `arg_ordinal == 0`
//! marks a mention that is itself part of such an expression and must not
//! rewrite any addressing-mode nibble.

use crate::config::Config;
use crate::executable::{Executable, Section, SectionType};
use crate::error::XvmError;
use crate::isa::{self, AddressingMode};
use crate::reloc::{RelocationEntry, RelocationTable, SymbolMention};
use crate::symtab::{Symbol, SymbolTable};

fn patch_addressing_mode(code: &mut [u8], header_offset: usize, slot: u8, mode: AddressingMode) {
    let flags_byte = code[header_offset];
    code[header_offset] = match slot {
        1 => (flags_byte & 0x0F) | ((mode as u8) << 4),
        2 => (flags_byte & 0xF0) | (mode as u8),
        _ => flags_byte,
    };
}

/// Patch one resolved mention's argument bytes and, unless `arg_ordinal ==
/// 0`, its addressing-mode nibble, in place. Unlike the assembler's own
/// label/variable patch passes (which add onto a constant-folded
/// `+expr`/`-expr` already sitting in the slot), this overwrites the slot
/// outright — at link time the slot holds only the assembler's placeholder
/// for the as-yet-unresolved extern, per `original_source/src/linker.cc`.
fn patch_mention(code: &mut [u8], mention: &SymbolMention, symbol_address: i32, pic: bool) {
    let arg_offset = mention.code_offset as usize;

    let value = if pic {
        (symbol_address - arg_offset as i32).abs()
    } else {
        symbol_address
    };
    isa::write_i32_le(&mut code[arg_offset..arg_offset + 4], value);

    if mention.arg_ordinal != 0 {
        let header_offset = if mention.arg_ordinal == 2 {
            arg_offset - 6
        } else {
            arg_offset - 2
        };
        let mode = if !pic {
            AddressingMode::Abs
        } else if symbol_address >= arg_offset as i32 {
            AddressingMode::Pro
        } else {
            AddressingMode::Nro
        };
        patch_addressing_mode(code, header_offset, mention.arg_ordinal, mode);
    }
}

/// Concatenate `objects`' code sections and resolve symbol references
/// across them. Relocations whose label is still undefined after merging
/// all objects are kept in the output for a further linking pass.
pub fn link(objects: &[Executable], config: &Config) -> Result<Executable, XvmError> {
    if objects.is_empty() {
        return Err(XvmError::Link("no objects to link".into()));
    }

    let mut code = Vec::new();
    let mut symbols = SymbolTable::new();
    let mut relocations = RelocationTable::new();

    for object in objects {
        let base = code.len() as i32;

        let code_section = object
            .section("code")
            .ok_or_else(|| XvmError::Link("object missing a code section".to_string()))?;
        code.extend_from_slice(&code_section.data);

        let symbols_section = object
            .section("symbols")
            .ok_or_else(|| XvmError::Link("MissingSymbolsSection: object has no symbols section".to_string()))?;
        for sym in SymbolTable::from_section(symbols_section)?.symbols {
            merge_symbol(&mut symbols, sym, base)?;
        }

        let relocations_section = object.section("relocations").ok_or_else(|| {
            XvmError::Link("MissingRelocationsSection: object has no relocations section".to_string())
        })?;
        for entry in RelocationTable::from_section(relocations_section)?.relocations {
            let rebased = RelocationEntry {
                label: entry.label,
                mentions: entry
                    .mentions
                    .into_iter()
                    .map(|m| SymbolMention {
                        code_offset: m.code_offset + base,
                        arg_ordinal: m.arg_ordinal,
                    })
                    .collect(),
            };
            relocations.entry_mut(&rebased.label).mentions.extend(rebased.mentions);
        }
    }

    let pic = config.as_bool("pic");
    let mut unresolved = RelocationTable::new();

    for entry in &relocations.relocations {
        match symbols.by_label(&entry.label).filter(|s| !s.is_extern()) {
            Some(sym) => {
                let address = sym.address;
                for mention in &entry.mentions {
                    patch_mention(&mut code, mention, address, pic);
                }
            }
            None => {
                unresolved
                    .entry_mut(&entry.label)
                    .mentions
                    .extend(entry.mentions.iter().copied());
            }
        }
    }

    let mut out = Executable::new();
    out.sections.push(Section::new("code", SectionType::Code, code));
    out.sections.push(symbols.to_section("symbols"));
    out.sections.push(unresolved.to_section("relocations"));

    Ok(out)
}

/// Merge one object's symbol, offsetting its address by that object's code
/// base. An `EXTERN` symbol is dropped in favor of a same-label symbol that
/// is already resolved (defined) elsewhere, matching
/// `original_source/src/linker.cc`'s extern-resolution pass. Two non-EXTERN
/// symbols sharing a label is a `DuplicateDefinition` error, not a silent
/// first-wins merge.
fn merge_symbol(table: &mut SymbolTable, sym: Symbol, base: i32) -> Result<(), XvmError> {
    let address = if sym.is_extern() { sym.address } else { sym.address + base };

    if let Some(existing_idx) = table.symbols.iter().position(|s| s.label == sym.label) {
        let existing_is_defined = !table.symbols[existing_idx].is_extern();
        let incoming_is_defined = !sym.is_extern();
        match (existing_is_defined, incoming_is_defined) {
            (true, true) => {
                return Err(XvmError::Link(format!(
                    "DuplicateDefinition: '{}' is defined in more than one object",
                    sym.label
                )));
            }
            (true, false) => {} // keep the already-defined symbol over the incoming extern
            (false, true) => table.symbols[existing_idx] = Symbol { address, ..sym },
            (false, false) => {} // both extern, keep the first
        }
        return Ok(());
    }

    table.add(address, sym.label, sym.flags, sym.size);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::{AddressingMode as M, OpCode as O, encode_header, write_i32_le};
    use crate::symtab::flags;

    fn obj_with_call_to(label: &str, target_local: Option<i32>) -> Executable {
        // call label; halt
        let mut code = Vec::new();
        code.extend_from_slice(&encode_header(M::Imm, M::None, O::Call));
        let mut buf = [0u8; 4];
        write_i32_le(&mut buf, 0);
        code.extend_from_slice(&buf);
        code.extend_from_slice(&encode_header(M::None, M::None, O::Halt));

        let mut exe = Executable::new();
        let mut syms = SymbolTable::new();
        let mut relocs = RelocationTable::new();

        if let Some(target) = target_local {
            syms.add(target, label, flags::LABEL | flags::PROCEDURE, 0);
        } else {
            syms.add(0, label, flags::LABEL | flags::EXTERN, 0);
            relocs.entry_mut(label).mentions.push(SymbolMention {
                code_offset: 2,
                arg_ordinal: 1,
            });
        }

        exe.sections
            .push(Section::new("code", SectionType::Code, code));
        exe.sections.push(syms.to_section("symbols"));
        exe.sections.push(relocs.to_section("relocations"));
        exe
    }

    #[test]
    fn resolves_extern_call_against_another_objects_definition() {
        let caller = obj_with_call_to("target", None);
        // callee: target: push 1; ret
        let mut callee_code = Vec::new();
        callee_code.extend_from_slice(&encode_header(M::Imm, M::None, O::Push));
        let mut buf = [0u8; 4];
        write_i32_le(&mut buf, 1);
        callee_code.extend_from_slice(&buf);
        callee_code.extend_from_slice(&encode_header(M::None, M::None, O::Ret));

        let mut callee = Executable::new();
        let mut syms = SymbolTable::new();
        syms.add(0, "target", flags::LABEL | flags::PROCEDURE, 0);
        callee
            .sections
            .push(Section::new("code", SectionType::Code, callee_code));
        callee.sections.push(syms.to_section("symbols"));
        callee.sections.push(RelocationTable::new().to_section("relocations"));

        let config = Config::new();
        let linked = link(&[caller, callee], &config).unwrap();

        // The linker always emits all three sections, even an empty relocations one.
        let relocs =
            RelocationTable::from_section(linked.section("relocations").unwrap()).unwrap();
        assert!(relocs.relocations.is_empty());
        let syms = SymbolTable::from_section(linked.section("symbols").unwrap()).unwrap();
        assert_eq!(syms.by_label("target").unwrap().address, 8);
    }

    #[test]
    fn leaves_unresolved_relocations_for_a_later_link() {
        let caller = obj_with_call_to("still_missing", None);
        let config = Config::new();
        let linked = link(&[caller], &config).unwrap();
        let relocs =
            RelocationTable::from_section(linked.section("relocations").unwrap()).unwrap();
        assert_eq!(relocs.relocations.len(), 1);
        assert_eq!(relocs.relocations[0].label, "still_missing");
    }
}
