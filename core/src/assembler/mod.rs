//! Two-pass assembler: tokenize, parse into code + label/variable mention
//! records, patch labels then variables, emit sections. Grounded on
//! `original_source/src/assembler.cc` / `include/assembler.h`, reworked from
//! a single index-mutating token-stream walk into a small hand-rolled
//! recursive-descent parser plus two explicit patch passes.

pub mod lexer;
mod parser;
mod patch;
pub mod token;

use crate::config::Config;
use crate::error::XvmError;
use crate::executable::{Executable, Section, SectionType};
use crate::reloc::{RelocationTable, SymbolMention};
use crate::symtab::{SymbolTable, flags};

/// Supplies `%include` contents by name. The core assembler does no
/// filesystem I/O itself — `xvm-cli` implements this against `-i` search
/// directories and the current working directory.
///
/// Returns the content alongside a canonical key identifying the resolved
/// file; the parser dedups repeat `%include`s of the same file by that key,
/// not by the literal spelling used in the directive, so `%include foo.inc`
/// and a later `%include ./foo.inc` that land on the same file include it
/// only once.
pub trait IncludeResolver {
    fn resolve(&mut self, name: &str) -> Option<(String, String)>;
}

/// An assembler that rejects every `%include`, for callers (tests, `dump`)
/// that don't need one.
pub struct NoIncludes;

impl IncludeResolver for NoIncludes {
    fn resolve(&mut self, _name: &str) -> Option<(String, String)> {
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum VarType {
    I8,
    I16,
    I32,
    Str,
}

impl VarType {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "i8" => Some(Self::I8),
            "i16" => Some(Self::I16),
            "i32" => Some(Self::I32),
            "str" => Some(Self::Str),
            _ => None,
        }
    }

    fn byte_size(self, count: i32) -> i32 {
        match self {
            Self::I8 => count,
            Self::I16 => count * 2,
            Self::I32 => count * 4,
            Self::Str => count + 1,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct LabelMention {
    pub code_offset: i32,
    pub arg_ordinal: u8,
}

pub(crate) struct Label {
    pub address: i32,
    pub is_procedure: bool,
    pub mentions: Vec<LabelMention>,
}

impl Default for Label {
    fn default() -> Self {
        Self {
            address: -1,
            is_procedure: false,
            mentions: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct VarMention {
    pub code_offset: i32,
    pub arg_ordinal: u8,
    pub is_deref: bool,
}

pub(crate) struct Variable {
    pub address: i32,
    pub kind: VarType,
    pub count: i32,
    pub mentions: Vec<VarMention>,
}

/// Assemble `source` with no `%include` support.
pub fn assemble(source: &str, filename: &str, config: &Config) -> Result<Executable, XvmError> {
    assemble_with_includes(source, filename, config, &mut NoIncludes)
}

pub fn assemble_with_includes(
    source: &str,
    filename: &str,
    config: &Config,
    includes: &mut dyn IncludeResolver,
) -> Result<Executable, XvmError> {
    let tokens: Vec<token::Token> = lexer::tokenize(source, filename)?
        .into_iter()
        .filter(|t| !t.is_newline())
        .collect();

    let mut p = parser::Parser::new(tokens, filename, includes);
    p.parse()?;

    let pic = config.as_bool("pic");
    patch::patch_labels(&mut p, pic)?;
    patch::patch_variables(&mut p, pic)?;

    let mut exe = Executable::new();
    exe.sections
        .push(Section::new("code", SectionType::Code, p.code));

    let mut table = SymbolTable::new();
    let mut relocations = RelocationTable::new();

    let mut names: Vec<String> = p.labels.keys().cloned().collect();
    names.sort();

    for name in names {
        if !p.export_all && !p.exported.iter().any(|e| e == &name) {
            continue;
        }
        let label = &p.labels[&name];

        let mut sym_flags = if label.is_procedure {
            flags::PROCEDURE
        } else {
            flags::LABEL
        };
        let mut size = 0u16;

        if let Some(var) = p.variables.get(&name) {
            sym_flags |= flags::VARIABLE;
            size = var.kind.byte_size(var.count) as u16;
        }

        if p.externs.iter().any(|e| e == &name) {
            sym_flags |= flags::EXTERN;
            let entry = relocations.entry_mut(&name);
            entry
                .mentions
                .extend(label.mentions.iter().map(|m| SymbolMention {
                    code_offset: m.code_offset,
                    arg_ordinal: m.arg_ordinal,
                }));
        }

        table.add(label.address, name, sym_flags, size);
    }

    if config.as_bool("include-symbols") {
        exe.sections.push(table.to_section("symbols"));
    }
    if !relocations.relocations.is_empty() {
        exe.sections.push(relocations.to_section("relocations"));
    }

    Ok(exe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::disassemble;

    #[test]
    fn hello_add_assembles_to_expected_shape() {
        let source = "push 2\npush 3\nadd\nhalt\n";
        let exe = assemble(source, "t.asm", &Config::new()).unwrap();
        let code = &exe.section("code").unwrap().data;
        let lines = disassemble(code);
        assert_eq!(lines.len(), 4);
        assert!(lines[2].contains("add"));
    }

    #[test]
    fn exported_label_appears_in_symbol_table() {
        let source = "%export main\nmain:\n  halt\n";
        let exe = assemble(source, "t.asm", &Config::new()).unwrap();
        let table = SymbolTable::from_section(exe.section("symbols").unwrap()).unwrap();
        assert_eq!(table.by_label("main").unwrap().address, 0);
    }

    #[test]
    fn unresolved_extern_emits_a_relocation() {
        let source = "%extern target\n%export target\ncall target\nhalt\n";
        let exe = assemble(source, "t.asm", &Config::new()).unwrap();
        let relocs =
            RelocationTable::from_section(exe.section("relocations").unwrap()).unwrap();
        assert_eq!(relocs.relocations[0].label, "target");
    }
}
