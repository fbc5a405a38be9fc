//! Loads a linked [`Executable`] into a [`Vm`]'s address space. Grounded on
//! `original_source/src/loader.cc`: validate the magic, copy the code
//! section into memory at address 0, and install the symbol table whenever
//! one is present, for diagnostics — the interpreter never consults it at
//! dispatch.

use crate::config::Config;
use crate::error::XvmError;
use crate::executable::{Executable, MAGIC};
use crate::isa;
use crate::symtab::SymbolTable;
use crate::vm::Vm;

pub fn load(vm: &mut Vm, exe: &Executable, config: &Config) -> Result<(), XvmError> {
    if exe.magic != MAGIC {
        return Err(XvmError::Load(format!(
            "bad magic 0x{:08x}, expected 0x{MAGIC:08x}",
            exe.magic
        )));
    }

    let code = exe
        .section("code")
        .ok_or_else(|| XvmError::Load("executable has no code section".to_string()))?;

    if config.as_bool("hexdump") {
        tracing::debug!(bytes = code.data.len(), "loading code section");
        for (offset, chunk) in code.data.chunks(16).enumerate() {
            let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
            tracing::debug!("{:04x}: {}", offset * 16, hex.join(" "));
        }
    }
    if config.as_bool("disasm") || config.as_bool("fancy-disasm") {
        for line in isa::disassemble(&code.data) {
            tracing::info!("{line}");
        }
    }

    vm.load_region(0, &code.data);
    vm.ip = 0;

    if let Some(section) = exe.section("symbols") {
        let symbols = SymbolTable::from_section(section)?;
        if config.as_bool("print-symbol-table") {
            for sym in &symbols.symbols {
                tracing::info!(address = sym.address, label = %sym.label, "symbol");
            }
        }
        vm.load_symbols(symbols);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executable::{Section, SectionType};
    use crate::isa::{AddressingMode as M, OpCode as O, encode_header};

    #[test]
    fn rejects_bad_magic() {
        let mut exe = Executable::new();
        exe.magic = 0;
        exe.sections
            .push(Section::new("code", SectionType::Code, vec![]));
        let mut vm = Vm::new(64);
        assert!(load(&mut vm, &exe, &Config::new()).is_err());
    }

    #[test]
    fn loads_code_at_address_zero_and_runs() {
        let mut exe = Executable::new();
        let code = encode_header(M::None, M::None, O::Halt).to_vec();
        exe.sections
            .push(Section::new("code", SectionType::Code, code));

        let mut vm = Vm::new(64);
        load(&mut vm, &exe, &Config::new()).unwrap();
        vm.run().unwrap();
        assert!(!vm.running);
    }

    #[test]
    fn installs_symbol_table_even_when_include_symbols_is_off() {
        use crate::symtab::{flags, SymbolTable as Symtab};

        let mut exe = Executable::new();
        let code = encode_header(M::None, M::None, O::Halt).to_vec();
        exe.sections
            .push(Section::new("code", SectionType::Code, code));
        let mut symbols = Symtab::new();
        symbols.add(0, "start", flags::LABEL, 0);
        exe.sections.push(symbols.to_section("symbols"));

        let mut config = Config::new();
        config.set("include-symbols", "0");
        let mut vm = Vm::new(64);
        load(&mut vm, &exe, &config).unwrap();

        assert!(vm.symbols.is_some());
    }
}
