use xvm_core::assembler;
use xvm_core::config::Config;
use xvm_core::linker;

#[test]
fn two_objects_with_mutual_externs_merge_with_no_externs_left() {
    let config = Config::new();

    // `bar`/`foo` must each be %export'd even where they are only %extern'd
    // here: the export filter runs before extern handling when a label's
    // symbol/relocation entries are emitted, so an un-exported extern gets
    // no relocation entry at all and could never be resolved by the linker.
    let a = assembler::assemble(
        "%export foo bar\n%extern bar\nfoo:\n  call bar\n  halt\n",
        "a",
        &config,
    )
    .unwrap();
    let b = assembler::assemble(
        "%export bar foo\n%extern foo\nbar:\n  call foo\n  ret\n",
        "b",
        &config,
    )
    .unwrap();

    let linked = linker::link(&[a, b], &config).unwrap();

    // The linker always emits all three sections; with both externs resolved
    // here the relocations section is present but empty.
    let relocations =
        xvm_core::reloc::RelocationTable::from_section(linked.section("relocations").unwrap())
            .unwrap();
    assert!(relocations.relocations.is_empty());

    let symbols =
        xvm_core::symtab::SymbolTable::from_section(linked.section("symbols").unwrap()).unwrap();
    let foo = symbols.by_label("foo").unwrap();
    let bar = symbols.by_label("bar").unwrap();
    assert!(!foo.is_extern());
    assert!(!bar.is_extern());
}
