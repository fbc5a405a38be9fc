use xvm_core::assembler;
use xvm_core::config::Config;
use xvm_core::loader;
use xvm_core::vm::Vm;

#[test]
fn stores_a_word_and_loads_it_back() {
    let config = Config::new();
    let source = "push 0xCAFEBABE\npush 100\nstore32\npush 100\nload32\nhalt\n";
    let exe = assembler::assemble(source, "store_load_roundtrip", &config).unwrap();

    let mut vm = Vm::new(2048);
    loader::load(&mut vm, &exe, &config).unwrap();
    vm.run().unwrap();

    assert_eq!(vm.data.peek(0).unwrap(), 0xCAFEBABEu32 as i32);
}
