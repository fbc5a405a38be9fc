use xvm_core::assembler;
use xvm_core::config::Config;
use xvm_core::loader;
use xvm_core::vm::Vm;

#[test]
fn counts_up_to_three_and_stops() {
    let config = Config::new();
    let source = "push 0\nloop:\n  dup\n  push 3\n  equ\n  jumpt end\n  push 1\n  add\n  jump loop\nend:\n  halt\n";
    let exe = assembler::assemble(source, "loop", &config).unwrap();

    let mut vm = Vm::new(2048);
    loader::load(&mut vm, &exe, &config).unwrap();
    vm.run().unwrap();

    assert_eq!(vm.data.peek(0).unwrap(), 3);
    assert!(vm.data.len() >= 1);
}
