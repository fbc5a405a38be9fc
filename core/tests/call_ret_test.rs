use xvm_core::assembler;
use xvm_core::config::Config;
use xvm_core::loader;
use xvm_core::vm::Vm;

#[test]
fn call_into_a_procedure_and_return_leaves_its_result() {
    let config = Config::new();
    let source = "call f\nhalt\nf:\n  push 7\n  ret\n";
    let exe = assembler::assemble(source, "call_ret", &config).unwrap();

    let mut vm = Vm::new(2048);
    loader::load(&mut vm, &exe, &config).unwrap();
    vm.run().unwrap();

    assert_eq!(vm.data.peek(0).unwrap(), 7);
    assert!(vm.call_stack.is_empty());
}
