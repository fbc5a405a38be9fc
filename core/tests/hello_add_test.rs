use xvm_core::assembler;
use xvm_core::config::Config;
use xvm_core::loader;
use xvm_core::vm::Vm;

#[test]
fn push_two_push_three_add_leaves_five() {
    let config = Config::new();
    let exe = assembler::assemble("push 2\npush 3\nadd\nhalt\n", "hello_add", &config).unwrap();

    let mut vm = Vm::new(2048);
    loader::load(&mut vm, &exe, &config).unwrap();
    vm.run().unwrap();

    assert_eq!(vm.data.peek(0).unwrap(), 5);
}
