use xvm_core::assembler;
use xvm_core::config::Config;
use xvm_core::isa::{self, AddressingMode};

#[test]
fn jump_to_a_forward_label_patches_a_pro_relative_displacement() {
    let config = Config::new();
    assert!(config.as_bool("pic"));

    let source = "jump target\nnop\ntarget:\n  halt\n";
    let exe = assembler::assemble(source, "pic_roundtrip", &config).unwrap();
    let code = &exe.section("code").unwrap().data;

    // jump target -> [header][4-byte slot], then nop -> [header], then target: halt.
    let arg_offset = 2usize;
    let target_address = 2 + 4 + 2;

    let (mode1, _, _) = isa::decode_header([code[0], code[1]]);
    assert_eq!(mode1, AddressingMode::Pro);

    let value = isa::read_i32_le(&code[arg_offset..arg_offset + 4]);
    assert_eq!(value, (target_address - arg_offset) as i32);
}
