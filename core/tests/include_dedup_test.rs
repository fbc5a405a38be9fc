use xvm_core::assembler::{self, IncludeResolver};
use xvm_core::config::Config;

/// Serves one file's content under two different spellings, both of which
/// resolve to the same canonical key — the second `%include` of it should
/// be a no-op rather than duplicating its code.
struct AliasedFileResolver;

impl IncludeResolver for AliasedFileResolver {
    fn resolve(&mut self, name: &str) -> Option<(String, String)> {
        match name {
            "once.inc" | "./once.inc" => {
                Some(("/lib/once.inc".to_string(), "push 1\n".to_string()))
            }
            _ => None,
        }
    }
}

#[test]
fn including_the_same_file_twice_under_different_spellings_includes_it_once() {
    let config = Config::new();
    let source = "%include once.inc\n%include ./once.inc\nhalt\n";
    let exe = assembler::assemble_with_includes(source, "t", &config, &mut AliasedFileResolver)
        .unwrap();

    // One `push 1` (6 bytes: 2-byte header + 4-byte immediate) plus one
    // `halt` (2-byte header) — if the second `%include` had re-inserted the
    // file, the code section would be 6 bytes longer.
    let code = &exe.section("code").unwrap().data;
    assert_eq!(code.len(), 8);
}
