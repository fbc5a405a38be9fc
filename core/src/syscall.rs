//! Host-provided routine registry. Grounded on
//! `original_source/include/syscalls.h` / `src/syscalls.cc`: the numbering
//! below is the concrete default a host installs handlers under, not a
//! requirement the core itself enforces.
//!
//! Core does not come with working `putc`/`readc`/... implementations —
//! those are a host (`xvm-cli`) concern — it only defines the mechanism.

use crate::error::XvmError;
use crate::vm::Vm;
use std::collections::HashMap;

pub mod numbers {
    pub const PUTC: i32 = 20;
    pub const READC: i32 = 21;
    pub const READL: i32 = 22;
    pub const OPEN: i32 = 30;
    pub const CLOSE: i32 = 31;
    pub const READ: i32 = 32;
    pub const WRITE: i32 = 33;
    pub const SLEEP: i32 = 50;
    pub const FSCTL: i32 = 60;
    pub const VMCTL: i32 = 70;
    pub const SYSCTL: i32 = 80;
    pub const BREAKPOINT: i32 = 90;
    pub const INIT_VIDEO: i32 = 100;
}

pub type Handler = Box<dyn FnMut(&mut Vm) -> Result<(), XvmError>>;

struct Entry {
    name: String,
    handler: Handler,
}

#[derive(Default)]
pub struct SyscallTable {
    entries: HashMap<i32, Entry>,
}

impl SyscallTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, number: i32, name: impl Into<String>, handler: Handler) {
        self.entries.insert(
            number,
            Entry {
                name: name.into(),
                handler,
            },
        );
    }

    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.entries.get(&number).map(|e| e.name.as_str())
    }

    /// Invoke the handler registered at `number`. `vm` is passed back in
    /// separately because the table itself is normally owned by the `Vm`
    /// it services; callers must take the table out of the `Vm` for the
    /// duration of the call (see [`Vm::syscall`]).
    pub fn invoke(&mut self, number: i32, vm: &mut Vm) -> Result<(), XvmError> {
        match self.entries.get_mut(&number) {
            Some(entry) => (entry.handler)(vm),
            None => Err(XvmError::Runtime(format!("unknown syscall {number}"))),
        }
    }
}
