//! Host-side syscall handlers. Grounded on
//! `original_source/src/syscalls.cc` / `include/syscalls.h` for both the
//! numbering (re-exported from `xvm_core::syscall::numbers`) and each
//! syscall's stack effect, documented there as `[args] -> [results]` with
//! the rightmost argument on top of the stack.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::rc::Rc;

use xvm_core::error::XvmError;
use xvm_core::syscall::numbers;
use xvm_core::vm::Vm;

/// Host file handles opened by the `open` syscall, keyed by the handle
/// returned to the guest. 0/1/2 are reserved for stdin/stdout/stderr and
/// never appear here since `putc`/`readc` talk to them directly.
#[derive(Default)]
struct FdTable {
    files: HashMap<i32, std::fs::File>,
    next: i32,
}

impl FdTable {
    fn new() -> Self {
        Self { files: HashMap::new(), next: 3 }
    }
}

/// Read a NUL-terminated string out of the guest's address space.
fn read_c_string(vm: &mut Vm, addr: i32) -> String {
    let mut bytes = Vec::new();
    let mut cursor = addr as u32;
    loop {
        let b = vm.bus.read(cursor);
        if b == 0 {
            break;
        }
        bytes.push(b);
        cursor += 1;
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn write_bytes(vm: &mut Vm, addr: i32, bytes: &[u8]) {
    let mut cursor = addr as u32;
    for &b in bytes {
        vm.bus.write(cursor, b);
        cursor += 1;
    }
}

fn open_mode_to_options(mode: i32) -> std::fs::OpenOptions {
    const RDONLY: i32 = 1;
    const WRONLY: i32 = 2;
    const RDWR: i32 = 4;
    const CREATE: i32 = 8;
    const APPEND: i32 = 16;

    let mut options = std::fs::OpenOptions::new();
    options.read(mode & (RDONLY | RDWR) != 0);
    options.write(mode & (WRONLY | RDWR) != 0);
    options.create(mode & CREATE != 0);
    options.append(mode & APPEND != 0);
    options
}

/// Install every syscall named in spec.md §4.7 onto `vm`.
pub fn install(vm: &mut Vm) {
    vm.register_syscall(numbers::PUTC, "putc", Box::new(|vm| {
        let c = vm.data.pop()?;
        print!("{}", c as u8 as char);
        let _ = std::io::stdout().flush();
        Ok(())
    }));

    vm.register_syscall(numbers::READC, "readc", Box::new(|vm| {
        let mut byte = [0u8; 1];
        let n = std::io::stdin().read(&mut byte).unwrap_or(0);
        let value = if n == 0 { -1 } else { byte[0] as i32 };
        vm.data.push(value)
    }));

    vm.register_syscall(numbers::READL, "readl", Box::new(|vm| {
        let len = vm.data.pop()?;
        let addr = vm.data.pop()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).unwrap_or(0);
        let trimmed = line.trim_end_matches(['\n', '\r']);
        let max = (len.max(0) as usize).saturating_sub(1);
        let mut bytes = trimmed.as_bytes()[..trimmed.len().min(max)].to_vec();
        bytes.push(0);
        write_bytes(vm, addr, &bytes);
        Ok(())
    }));

    let fds = Rc::new(RefCell::new(FdTable::new()));

    {
        let fds = fds.clone();
        vm.register_syscall(numbers::OPEN, "open", Box::new(move |vm| {
            let mode = vm.data.pop()?;
            let filename_addr = vm.data.pop()?;
            let filename = read_c_string(vm, filename_addr);
            let mut table = fds.borrow_mut();
            match open_mode_to_options(mode).open(&filename) {
                Ok(file) => {
                    let handle = table.next;
                    table.next += 1;
                    table.files.insert(handle, file);
                    vm.data.push(handle)
                }
                Err(_) => vm.data.push(-1),
            }
        }));
    }

    {
        let fds = fds.clone();
        vm.register_syscall(numbers::CLOSE, "close", Box::new(move |vm| {
            let handle = vm.data.pop()?;
            fds.borrow_mut().files.remove(&handle);
            Ok(())
        }));
    }

    {
        let fds = fds.clone();
        vm.register_syscall(numbers::READ, "read", Box::new(move |vm| {
            let len = vm.data.pop()?;
            let addr = vm.data.pop()?;
            let handle = vm.data.pop()?;
            let mut buf = vec![0u8; len.max(0) as usize];
            let n = {
                let mut table = fds.borrow_mut();
                match table.files.get_mut(&handle) {
                    Some(file) => file.read(&mut buf).unwrap_or(0),
                    None => 0,
                }
            };
            write_bytes(vm, addr, &buf[..n]);
            Ok(())
        }));
    }

    {
        let fds = fds.clone();
        vm.register_syscall(numbers::WRITE, "write", Box::new(move |vm| {
            let len = vm.data.pop()?;
            let addr = vm.data.pop()?;
            let handle = vm.data.pop()?;
            let mut buf = vec![0u8; len.max(0) as usize];
            let mut cursor = addr as u32;
            for b in buf.iter_mut() {
                *b = vm.bus.read(cursor);
                cursor += 1;
            }
            let mut table = fds.borrow_mut();
            if let Some(file) = table.files.get_mut(&handle) {
                let _ = file.write_all(&buf);
            }
            Ok(())
        }));
    }

    vm.register_syscall(numbers::SLEEP, "sleep", Box::new(|vm| {
        let ms = vm.data.pop()?;
        std::thread::sleep(std::time::Duration::from_millis(ms.max(0) as u64));
        Ok(())
    }));

    vm.register_syscall(numbers::BREAKPOINT, "breakpoint", Box::new(|_vm| {
        eprint!("breakpoint> ");
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        Ok(())
    }));

    for (number, name) in [
        (numbers::FSCTL, "fsctl"),
        (numbers::VMCTL, "vmctl"),
        (numbers::SYSCTL, "sysctl"),
        (numbers::INIT_VIDEO, "init_video"),
    ] {
        vm.register_syscall(number, name, Box::new(move |_vm| {
            Err(XvmError::Runtime(format!("syscall '{name}' is not implemented")))
        }));
    }
}
