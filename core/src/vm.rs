//! The fetch-decode-execute loop. Grounded on
//! `original_source/src/vm.cc`, with one correction: the original's
//! `executeInstruction` dispatches on stale addressing-mode names
//! (`IMM1`/`IMM2`/`IND`) that disagree with the canonical `AddressingMode`
//! enum in `bytecode.h`; the per-opcode table in spec.md §4.6 is authoritative
//! here, not that drift.

use crate::bus::Bus;
use crate::device::Ram;
use crate::error::XvmError;
use crate::isa::{self, AddressingMode, OpCode};
use crate::stack::{DEFAULT_DEPTH, Stack};
use crate::symtab::SymbolTable;
use crate::syscall::SyscallTable;

pub struct Vm {
    pub ip: u32,
    pub data: Stack<i32>,
    pub call_stack: Stack<u32>,
    pub bus: Bus,
    pub symbols: Option<SymbolTable>,
    pub running: bool,
    pub debug: u32,
    syscalls: Option<SyscallTable>,
}

impl Vm {
    /// Construct a VM with its own RAM device bound at address 0, matching
    /// `original_source/src/vm.cc`'s constructor, which owns a RAM region
    /// sized from the `ram-size` config key.
    pub fn new(ram_size: usize) -> Self {
        let mut bus = Bus::new();
        bus.bind(0, ram_size as u32, Box::new(Ram::new(ram_size)))
            .expect("fresh bus cannot have an overlapping RAM binding");
        Self {
            ip: 0,
            data: Stack::new(DEFAULT_DEPTH),
            call_stack: Stack::new(DEFAULT_DEPTH),
            bus,
            symbols: None,
            running: false,
            debug: 0,
            syscalls: Some(SyscallTable::new()),
        }
    }

    pub fn load_region(&mut self, base: u32, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            self.bus.write(base + i as u32, b);
        }
    }

    pub fn load_symbols(&mut self, symbols: SymbolTable) {
        self.symbols = Some(symbols);
    }

    pub fn register_syscall(
        &mut self,
        number: i32,
        name: impl Into<String>,
        handler: crate::syscall::Handler,
    ) {
        self.syscalls
            .as_mut()
            .expect("syscall table always present between calls")
            .register(number, name, handler);
    }

    pub fn reset(&mut self) {
        self.data.clear();
        self.call_stack.clear();
        self.ip = 0;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Run until HALT, an out-of-range instruction pointer, or a runtime
    /// error.
    pub fn run(&mut self) -> Result<(), XvmError> {
        self.running = true;
        while self.running {
            if self.ip >= self.bus.max_addr() {
                self.running = false;
                break;
            }
            self.step()?;
        }
        Ok(())
    }

    fn fetch_byte(&mut self) -> u8 {
        let b = self.bus.read(self.ip);
        self.ip += 1;
        b
    }

    /// Read the literal 4-byte argument inline in the code stream and
    /// advance `ip` past it.
    fn fetch_inline_i32(&mut self) -> i32 {
        let bytes = [
            self.bus.read(self.ip),
            self.bus.read(self.ip + 1),
            self.bus.read(self.ip + 2),
            self.bus.read(self.ip + 3),
        ];
        self.ip += 4;
        isa::read_i32_le(&bytes)
    }

    /// Resolve an argument to a raw address (no extra dereference for ABS).
    fn fetch_address(&mut self, mode: AddressingMode) -> Result<i32, XvmError> {
        match mode {
            AddressingMode::Stk => self.data.pop(),
            AddressingMode::Imm | AddressingMode::Abs => Ok(self.fetch_inline_i32()),
            AddressingMode::Pro => {
                let d = self.fetch_inline_i32();
                Ok(self.ip as i32 + d - 4)
            }
            AddressingMode::Nro => {
                let d = self.fetch_inline_i32();
                Ok(self.ip as i32 - d - 4)
            }
            AddressingMode::None => Err(XvmError::Runtime(
                "opcode requires an argument but mode is NONE".into(),
            )),
        }
    }

    /// Resolve an argument to a value: identical to `fetch_address` except
    /// ABS additionally dereferences the bus at the literal address, per
    /// spec.md §4.6.
    fn fetch_value(&mut self, mode: AddressingMode) -> Result<i32, XvmError> {
        if mode == AddressingMode::Abs {
            let addr = self.fetch_inline_i32();
            return Ok(self.bus.read32(addr as u32) as i32);
        }
        self.fetch_address(mode)
    }

    fn read_n(&mut self, addr: i32, width: u8) -> i32 {
        let addr = addr as u32;
        match width {
            8 => self.bus.read(addr) as i8 as i32,
            16 => self.bus.read16(addr) as i16 as i32,
            32 => self.bus.read32(addr) as i32,
            _ => unreachable!(),
        }
    }

    fn write_n(&mut self, addr: i32, value: i32, width: u8) {
        let addr = addr as u32;
        match width {
            8 => self.bus.write(addr, value as u8),
            16 => self.bus.write16(addr, value as u16),
            32 => self.bus.write32(addr, value as u32),
            _ => unreachable!(),
        }
    }

    fn step(&mut self) -> Result<(), XvmError> {
        let start_ip = self.ip;
        let flags = self.fetch_byte();
        let raw_op = self.fetch_byte();
        let mode1 = isa::extract_mode1(flags);
        let mode2 = isa::extract_mode2(flags);
        let op = OpCode::from_u8(raw_op)
            .ok_or_else(|| XvmError::Runtime(format!("unknown opcode 0x{raw_op:x}")))?;

        if self.debug > 0 {
            tracing::trace!(ip = start_ip, op = %op, mode1 = ?mode1, mode2 = ?mode2, "step");
        }

        self.execute(op, mode1, mode2)
    }

    fn execute(
        &mut self,
        op: OpCode,
        mode1: AddressingMode,
        mode2: AddressingMode,
    ) -> Result<(), XvmError> {
        use OpCode::*;
        match op {
            Nop => {}
            Halt => self.running = false,
            Reset => self.reset(),
            Ret => {
                self.ip = self.call_stack.pop()?;
            }
            Push => {
                let v = self.fetch_value(mode1)?;
                self.data.push(v)?;
            }
            Pop => {
                let n = if mode1 == AddressingMode::None {
                    1
                } else {
                    self.fetch_value(mode1)?
                };
                for _ in 0..n {
                    self.data.pop()?;
                }
            }
            Dup => {
                let top = self.data.peek(0)?;
                self.data.push(top)?;
            }
            Rol => {
                let top = self.data.pop()?;
                let second = self.data.pop()?;
                self.data.push(top)?;
                self.data.push(second)?;
            }
            Rol3 => {
                let a = self.data.pop()?;
                let b = self.data.pop()?;
                let c = self.data.pop()?;
                self.data.push(a)?;
                self.data.push(b)?;
                self.data.push(c)?;
            }
            Deref8 | Load8 => self.do_deref(mode1, 8)?,
            Deref16 | Load16 => self.do_deref(mode1, 16)?,
            Deref32 | Load32 => self.do_deref(mode1, 32)?,
            Store8 => self.do_store(mode1, mode2, 8)?,
            Store16 => self.do_store(mode1, mode2, 16)?,
            Store32 => self.do_store(mode1, mode2, 32)?,
            Add => self.binary_op(mode1, mode2, |x, y| Ok(y.wrapping_add(x)))?,
            Sub => self.binary_op(mode1, mode2, |x, y| Ok(y.wrapping_sub(x)))?,
            Mul => self.binary_op(mode1, mode2, |x, y| Ok(y.wrapping_mul(x)))?,
            Div => self.binary_op(mode1, mode2, |x, y| {
                if x == 0 {
                    Err(XvmError::Runtime("division by zero".into()))
                } else {
                    Ok(y.wrapping_div(x))
                }
            })?,
            Equ => self.binary_op(mode1, mode2, |x, y| Ok((y == x) as i32))?,
            Lt => self.binary_op(mode1, mode2, |x, y| Ok((y < x) as i32))?,
            Gt => self.binary_op(mode1, mode2, |x, y| Ok((y > x) as i32))?,
            And => self.binary_op(mode1, mode2, |x, y| Ok(y & x))?,
            Or => self.binary_op(mode1, mode2, |x, y| Ok(y | x))?,
            Shl => {
                let k = self.fetch_value(mode1)?;
                let value = self.data.pop()?;
                self.data.push(value.wrapping_shl(k as u32))?;
            }
            Shr => {
                let k = self.fetch_value(mode1)?;
                let value = self.data.pop()?;
                self.data.push(value.wrapping_shr(k as u32))?;
            }
            Inc => {
                let addr = self.fetch_address(mode1)?;
                let value = self.read_n(addr, 32);
                self.data.push(value.wrapping_add(1))?;
            }
            Dec => {
                let addr = self.fetch_address(mode1)?;
                let value = self.read_n(addr, 32);
                self.data.push(value.wrapping_sub(1))?;
            }
            Jump => {
                let target = self.fetch_address(mode1)?;
                self.ip = target as u32;
            }
            Jumpt => {
                let target = self.fetch_address(mode1)?;
                if self.data.pop()? != 0 {
                    self.ip = target as u32;
                }
            }
            Jumpf => {
                let target = self.fetch_address(mode1)?;
                if self.data.pop()? == 0 {
                    self.ip = target as u32;
                }
            }
            Call => {
                let target = self.fetch_address(mode1)?;
                self.call_stack.push(self.ip)?;
                self.ip = target as u32;
            }
            Syscall => {
                let n = self.fetch_value(mode1)?;
                let mut table = self
                    .syscalls
                    .take()
                    .expect("syscall table always present between calls");
                let result = table.invoke(n, self);
                self.syscalls = Some(table);
                result?;
            }
        }
        Ok(())
    }

    fn do_deref(&mut self, mode: AddressingMode, width: u8) -> Result<(), XvmError> {
        let addr = self.fetch_address(mode)?;
        let value = self.read_n(addr, width);
        self.data.push(value)
    }

    /// `mode1` is the address slot, `mode2` the value slot — see DESIGN.md
    /// for why this ordering was chosen over the alternative reading of
    /// spec.md §4.6's STORE row.
    fn do_store(
        &mut self,
        mode1: AddressingMode,
        mode2: AddressingMode,
        width: u8,
    ) -> Result<(), XvmError> {
        let addr = self.fetch_address(mode1)?;
        let value = self.fetch_value(mode2)?;
        self.write_n(addr, value, width);
        Ok(())
    }

    fn binary_op(
        &mut self,
        mode1: AddressingMode,
        mode2: AddressingMode,
        f: impl Fn(i32, i32) -> Result<i32, XvmError>,
    ) -> Result<(), XvmError> {
        let x = self.fetch_value(mode1)?;
        let y = self.fetch_value(mode2)?;
        self.data.push(f(x, y)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::{AddressingMode as M, OpCode as O, encode_header, write_i32_le};

    fn assemble_raw(instrs: &[(M, M, O, Option<i32>, Option<i32>)]) -> Vec<u8> {
        let mut out = Vec::new();
        for &(m1, m2, op, a1, a2) in instrs {
            out.extend_from_slice(&encode_header(m1, m2, op));
            if let Some(v) = a1 {
                let mut buf = [0u8; 4];
                write_i32_le(&mut buf, v);
                out.extend_from_slice(&buf);
            }
            if let Some(v) = a2 {
                let mut buf = [0u8; 4];
                write_i32_le(&mut buf, v);
                out.extend_from_slice(&buf);
            }
        }
        out
    }

    #[test]
    fn hello_add() {
        let code = assemble_raw(&[
            (M::Imm, M::None, O::Push, Some(2), None),
            (M::Imm, M::None, O::Push, Some(3), None),
            (M::Stk, M::Stk, O::Add, None, None),
            (M::None, M::None, O::Halt, None, None),
        ]);
        let mut vm = Vm::new(256);
        vm.load_region(0, &code);
        vm.run().unwrap();
        assert_eq!(vm.data.as_slice(), &[5]);
    }

    #[test]
    fn store_then_load_round_trips() {
        let code = assemble_raw(&[
            (M::Imm, M::Imm, O::Store32, Some(100), Some(0xCAFE_BABEu32 as i32)),
            (M::Imm, M::None, O::Load32, Some(100), None),
            (M::None, M::None, O::Halt, None, None),
        ]);
        let mut vm = Vm::new(256);
        vm.load_region(0, &code);
        vm.run().unwrap();
        assert_eq!(vm.data.as_slice(), &[0xCAFE_BABEu32 as i32]);
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let code = assemble_raw(&[
            (M::Imm, M::None, O::Push, Some(10), None),
            (M::Imm, M::None, O::Push, Some(0), None),
            (M::Stk, M::Stk, O::Div, None, None),
        ]);
        let mut vm = Vm::new(256);
        vm.load_region(0, &code);
        assert!(vm.run().is_err());
    }

    #[test]
    fn call_ret_round_trips() {
        // call f; halt; f: push 7; ret
        let code = assemble_raw(&[
            (M::Imm, M::None, O::Call, Some(10), None),
            (M::None, M::None, O::Halt, None, None),
            (M::Imm, M::None, O::Push, Some(7), None),
            (M::None, M::None, O::Ret, None, None),
        ]);
        let mut vm = Vm::new(256);
        vm.load_region(0, &code);
        vm.run().unwrap();
        assert_eq!(vm.data.as_slice(), &[7]);
        assert!(vm.call_stack.is_empty());
    }
}
