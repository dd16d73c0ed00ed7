//! The instrumentation inserter: the single public [`insert`] call emits,
//! for one application instruction, the recording code that writes one
//! [`WireRecord`] into the ring and advances the cursor.

pub mod operand;
pub mod regalloc;

use crate::arch::AnyRegister;
use crate::host::{HostFramework, TlsSlot};
use crate::trace::record::{OperandTag, WireOperand, WireRecord, VALS_LEN};
use operand::{registers_touched, AppInstr, AppOperand};
use regalloc::ScratchPair;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The host framework could not satisfy a reservation request against
    /// the current forbidden set.
    RegisterStarvation,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::RegisterStarvation => write!(f, "register starvation"),
        }
    }
}

impl std::error::Error for Error {}

const WORD: usize = std::mem::size_of::<u64>();
const OPERAND_SIZE: usize = std::mem::size_of::<WireOperand>();

// `core::mem::offset_of!` needs a recent toolchain; these constants derive
// the same displacements from the struct's known, `#[repr(C)]`-frozen
// field order instead.
mod layout {
    use super::WORD;

    pub const PC: usize = 0;
    pub const OPCODE: usize = WORD;
    pub const NUM_VALS: usize = 2 * WORD;
    pub const BP: usize = 3 * WORD;
    pub const VALS_START: usize = 4 * WORD;

    pub const OPERAND_TAG: usize = 0;
    pub const OPERAND_PAYLOAD: usize = WORD;

    // Payload sub-offsets, relative to `OPERAND_PAYLOAD`. Only one
    // variant is ever active per operand, matching the wire union.
    pub const REG_NAME: usize = 0;
    pub const REG_VALUE: usize = WORD;

    pub const IMM_VALUE: usize = 0;

    pub const MEM_IS_FAR: usize = 0;
    pub const MEM_ADDRESS: usize = WORD;
    pub const MEM_VALUE: usize = 2 * WORD;

    pub const IND_IS_FAR: usize = 0;
    pub const IND_BASE_NULL: usize = WORD;
    pub const IND_BASE_NAME: usize = 2 * WORD;
    pub const IND_BASE_VALUE: usize = 3 * WORD;
    pub const IND_DISP: usize = 4 * WORD;
    pub const IND_VALUE_NULL: usize = 5 * WORD;
    pub const IND_VALUE: usize = 6 * WORD;

    pub const TARGET_PC: usize = 0;
    pub const TARGET_NAME: usize = WORD;
    pub const TARGET_SP: usize = WORD + 64;
}

fn offset_val(i: usize) -> usize {
    layout::VALS_START + i * OPERAND_SIZE
}

/// Emits, before `instr`, the code that writes one full [`WireRecord`] at
/// the pointer held in `*(seg_base_reg + tls_slot)` and advances it. Uses
/// exactly two scratch registers, reserved and released within this call.
pub fn insert(host: &dyn HostFramework, tls_slot: TlsSlot, instr: &AppInstr) -> Result<(), Error> {
    let dst0 = host.reserve_register(&[]).ok_or(Error::RegisterStarvation)?;
    let val0 = host.reserve_register(&[dst0]).ok_or_else(|| {
        host.unreserve_register(dst0);
        Error::RegisterStarvation
    })?;
    let mut pair = ScratchPair { dst: dst0, val: val0 };

    host.emit_load_tls(pair.dst, tls_slot);

    host.emit_load_immediate(pair.val, instr.app_pc);
    host.emit_store_field(pair.dst, layout::PC, pair.val);

    host.emit_load_immediate(pair.val, instr.opcode);
    host.emit_store_field(pair.dst, layout::OPCODE, pair.val);

    let mut num_vals = 0u64;
    for operand in instr.operands().take(VALS_LEN) {
        let app_regs = registers_touched(operand);
        pair = regalloc::resolve_conflicts(host, pair, &app_regs)?;
        emit_operand(host, pair, offset_val(num_vals as usize), operand);
        num_vals += 1;
    }

    host.emit_load_immediate(pair.val, num_vals);
    host.emit_store_field(pair.dst, layout::NUM_VALS, pair.val);

    host.emit_add_immediate(pair.dst, std::mem::size_of::<WireRecord>() as i64);
    host.emit_store_tls(tls_slot, pair.dst);

    host.unreserve_register(pair.dst);
    host.unreserve_register(pair.val);
    Ok(())
}

fn emit_operand(host: &dyn HostFramework, pair: ScratchPair, base_off: usize, operand: &AppOperand) {
    let tag_off = base_off + layout::OPERAND_TAG;
    let payload_off = base_off + layout::OPERAND_PAYLOAD;

    match operand {
        AppOperand::Unknown => {
            set_tag(host, pair, tag_off, OperandTag::Unknown);
        }
        AppOperand::Register(reg) => {
            set_tag(host, pair, tag_off, OperandTag::Register);
            set_imm(host, pair, payload_off + layout::REG_NAME, reg.id());
            // A register operand's value is already sitting in a
            // register: just store it, no load needed.
            host.emit_store_field(pair.dst, payload_off + layout::REG_VALUE, *reg);
        }
        AppOperand::Immediate(value) => {
            set_tag(host, pair, tag_off, OperandTag::Immediate);
            set_imm(host, pair, payload_off + layout::IMM_VALUE, *value);
        }
        AppOperand::Memory { address, is_far } => {
            set_tag(host, pair, tag_off, OperandTag::Memory);
            set_imm(host, pair, payload_off + layout::MEM_IS_FAR, *is_far as u64);
            set_imm(host, pair, payload_off + layout::MEM_ADDRESS, *address);
            host.emit_load_absolute(pair.val, *address);
            host.emit_store_field(pair.dst, payload_off + layout::MEM_VALUE, pair.val);
        }
        AppOperand::Indirect {
            base,
            disp,
            is_far,
            reads_memory,
            ..
        } => {
            set_tag(host, pair, tag_off, OperandTag::Indirect);
            set_imm(host, pair, payload_off + layout::IND_IS_FAR, *is_far as u64);
            set_imm(host, pair, payload_off + layout::IND_DISP, *disp as u64);
            match base {
                Some(reg) => {
                    set_imm(host, pair, payload_off + layout::IND_BASE_NULL, 0);
                    set_imm(host, pair, payload_off + layout::IND_BASE_NAME, reg.id());
                    host.emit_store_field(pair.dst, payload_off + layout::IND_BASE_VALUE, *reg);

                    if *reads_memory && !*is_far {
                        host.emit_load_indirect(pair.val, *reg, *disp);
                        host.emit_store_field(pair.dst, payload_off + layout::IND_VALUE, pair.val);
                        set_imm(host, pair, payload_off + layout::IND_VALUE_NULL, 0);
                    } else {
                        set_imm(host, pair, payload_off + layout::IND_VALUE_NULL, 1);
                    }
                }
                None => {
                    set_imm(host, pair, payload_off + layout::IND_BASE_NULL, 1);
                    set_imm(host, pair, payload_off + layout::IND_VALUE_NULL, 1);
                }
            }
        }
        AppOperand::CallTarget { pc, name } => {
            set_tag(host, pair, tag_off, OperandTag::CallTarget);
            set_imm(host, pair, payload_off + layout::TARGET_PC, *pc);
            let mut bytes = [0u8; 64];
            let n = name.len().min(63);
            bytes[..n].copy_from_slice(&name.as_bytes()[..n]);
            host.emit_store_bytes(pair.dst, payload_off + layout::TARGET_NAME, &bytes);
            // rsp holds the live stack pointer and is never a scratch
            // candidate, so it can be stored directly with no conflict
            // resolution.
            host.emit_store_field(pair.dst, payload_off + layout::TARGET_SP, AnyRegister::Rsp);
        }
    }
}

fn set_tag(host: &dyn HostFramework, pair: ScratchPair, offset: usize, tag: OperandTag) {
    set_imm(host, pair, offset, tag as u64);
}

fn set_imm(host: &dyn HostFramework, pair: ScratchPair, offset: usize, value: u64) {
    host.emit_load_immediate(pair.val, value);
    host.emit_store_field(pair.dst, offset, pair.val);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::GpRegister;
    use crate::host::fake::FakeHost;
    use crate::host::{HostFramework, MainModule, TlsSlot};

    fn fake() -> FakeHost {
        FakeHost::new(MainModule {
            path: "/bin/fixture".into(),
            base: 0,
        })
    }

    #[test]
    fn reservation_parity_holds_after_insert() {
        let host = fake();
        let instr = AppInstr {
            app_pc: 0x401000,
            opcode: 0x20,
            sources: vec![AppOperand::Immediate(0x2a)],
            destinations: vec![AppOperand::Memory {
                address: 0x404028,
                is_far: false,
            }],
        };
        insert(&host, TlsSlot(0), &instr).unwrap();
        assert_eq!(host.reservation_count(), 0);
    }

    #[test]
    fn starvation_during_insert_leaves_no_leaked_reservations() {
        let host = fake();
        // Hold every register except the two `insert` itself will claim for
        // its scratch pair, so the first operand whose register matches the
        // pair's `dst` has nowhere to reseat into.
        let mut held = Vec::new();
        for _ in 0..GpRegister::ALL.len() - 2 {
            held.push(host.reserve_register(&held.clone()).unwrap());
        }
        let reserved_before = host.reservation_count();

        // One source per GP register: whichever one `insert` picks as its
        // `dst` scratch register is guaranteed to appear in this list.
        let sources: Vec<_> = GpRegister::ALL
            .iter()
            .map(|r| AppOperand::Register(AnyRegister::Gp(*r)))
            .collect();
        let instr = AppInstr {
            app_pc: 0x401000,
            opcode: 0x20,
            sources,
            destinations: vec![],
        };

        let result = insert(&host, TlsSlot(0), &instr);
        assert!(matches!(result, Err(Error::RegisterStarvation)));
        // `insert`'s own scratch pair must be fully released on the way
        // out, leaving only the registers this test reserved up front.
        assert_eq!(host.reservation_count(), reserved_before);
    }

    #[test]
    fn indirect_with_rbp_base_needs_no_swap() {
        let host = fake();
        let instr = AppInstr {
            app_pc: 0x401010,
            opcode: 0x20,
            sources: vec![AppOperand::Indirect {
                base: Some(AnyRegister::Rbp),
                index: None,
                disp: -0x10,
                is_far: false,
                reads_memory: true,
            }],
            destinations: vec![AppOperand::Register(AnyRegister::Gp(GpRegister::Rax))],
        };
        insert(&host, TlsSlot(0), &instr).unwrap();
        assert_eq!(host.reservation_count(), 0);
        assert!(host.log.borrow().iter().any(|l| l.contains("load ")));
    }

    #[test]
    fn destination_register_colliding_with_scratch_triggers_swap() {
        let host = fake();
        // force the first reservation to land on Rax by forbidding nothing
        let instr = AppInstr {
            app_pc: 0x401020,
            opcode: 0x20,
            sources: vec![],
            destinations: vec![AppOperand::Register(AnyRegister::Gp(GpRegister::Rax))],
        };
        insert(&host, TlsSlot(0), &instr).unwrap();
        assert_eq!(host.reservation_count(), 0);
    }

    #[test]
    fn call_target_operand_stores_name_bytes_and_live_sp() {
        let host = fake();
        let instr = AppInstr {
            app_pc: 0x401030,
            opcode: 0x30,
            sources: vec![AppOperand::CallTarget {
                pc: 0x402000,
                name: "sum_to".into(),
            }],
            destinations: vec![],
        };
        insert(&host, TlsSlot(0), &instr).unwrap();
        let log = host.log.borrow();
        assert!(log.iter().any(|l| l.contains("store_bytes")));
        assert!(log.iter().any(|l| l.contains("rsp")));
    }

    #[test]
    fn operand_count_is_capped_at_vals_len() {
        let host = fake();
        let sources: Vec<_> = (0..40).map(AppOperand::Immediate).collect();
        let instr = AppInstr {
            app_pc: 0x401040,
            opcode: 0x0,
            sources,
            destinations: vec![],
        };
        insert(&host, TlsSlot(0), &instr).unwrap();
        // one store per immediate (tag + value), so at most
        // 2 * VALS_LEN stores of that shape get emitted.
        let stores = host
            .log
            .borrow()
            .iter()
            .filter(|l| l.starts_with("store ["))
            .count();
        assert!(stores <= 2 * VALS_LEN + 2);
    }
}
