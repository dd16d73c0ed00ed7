//! The trace record layout: a fixed 3-word header plus `bp`, and a
//! fixed-length array of tagged operand values. All scalar fields are
//! pointer-sized (`u64`), including flags, so the layout has no implicit
//! padding the inserter can't account for — the inserter writes to these
//! fields at constant displacements.
//!
//! This wire struct is the layout the inserter/drain actually touch;
//! [`Operand`] is the decoded sum type the writer works with. The two views
//! are kept deliberately separate.

use crate::arch::AnyRegister;

/// Cap on recorded operands per instruction; further operands are silently
/// dropped.
pub const VALS_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum OperandTag {
    Unknown = 0,
    Register = 1,
    Immediate = 2,
    Memory = 3,
    Indirect = 4,
    CallTarget = 5,
}

impl OperandTag {
    fn from_u64(v: u64) -> Self {
        match v {
            1 => OperandTag::Register,
            2 => OperandTag::Immediate,
            3 => OperandTag::Memory,
            4 => OperandTag::Indirect,
            5 => OperandTag::CallTarget,
            _ => OperandTag::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct RegisterPayload {
    pub name: u64,
    pub value: u64,
}

#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct ImmediatePayload {
    pub value: u64,
}

#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct MemoryPayload {
    pub is_far: u64,
    pub address: u64,
    pub value: u64,
}

#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct IndirectPayload {
    pub is_far: u64,
    pub base_null: u64,
    pub base_name: u64,
    pub base_value: u64,
    pub disp: u64,
    pub value_null: u64,
    pub value: u64,
}

#[derive(Clone, Copy)]
#[repr(C)]
pub struct CallTargetPayload {
    pub pc: u64,
    pub name: [u8; 64],
    pub sp: u64,
}

impl Default for CallTargetPayload {
    fn default() -> Self {
        CallTargetPayload {
            pc: 0,
            name: [0; 64],
            sp: 0,
        }
    }
}

impl core::fmt::Debug for CallTargetPayload {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CallTargetPayload")
            .field("pc", &self.pc)
            .field("name", &call_target_name(self))
            .field("sp", &self.sp)
            .finish()
    }
}

fn call_target_name(p: &CallTargetPayload) -> &str {
    let end = p.name.iter().position(|&b| b == 0).unwrap_or(p.name.len());
    core::str::from_utf8(&p.name[..end]).unwrap_or("")
}

/// All scalar, pointer-sized-or-smaller, `Copy` fields: a real `union` is
/// safe to use here since exactly one variant is ever live per operand tag.
#[derive(Clone, Copy)]
#[repr(C)]
pub union OperandPayload {
    pub register: RegisterPayload,
    pub immediate: ImmediatePayload,
    pub memory: MemoryPayload,
    pub indirect: IndirectPayload,
    pub call_target: CallTargetPayload,
}

impl Default for OperandPayload {
    fn default() -> Self {
        OperandPayload {
            register: RegisterPayload::default(),
        }
    }
}

#[derive(Clone, Copy, Default)]
#[repr(C)]
pub struct WireOperand {
    pub tag: u64,
    pub payload: OperandPayload,
}

impl WireOperand {
    pub fn unknown() -> Self {
        WireOperand {
            tag: OperandTag::Unknown as u64,
            ..Default::default()
        }
    }

    pub fn register(reg: AnyRegister, value: u64) -> Self {
        WireOperand {
            tag: OperandTag::Register as u64,
            payload: OperandPayload {
                register: RegisterPayload {
                    name: reg.id(),
                    value,
                },
            },
        }
    }

    pub fn immediate(value: u64) -> Self {
        WireOperand {
            tag: OperandTag::Immediate as u64,
            payload: OperandPayload {
                immediate: ImmediatePayload { value },
            },
        }
    }

    pub fn memory(is_far: bool, address: u64, value: u64) -> Self {
        WireOperand {
            tag: OperandTag::Memory as u64,
            payload: OperandPayload {
                memory: MemoryPayload {
                    is_far: is_far as u64,
                    address,
                    value,
                },
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn indirect(
        is_far: bool,
        base: Option<(AnyRegister, u64)>,
        disp: i64,
        value: Option<u64>,
    ) -> Self {
        let (base_null, base_name, base_value) = match base {
            Some((reg, v)) => (0u64, reg.id(), v),
            None => (1u64, 0, 0),
        };
        let (value_null, value) = match value {
            Some(v) => (0u64, v),
            None => (1u64, 0),
        };
        WireOperand {
            tag: OperandTag::Indirect as u64,
            payload: OperandPayload {
                indirect: IndirectPayload {
                    is_far: is_far as u64,
                    base_null,
                    base_name,
                    base_value,
                    disp: disp as u64,
                    value_null,
                    value,
                },
            },
        }
    }

    pub fn call_target(pc: u64, name: &str, sp: u64) -> Self {
        let mut bytes = [0u8; 64];
        let n = name.len().min(63);
        bytes[..n].copy_from_slice(&name.as_bytes()[..n]);
        WireOperand {
            tag: OperandTag::CallTarget as u64,
            payload: OperandPayload {
                call_target: CallTargetPayload {
                    pc,
                    name: bytes,
                    sp,
                },
            },
        }
    }

    pub fn tag(&self) -> OperandTag {
        OperandTag::from_u64(self.tag)
    }
}

impl core::fmt::Debug for WireOperand {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        Operand::from_wire(self).fmt(f)
    }
}

/// The decoded sum type the writer works with. One variant per JSON
/// operand shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Unknown,
    Register {
        name: &'static str,
        value: u64,
    },
    Immediate {
        value: u64,
    },
    Memory {
        is_far: bool,
        address: u64,
        value: u64,
    },
    Indirect {
        is_far: bool,
        base: Option<(&'static str, u64)>,
        offset: i64,
        value: Option<u64>,
    },
    CallTarget {
        pc: u64,
        name: String,
        sp: u64,
    },
}

fn register_name(id: u64) -> &'static str {
    AnyRegister::from_id(id)
        .map(|r| r.name())
        .unwrap_or("unknown")
}

impl Operand {
    pub fn from_wire(wire: &WireOperand) -> Operand {
        match wire.tag() {
            OperandTag::Unknown => Operand::Unknown,
            // SAFETY: the tag was just checked to match the union variant
            // being read.
            OperandTag::Register => {
                let p = unsafe { wire.payload.register };
                Operand::Register {
                    name: register_name(p.name),
                    value: p.value,
                }
            }
            OperandTag::Immediate => {
                let p = unsafe { wire.payload.immediate };
                Operand::Immediate { value: p.value }
            }
            OperandTag::Memory => {
                let p = unsafe { wire.payload.memory };
                Operand::Memory {
                    is_far: p.is_far != 0,
                    address: p.address,
                    value: p.value,
                }
            }
            OperandTag::Indirect => {
                let p = unsafe { wire.payload.indirect };
                Operand::Indirect {
                    is_far: p.is_far != 0,
                    base: (p.base_null == 0).then(|| (register_name(p.base_name), p.base_value)),
                    offset: p.disp as i64,
                    value: (p.value_null == 0).then_some(p.value),
                }
            }
            OperandTag::CallTarget => {
                let p = unsafe { wire.payload.call_target };
                Operand::CallTarget {
                    pc: p.pc,
                    name: call_target_name(&p).to_owned(),
                    sp: p.sp,
                }
            }
        }
    }
}

/// The fixed-size trace record. `#[repr(C)]` so its layout is frozen: the
/// inserter computes constant displacements from it once at build time.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct WireRecord {
    pub pc: u64,
    pub opcode: u64,
    pub num_vals: u64,
    pub bp: u64,
    pub vals: [WireOperand; VALS_LEN],
}

impl Default for WireRecord {
    fn default() -> Self {
        WireRecord {
            pc: 0,
            opcode: 0,
            num_vals: 0,
            bp: 0,
            vals: [WireOperand::default(); VALS_LEN],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_operand_roundtrips() {
        let wire = WireOperand::register(AnyRegister::Gp(crate::arch::GpRegister::Rax), 0x42);
        match Operand::from_wire(&wire) {
            Operand::Register { name, value } => {
                assert_eq!(name, "rax");
                assert_eq!(value, 0x42);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn indirect_with_null_base_and_value() {
        let wire = WireOperand::indirect(false, None, -0x10, None);
        match Operand::from_wire(&wire) {
            Operand::Indirect {
                base,
                value,
                offset,
                ..
            } => {
                assert!(base.is_none());
                assert!(value.is_none());
                assert_eq!(offset, -0x10);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn call_target_name_truncates_at_nul() {
        let wire = WireOperand::call_target(0x401000, "my_function", 0x7fff0000);
        match Operand::from_wire(&wire) {
            Operand::CallTarget { name, .. } => assert_eq!(name, "my_function"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn record_caps_at_32_operands() {
        let record = WireRecord::default();
        assert_eq!(record.vals.len(), VALS_LEN);
    }
}
