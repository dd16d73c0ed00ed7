//! Architecture-specific primitives. The core assumes a pointer-sized
//! load/store ISA with general-purpose registers and a frame-pointer-
//! relative local variable convention; this module is the one place that
//! knowledge lives.

use core::arch::asm;

/// A virtual address, either inside this process or (conceptually) inside
/// a traced target. Plain `u64` wrapper so pointer arithmetic on trace
/// data can't accidentally be mixed with real pointer arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Addr(pub u64);

impl Addr {
    pub const fn wrapping_add_signed(self, rhs: i64) -> Addr {
        Addr(self.0.wrapping_add_signed(rhs))
    }

    pub const fn wrapping_sub(self, rhs: Addr) -> i64 {
        self.0.wrapping_sub(rhs.0) as i64
    }
}

impl core::fmt::Display for Addr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Reads this process's own frame-base register. Used only by the
/// host-framework fake backend and by tests that want a live address —
/// there is no real application being observed here.
pub(crate) fn get_rbp() -> Addr {
    let mut out: u64;
    unsafe {
        asm!(
            "mov {out}, rbp",
            out = out(reg) out,
            options(nostack, readonly)
        );
    }
    Addr(out)
}

pub(crate) fn get_rip() -> Addr {
    let mut out: u64;
    unsafe {
        asm!(
            "lea {out}, [rip]",
            out = out(reg) out,
            options(nostack, readonly),
        );
    }
    Addr(out)
}

/// Gates the `bp + slot` stack-pointer approximation the writer uses to
/// call the resolver. Only one convention is implemented; the enum exists
/// so a second one can be added without touching call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AbiConvention {
    /// System V AMD64: one return-address slot sits directly above the
    /// saved frame-base register, so `sp_at(pc) ≈ bp + 0x10`.
    #[default]
    SysVAmd64,
}

impl AbiConvention {
    /// Offset in bytes from a call frame's base-pointer value to the
    /// approximate caller stack pointer at the moment the instrumented
    /// instruction executes.
    pub const fn return_slot_offset(self) -> i64 {
        match self {
            AbiConvention::SysVAmd64 => 0x10,
        }
    }
}

/// General-purpose registers on the target ISA, in the order the inserter
/// and resolver refer to them. `Rsp`/`Rbp` are deliberately absent from
/// this set: clobbering the stack or frame pointer mid-instrumentation
/// would corrupt the very frame the record describes, so they can never be
/// handed out as scratch or replacement registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum GpRegister {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

impl GpRegister {
    pub const ALL: [GpRegister; 14] = [
        GpRegister::Rax,
        GpRegister::Rbx,
        GpRegister::Rcx,
        GpRegister::Rdx,
        GpRegister::Rsi,
        GpRegister::Rdi,
        GpRegister::R8,
        GpRegister::R9,
        GpRegister::R10,
        GpRegister::R11,
        GpRegister::R12,
        GpRegister::R13,
        GpRegister::R14,
        GpRegister::R15,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            GpRegister::Rax => "rax",
            GpRegister::Rbx => "rbx",
            GpRegister::Rcx => "rcx",
            GpRegister::Rdx => "rdx",
            GpRegister::Rsi => "rsi",
            GpRegister::Rdi => "rdi",
            GpRegister::R8 => "r8",
            GpRegister::R9 => "r9",
            GpRegister::R10 => "r10",
            GpRegister::R11 => "r11",
            GpRegister::R12 => "r12",
            GpRegister::R13 => "r13",
            GpRegister::R14 => "r14",
            GpRegister::R15 => "r15",
        }
    }
}

impl core::fmt::Display for GpRegister {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Every register an operand can be *named after* — a superset of
/// [`GpRegister`] that also covers the frame pointer and stack pointer,
/// which show up constantly as addressing bases (`[rbp-0x10]`) but can
/// never be handed out as instrumentation scratch registers. Kept separate
/// so the regalloc state machine's candidate set stays exactly the 14
/// registers that are safe to clobber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum AnyRegister {
    Gp(GpRegister),
    Rbp,
    Rsp,
}

impl AnyRegister {
    pub const fn id(self) -> u64 {
        match self {
            AnyRegister::Gp(r) => r as u64,
            AnyRegister::Rbp => 100,
            AnyRegister::Rsp => 101,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            AnyRegister::Gp(r) => r.name(),
            AnyRegister::Rbp => "rbp",
            AnyRegister::Rsp => "rsp",
        }
    }

    pub fn from_id(id: u64) -> Option<AnyRegister> {
        match id {
            100 => Some(AnyRegister::Rbp),
            101 => Some(AnyRegister::Rsp),
            _ => GpRegister::ALL
                .into_iter()
                .find(|r| *r as u64 == id)
                .map(AnyRegister::Gp),
        }
    }

    /// Whether this register can be reserved as instrumentation scratch
    /// space: the allowed set is every general-purpose register and never
    /// includes the stack or frame pointer.
    pub const fn is_scratch_eligible(self) -> bool {
        matches!(self, AnyRegister::Gp(_))
    }
}

impl From<GpRegister> for AnyRegister {
    fn from(r: GpRegister) -> Self {
        AnyRegister::Gp(r)
    }
}

impl core::fmt::Display for AnyRegister {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_slot_offset_is_documented_value() {
        assert_eq!(AbiConvention::SysVAmd64.return_slot_offset(), 0x10);
    }

    #[test]
    fn addr_signed_arithmetic() {
        let a = Addr(0x1000);
        assert_eq!(a.wrapping_add_signed(-0x10), Addr(0xff0));
        assert_eq!(a.wrapping_sub(Addr(0xf00)), 0x100);
    }

    #[test]
    fn any_register_roundtrips_through_id() {
        assert_eq!(
            AnyRegister::from_id(AnyRegister::Rbp.id()),
            Some(AnyRegister::Rbp)
        );
        let gp = AnyRegister::Gp(GpRegister::R12);
        assert_eq!(AnyRegister::from_id(gp.id()), Some(gp));
    }

    #[test]
    fn stack_and_frame_pointer_are_not_scratch_eligible() {
        assert!(!AnyRegister::Rbp.is_scratch_eligible());
        assert!(!AnyRegister::Rsp.is_scratch_eligible());
        assert!(AnyRegister::Gp(GpRegister::Rax).is_scratch_eligible());
    }
}
