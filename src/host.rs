//! The host-framework adapter. The real DBI host — basic-block iteration,
//! register reservation, TLS slot allocation, emission primitives for
//! load/store/move/immediate — lives outside this crate, so here it is a
//! trait boundary: [`HostFramework`] states the contract the inserter
//! needs, and [`fake::FakeHost`] is the in-process stand-in exercised by
//! this crate's own tests.

use crate::arch::AnyRegister;
use crate::debuginfo::{InfoTable, VariableIdentity};
pub use crate::arch::AbiConvention;

/// Opaque client identity handed back by the host at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u64);

/// A raw-TLS word, addressable as `segment_register + fixed_offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsSlot(pub usize);

/// The target's main module descriptor: resolved by querying the
/// framework's main-module lookup once at client load.
#[derive(Debug, Clone)]
pub struct MainModule {
    pub path: String,
    pub base: u64,
}

/// Responsibilities and contracts only: allocate one raw-TLS word, register
/// lifecycle hooks, provide register reservation and code emission
/// primitives. No method here performs real code generation — each call
/// corresponds to one host-framework API a real DBI engine would expose.
pub trait HostFramework {
    fn main_module(&self) -> MainModule;

    /// Allocates the single raw-TLS word the client keeps its per-thread
    /// ring cursor in.
    fn alloc_tls_slot(&self) -> TlsSlot;

    /// Reserves a scratch register not in `forbidden`. `None` signals
    /// register starvation: the caller must abort instrumenting this basic
    /// block.
    fn reserve_register(&self, forbidden: &[AnyRegister]) -> Option<AnyRegister>;
    fn unreserve_register(&self, reg: AnyRegister);

    fn emit_load_tls(&self, dst: AnyRegister, slot: TlsSlot);
    fn emit_store_tls(&self, slot: TlsSlot, src: AnyRegister);
    fn emit_load_immediate(&self, dst: AnyRegister, value: u64);
    fn emit_move(&self, dst: AnyRegister, src: AnyRegister);
    fn emit_store_field(&self, base: AnyRegister, offset: usize, src: AnyRegister);
    fn emit_load_absolute(&self, dst: AnyRegister, address: u64);
    fn emit_load_indirect(&self, dst: AnyRegister, base: AnyRegister, disp: i64);
    fn emit_add_immediate(&self, reg: AnyRegister, value: i64);

    /// Embeds a literal byte string at a constant displacement — used for
    /// the call-target operand's fixed 64-byte name field, which is known
    /// at instrument time and needs no scratch register at all.
    fn emit_store_bytes(&self, base: AnyRegister, offset: usize, bytes: &[u8]);
}

/// Everything a loaded client needs for the lifetime of the process: built
/// once on the client-load thread and then read-only. Carries the
/// debug-info table when loading succeeded, `None` when it didn't — a
/// malformed or missing table is non-fatal, tracing proceeds without
/// variable resolution.
pub struct ClientContext {
    pub id: ClientId,
    pub module: MainModule,
    pub info: Option<InfoTable>,
    pub abi: AbiConvention,
}

impl ClientContext {
    pub fn new(id: ClientId, module: MainModule, info: Option<InfoTable>) -> Self {
        ClientContext {
            id,
            module,
            info,
            abi: AbiConvention::default(),
        }
    }

    /// Convenience wrapper around [`crate::debuginfo::resolve`] bound to
    /// this client's module base; used by the writer.
    pub fn resolve(&self, addr: u64, pc: u64, sp: u64) -> Option<VariableIdentity> {
        let info = self.info.as_ref()?;
        crate::debuginfo::resolve(info, addr, pc, self.module.base, sp)
    }
}

pub mod fake {
    //! An in-memory [`HostFramework`] that records every emission as a
    //! line of text instead of generating real machine code. Used only by
    //! tests: it lets the inserter's emission sequence and register
    //! reservation parity be asserted on without a live DBI process to
    //! attach to.

    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;

    pub struct FakeHost {
        pub module: MainModule,
        reserved: RefCell<HashSet<AnyRegister>>,
        pub log: RefCell<Vec<String>>,
        next_candidate: RefCell<usize>,
    }

    impl FakeHost {
        pub fn new(module: MainModule) -> Self {
            FakeHost {
                module,
                reserved: RefCell::new(HashSet::new()),
                log: RefCell::new(Vec::new()),
                next_candidate: RefCell::new(0),
            }
        }

        pub fn reservation_count(&self) -> usize {
            self.reserved.borrow().len()
        }
    }

    impl HostFramework for FakeHost {
        fn main_module(&self) -> MainModule {
            self.module.clone()
        }

        fn alloc_tls_slot(&self) -> TlsSlot {
            TlsSlot(0)
        }

        fn reserve_register(&self, forbidden: &[AnyRegister]) -> Option<AnyRegister> {
            let all = crate::arch::GpRegister::ALL;
            let mut idx = self.next_candidate.borrow_mut();
            for _ in 0..all.len() {
                let candidate = AnyRegister::Gp(all[*idx % all.len()]);
                *idx += 1;
                let taken = self.reserved.borrow().contains(&candidate);
                if !taken && !forbidden.contains(&candidate) {
                    self.reserved.borrow_mut().insert(candidate);
                    self.log.borrow_mut().push(format!("reserve {candidate}"));
                    return Some(candidate);
                }
            }
            None
        }

        fn unreserve_register(&self, reg: AnyRegister) {
            self.reserved.borrow_mut().remove(&reg);
            self.log.borrow_mut().push(format!("unreserve {reg}"));
        }

        fn emit_load_tls(&self, dst: AnyRegister, slot: TlsSlot) {
            self.log
                .borrow_mut()
                .push(format!("load_tls {dst} <- slot[{}]", slot.0));
        }

        fn emit_store_tls(&self, slot: TlsSlot, src: AnyRegister) {
            self.log
                .borrow_mut()
                .push(format!("store_tls slot[{}] <- {src}", slot.0));
        }

        fn emit_load_immediate(&self, dst: AnyRegister, value: u64) {
            self.log
                .borrow_mut()
                .push(format!("load_imm {dst} <- {value:#x}"));
        }

        fn emit_move(&self, dst: AnyRegister, src: AnyRegister) {
            self.log.borrow_mut().push(format!("move {dst} <- {src}"));
        }

        fn emit_store_field(&self, base: AnyRegister, offset: usize, src: AnyRegister) {
            self.log
                .borrow_mut()
                .push(format!("store [{base}+{offset:#x}] <- {src}"));
        }

        fn emit_load_absolute(&self, dst: AnyRegister, address: u64) {
            self.log
                .borrow_mut()
                .push(format!("load {dst} <- [{address:#x}]"));
        }

        fn emit_load_indirect(&self, dst: AnyRegister, base: AnyRegister, disp: i64) {
            self.log
                .borrow_mut()
                .push(format!("load {dst} <- [{base}{disp:+#x}]"));
        }

        fn emit_add_immediate(&self, reg: AnyRegister, value: i64) {
            self.log
                .borrow_mut()
                .push(format!("add {reg}, {value:#x}"));
        }

        fn emit_store_bytes(&self, base: AnyRegister, offset: usize, bytes: &[u8]) {
            self.log.borrow_mut().push(format!(
                "store_bytes [{base}+{offset:#x}] <- {} bytes",
                bytes.len()
            ));
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn reserve_then_unreserve_restores_zero_count() {
            let host = FakeHost::new(MainModule {
                path: "/bin/fixture".into(),
                base: 0x400000,
            });
            let a = host.reserve_register(&[]).unwrap();
            let b = host.reserve_register(&[]).unwrap();
            assert_ne!(a, b);
            assert_eq!(host.reservation_count(), 2);
            host.unreserve_register(a);
            host.unreserve_register(b);
            assert_eq!(host.reservation_count(), 0);
        }

        #[test]
        fn forbidden_registers_are_never_handed_out() {
            let host = FakeHost::new(MainModule {
                path: "/bin/fixture".into(),
                base: 0,
            });
            let forbidden = [AnyRegister::Gp(crate::arch::GpRegister::Rax)];
            for _ in 0..crate::arch::GpRegister::ALL.len() - 1 {
                let reg = host.reserve_register(&forbidden).unwrap();
                assert_ne!(reg, forbidden[0]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_context_resolve_is_none_without_debug_info() {
        let ctx = ClientContext::new(
            ClientId(1),
            MainModule {
                path: "/bin/fixture".into(),
                base: 0,
            },
            None,
        );
        assert!(ctx.resolve(0x1000, 0x1000, 0x7fff0000).is_none());
    }
}
