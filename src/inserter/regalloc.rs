//! Register-conflict resolution as an explicit state machine: the state is
//! the `(reg_dst, reg_val)` assignment, transitions are the swap and the
//! reseat-with-constraints operations, and the terminal state guarantees
//! neither register is in the forbidden set.

use super::Error;
use crate::arch::AnyRegister;
use crate::host::HostFramework;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchPair {
    pub dst: AnyRegister,
    pub val: AnyRegister,
}

/// Ensures neither register in `pair` overlaps any of `app_registers` — the
/// registers the emitted operand-save code is about to read. A dst conflict
/// forces a swap (not a spill, since `reg_val` already holds nothing live);
/// a val conflict (checked *after* the possible swap) is resolved by a
/// plain reseat.
pub fn resolve_conflicts(
    host: &dyn HostFramework,
    pair: ScratchPair,
    app_registers: &[AnyRegister],
) -> Result<ScratchPair, Error> {
    let mut dst = pair.dst;
    let mut val = pair.val;

    if app_registers.contains(&dst) {
        // Preserve the record pointer by moving it into the other scratch
        // register, then swap which one plays which role.
        host.emit_move(val, dst);
        let old_dst = dst;
        dst = val;
        host.unreserve_register(old_dst);
        let forbidden = forbidden_set(app_registers, dst);
        val = match host.reserve_register(&forbidden) {
            Some(r) => r,
            None => {
                host.unreserve_register(dst);
                return Err(Error::RegisterStarvation);
            }
        };
    }

    if app_registers.contains(&val) {
        host.unreserve_register(val);
        let forbidden = forbidden_set(app_registers, dst);
        val = match host.reserve_register(&forbidden) {
            Some(r) => r,
            None => {
                host.unreserve_register(dst);
                return Err(Error::RegisterStarvation);
            }
        };
    }

    Ok(ScratchPair { dst, val })
}

fn forbidden_set(app_registers: &[AnyRegister], keep: AnyRegister) -> Vec<AnyRegister> {
    let mut v = app_registers.to_vec();
    v.push(keep);
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::GpRegister;
    use crate::host::fake::FakeHost;
    use crate::host::MainModule;

    fn fake() -> FakeHost {
        FakeHost::new(MainModule {
            path: "/bin/fixture".into(),
            base: 0,
        })
    }

    #[test]
    fn no_conflict_leaves_pair_untouched() {
        let host = fake();
        let dst = host.reserve_register(&[]).unwrap();
        let val = host.reserve_register(&[dst]).unwrap();
        let pair = ScratchPair { dst, val };
        let resolved = resolve_conflicts(&host, pair, &[AnyRegister::Rbp]).unwrap();
        assert_eq!(resolved, pair);
    }

    #[test]
    fn dst_conflict_triggers_swap_and_preserves_invariant() {
        let host = fake();
        let dst = host.reserve_register(&[]).unwrap();
        let val = host.reserve_register(&[dst]).unwrap();
        let pair = ScratchPair { dst, val };

        let resolved = resolve_conflicts(&host, pair, &[dst]).unwrap();

        assert_eq!(resolved.dst, val, "old reg_val now plays reg_dst");
        assert!(!resolved.dst.eq(&dst));
        assert_ne!(resolved.val, dst);
        assert_ne!(resolved.val, resolved.dst);
        // parity: still exactly two registers reserved
        assert_eq!(host.reservation_count(), 2);
    }

    #[test]
    fn val_conflict_alone_only_reseats_val() {
        let host = fake();
        let dst = host.reserve_register(&[]).unwrap();
        let val = host.reserve_register(&[dst]).unwrap();
        let pair = ScratchPair { dst, val };

        let resolved = resolve_conflicts(&host, pair, &[val]).unwrap();

        assert_eq!(resolved.dst, dst);
        assert_ne!(resolved.val, val);
        assert_eq!(host.reservation_count(), 2);
    }

    #[test]
    fn terminal_state_never_overlaps_forbidden_registers() {
        let host = fake();
        let dst = host.reserve_register(&[]).unwrap();
        let val = host.reserve_register(&[dst]).unwrap();
        let pair = ScratchPair { dst, val };
        let forbidden = [dst, val];

        let resolved = resolve_conflicts(&host, pair, &forbidden).unwrap();

        assert!(!forbidden.contains(&resolved.dst));
        assert!(!forbidden.contains(&resolved.val));
    }

    #[test]
    fn starvation_surfaces_as_an_error() {
        let host = fake();
        // reserve every scratch register except one so only a single slot
        // remains for both the forced reseat and nothing else.
        let mut held = Vec::new();
        for _ in 0..GpRegister::ALL.len() - 2 {
            held.push(host.reserve_register(&held.clone()).unwrap());
        }
        let dst = host.reserve_register(&held.clone()).unwrap();
        let val = host.reserve_register(&{
            let mut f = held.clone();
            f.push(dst);
            f
        })
        .unwrap();
        let pair = ScratchPair { dst, val };
        let reserved_before = host.reservation_count();
        // Forbid `dst` (forces a swap+reseat) while every other register
        // is already held: no replacement is available.
        let result = resolve_conflicts(&host, pair, &[dst]);
        assert!(matches!(result, Err(Error::RegisterStarvation)));
        // both halves of `pair` must be released on the way out, not just
        // the one that triggered the failed reservation.
        assert_eq!(host.reservation_count(), reserved_before - 2);
    }
}
