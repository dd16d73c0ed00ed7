//! `resolve(info, addr, pc, segm_base, sp) -> VariableIdentity | None`:
//! normalize `pc` against the segment base, check the current function's
//! locals against the `addr - sp` stack offset first, then fall back to
//! file-scope statics against `addr - segm_base`.

use super::types::{InfoTable, VariableIdentity};

/// A local inside the function containing `pc` always wins over a
/// same-range static.
pub fn resolve(
    info: &InfoTable,
    addr: u64,
    pc: u64,
    segm_base: u64,
    sp: u64,
) -> Option<VariableIdentity> {
    let pc_rel = pc.wrapping_sub(segm_base);
    let stack_offset = addr as i64 - sp as i64;

    if let Some(func) = info.function_containing(pc_rel) {
        for local in &func.locals {
            let start = local.frame_offset;
            let end = local.frame_offset + local.ty.size as i64;
            if stack_offset >= start && stack_offset < end {
                return Some(VariableIdentity::Local {
                    name: local.name.clone(),
                    ty: local.ty.clone(),
                    frame_offset: local.frame_offset,
                });
            }
        }
    }

    let seg_offset = addr.wrapping_sub(segm_base);
    info.statics()
        .iter()
        .find(|v| {
            let start = v.address;
            let end = v.address + v.ty.size;
            seg_offset >= start && seg_offset < end
        })
        .map(|v| VariableIdentity::Static {
            name: v.name.clone(),
            ty: v.ty.clone(),
            source_path: v.source_path.clone(),
            address: v.address,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debuginfo::types::{Function, Local, StaticVar, Type};
    use std::sync::Arc;

    fn int_type() -> Arc<Type> {
        Arc::new(Type {
            name: "int".into(),
            size: 4,
            source_path: "main.c".into(),
        })
    }

    #[test]
    fn resolver_locality_static_hit() {
        let mut info = InfoTable::default();
        info.statics.push(StaticVar {
            name: "flags".into(),
            ty: int_type(),
            source_path: "main.c".into(),
            address: 0x4028,
        });
        let found = resolve(&info, 0x4028, 0x9999, 0, 0x7fff0000).unwrap();
        assert_eq!(found.name(), "flags");
        assert!(!found.is_local());
    }

    #[test]
    fn resolver_priority_local_wins_over_static() {
        let mut info = InfoTable::default();
        info.functions.push(Function {
            name: "main".into(),
            source_path: "main.c".into(),
            low_pc: 0x1000,
            length: 0x100,
            locals: vec![Local {
                name: "counter".into(),
                ty: int_type(),
                frame_offset: -0x10,
            }],
        });
        // a static whose absolute-address-derived range happens to overlap
        // the same stack_offset/seg_offset window
        info.statics.push(StaticVar {
            name: "shadow".into(),
            ty: int_type(),
            source_path: "main.c".into(),
            address: 0,
        });

        let sp = 0x7ffd_0000u64;
        let addr = sp.wrapping_add_signed(-0x10);
        let found = resolve(&info, addr, 0x1010, 0, sp).unwrap();
        assert_eq!(found.name(), "counter");
        assert!(found.is_local());
    }

    #[test]
    fn no_match_returns_none() {
        let info = InfoTable::default();
        assert!(resolve(&info, 0x1234, 0x1, 0, 0).is_none());
    }

    #[test]
    fn pc_outside_any_function_falls_through_to_static() {
        let mut info = InfoTable::default();
        info.functions.push(Function {
            name: "main".into(),
            source_path: "main.c".into(),
            low_pc: 0x1000,
            length: 0x10,
            locals: vec![Local {
                name: "counter".into(),
                ty: int_type(),
                frame_offset: 0,
            }],
        });
        info.statics.push(StaticVar {
            name: "flags".into(),
            ty: int_type(),
            source_path: "main.c".into(),
            address: 0x2000,
        });
        let found = resolve(&info, 0x2000, 0x9999, 0, 0).unwrap();
        assert_eq!(found.name(), "flags");
    }
}
