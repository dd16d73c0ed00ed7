//! Symbol lookup for addresses in the instrumenting process's own address
//! space, via `dladdr`. Used by the binary entry point to stand in for a
//! main-module descriptor and a call-target name when no real DBI host
//! supplies either.

use std::ffi::CStr;

/// A module (shared object or the main executable) as seen by the dynamic
/// linker: its load path and the address its first segment was mapped at.
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub path: String,
    pub base: u64,
}

/// Resolves the nearest preceding exported symbol name for `addr`, if any.
pub fn symbol_name(addr: usize) -> Option<String> {
    unsafe {
        let mut info: libc::Dl_info = std::mem::zeroed();
        if libc::dladdr(addr as *const _, &mut info) == 0 {
            return None;
        }
        if info.dli_sname.is_null() {
            return None;
        }
        CStr::from_ptr(info.dli_sname)
            .to_str()
            .ok()
            .map(str::to_owned)
    }
}

/// Resolves the module (path + load base) containing `addr`, if any.
pub fn module_containing(addr: usize) -> Option<ModuleInfo> {
    unsafe {
        let mut info: libc::Dl_info = std::mem::zeroed();
        if libc::dladdr(addr as *const _, &mut info) == 0 {
            return None;
        }
        if info.dli_fname.is_null() {
            return None;
        }
        let path = CStr::from_ptr(info.dli_fname).to_str().ok()?.to_owned();
        Some(ModuleInfo {
            path,
            base: info.dli_fbase as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_containing_finds_self() {
        let addr = module_containing as usize;
        let info = module_containing(addr);
        assert!(info.is_some());
    }
}
