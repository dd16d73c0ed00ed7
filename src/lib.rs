#![allow(dead_code)]

//! A dynamic binary instrumentation client that records every executed
//! instruction of a target program as a per-thread JSON trace, annotating
//! indirect-memory operands with the source-level variable they denote
//! whenever the target's debug info resolves one.
//!
//! The two pieces of real engineering are [`inserter`], which emits the
//! recording code for a single application instruction while cooperating
//! with the host framework's register reservation, and [`debuginfo`], which
//! parses the target's `.debug_info`/`.debug_abbrev`/`.debug_line` once and
//! answers variable-identity queries at trace time. Everything else is glue.

#[macro_use]
mod diag;

pub mod arch;
pub mod debuginfo;
pub mod dwarf;
pub mod elf;
pub mod host;
pub mod identify;
pub mod inserter;
pub mod mnemonic;
pub mod oserr;
pub mod trace;

pub use debuginfo::InfoTable;
pub use host::{AbiConvention, ClientContext};

/// Called once by the host framework when the client is loaded into the
/// target process. Registers lifecycle hooks and performs the one-time
/// debug-info load; never panics, since a malformed or missing debug
/// section degrades to tracing without variable resolution.
pub fn client_main(host: &dyn host::HostFramework, id: host::ClientId) -> ClientContext {
    diag::trace!("client_main: id={id:?}");
    let module = host.main_module();
    let info = match debuginfo::InfoTable::load(&module.path) {
        Ok(table) => {
            diag::trace!(
                "client_main: loaded debug info, {} functions, {} statics",
                table.functions().len(),
                table.statics().len()
            );
            Some(table)
        }
        Err(err) => {
            diag::warn!("client_main: debug info unavailable ({err}), tracing without resolution");
            None
        }
    };
    ClientContext::new(id, module, info)
}
