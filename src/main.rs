//! Binary entry point. There is no real DBI host process to attach to here,
//! so this binary demonstrates the full pipeline — debug-info load,
//! instrumentation emission, ring drain, JSON write — against
//! [`json_tracer::host::fake::FakeHost`] and whatever target binary
//! `JSON_TRACER_TARGET` points at.

use json_tracer::arch::{AnyRegister, GpRegister};
use json_tracer::host::fake::FakeHost;
use json_tracer::host::{ClientId, MainModule, TlsSlot};
use json_tracer::identify;
use json_tracer::inserter::operand::{AppInstr, AppOperand};
use json_tracer::trace::ring::Ring;
use json_tracer::trace::TraceWriter;
use json_tracer::{client_main, inserter};

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).init();
}

fn target_path() -> String {
    std::env::var("JSON_TRACER_TARGET").unwrap_or_else(|_| "./fixture-target/target/debug/fixture-target".into())
}

/// Selects which ABI-specific `sp ≈ bp + slot` approximation the writer
/// uses to call the resolver. Currently only one convention exists; the
/// variable is read so operators can be explicit about the assumption
/// without the binary silently guessing.
fn sp_slot_override() -> Option<i64> {
    std::env::var("JSON_TRACER_SP_SLOT")
        .ok()
        .and_then(|v| v.parse().ok())
}

/// There's no real DBI host here to hand back a main-module descriptor, so
/// this binary is its own "target": it asks the dynamic linker, via
/// `dladdr`, which module its own `main` function was loaded from and uses
/// that load base the same way a real host's main-module lookup would.
fn main_module(path: String) -> MainModule {
    match identify::module_containing(main as usize) {
        Some(info) => MainModule {
            path,
            base: info.base,
        },
        None => MainModule { path, base: 0 },
    }
}

fn main() {
    init_logging();

    let path = target_path();
    let module = main_module(path.clone());
    let host = FakeHost::new(module);

    let ctx = client_main(&host, ClientId(0));
    tracing::info!(
        target: "json_tracer",
        "loaded target {}: debug info {}",
        path,
        if ctx.info.is_some() { "available" } else { "unavailable" }
    );

    if let Some(slot) = sp_slot_override() {
        tracing::debug!("JSON_TRACER_SP_SLOT override requested: {slot:#x} (not yet wired to a second AbiConvention variant)");
    }

    // One representative application instruction — a load of a stack
    // local into rax plus a call-target operand — run through the inserter
    // to exercise the whole emission sequence end to end. The call target's
    // name is resolved the same way a real decoder would resolve one: by
    // symbol lookup against the address it targets.
    let call_target_name =
        identify::symbol_name(main as usize).unwrap_or_else(|| "main".to_owned());
    let instr = AppInstr {
        app_pc: 0x401010,
        opcode: 0x20,
        sources: vec![
            AppOperand::Indirect {
                base: Some(AnyRegister::Rbp),
                index: None,
                disp: -0x10,
                is_far: false,
                reads_memory: true,
            },
            AppOperand::CallTarget {
                pc: main as u64,
                name: call_target_name,
            },
        ],
        destinations: vec![AppOperand::Register(AnyRegister::Gp(GpRegister::Rax))],
    };

    match inserter::insert(&host, TlsSlot(0), &instr) {
        Ok(()) => tracing::trace!("emitted {} host calls", host.log.borrow().len()),
        Err(err) => tracing::error!("instrumentation failed: {err}"),
    }

    // There is no running target thread to drive the emitted code, so the
    // demonstration record below is what that code would have produced —
    // the same shape the real drain path hands to the writer.
    let ring = Ring::new();
    if let Some(record) = ring.next_slot() {
        record.pc = instr.app_pc;
        record.opcode = instr.opcode;
        record.bp = 0x7ffd_0000;
        record.num_vals = 0;
    }

    match TraceWriter::create_in(".") {
        Ok(mut writer) => {
            for record in ring.drain() {
                if let Err(err) =
                    writer.write_record(&record, ctx.info.as_ref(), ctx.module.base, ctx.abi)
                {
                    tracing::error!("failed to write trace record: {err}");
                }
            }
            if let Err(err) = writer.close() {
                tracing::error!("failed to close trace file: {err}");
            }
        }
        Err(err) => tracing::error!("failed to open trace file: {err}"),
    }
}
