//! A tiny native program used as an instrumentation subject in manual
//! testing. It is never linked against `json-tracer`: the client attaches
//! to it from the outside, the way a DBI client attaches to any target
//! binary. Its only job is to be compiled with debug info and to contain
//! one obvious local and one obvious static variable to resolve.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// A file-scope variable with a fixed absolute address once linked.
static FLAGS: u32 = 0;

fn main() {
    let registry = tracing_subscriber::Registry::default().with(
        EnvFilter::builder()
            .with_default_directive(tracing::Level::INFO.into())
            .from_env()
            .unwrap(),
    );
    registry.init();

    let total = sum_to(10);
    tracing::info!(total, flags = FLAGS, "fixture-target finished");
}

fn sum_to(n: u32) -> u32 {
    let mut counter = 0u32;
    let mut i = 1u32;
    while i <= n {
        counter += i;
        i += 1;
    }
    counter
}
