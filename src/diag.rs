//! Thin wrapper around `tracing` matching the density the rest of this
//! crate logs at: one line per FFI boundary, one per rejected debug-info
//! entry, one per dropped trace record. Kept as a module (rather than using
//! `tracing::trace!` directly everywhere) so the call sites read the same
//! whether or not `tracing`'s attribute machinery is in scope.

pub(crate) use tracing::{debug, error, trace, warn};
