//! The ring buffer and JSON writer: a thread-local ring drained by a writer
//! that emits the trace file.

pub mod record;
pub mod ring;
pub mod writer;

pub use record::{Operand, WireOperand, WireRecord, VALS_LEN};
pub use ring::{Ring, CAPACITY, RING};
pub use writer::TraceWriter;
