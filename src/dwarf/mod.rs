//! Hand-rolled DWARF reader: just enough of `.debug_info`/`.debug_abbrev`/
//! `.debug_line` to support [`crate::debuginfo`]. No general-purpose DWARF
//! crate is linked — a full DWARF implementation is out of scope, this
//! reads only the handful of forms and opcodes the loader needs.

pub mod abbrev;
pub mod constants;
pub mod cursor;
pub mod die;
pub mod line;

pub use cursor::{Error, Result};
