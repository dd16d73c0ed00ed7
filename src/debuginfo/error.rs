//! Loader error kinds. Propagate to the caller; a partial table is never
//! returned — [`super::InfoTable::load`] either returns a fully built table
//! or one of these.

#[derive(Debug)]
pub enum Error {
    /// Cannot open the target binary.
    Io(String),
    /// The debug session (ELF + DWARF) refuses to initialize or produces
    /// invalid records.
    Format(String),
    /// A growable sequence could not grow.
    OutOfMemory,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Io(msg) => write!(f, "io error: {msg}"),
            Error::Format(msg) => write!(f, "format error: {msg}"),
            Error::OutOfMemory => write!(f, "out of memory"),
        }
    }
}

impl std::error::Error for Error {}

impl From<crate::dwarf::Error> for Error {
    fn from(e: crate::dwarf::Error) -> Self {
        Error::Format(e.0)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
