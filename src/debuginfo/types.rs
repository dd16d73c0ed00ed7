//! The data model: type descriptors, variable identities, function records,
//! and the info table that owns them.

use std::sync::Arc;

/// `(name, size, source_path)`. Immutable after construction; `size == 0`
/// means "unresolved" and is rejected before ever reaching an `InfoTable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
    pub name: String,
    pub size: u64,
    pub source_path: String,
}

/// A local variable: a name, its type, and a frame-pointer-relative offset
/// decoded from a `DW_OP_fbreg` location expression.
#[derive(Debug, Clone)]
pub struct Local {
    pub name: String,
    pub ty: Arc<Type>,
    pub frame_offset: i64,
}

/// A file-scope variable: a name, its type, and the absolute virtual
/// address a `DW_OP_addr` location expression gave it.
#[derive(Debug, Clone)]
pub struct StaticVar {
    pub name: String,
    pub ty: Arc<Type>,
    pub source_path: String,
    pub address: u64,
}

/// `(name, source_path, low_pc, length, locals)`. Invariant:
/// `[low_pc, low_pc + length)` is non-empty and does not overlap any other
/// function's range in the same table — enforced by the loader dropping
/// (never truncating) a function whose length is zero, and left to the
/// source binary's own correctness for overlap, since debuggable binaries
/// never legitimately overlap function ranges.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub source_path: String,
    pub low_pc: u64,
    pub length: u64,
    pub locals: Vec<Local>,
}

impl Function {
    pub fn contains(&self, pc: u64) -> bool {
        pc >= self.low_pc && pc < self.low_pc + self.length
    }

    pub fn high_pc(&self) -> u64 {
        self.low_pc + self.length
    }
}

/// The result of a resolved variable-identity query: common fields plus the
/// static/local-specific ones, folded into one enum since the wire format
/// distinguishes them only by a `local: bool` flag, never by a different
/// shape.
#[derive(Debug, Clone)]
pub enum VariableIdentity {
    Static {
        name: String,
        ty: Arc<Type>,
        source_path: String,
        address: u64,
    },
    Local {
        name: String,
        ty: Arc<Type>,
        frame_offset: i64,
    },
}

impl VariableIdentity {
    pub fn name(&self) -> &str {
        match self {
            VariableIdentity::Static { name, .. } => name,
            VariableIdentity::Local { name, .. } => name,
        }
    }

    pub fn ty(&self) -> &Type {
        match self {
            VariableIdentity::Static { ty, .. } => ty,
            VariableIdentity::Local { ty, .. } => ty,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, VariableIdentity::Local { .. })
    }
}

/// Three growable, ordered sequences owned once at load time and read-only
/// for the rest of the process's life, safe to share by reference across
/// all worker threads. The growable-sequence policy (start small, double on
/// overflow) is satisfied for free by `Vec`'s own growth policy, which the
/// loader relies on rather than reimplementing.
#[derive(Debug, Default)]
pub struct InfoTable {
    pub(crate) functions: Vec<Function>,
    pub(crate) statics: Vec<StaticVar>,
    pub(crate) types: Vec<Arc<Type>>,
    pub(crate) line_programs: Vec<crate::dwarf::line::LineProgram>,
}

impl InfoTable {
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn statics(&self) -> &[StaticVar] {
        &self.statics
    }

    pub fn types(&self) -> &[Arc<Type>] {
        &self.types
    }

    /// Looks up the function containing `pc`, if any. Linear scan; could be
    /// replaced with sorted arrays and binary search without changing
    /// observable behavior.
    pub fn function_containing(&self, pc: u64) -> Option<&Function> {
        self.functions.iter().find(|f| f.contains(pc))
    }

    /// `"file"`/`"line"` lookup for the writer: finds the function
    /// containing `pc` and the nearest preceding line
    /// row across all loaded line programs. Returns `None` rather than a
    /// guess when nothing matches.
    pub fn source_location(&self, pc: u64) -> Option<(&str, u64)> {
        let func = self.function_containing(pc)?;
        self.line_programs
            .iter()
            .find_map(|p| p.row_for(pc))
            .map(|row| {
                if row.file.is_empty() {
                    (func.source_path.as_str(), row.line)
                } else {
                    (row.file.as_str(), row.line)
                }
            })
    }
}
