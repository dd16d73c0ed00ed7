//! The debug-info loader: parses the target binary's debug records once at
//! startup and builds the read-only [`InfoTable`] the resolver and writer
//! consult for the rest of the process's life. Opens the file, parses its
//! section headers, iterates compilation units, descends to immediate
//! children, and classifies each by its distinguishing attribute.

pub mod error;
pub mod resolver;
pub mod types;

use std::sync::Arc;

use crate::dwarf::abbrev::AbbrevTable;
use crate::dwarf::constants::*;
use crate::dwarf::die::{self, AttrValue, CuHeader, Die};

pub use error::{Error, Result};
pub use resolver::resolve;
pub use types::{Function, InfoTable, Local, StaticVar, Type, VariableIdentity};

const INITIAL_CAPACITY: usize = 16;

impl InfoTable {
    /// Loads and classifies every compile unit in `path`'s debug sections.
    pub fn load(path: &str) -> Result<InfoTable> {
        crate::diag::trace!("debuginfo::load: {path}");
        let bytes = std::fs::read(path)
            .map_err(|_| Error::Io(format!("{}: {}", path, crate::oserr::last_os_error_str())))?;
        let sections = crate::elf::read_debug_sections(&bytes)
            .map_err(|e| Error::Format(e.0))?;

        let mut table = InfoTable {
            functions: Vec::with_capacity(INITIAL_CAPACITY),
            statics: Vec::with_capacity(INITIAL_CAPACITY),
            types: Vec::with_capacity(INITIAL_CAPACITY),
            line_programs: Vec::new(),
        };

        let units = parse_units(&sections)?;

        for unit in &units {
            load_compile_unit(&sections, unit, &units, &mut table)?;
        }

        Ok(table)
    }
}

struct Unit {
    header: CuHeader,
    abbrevs: AbbrevTable,
}

fn parse_units(sections: &crate::elf::DebugSections) -> Result<Vec<Unit>> {
    let mut units = Vec::new();
    let mut offset = 0usize;
    while offset < sections.debug_info.len() {
        let header = die::parse_cu_header(&sections.debug_info, offset)?;
        let abbrevs = AbbrevTable::parse(&sections.debug_abbrev, header.abbrev_offset as usize)?;
        let unit_end = header.unit_end;
        units.push(Unit { header, abbrevs });
        offset = unit_end;
    }
    Ok(units)
}

fn find_unit<'u>(units: &'u [Unit], offset: usize) -> Option<&'u Unit> {
    units
        .iter()
        .find(|u| offset >= u.header.cu_base() && offset < u.header.unit_end)
}

fn load_compile_unit(
    sections: &crate::elf::DebugSections,
    unit: &Unit,
    units: &[Unit],
    table: &mut InfoTable,
) -> Result<()> {
    let debug_info = &sections.debug_info;
    let (root, mut cursor) = match die::read_die(debug_info, &unit.header, &unit.abbrevs, unit.header.dies_start)? {
        Some((die, next)) => (die, next),
        None => return Ok(()),
    };

    let comp_dir = attr_string(&root, sections, DW_AT_comp_dir).unwrap_or_default();
    let source_path = attr_string(&root, sections, DW_AT_name).unwrap_or_default();

    if let Some(stmt_list) = root.attr(DW_AT_stmt_list).and_then(AttrValue::as_u64) {
        if let Ok(program) = crate::dwarf::line::parse(&sections.debug_line, stmt_list as usize, &comp_dir) {
            if !program.is_empty() {
                table.line_programs.push(program);
            }
        }
    }

    if !root.has_children {
        return Ok(());
    }

    // Walk direct children of the CU root, classifying each per spec
    // §4.1's priority order. Children are siblings in `.debug_info`
    // order; a child's own children (if it has any, e.g. a subprogram's
    // formal parameters and locals) are skipped over here and read
    // separately by `extract_function`.
    loop {
        let child_offset = cursor;
        let Some((child, next)) = die::read_die(debug_info, &unit.header, &unit.abbrevs, child_offset)? else {
            break;
        };
        cursor = if child.has_children {
            skip_subtree(debug_info, unit, next)?
        } else {
            next
        };

        classify_and_extract(debug_info, unit, units, sections, &child, &source_path, table)?;
    }

    Ok(())
}

/// Skips past a DIE's children to the offset right after its closing null
/// entry, without decoding them — used for CU-level children we don't
/// need the insides of (anything but a function, whose locals we do want).
fn skip_subtree(debug_info: &[u8], unit: &Unit, mut offset: usize) -> Result<usize> {
    let mut depth = 1;
    while depth > 0 {
        match die::read_die(debug_info, &unit.header, &unit.abbrevs, offset)? {
            None => {
                depth -= 1;
                offset += 1; // the null entry is one ULEB128 byte (0x00)
            }
            Some((child, next)) => {
                offset = next;
                if child.has_children {
                    depth += 1;
                }
            }
        }
    }
    Ok(offset)
}

fn classify_and_extract(
    debug_info: &[u8],
    unit: &Unit,
    units: &[Unit],
    sections: &crate::elf::DebugSections,
    die: &Die<'_>,
    cu_source_path: &str,
    table: &mut InfoTable,
) -> Result<()> {
    if die.attr(DW_AT_low_pc).is_some() {
        if let Some(function) = extract_function(debug_info, unit, units, sections, die, cu_source_path)? {
            push_checked(&mut table.functions, function)?;
        }
    } else if die.attr(DW_AT_location).is_some() {
        if let Some(var) = extract_static(units, sections, die) {
            push_checked(&mut table.statics, var)?;
        }
    } else if die.attr(DW_AT_byte_size).is_some() {
        if let Some(ty) = extract_type(sections, die, cu_source_path) {
            push_checked(&mut table.types, Arc::new(ty))?;
        }
    }
    Ok(())
}

fn push_checked<T>(vec: &mut Vec<T>, value: T) -> Result<()> {
    if vec.len() == vec.capacity() {
        vec.try_reserve(vec.capacity().max(1)).map_err(|_| Error::OutOfMemory)?;
    }
    vec.push(value);
    Ok(())
}

fn attr_string<'a>(
    die: &Die<'a>,
    sections: &'a crate::elf::DebugSections,
    which: u64,
) -> Option<String> {
    match die.attr(which)? {
        AttrValue::String(s) => Some((*s).to_owned()),
        AttrValue::StrOffset(off) => read_strp(&sections.debug_str, *off).or_else(|| {
            read_strp(&sections.debug_line_str, *off)
        }),
        _ => None,
    }
}

fn read_strp(section: &[u8], offset: u64) -> Option<String> {
    let start = offset as usize;
    let bytes = section.get(start..)?;
    let end = bytes.iter().position(|&b| b == 0)?;
    core::str::from_utf8(&bytes[..end]).ok().map(str::to_owned)
}

/// §4.1 "Function extraction": resolve `name`, `low_pc`, `length`
/// (`high_pc` as either a constant length or an address, per the
/// arithmetically-correct `high - low` spec.md mandates — not the source's
/// reversed-subtraction bug, see §9). Missing any of the three rejects the
/// function. Descends once into children for locals.
fn extract_function(
    debug_info: &[u8],
    unit: &Unit,
    units: &[Unit],
    sections: &crate::elf::DebugSections,
    die: &Die<'_>,
    cu_source_path: &str,
) -> Result<Option<Function>> {
    let Some(name) = attr_string(die, sections, DW_AT_name) else {
        return Ok(None);
    };
    let Some(low_pc) = die.attr(DW_AT_low_pc).and_then(AttrValue::as_u64) else {
        return Ok(None);
    };
    let Some(high_pc_attr) = die.attr(DW_AT_high_pc) else {
        return Ok(None);
    };
    let length = match high_pc_attr {
        AttrValue::Addr(high) => {
            if *high < low_pc {
                crate::diag::warn!("extract_function: high_pc {high:#x} < low_pc {low_pc:#x}, rejecting {name}");
                return Ok(None);
            }
            high - low_pc
        }
        other => other.as_u64().unwrap_or(0),
    };
    if length == 0 {
        return Ok(None);
    }

    let mut locals = Vec::new();
    if die.has_children {
        let children_start = die.offset
            + encoded_die_header_len(debug_info, unit, die.offset)?;
        let mut offset = children_start;
        loop {
            let Some((child, next)) = die::read_die(debug_info, &unit.header, &unit.abbrevs, offset)? else {
                break;
            };
            offset = if child.has_children {
                skip_subtree(debug_info, unit, next)?
            } else {
                next
            };
            if matches!(child.tag, DW_TAG_variable | DW_TAG_formal_parameter) {
                if let Some(local) = extract_local(units, sections, &child) {
                    locals.push(local);
                }
            }
        }
    }

    Ok(Some(Function {
        name,
        source_path: cu_source_path.to_owned(),
        low_pc,
        length,
        locals,
    }))
}

/// The byte length of a DIE's abbreviation-code + attribute encoding, i.e.
/// how far past `offset` its first child (if any) starts. Recomputed by
/// re-reading the DIE rather than threaded through as a second return
/// value everywhere, since only `extract_function` needs it.
fn encoded_die_header_len(debug_info: &[u8], unit: &Unit, offset: usize) -> Result<usize> {
    let (_, next) = die::read_die(debug_info, &unit.header, &unit.abbrevs, offset)?
        .ok_or_else(|| Error::Format("expected a DIE, found a null entry".into()))?;
    Ok(next - offset)
}

/// §4.1 "local": name + type reference + location, where the location must
/// be a single-op `DW_OP_fbreg` expression; anything else rejects the
/// local.
fn extract_local(units: &[Unit], sections: &crate::elf::DebugSections, die: &Die<'_>) -> Option<Local> {
    let name = attr_string(die, sections, DW_AT_name)?;
    let type_ref = die.attr(DW_AT_type)?.as_offset()?;
    let location = die.attr(DW_AT_location)?.as_block()?;
    let frame_offset = decode_single_op_fbreg(location)?;
    let ty = resolve_type_ref(units, sections, type_ref)?;
    Some(Local {
        name,
        ty: Arc::new(ty),
        frame_offset,
    })
}

/// §4.1 "Static variable extraction": name + type reference + location,
/// where the location must contain `DW_OP_addr`.
fn extract_static(units: &[Unit], sections: &crate::elf::DebugSections, die: &Die<'_>) -> Option<StaticVar> {
    let name = attr_string(die, sections, DW_AT_name)?;
    let type_ref = die.attr(DW_AT_type)?.as_offset()?;
    let location = die.attr(DW_AT_location)?.as_block()?;
    let address = decode_single_op_addr(location)?;
    let ty = resolve_type_ref(units, sections, type_ref)?;
    let source_path = attr_string(die, sections, DW_AT_decl_file).unwrap_or_default();
    Some(StaticVar {
        name,
        ty: Arc::new(ty),
        source_path,
        address,
    })
}

/// A single-op location expression: one opcode byte followed by its
/// (fixed-size, for the two opcodes this loader understands) operand.
fn decode_single_op_fbreg(expr: &[u8]) -> Option<i64> {
    let (&op, rest) = expr.split_first()?;
    if op != DW_OP_fbreg {
        return None;
    }
    let mut cursor = crate::dwarf::cursor::Cursor::new(rest);
    let offset = cursor.read_ileb128().ok()?;
    cursor.is_empty().then_some(offset)
}

fn decode_single_op_addr(expr: &[u8]) -> Option<u64> {
    let (&op, rest) = expr.split_first()?;
    if op != DW_OP_addr || rest.len() != 8 {
        return None;
    }
    Some(u64::from_le_bytes(rest.try_into().ok()?))
}

/// Resolves the type reference attribute through its DIE offset. Only base
/// types yield a non-zero size; pointer/typedef/composite chains that do
/// not themselves carry a byte-size attribute yield `size = 0`, since this
/// follows the reference exactly one hop rather than chasing a full type
/// graph.
fn resolve_type_ref(units: &[Unit], sections: &crate::elf::DebugSections, offset: usize) -> Option<Type> {
    let unit = find_unit(units, offset)?;
    let (die, _) = die::read_die(&sections.debug_info, &unit.header, &unit.abbrevs, offset).ok()??;
    let (root, _) = die::read_die(
        &sections.debug_info,
        &unit.header,
        &unit.abbrevs,
        unit.header.dies_start,
    )
    .ok()??;
    let cu_source_path = attr_string(&root, sections, DW_AT_name).unwrap_or_default();
    extract_type(sections, &die, &cu_source_path)
}

fn extract_type(sections: &crate::elf::DebugSections, die: &Die<'_>, cu_source_path: &str) -> Option<Type> {
    let name = attr_string(die, sections, DW_AT_name)?;
    let size = die.attr(DW_AT_byte_size)?.as_u64()?;
    if size == 0 {
        return None;
    }
    Some(Type {
        name,
        size,
        source_path: cu_source_path.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_single_op_fbreg_roundtrip() {
        // DW_OP_fbreg -16
        let expr = [DW_OP_fbreg, 0x70];
        assert_eq!(decode_single_op_fbreg(&expr), Some(-16));
    }

    #[test]
    fn decode_single_op_fbreg_rejects_other_opcodes() {
        let expr = [DW_OP_addr, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(decode_single_op_fbreg(&expr), None);
    }

    #[test]
    fn decode_single_op_addr_roundtrip() {
        let mut expr = vec![DW_OP_addr];
        expr.extend_from_slice(&0x404028u64.to_le_bytes());
        assert_eq!(decode_single_op_addr(&expr), Some(0x404028));
    }

    #[test]
    fn extract_type_rejects_zero_size() {
        use crate::dwarf::die::AttrValue;
        let die = Die {
            offset: 0,
            tag: DW_TAG_pointer_type,
            has_children: false,
            attrs: vec![(DW_AT_byte_size, AttrValue::Udata(0))],
        };
        let sections = crate::elf::DebugSections::default();
        assert!(extract_type(&sections, &die, "").is_none());
    }

    #[test]
    fn extract_type_rejects_missing_name() {
        use crate::dwarf::die::AttrValue;
        let die = Die {
            offset: 0,
            tag: DW_TAG_base_type,
            has_children: false,
            attrs: vec![(DW_AT_byte_size, AttrValue::Udata(4))],
        };
        let sections = crate::elf::DebugSections::default();
        assert!(extract_type(&sections, &die, "").is_none());
    }
}
