//! A minimal `.debug_line` state-machine decoder producing `(address, file,
//! line)` rows. Its absence or a malformed program never fails the load, it
//! only means the writer can't populate `"file"`/`"line"` for a trace
//! entry.
//!
//! Source: DWARF5 §6.2 "Line Number Program".

use super::cursor::{Cursor, Result};

#[derive(Debug, Clone)]
pub struct LineRow {
    pub address: u64,
    pub file: String,
    pub line: u64,
}

/// Line rows for one compilation unit, sorted by address so the writer can
/// binary-search the nearest row at or below a given `pc`.
#[derive(Debug, Default)]
pub struct LineProgram {
    rows: Vec<LineRow>,
}

impl LineProgram {
    pub fn row_for(&self, pc: u64) -> Option<&LineRow> {
        match self.rows.binary_search_by_key(&pc, |r| r.address) {
            Ok(idx) => Some(&self.rows[idx]),
            Err(0) => None,
            Err(idx) => Some(&self.rows[idx - 1]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

struct Registers {
    address: u64,
    file: usize,
    line: i64,
}

impl Default for Registers {
    fn default() -> Self {
        Registers {
            address: 0,
            file: 1,
            line: 1,
        }
    }
}

/// Parses the program starting at `offset` in `.debug_line` (the value of a
/// CU's `DW_AT_stmt_list`). Unknown standard/extended opcodes are skipped
/// using their declared operand counts/lengths rather than rejected, since
/// one unfamiliar vendor opcode shouldn't discard an otherwise-good table.
pub fn parse(debug_line: &[u8], offset: usize, comp_dir: &str) -> Result<LineProgram> {
    let mut cursor = Cursor::new(&debug_line[offset..]);
    let unit_length = cursor.read_u32()? as usize;
    let unit_end = cursor.offset() + unit_length;
    let version = cursor.read_u16()?;
    let _header_length = cursor.read_u32()?;
    let minimum_instruction_length = cursor.read_u8()?;
    if version >= 4 {
        let _max_ops = cursor.read_u8()?;
    }
    let _default_is_stmt = cursor.read_u8()?;
    let line_base = cursor.read_u8()? as i8;
    let line_range = cursor.read_u8()?;
    let opcode_base = cursor.read_u8()?;
    let mut standard_opcode_lengths = Vec::with_capacity(opcode_base as usize - 1);
    for _ in 1..opcode_base {
        standard_opcode_lengths.push(cursor.read_u8()?);
    }

    // include_directories: sequence of non-empty strings, empty string
    // terminates (pre-DWARF5 layout, which is what this reader targets).
    let mut _include_dirs = vec![comp_dir.to_string()];
    loop {
        let s = cursor.read_utf8_cstr()?;
        if s.is_empty() {
            break;
        }
        _include_dirs.push(s.to_string());
    }

    // file_names: (name, dir_index uleb, mtime uleb, size uleb)*, empty
    // name terminates.
    let mut files = vec![String::new()]; // index 0 unused pre-DWARF5
    loop {
        let name = cursor.read_utf8_cstr()?;
        if name.is_empty() {
            break;
        }
        let _dir_index = cursor.read_uleb128()?;
        let _mtime = cursor.read_uleb128()?;
        let _size = cursor.read_uleb128()?;
        files.push(name.to_string());
    }

    let mut rows = Vec::new();
    let mut regs = Registers::default();
    while cursor.offset() < unit_end {
        let opcode = cursor.read_u8()?;
        if opcode == 0 {
            // extended opcode
            let len = cursor.read_uleb128()? as usize;
            let body = cursor.read_bytes(len)?;
            if body.is_empty() {
                continue;
            }
            match body[0] {
                super::constants::DW_LNE_end_sequence => {
                    emit(&mut rows, &regs, &files);
                    regs = Registers::default();
                }
                super::constants::DW_LNE_set_address => {
                    if body.len() >= 9 {
                        regs.address = u64::from_le_bytes(body[1..9].try_into().unwrap());
                    }
                }
                _ => {}
            }
        } else if opcode < opcode_base {
            match opcode {
                super::constants::DW_LNS_copy => emit(&mut rows, &regs, &files),
                super::constants::DW_LNS_advance_pc => {
                    let adv = cursor.read_uleb128()?;
                    regs.address += adv * minimum_instruction_length as u64;
                }
                super::constants::DW_LNS_advance_line => {
                    regs.line += cursor.read_ileb128()?;
                }
                super::constants::DW_LNS_set_file => {
                    regs.file = cursor.read_uleb128()? as usize;
                }
                super::constants::DW_LNS_const_add_pc => {
                    let adjusted = (255 - opcode_base) / line_range;
                    regs.address += adjusted as u64 * minimum_instruction_length as u64;
                }
                other => {
                    // Skip declared operand count for opcodes we don't
                    // special-case.
                    let n = standard_opcode_lengths
                        .get(other as usize - 1)
                        .copied()
                        .unwrap_or(0);
                    for _ in 0..n {
                        cursor.read_uleb128()?;
                    }
                }
            }
        } else {
            // special opcode
            let adjusted = opcode - opcode_base;
            let addr_advance = adjusted / line_range;
            let line_advance = line_base as i64 + (adjusted % line_range) as i64;
            regs.address += addr_advance as u64 * minimum_instruction_length as u64;
            regs.line += line_advance;
            emit(&mut rows, &regs, &files);
        }
    }

    rows.sort_by_key(|r| r.address);
    Ok(LineProgram { rows })
}

fn emit(rows: &mut Vec<LineRow>, regs: &Registers, files: &[String]) {
    let file = files.get(regs.file).cloned().unwrap_or_default();
    rows.push(LineRow {
        address: regs.address,
        file,
        line: regs.line.max(0) as u64,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_program(body: &[u8]) -> Vec<u8> {
        let mut header_tail = Vec::new();
        header_tail.push(1u8); // minimum_instruction_length
        header_tail.push(1u8); // max_ops (version 4)
        header_tail.push(1u8); // default_is_stmt
        header_tail.push(0xfbu8); // line_base = -5
        header_tail.push(14u8); // line_range
        header_tail.push(13u8); // opcode_base
        header_tail.extend_from_slice(&[0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]); // 12 std opcode lengths
        header_tail.push(0); // include_directories terminator
        header_tail.extend_from_slice(b"main.rs\0");
        header_tail.extend_from_slice(&[0, 0, 0]); // dir/mtime/size
        header_tail.push(0); // file_names terminator
        let header_length = header_tail.len() as u32;

        let mut unit = Vec::new();
        unit.extend_from_slice(&4u16.to_le_bytes()); // version
        unit.extend_from_slice(&header_length.to_le_bytes());
        unit.extend_from_slice(&header_tail);
        unit.extend_from_slice(body);

        let mut out = Vec::new();
        out.extend_from_slice(&(unit.len() as u32).to_le_bytes());
        out.extend_from_slice(&unit);
        out
    }

    #[test]
    fn decodes_set_address_copy_end_sequence() {
        let mut body = Vec::new();
        // DW_LNE_set_address 0x401000
        body.push(0); // extended opcode marker
        body.push(9); // length
        body.push(super::super::constants::DW_LNE_set_address);
        body.extend_from_slice(&0x401000u64.to_le_bytes());
        // DW_LNS_copy
        body.push(super::super::constants::DW_LNS_copy);
        // DW_LNE_end_sequence
        body.push(0);
        body.push(1);
        body.push(super::super::constants::DW_LNE_end_sequence);

        let bytes = build_program(&body);
        let program = parse(&bytes, 0, "/src").unwrap();
        let row = program.row_for(0x401000).unwrap();
        assert_eq!(row.address, 0x401000);
        assert_eq!(row.file, "main.rs");
        assert_eq!(row.line, 1);
    }

    #[test]
    fn row_for_before_any_row_is_none() {
        let program = LineProgram::default();
        assert!(program.row_for(0x1000).is_none());
    }
}
