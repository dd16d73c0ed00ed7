//! Just enough ELF64 section-header parsing to find `.debug_info`,
//! `.debug_abbrev`, `.debug_str`, and `.debug_line` in the target binary.
//! Uses the same `Cursor` idiom as the DWARF reader rather than a general
//! object-file crate, since the only thing this client ever needs from an
//! ELF file is "give me these four sections by name".

use crate::dwarf::cursor::{Cursor, Error, Result};

const EI_MAG: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const ELFCLASS64: u8 = 2;
const SHT_STRTAB: u32 = 3;

#[derive(Debug, Default)]
pub struct DebugSections {
    pub debug_info: Vec<u8>,
    pub debug_abbrev: Vec<u8>,
    pub debug_str: Vec<u8>,
    pub debug_line: Vec<u8>,
    pub debug_line_str: Vec<u8>,
}

struct SectionHeader {
    name_offset: u32,
    sh_type: u32,
    offset: u64,
    size: u64,
}

/// Reads `.debug_*` sections out of a 64-bit little-endian ELF file.
/// Anything else (wrong magic, 32-bit ELF, missing sections) degrades to a
/// non-fatal format error at the call site.
pub fn read_debug_sections(bytes: &[u8]) -> Result<DebugSections> {
    if bytes.len() < 64 || bytes[0..4] != EI_MAG {
        return Err(Error("not an ELF file".into()));
    }
    if bytes[4] != ELFCLASS64 {
        return Err(Error("only 64-bit ELF is supported".into()));
    }

    let e_shoff = u64::from_le_bytes(bytes[0x28..0x30].try_into().unwrap());
    let e_shentsize = u16::from_le_bytes(bytes[0x3a..0x3c].try_into().unwrap()) as usize;
    let e_shnum = u16::from_le_bytes(bytes[0x3c..0x3e].try_into().unwrap()) as usize;
    let e_shstrndx = u16::from_le_bytes(bytes[0x3e..0x40].try_into().unwrap()) as usize;

    let mut headers = Vec::with_capacity(e_shnum);
    for i in 0..e_shnum {
        let start = e_shoff as usize + i * e_shentsize;
        let raw = bytes
            .get(start..start + e_shentsize)
            .ok_or_else(|| Error("section header table truncated".into()))?;
        let mut c = Cursor::new(raw);
        let name_offset = c.read_u32()?;
        let sh_type = c.read_u32()?;
        c.skip(8)?; // flags
        c.skip(8)?; // addr
        let offset = c.read_u64()?;
        let size = c.read_u64()?;
        headers.push(SectionHeader {
            name_offset,
            sh_type,
            offset,
            size,
        });
    }

    let shstrtab = headers
        .get(e_shstrndx)
        .filter(|h| h.sh_type == SHT_STRTAB)
        .ok_or_else(|| Error("missing section header string table".into()))?;
    let shstrtab_bytes = section_bytes(bytes, shstrtab.offset, shstrtab.size)?;

    let mut sections = DebugSections::default();
    for h in &headers {
        let name = read_cstr_at(shstrtab_bytes, h.name_offset as usize);
        let data = section_bytes(bytes, h.offset, h.size)?;
        match name {
            ".debug_info" => sections.debug_info = data.to_vec(),
            ".debug_abbrev" => sections.debug_abbrev = data.to_vec(),
            ".debug_str" => sections.debug_str = data.to_vec(),
            ".debug_line" => sections.debug_line = data.to_vec(),
            ".debug_line_str" => sections.debug_line_str = data.to_vec(),
            _ => {}
        }
    }

    if sections.debug_info.is_empty() || sections.debug_abbrev.is_empty() {
        return Err(Error("no debug info present".into()));
    }

    Ok(sections)
}

fn section_bytes(bytes: &[u8], offset: u64, size: u64) -> Result<&[u8]> {
    let start = offset as usize;
    let end = start
        .checked_add(size as usize)
        .ok_or_else(|| Error("section size overflow".into()))?;
    bytes
        .get(start..end)
        .ok_or_else(|| Error("section out of file bounds".into()))
}

fn read_cstr_at(data: &[u8], offset: usize) -> &str {
    let slice = &data[offset.min(data.len())..];
    let end = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
    core::str::from_utf8(&slice[..end]).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_elf() {
        let err = read_debug_sections(b"not an elf file at all").unwrap_err();
        assert!(err.0.contains("ELF"));
    }

    #[test]
    fn rejects_truncated_header() {
        let mut bytes = vec![0u8; 63];
        bytes[0..4].copy_from_slice(&EI_MAG);
        assert!(read_debug_sections(&bytes).is_err());
    }
}
