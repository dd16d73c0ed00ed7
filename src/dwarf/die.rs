//! `.debug_info` compilation-unit and DIE (debugging information entry)
//! decoding: CU headers, attribute values per DWARF form, and the child
//! iteration the loader descends with.
//!
//! Source: DWARF5 §7.5 "Format of Debugging Information".

use super::abbrev::{AbbrevDecl, AbbrevTable};
use super::constants::*;
use super::cursor::{Cursor, Error, Result};

#[derive(Debug, Clone)]
pub enum AttrValue<'a> {
    Udata(u64),
    Sdata(i64),
    Addr(u64),
    String(&'a str),
    /// Offset into `.debug_str`, not resolved here — resolved by the caller
    /// once it has the section bytes.
    StrOffset(u64),
    Block(&'a [u8]),
    Flag(bool),
    /// A reference to another DIE, stored as an offset into `.debug_info`.
    Ref(usize),
}

impl<'a> AttrValue<'a> {
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            AttrValue::Udata(v) => Some(v),
            AttrValue::Addr(v) => Some(v),
            AttrValue::Sdata(v) if v >= 0 => Some(v as u64),
            AttrValue::Flag(v) => Some(v as u64),
            _ => None,
        }
    }

    pub fn as_offset(&self) -> Option<usize> {
        match *self {
            AttrValue::Ref(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&'a [u8]> {
        match *self {
            AttrValue::Block(b) => Some(b),
            _ => None,
        }
    }
}

/// A decoded DIE: its tag and the attribute values the reader cared to
/// keep, plus the byte range of its children (if `has_children`).
#[derive(Debug, Clone)]
pub struct Die<'a> {
    pub offset: usize,
    pub tag: u64,
    pub has_children: bool,
    pub attrs: Vec<(u64, AttrValue<'a>)>,
}

impl<'a> Die<'a> {
    pub fn attr(&self, which: u64) -> Option<&AttrValue<'a>> {
        self.attrs
            .iter()
            .find(|(attr, _)| *attr == which)
            .map(|(_, v)| v)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CuHeader {
    /// Offset of the first byte after the header, i.e. where the root DIE
    /// starts.
    pub dies_start: usize,
    /// Offset one past the end of this unit within `.debug_info`.
    pub unit_end: usize,
    pub abbrev_offset: u64,
    pub address_size: u8,
    pub version: u16,
}

/// Parses a single compilation unit header starting at `offset` within
/// `.debug_info`. Supports DWARF32, versions 4 and 5.
pub fn parse_cu_header(debug_info: &[u8], offset: usize) -> Result<CuHeader> {
    let mut cursor = Cursor::at_offset(&debug_info[offset..], offset);
    let unit_length = cursor.read_u32()? as usize;
    if unit_length == 0xffff_ffff {
        return Err(Error("64-bit DWARF is not supported".into()));
    }
    let unit_end = cursor.offset() + unit_length;
    let version = cursor.read_u16()?;
    let (abbrev_offset, address_size) = if version >= 5 {
        let _unit_type = cursor.read_u8()?;
        let address_size = cursor.read_u8()?;
        let abbrev_offset = cursor.read_u32()? as u64;
        (abbrev_offset, address_size)
    } else {
        let abbrev_offset = cursor.read_u32()? as u64;
        let address_size = cursor.read_u8()?;
        (abbrev_offset, address_size)
    };
    Ok(CuHeader {
        dies_start: cursor.offset(),
        unit_end,
        abbrev_offset,
        address_size,
        version,
    })
}

/// Reads one DIE (abbreviation code + attributes) at `offset`. Returns
/// `Ok(None)` for a null entry (the abbreviation-code-0 terminator that
/// closes a sibling list).
pub fn read_die<'a>(
    debug_info: &'a [u8],
    cu: &CuHeader,
    abbrevs: &AbbrevTable,
    offset: usize,
) -> Result<Option<(Die<'a>, usize)>> {
    let mut cursor = Cursor::at_offset(&debug_info[offset..cu.unit_end], offset);
    let code = cursor.read_uleb128()?;
    if code == 0 {
        return Ok(None);
    }
    let decl = abbrevs
        .get(code)
        .ok_or_else(|| Error(format!("unknown abbreviation code {code}")))?;
    let attrs = read_attrs(&mut cursor, decl, cu)?;
    let next_offset = cursor.offset();
    Ok(Some((
        Die {
            offset,
            tag: decl.tag,
            has_children: decl.has_children,
            attrs,
        },
        next_offset,
    )))
}

fn read_attrs<'a>(
    cursor: &mut Cursor<'a>,
    decl: &AbbrevDecl,
    cu: &CuHeader,
) -> Result<Vec<(u64, AttrValue<'a>)>> {
    let mut out = Vec::with_capacity(decl.attrs.len());
    for spec in &decl.attrs {
        let value = read_form(cursor, spec.form, cu, spec.implicit_const)?;
        out.push((spec.attr, value));
    }
    Ok(out)
}

fn read_form<'a>(
    cursor: &mut Cursor<'a>,
    form: u64,
    cu: &CuHeader,
    implicit_const: i64,
) -> Result<AttrValue<'a>> {
    Ok(match form {
        DW_FORM_addr => AttrValue::Addr(read_address(cursor, cu)?),
        DW_FORM_data1 => AttrValue::Udata(cursor.read_u8()? as u64),
        DW_FORM_data2 => AttrValue::Udata(cursor.read_u16()? as u64),
        DW_FORM_data4 => AttrValue::Udata(cursor.read_u32()? as u64),
        DW_FORM_data8 => AttrValue::Udata(cursor.read_u64()?),
        DW_FORM_sdata => AttrValue::Sdata(cursor.read_ileb128()?),
        DW_FORM_udata => AttrValue::Udata(cursor.read_uleb128()?),
        DW_FORM_string => AttrValue::String(cursor.read_utf8_cstr()?),
        DW_FORM_strp | DW_FORM_line_strp | DW_FORM_sec_offset => {
            AttrValue::StrOffset(cursor.read_u32()? as u64)
        }
        DW_FORM_strx => AttrValue::Udata(cursor.read_uleb128()?),
        DW_FORM_addrx => AttrValue::Udata(cursor.read_uleb128()?),
        DW_FORM_flag => AttrValue::Flag(cursor.read_u8()? != 0),
        DW_FORM_flag_present => AttrValue::Flag(true),
        DW_FORM_implicit_const => AttrValue::Sdata(implicit_const),
        DW_FORM_exprloc | DW_FORM_block => {
            let len = cursor.read_uleb128()? as usize;
            AttrValue::Block(cursor.read_bytes(len)?)
        }
        DW_FORM_block1 => {
            let len = cursor.read_u8()? as usize;
            AttrValue::Block(cursor.read_bytes(len)?)
        }
        DW_FORM_block2 => {
            let len = cursor.read_u16()? as usize;
            AttrValue::Block(cursor.read_bytes(len)?)
        }
        DW_FORM_block4 => {
            let len = cursor.read_u32()? as usize;
            AttrValue::Block(cursor.read_bytes(len)?)
        }
        DW_FORM_ref1 => AttrValue::Ref(cu_relative(cu, cursor.read_u8()? as u64)),
        DW_FORM_ref2 => AttrValue::Ref(cu_relative(cu, cursor.read_u16()? as u64)),
        DW_FORM_ref4 => AttrValue::Ref(cu_relative(cu, cursor.read_u32()? as u64)),
        DW_FORM_ref8 => AttrValue::Ref(cu_relative(cu, cursor.read_u64()?)),
        DW_FORM_ref_udata => AttrValue::Ref(cu_relative(cu, cursor.read_uleb128()?)),
        DW_FORM_ref_addr => AttrValue::Ref(cursor.read_u32()? as usize),
        DW_FORM_indirect => {
            let real_form = cursor.read_uleb128()?;
            return read_form(cursor, real_form, cu, implicit_const);
        }
        other => return Err(Error(format!("unsupported DW_FORM {other:#x}"))),
    })
}

fn read_address(cursor: &mut Cursor<'_>, cu: &CuHeader) -> Result<u64> {
    match cu.address_size {
        4 => cursor.read_u32().map(|v| v as u64),
        8 => cursor.read_u64(),
        other => Err(Error(format!("unsupported address size {other}"))),
    }
}

/// A CU-relative offset (§4.1: "CU-relative offset added to the CU's
/// global offset") translated into an absolute `.debug_info` offset.
fn cu_relative(cu: &CuHeader, rel: u64) -> usize {
    // The CU's global offset is the offset of its header, i.e.
    // `dies_start` minus the header size; but every reference we decode is
    // relative to that same header start, which equals `dies_start`'s CU
    // base. We recover it from `dies_start` by walking back is wasteful, so
    // callers instead pass already-based cursors; store the CU base here.
    cu.cu_base() + rel as usize
}

impl CuHeader {
    /// The compilation unit's own global offset (the offset of its
    /// `unit_length` field), used to resolve CU-relative type references.
    pub fn cu_base(&self) -> usize {
        self.dies_start - self.header_len()
    }

    fn header_len(&self) -> usize {
        if self.version >= 5 {
            4 + 2 + 1 + 1 + 4
        } else {
            4 + 2 + 4 + 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_cu(dies: &[u8], abbrev_offset: u32) -> Vec<u8> {
        let mut out = Vec::new();
        let version: u16 = 4;
        let address_size: u8 = 8;
        let body_len = 2 + 4 + 1 + dies.len();
        out.extend_from_slice(&(body_len as u32).to_le_bytes());
        out.extend_from_slice(&version.to_le_bytes());
        out.extend_from_slice(&abbrev_offset.to_le_bytes());
        out.push(address_size);
        out.extend_from_slice(dies);
        out
    }

    #[test]
    fn parses_v4_header_and_base_type_die() {
        // abbrev: code 1 = DW_TAG_base_type, no children,
        // DW_AT_name/string, DW_AT_byte_size/data1.
        let abbrev = [
            0x01, DW_TAG_base_type as u8, 0x00, DW_AT_name as u8, DW_FORM_string as u8,
            DW_AT_byte_size as u8, DW_FORM_data1 as u8, 0x00, 0x00, 0x00,
        ];
        let abbrevs = AbbrevTable::parse(&abbrev, 0).unwrap();

        let mut die_bytes = vec![0x01]; // abbrev code
        die_bytes.extend_from_slice(b"int\0");
        die_bytes.push(4);

        let cu_bytes = build_cu(&die_bytes, 0);
        let header = parse_cu_header(&cu_bytes, 0).unwrap();
        assert_eq!(header.version, 4);
        assert_eq!(header.address_size, 8);

        let (die, _) = read_die(&cu_bytes, &header, &abbrevs, header.dies_start)
            .unwrap()
            .unwrap();
        assert_eq!(die.tag, DW_TAG_base_type);
        assert!(matches!(die.attr(DW_AT_name), Some(AttrValue::String(s)) if *s == "int"));
        assert_eq!(die.attr(DW_AT_byte_size).unwrap().as_u64(), Some(4));
    }
}
