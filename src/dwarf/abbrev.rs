//! `.debug_abbrev` parsing. Each compilation unit points at an abbreviation
//! table entry; every DIE in the unit starts with a ULEB128 abbreviation
//! code that indexes into that table to learn its tag and attribute list.
//!
//! Source: DWARF5 §7.5.3 "Abbreviations Tables".

use std::collections::HashMap;

use super::constants::*;
use super::cursor::{Cursor, Result};

#[derive(Debug, Clone, Copy)]
pub struct AttrSpec {
    pub attr: u64,
    pub form: u64,
    pub implicit_const: i64,
}

#[derive(Debug, Clone)]
pub struct AbbrevDecl {
    pub tag: u64,
    pub has_children: bool,
    pub attrs: Vec<AttrSpec>,
}

/// Maps abbreviation code -> declaration, for one compilation unit's slice
/// of `.debug_abbrev`.
#[derive(Debug, Default)]
pub struct AbbrevTable {
    decls: HashMap<u64, AbbrevDecl>,
}

impl AbbrevTable {
    pub fn parse(section: &[u8], start_offset: usize) -> Result<Self> {
        let mut cursor = Cursor::new(&section[start_offset..]);
        let mut decls = HashMap::new();
        loop {
            if cursor.is_empty() {
                break;
            }
            let code = cursor.read_uleb128()?;
            if code == 0 {
                break;
            }
            let tag = cursor.read_uleb128()?;
            let has_children = cursor.read_u8()? != 0;
            let mut attrs = Vec::new();
            loop {
                let attr = cursor.read_uleb128()?;
                let form = cursor.read_uleb128()?;
                let implicit_const = if form == DW_FORM_implicit_const {
                    cursor.read_ileb128()?
                } else {
                    0
                };
                if attr == 0 && form == 0 {
                    break;
                }
                attrs.push(AttrSpec {
                    attr,
                    form,
                    implicit_const,
                });
            }
            decls.insert(
                code,
                AbbrevDecl {
                    tag,
                    has_children,
                    attrs,
                },
            );
        }
        Ok(AbbrevTable { decls })
    }

    pub fn get(&self, code: u64) -> Option<&AbbrevDecl> {
        self.decls.get(&code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_declaration() {
        // code=1, tag=DW_TAG_base_type, no children,
        // DW_AT_name/DW_FORM_string, DW_AT_byte_size/DW_FORM_data1, end.
        let bytes = [
            0x01, DW_TAG_base_type as u8, 0x00, DW_AT_name as u8, DW_FORM_string as u8,
            DW_AT_byte_size as u8, DW_FORM_data1 as u8, 0x00, 0x00, 0x00,
        ];
        let table = AbbrevTable::parse(&bytes, 0).unwrap();
        let decl = table.get(1).unwrap();
        assert_eq!(decl.tag, DW_TAG_base_type);
        assert!(!decl.has_children);
        assert_eq!(decl.attrs.len(), 2);
    }
}
