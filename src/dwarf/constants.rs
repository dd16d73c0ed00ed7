//! DWARF tag/attribute/form/opcode constants actually consulted by the
//! loader. Not exhaustive — only what's needed to classify and decode
//! entries.

#![allow(dead_code, non_upper_case_globals)]

pub const DW_TAG_subprogram: u64 = 0x2e;
pub const DW_TAG_variable: u64 = 0x34;
pub const DW_TAG_formal_parameter: u64 = 0x05;
pub const DW_TAG_base_type: u64 = 0x24;
pub const DW_TAG_pointer_type: u64 = 0x0f;
pub const DW_TAG_typedef: u64 = 0x16;
pub const DW_TAG_const_type: u64 = 0x26;

pub const DW_AT_name: u64 = 0x03;
pub const DW_AT_byte_size: u64 = 0x0b;
pub const DW_AT_low_pc: u64 = 0x11;
pub const DW_AT_high_pc: u64 = 0x12;
pub const DW_AT_location: u64 = 0x02;
pub const DW_AT_type: u64 = 0x49;
pub const DW_AT_decl_file: u64 = 0x3a;
pub const DW_AT_decl_line: u64 = 0x3b;
pub const DW_AT_stmt_list: u64 = 0x10;
pub const DW_AT_comp_dir: u64 = 0x1b;

pub const DW_FORM_addr: u64 = 0x01;
pub const DW_FORM_block2: u64 = 0x03;
pub const DW_FORM_block4: u64 = 0x04;
pub const DW_FORM_data2: u64 = 0x05;
pub const DW_FORM_data4: u64 = 0x06;
pub const DW_FORM_data8: u64 = 0x07;
pub const DW_FORM_string: u64 = 0x08;
pub const DW_FORM_block: u64 = 0x09;
pub const DW_FORM_block1: u64 = 0x0a;
pub const DW_FORM_data1: u64 = 0x0b;
pub const DW_FORM_flag: u64 = 0x0c;
pub const DW_FORM_sdata: u64 = 0x0d;
pub const DW_FORM_strp: u64 = 0x0e;
pub const DW_FORM_udata: u64 = 0x0f;
pub const DW_FORM_ref_addr: u64 = 0x10;
pub const DW_FORM_ref1: u64 = 0x11;
pub const DW_FORM_ref2: u64 = 0x12;
pub const DW_FORM_ref4: u64 = 0x13;
pub const DW_FORM_ref8: u64 = 0x14;
pub const DW_FORM_ref_udata: u64 = 0x15;
pub const DW_FORM_indirect: u64 = 0x16;
pub const DW_FORM_sec_offset: u64 = 0x17;
pub const DW_FORM_exprloc: u64 = 0x18;
pub const DW_FORM_flag_present: u64 = 0x19;
pub const DW_FORM_strx: u64 = 0x1a;
pub const DW_FORM_addrx: u64 = 0x1b;
pub const DW_FORM_implicit_const: u64 = 0x21;
pub const DW_FORM_line_strp: u64 = 0x1f;

/// The only single-op location expressions the loader understands: the
/// frame-relative opcode for locals, the absolute-address opcode for
/// statics.
pub const DW_OP_addr: u8 = 0x03;
pub const DW_OP_fbreg: u8 = 0x91;

pub const DW_LNS_copy: u8 = 0x01;
pub const DW_LNS_advance_pc: u8 = 0x02;
pub const DW_LNS_advance_line: u8 = 0x03;
pub const DW_LNS_set_file: u8 = 0x04;
pub const DW_LNS_const_add_pc: u8 = 0x08;
pub const DW_LNE_end_sequence: u8 = 0x01;
pub const DW_LNE_set_address: u8 = 0x02;
