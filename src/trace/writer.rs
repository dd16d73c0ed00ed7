//! The JSON trace writer. Hand-rolled serialization — no `serde` in this
//! dependency stack, so the writer builds JSON text directly rather than
//! deriving it.

use super::record::{Operand, WireRecord};
use crate::arch::AbiConvention;
use crate::debuginfo::{resolve, InfoTable, VariableIdentity};
use crate::oserr::last_os_error_str;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};

static FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A per-thread trace file (`trace-<pid>-<counter>.log`). The suffix is
/// PID-derived plus a monotonic counter, which is enough to avoid
/// collisions across threads and across repeated runs in the same working
/// directory without needing a real thread-id syscall.
pub struct TraceWriter {
    file: File,
    first_line: bool,
}

impl TraceWriter {
    pub fn create_in(dir: &str) -> io::Result<TraceWriter> {
        let suffix = FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = format!("{dir}/trace-{}-{suffix}.log", std::process::id());
        Self::open_path(&path)
    }

    fn open_path(path: &str) -> io::Result<TraceWriter> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| {
                crate::diag::error!("failed to open trace file {path}: {}", last_os_error_str());
                e
            })?;
        file.write_all(b"[\n")?;
        Ok(TraceWriter {
            file,
            first_line: true,
        })
    }

    /// Appends one JSON object for `record`. `info`/`segm_base`/`abi` are
    /// used to enrich indirect operands with a resolved variable, when a
    /// debug-info table is loaded.
    pub fn write_record(
        &mut self,
        record: &WireRecord,
        info: Option<&InfoTable>,
        segm_base: u64,
        abi: AbiConvention,
    ) -> io::Result<()> {
        let json = render_record(record, info, segm_base, abi);
        if self.first_line {
            self.first_line = false;
        } else {
            self.file.write_all(b",\n")?;
        }
        self.file.write_all(json.as_bytes())
    }

    pub fn close(mut self) -> io::Result<()> {
        self.file.write_all(b"\n]")
    }
}

fn hex(v: u64) -> String {
    format!("0x{v:x}")
}

fn hex_signed(v: i64) -> String {
    if v < 0 {
        format!("\"-0x{:x}\"", v.unsigned_abs())
    } else {
        format!("\"0x{v:x}\"")
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn render_record(
    record: &WireRecord,
    info: Option<&InfoTable>,
    segm_base: u64,
    abi: AbiConvention,
) -> String {
    let mut out = String::new();
    out.push('{');
    out.push_str(&format!("\"pc\":{},", hex(record.pc)));
    out.push_str(&format!(
        "\"opcode\":{{\"value\":{},\"name\":{}}}",
        record.opcode,
        escape(crate::mnemonic::name_of(record.opcode))
    ));

    let pc_rel = record.pc.wrapping_sub(segm_base);
    if let Some((file, line)) = info.and_then(|t| t.source_location(pc_rel)) {
        out.push_str(&format!(",\"file\":{},\"line\":{line}", escape(file)));
    }

    let num_vals = (record.num_vals as usize).min(record.vals.len());
    out.push_str(",\"operands\":[");
    for (i, wire) in record.vals[..num_vals].iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let operand = Operand::from_wire(wire);
        out.push_str(&render_operand(&operand, info, segm_base, abi, record.bp));
    }
    out.push(']');
    out.push('}');
    out
}

fn render_operand(
    operand: &Operand,
    info: Option<&InfoTable>,
    segm_base: u64,
    abi: AbiConvention,
    bp: u64,
) -> String {
    match operand {
        Operand::Unknown => "{\"type\":null}".to_owned(),
        Operand::Register { name, value } => {
            format!(
                "{{\"type\":\"register\",\"name\":{},\"value\":{}}}",
                escape(name),
                hex(*value)
            )
        }
        Operand::Immediate { value } => {
            format!("{{\"type\":\"immediate\",\"value\":{}}}", hex(*value))
        }
        Operand::Memory {
            is_far,
            address,
            value,
        } => format!(
            "{{\"type\":\"memory\",\"distance\":{},\"address\":{},\"value\":{}}}",
            distance(*is_far),
            hex(*address),
            hex(*value)
        ),
        Operand::Indirect {
            is_far,
            base,
            offset,
            value,
        } => {
            let base_json = match base {
                Some((name, _)) => escape(name),
                None => "null".to_owned(),
            };
            let base_value_json = match base {
                Some((_, v)) => hex(*v),
                None => "null".to_owned(),
            };
            let value_json = match value {
                Some(v) => hex(*v),
                None => "null".to_owned(),
            };
            let variable_json = value.and_then(|_| {
                let (_, base_value) = (*base)?;
                let addr = base_value.wrapping_add_signed(*offset);
                let sp = bp.wrapping_add_signed(abi.return_slot_offset());
                let table = info?;
                // pc normalization happens in `resolve` itself via segm_base
                let identity = resolve(table, addr, bp, segm_base, sp)?;
                Some(render_variable(&identity))
            });
            let mut s = format!(
                "{{\"type\":\"indirect\",\"distance\":{},\"base\":{base_json},\"baseValue\":{base_value_json},\"offset\":{},\"value\":{value_json}",
                distance(*is_far),
                hex_signed(*offset),
            );
            if let Some(v) = variable_json {
                s.push_str(&format!(",\"variable\":{v}"));
            }
            s.push('}');
            s
        }
        Operand::CallTarget { pc, name, .. } => {
            format!(
                "{{\"type\":\"target\",\"pc\":{},\"name\":{}}}",
                hex(*pc),
                escape(name)
            )
        }
    }
}

fn distance(is_far: bool) -> &'static str {
    if is_far {
        "\"far\""
    } else {
        "\"near\""
    }
}

fn render_variable(identity: &VariableIdentity) -> String {
    format!(
        "{{\"name\":{},\"local\":{},\"type\":{{\"name\":{},\"size\":{}}}}}",
        escape(identity.name()),
        identity.is_local(),
        escape(&identity.ty().name),
        identity.ty().size
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::AnyRegister;
    use crate::debuginfo::types::{Function, Local, Type};
    use crate::trace::record::WireOperand;
    use std::sync::Arc;

    #[test]
    fn renders_register_operand() {
        let record = {
            let mut r = WireRecord::default();
            r.pc = 0x401000;
            r.opcode = 0x20;
            r.num_vals = 1;
            r.vals[0] = WireOperand::register(
                AnyRegister::Gp(crate::arch::GpRegister::Rax),
                0xff,
            );
            r
        };
        let json = render_record(&record, None, 0, AbiConvention::SysVAmd64);
        assert!(json.contains("\"pc\":0x401000"));
        assert!(json.contains("\"name\":\"mov\""));
        assert!(json.contains("\"type\":\"register\""));
        assert!(json.contains("\"name\":\"rax\""));
    }

    #[test]
    fn renders_indirect_with_resolved_local_variable() {
        let mut info = InfoTable::default();
        info.functions.push(Function {
            name: "sum_to".into(),
            source_path: "main.c".into(),
            low_pc: 0x1000,
            length: 0x50,
            locals: vec![Local {
                name: "counter".into(),
                ty: Arc::new(Type {
                    name: "int".into(),
                    size: 4,
                    source_path: "main.c".into(),
                }),
                frame_offset: -0x10,
            }],
        });

        let bp = 0x7ffd_1000u64;
        let sp = bp.wrapping_add_signed(AbiConvention::SysVAmd64.return_slot_offset());
        let base_value = sp.wrapping_add_signed(-0x10);

        let record = {
            let mut r = WireRecord::default();
            r.pc = 0x1010;
            r.opcode = 0x20;
            r.num_vals = 1;
            r.bp = bp;
            r.vals[0] = WireOperand::indirect(
                false,
                Some((AnyRegister::Rbp, base_value)),
                0,
                Some(4),
            );
            r
        };

        let json = render_record(&record, Some(&info), 0, AbiConvention::SysVAmd64);
        assert!(json.contains("\"type\":\"indirect\""));
        assert!(json.contains("\"variable\":{\"name\":\"counter\""));
        assert!(json.contains("\"local\":true"));
    }

    #[test]
    fn unknown_operand_is_null_type() {
        let record = {
            let mut r = WireRecord::default();
            r.num_vals = 1;
            r.vals[0] = WireOperand::unknown();
            r
        };
        let json = render_record(&record, None, 0, AbiConvention::SysVAmd64);
        assert!(json.contains("\"operands\":[{\"type\":null}]"));
    }

    #[test]
    fn num_vals_caps_rendered_operand_count() {
        let mut r = WireRecord::default();
        r.num_vals = 9999;
        let json = render_record(&r, None, 0, AbiConvention::SysVAmd64);
        let count = json.matches("\"type\":null").count();
        assert_eq!(count, super::super::record::VALS_LEN);
    }
}
