//! A small byte-slice cursor with the read primitives DWARF sections are
//! built from: fixed-width little-endian integers, NUL-terminated strings,
//! and LEB128 variable-length integers.
//!
//! Source: DWARF5 §7.6 "Variable Length Data".

use std::ffi::CStr;

#[derive(Debug)]
pub struct Error(pub String);

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "dwarf: {}", self.0)
    }
}

impl std::error::Error for Error {}

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    data: &'a [u8],
    /// Offset of `data`'s first byte from the start of the section it was
    /// sliced from. DIE attribute references are section-relative, so this
    /// is needed to translate a cursor position back into an offset.
    base_offset: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Cursor {
            data,
            base_offset: 0,
        }
    }

    pub fn at_offset(data: &'a [u8], base_offset: usize) -> Self {
        Cursor { data, base_offset }
    }

    pub fn offset(&self) -> usize {
        self.base_offset
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> &'a [u8] {
        self.data
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.read_bytes(n).map(|_| ())
    }

    pub fn read_bytes(&mut self, amount: usize) -> Result<&'a [u8]> {
        if self.data.len() < amount {
            return Err(Error(format!(
                "index out of bounds, tried to read {amount} bytes from {}",
                self.data.len()
            )));
        }
        let result = &self.data[..amount];
        self.data = &self.data[amount..];
        self.base_offset += amount;
        Ok(result)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.read_bytes(8)?;
        Ok(u64::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn read_utf8_cstr(&mut self) -> Result<&'a str> {
        let cstr = CStr::from_bytes_until_nul(self.data)
            .map_err(|_| Error("no null terminator found for string".into()))?;
        let utf8 = cstr
            .to_str()
            .map_err(|e| Error(format!("invalid utf8: {e:?}")))?;
        self.read_bytes(utf8.len() + 1)?;
        Ok(utf8)
    }

    /// DWARF5 §7.6: unsigned LEB128. Seven bits per byte, low-order first,
    /// continuation flag in the top bit.
    pub fn read_uleb128(&mut self) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift < 64 {
                result |= ((byte & 0x7f) as u64) << shift;
            }
            shift += 7;
            if (byte & 0x80) == 0 {
                break;
            }
        }
        Ok(result)
    }

    /// DWARF5 §7.6: signed LEB128, sign-extended from the last byte read.
    pub fn read_ileb128(&mut self) -> Result<i64> {
        let mut result: i64 = 0;
        let mut shift = 0u32;
        let mut byte;
        loop {
            byte = self.read_u8()?;
            if shift < 64 {
                result |= ((byte & 0x7f) as i64) << shift;
            }
            shift += 7;
            if (byte & 0x80) == 0 {
                break;
            }
        }
        if shift < 64 && (byte & 0x40) != 0 {
            result |= -1i64 << shift;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uleb128_small() {
        let mut c = Cursor::new(&[0x02]);
        assert_eq!(c.read_uleb128().unwrap(), 2);
    }

    #[test]
    fn uleb128_multibyte() {
        // 624485 = 0x98765
        let mut c = Cursor::new(&[0xE5, 0x8E, 0x26]);
        assert_eq!(c.read_uleb128().unwrap(), 624485);
    }

    #[test]
    fn ileb128_negative() {
        // -2
        let mut c = Cursor::new(&[0x7e]);
        assert_eq!(c.read_ileb128().unwrap(), -2);
    }

    #[test]
    fn ileb128_negative_multibyte() {
        // -123456 = 0x9D878F in two's complement form per the DWARF example
        let mut c = Cursor::new(&[0xC0, 0xBB, 0x78]);
        assert_eq!(c.read_ileb128().unwrap(), -123456);
    }

    #[test]
    fn read_bytes_out_of_bounds_errors() {
        let mut c = Cursor::new(&[0x01]);
        assert!(c.read_bytes(4).is_err());
    }

    #[test]
    fn cstr_reads_up_to_nul() {
        let mut c = Cursor::new(b"hello\0world");
        assert_eq!(c.read_utf8_cstr().unwrap(), "hello");
        assert_eq!(c.remaining(), b"world");
    }
}
