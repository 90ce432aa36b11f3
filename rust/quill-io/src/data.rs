//! Primitive encoders and decoders shared by every index file.
//!
//! Fixed-width integers are big-endian. `VInt`/`VLong` values are written seven bits
//! at a time, low-order group first, with the high bit of each byte set when more
//! bytes follow. Term characters are UTF-16 code units written in the "modified
//! UTF-8" form: one byte for `0x01..=0x7F`, two bytes for `0` and `0x80..=0x7FF`,
//! three bytes otherwise.

use crate::utils::unexpected_eof;

/// A sink of index bytes.
pub trait DataOutput {
    fn write_byte(&mut self, b: u8) -> std::io::Result<()>;

    fn write_bytes(&mut self, buf: &[u8]) -> std::io::Result<()>;

    fn write_int(&mut self, v: i32) -> std::io::Result<()> {
        self.write_bytes(&v.to_be_bytes())
    }

    fn write_long(&mut self, v: i64) -> std::io::Result<()> {
        self.write_bytes(&v.to_be_bytes())
    }

    fn write_vint(&mut self, mut v: u32) -> std::io::Result<()> {
        while v & !0x7f != 0 {
            self.write_byte(((v & 0x7f) | 0x80) as u8)?;
            v >>= 7;
        }
        self.write_byte(v as u8)
    }

    fn write_vlong(&mut self, mut v: u64) -> std::io::Result<()> {
        while v & !0x7f != 0 {
            self.write_byte(((v & 0x7f) | 0x80) as u8)?;
            v >>= 7;
        }
        self.write_byte(v as u8)
    }

    /// Writes a UTF-8 string prefixed by its byte length.
    fn write_string(&mut self, s: &str) -> std::io::Result<()> {
        self.write_vint(s.len() as u32)?;
        self.write_bytes(s.as_bytes())
    }

    /// Writes UTF-16 code units in modified UTF-8. The caller records the unit count.
    fn write_chars(&mut self, chars: &[u16]) -> std::io::Result<()> {
        for &code in chars {
            if (0x01..=0x7f).contains(&code) {
                self.write_byte(code as u8)?;
            } else if code == 0 || (0x80..=0x7ff).contains(&code) {
                self.write_byte(0xc0 | (code >> 6) as u8)?;
                self.write_byte(0x80 | (code & 0x3f) as u8)?;
            } else {
                self.write_byte(0xe0 | (code >> 12) as u8)?;
                self.write_byte(0x80 | ((code >> 6) & 0x3f) as u8)?;
                self.write_byte(0x80 | (code & 0x3f) as u8)?;
            }
        }
        Ok(())
    }
}

/// A source of index bytes.
pub trait DataInput {
    fn read_byte(&mut self) -> std::io::Result<u8>;

    fn read_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<()>;

    fn read_int(&mut self) -> std::io::Result<i32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    fn read_long(&mut self) -> std::io::Result<i64> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(i64::from_be_bytes(buf))
    }

    fn read_vint(&mut self) -> std::io::Result<u32> {
        let mut b = self.read_byte()?;
        let mut v = (b & 0x7f) as u32;
        let mut shift = 7;
        while b & 0x80 != 0 {
            if shift > 28 {
                return Err(invalid_data("VInt is too long"));
            }
            b = self.read_byte()?;
            v |= ((b & 0x7f) as u32) << shift;
            shift += 7;
        }
        Ok(v)
    }

    fn read_vlong(&mut self) -> std::io::Result<u64> {
        let mut b = self.read_byte()?;
        let mut v = (b & 0x7f) as u64;
        let mut shift = 7;
        while b & 0x80 != 0 {
            if shift > 63 {
                return Err(invalid_data("VLong is too long"));
            }
            b = self.read_byte()?;
            v |= ((b & 0x7f) as u64) << shift;
            shift += 7;
        }
        Ok(v)
    }

    fn read_string(&mut self) -> std::io::Result<String> {
        let len = self.read_vint()? as usize;
        let mut buf = vec![0u8; len];
        self.read_bytes(&mut buf)?;
        String::from_utf8(buf).map_err(|_| invalid_data("string is not valid UTF-8"))
    }

    /// Reads `count` UTF-16 code units written by [`DataOutput::write_chars`],
    /// appending them to `out`.
    fn read_chars(&mut self, count: usize, out: &mut Vec<u16>) -> std::io::Result<()> {
        out.reserve(count);
        for _ in 0..count {
            let b = self.read_byte()? as u16;
            let code = if b & 0x80 == 0 {
                b
            } else if b & 0xe0 != 0xe0 {
                ((b & 0x1f) << 6) | (self.read_byte()? as u16 & 0x3f)
            } else {
                let b2 = self.read_byte()? as u16;
                let b3 = self.read_byte()? as u16;
                ((b & 0x0f) << 12) | ((b2 & 0x3f) << 6) | (b3 & 0x3f)
            };
            out.push(code);
        }
        Ok(())
    }
}

impl DataOutput for Vec<u8> {
    fn write_byte(&mut self, b: u8) -> std::io::Result<()> {
        self.push(b);
        Ok(())
    }

    fn write_bytes(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.extend_from_slice(buf);
        Ok(())
    }
}

impl DataInput for &[u8] {
    fn read_byte(&mut self) -> std::io::Result<u8> {
        let (&b, rest) = self.split_first().ok_or_else(|| unexpected_eof("slice"))?;
        *self = rest;
        Ok(b)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        if self.len() < buf.len() {
            return Err(unexpected_eof("slice"));
        }
        let (head, rest) = self.split_at(buf.len());
        buf.copy_from_slice(head);
        *self = rest;
        Ok(())
    }
}

/// Returns the number of bytes `write_vint(v)` produces.
pub fn vint_len(mut v: u32) -> usize {
    let mut len = 1;
    while v & !0x7f != 0 {
        v >>= 7;
        len += 1;
    }
    len
}

fn invalid_data(message: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vint_layout() {
        let mut out = Vec::new();
        out.write_vint(0).unwrap();
        out.write_vint(127).unwrap();
        out.write_vint(128).unwrap();
        out.write_vint(16384).unwrap();
        assert_eq!(out, [0x00, 0x7f, 0x80, 0x01, 0x80, 0x80, 0x01]);

        let mut input = out.as_slice();
        assert_eq!(input.read_vint().unwrap(), 0);
        assert_eq!(input.read_vint().unwrap(), 127);
        assert_eq!(input.read_vint().unwrap(), 128);
        assert_eq!(input.read_vint().unwrap(), 16384);
        assert!(input.read_vint().is_err());
    }

    #[test]
    fn test_vint_len() {
        assert_eq!(vint_len(0), 1);
        assert_eq!(vint_len(127), 1);
        assert_eq!(vint_len(128), 2);
        assert_eq!(vint_len(u32::MAX), 5);
        let mut out = Vec::new();
        out.write_vint(u32::MAX).unwrap();
        assert_eq!(out.len(), 5);
        assert_eq!(out.as_slice().read_vint().unwrap(), u32::MAX);
    }

    #[test]
    fn test_vlong_large() {
        let mut out = Vec::new();
        out.write_vlong(u64::MAX).unwrap();
        assert_eq!(out.len(), 10);
        assert_eq!(out.as_slice().read_vlong().unwrap(), u64::MAX);
    }

    #[test]
    fn test_fixed_width_big_endian() {
        let mut out = Vec::new();
        out.write_int(-3).unwrap();
        out.write_long(1).unwrap();
        assert_eq!(&out[..4], &[0xff, 0xff, 0xff, 0xfd]);
        assert_eq!(&out[4..], &[0, 0, 0, 0, 0, 0, 0, 1]);
        let mut input = out.as_slice();
        assert_eq!(input.read_int().unwrap(), -3);
        assert_eq!(input.read_long().unwrap(), 1);
    }

    #[test]
    fn test_modified_utf8_chars() {
        let text: Vec<u16> = "aé中".encode_utf16().chain([0u16]).collect();
        let mut out = Vec::new();
        out.write_chars(&text).unwrap();
        // 'a' = 1 byte, 'é' = 2 bytes, '中' = 3 bytes, NUL = 2 bytes
        assert_eq!(out.len(), 8);
        assert_eq!(&out[6..], &[0xc0, 0x80]);

        let mut decoded = Vec::new();
        out.as_slice().read_chars(text.len(), &mut decoded).unwrap();
        assert_eq!(decoded, text);
    }

    #[test]
    fn test_string_is_length_prefixed() {
        let mut out = Vec::new();
        out.write_string("body").unwrap();
        assert_eq!(out, b"\x04body");
        assert_eq!(out.as_slice().read_string().unwrap(), "body");
    }
}
