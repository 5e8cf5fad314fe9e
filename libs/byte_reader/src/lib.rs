// This file is part of a SpringRTS map archive parser.
//
// Licensed under the GNU General Public License, version 3 or later.

//! A safe cursor over a borrowed byte slice. Every binary-format component
//! in this workspace is built on this instead of an unsafe struct overlay,
//! because SMF/SMT have variable-length, count-prefixed regions that don't
//! fit a fixed `#[repr(C)]` shape.

use springmap_error::{Error, Result};

pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn seek(&mut self, abs: usize) -> Result<()> {
        if abs > self.buf.len() {
            return Err(Error::InputTruncated {
                offset: abs,
                needed: 0,
                available: self.buf.len(),
            });
        }
        self.pos = abs;
        Ok(())
    }

    fn require(&self, n: usize) -> Result<()> {
        if self.pos + n > self.buf.len() {
            return Err(Error::InputTruncated {
                offset: self.pos,
                needed: n,
                available: self.buf.len() - self.pos.min(self.buf.len()),
            });
        }
        Ok(())
    }

    /// Borrow `n` bytes at the current position and advance past them.
    pub fn read(&mut self, n: usize) -> Result<&'a [u8]> {
        self.require(n)?;
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.read(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.read(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let b = self.read(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a fixed-width ASCII field, stripping trailing NUL bytes.
    pub fn read_string(&mut self, n: usize) -> Result<String> {
        let b = self.read(n)?;
        let end = b.iter().position(|&c| c == 0).unwrap_or(b.len());
        Ok(String::from_utf8_lossy(&b[..end]).into_owned())
    }

    /// Read bytes up to (and consuming) the next NUL, or to the end of the
    /// buffer if none is found.
    pub fn read_until_null(&mut self) -> Result<String> {
        let start = self.pos;
        let mut end = start;
        while end < self.buf.len() && self.buf[end] != 0 {
            end += 1;
        }
        let s = String::from_utf8_lossy(&self.buf[start..end]).into_owned();
        self.pos = (end + 1).min(self.buf.len());
        Ok(s)
    }

    /// Read `count` little-endian integers of `bytes_per_int` width each
    /// (1, 2, or 4), widening to `i64`. Used for SMF's tile-index array and
    /// other count-prefixed integer regions.
    pub fn read_ints(&mut self, count: usize, bytes_per_int: usize, unsigned: bool) -> Result<Vec<i64>> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let v = match bytes_per_int {
                1 => {
                    let b = self.read_u8()?;
                    if unsigned {
                        b as i64
                    } else {
                        b as i8 as i64
                    }
                }
                2 => {
                    let b = self.read_u16()?;
                    if unsigned {
                        b as i64
                    } else {
                        b as i16 as i64
                    }
                }
                4 => {
                    let b = self.read_u32()?;
                    if unsigned {
                        b as i64
                    } else {
                        b as i32 as i64
                    }
                }
                n => panic!("read_ints: unsupported width {n}"),
            };
            out.push(v);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reads_primitives_little_endian() {
        let buf = [0x01, 0x02, 0x03, 0x04, 0x00, 0x00, 0x80, 0x3F];
        let mut r = ByteReader::new(&buf);
        assert_eq!(r.read_u8().unwrap(), 0x01);
        assert_eq!(r.read_u16().unwrap(), 0x0403);
        assert_eq!(r.read_f32().unwrap(), 1.0);
    }

    #[test]
    fn truncated_read_is_an_error() {
        let buf = [0x01, 0x02];
        let mut r = ByteReader::new(&buf);
        assert!(r.read_u32().is_err());
    }

    #[test]
    fn read_string_strips_trailing_nuls() {
        let buf = b"spring map file\0";
        let mut r = ByteReader::new(buf);
        assert_eq!(r.read_string(16).unwrap(), "spring map file");
    }

    #[test]
    fn read_until_null_stops_at_nul_and_advances_past_it() {
        let buf = b"tilefile.smt\0trailing";
        let mut r = ByteReader::new(buf);
        assert_eq!(r.read_until_null().unwrap(), "tilefile.smt");
        assert_eq!(r.position(), 13);
    }

    #[test]
    fn read_ints_widens_and_sign_extends() {
        let buf = [0xFFu8, 0xFF, 0xFF, 0xFF];
        let mut r = ByteReader::new(&buf);
        let v = r.read_ints(1, 4, false).unwrap();
        assert_eq!(v[0], -1);
    }
}
