use std::io::{self, Write};

/// Little-endian primitives shared by every container writer.
///
/// RIFF-derived formats (WAV, AVI) and PCX store all integer fields
/// little-endian regardless of the host, so byte order is fixed here once and
/// no other module inspects host endianness.
pub trait WriteLittleEndian: Write {
    /// Write a 16-bit word, low byte first.
    fn put_u16_le(&mut self, v: u16) -> io::Result<()> {
        self.write_all(&v.to_le_bytes())
    }

    /// Write a 32-bit word, low byte first.
    fn put_u32_le(&mut self, v: u32) -> io::Result<()> {
        self.write_all(&v.to_le_bytes())
    }

    /// Write a 4-byte chunk or codec tag unmodified.
    fn put_tag(&mut self, tag: &[u8; 4]) -> io::Result<()> {
        self.write_all(tag)
    }

    /// Write `buf` as a run of little-endian elements of `sample_size` bytes.
    ///
    /// Sample size 1 is plain byte data with no endianness. Sample size 2 is
    /// 16-bit data, byte-swapped on big-endian hosts before it reaches the
    /// sink. No caller uses any other element size.
    fn put_samples_le(&mut self, buf: &[u8], sample_size: usize) -> io::Result<()> {
        debug_assert!(sample_size == 1 || sample_size == 2);
        if sample_size == 2 && cfg!(target_endian = "big") {
            for pair in buf.chunks_exact(2) {
                self.write_all(&[pair[1], pair[0]])?;
            }
            Ok(())
        } else {
            self.write_all(buf)
        }
    }
}

impl<W: Write + ?Sized> WriteLittleEndian for W {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn u16_low_byte_first() -> io::Result<()> {
        let mut sink = Cursor::new(Vec::new());
        sink.put_u16_le(0x1122)?;
        assert_eq!(sink.into_inner(), [0x22, 0x11]);
        Ok(())
    }

    #[test]
    fn u32_low_byte_first() -> io::Result<()> {
        let mut sink = Cursor::new(Vec::new());
        sink.put_u32_le(0x11223344)?;
        assert_eq!(sink.into_inner(), [0x44, 0x33, 0x22, 0x11]);
        Ok(())
    }

    #[test]
    fn tag_unmodified() -> io::Result<()> {
        let mut sink = Cursor::new(Vec::new());
        sink.put_tag(b"RIFF")?;
        assert_eq!(sink.into_inner(), *b"RIFF");
        Ok(())
    }

    #[test]
    fn byte_samples_pass_through() -> io::Result<()> {
        let mut sink = Cursor::new(Vec::new());
        sink.put_samples_le(&[1, 2, 3], 1)?;
        assert_eq!(sink.into_inner(), [1, 2, 3]);
        Ok(())
    }

    #[cfg(target_endian = "little")]
    #[test]
    fn word_samples_pass_through_on_little_endian() -> io::Result<()> {
        let mut sink = Cursor::new(Vec::new());
        sink.put_samples_le(&[0x34, 0x12, 0x78, 0x56], 2)?;
        assert_eq!(sink.into_inner(), [0x34, 0x12, 0x78, 0x56]);
        Ok(())
    }
}
