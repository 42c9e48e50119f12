//! Little-endian cursor over an SBE buffer.

use crate::error::DecodeError;

/// Bounds-checked reader. Every read either consumes exactly the bytes it
/// needs or fails with `EndOfStream` and leaves the position untouched.
#[derive(Debug, Clone)]
pub struct SbeReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SbeReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Bytes not yet consumed.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    #[inline]
    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::EndOfStream {
                offset: self.pos,
                needed: n,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    #[inline]
    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        self.take(n).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    /// IEEE-754 double; NaN payloads come through untouched.
    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.take_array()?))
    }

    /// `uint64` with the SBE null value (`u64::MAX`) mapped to `None`.
    pub fn read_optional_u64(&mut self) -> Result<Option<u64>, DecodeError> {
        let value = self.read_u64()?;
        Ok((value != u64::MAX).then_some(value))
    }

    /// Fixed `char[N]` field, NUL padded on the right.
    pub fn read_char_array<const N: usize>(
        &mut self,
        field: &'static str,
    ) -> Result<String, DecodeError> {
        let raw = self.take_array::<N>()?;
        let end = raw.iter().position(|b| *b == 0).unwrap_or(N);
        std::str::from_utf8(&raw[..end])
            .map(str::to_string)
            .map_err(|_| DecodeError::InvalidUtf8(field))
    }

    /// Variable-length string: one length byte followed by the raw bytes.
    pub fn read_var_string(&mut self, field: &'static str) -> Result<String, DecodeError> {
        let start = self.pos;
        let len = self.read_u8()? as usize;
        let bytes = match self.take(len) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.pos = start;
                return Err(e);
            }
        };
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_reads() {
        let buf = [0x8c, 0x00, 0xe8, 0x03, 0x01, 0x00, 0x00, 0x00];
        let mut reader = SbeReader::new(&buf);
        assert_eq!(reader.read_u16().unwrap(), 140);
        assert_eq!(reader.read_u16().unwrap(), 1000);
        assert_eq!(reader.read_u32().unwrap(), 1);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_end_of_stream_leaves_position() {
        let buf = [1u8, 2, 3];
        let mut reader = SbeReader::new(&buf);
        reader.read_u8().unwrap();
        let err = reader.read_u32().unwrap_err();
        assert_eq!(
            err,
            DecodeError::EndOfStream {
                offset: 1,
                needed: 4,
                remaining: 2
            }
        );
        assert_eq!(reader.position(), 1);
    }

    #[test]
    fn test_char_array_trims_padding() {
        let buf = *b"ETH\0\0\0\0\0";
        let mut reader = SbeReader::new(&buf);
        assert_eq!(reader.read_char_array::<8>("currency").unwrap(), "ETH");
    }

    #[test]
    fn test_var_string() {
        let mut buf = vec![5u8];
        buf.extend_from_slice(b"BTC-P");
        let mut reader = SbeReader::new(&buf);
        assert_eq!(reader.read_var_string("name").unwrap(), "BTC-P");

        // Declared length runs past the buffer
        let truncated = [9u8, b'A', b'B'];
        let mut reader = SbeReader::new(&truncated);
        assert!(matches!(
            reader.read_var_string("name"),
            Err(DecodeError::EndOfStream { .. })
        ));
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn test_nan_and_null_sentinels() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&u64::MAX.to_le_bytes());
        buf.extend_from_slice(&u64::MAX.to_le_bytes());
        buf.extend_from_slice(&7u64.to_le_bytes());
        let mut reader = SbeReader::new(&buf);
        assert!(reader.read_f64().unwrap().is_nan());
        assert_eq!(reader.read_optional_u64().unwrap(), None);
        assert_eq!(reader.read_optional_u64().unwrap(), Some(7));
    }
}
