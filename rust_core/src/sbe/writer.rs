//! Little-endian SBE writer, the mirror of `SbeReader`.

#[derive(Debug, Clone, Default)]
pub struct SbeWriter {
    buf: Vec<u8>,
}

impl SbeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_optional_u64(&mut self, v: Option<u64>) {
        self.put_u64(v.unwrap_or(u64::MAX));
    }

    /// `None` is written as the all-bits-one pattern.
    pub fn put_optional_f64(&mut self, v: Option<f64>) {
        match v {
            Some(v) => self.put_f64(v),
            None => self.put_u64(u64::MAX),
        }
    }

    /// Writes `s` into a NUL padded `char[N]`, truncating if it is longer.
    pub fn put_char_array<const N: usize>(&mut self, s: &str) {
        let mut raw = [0u8; N];
        let bytes = s.as_bytes();
        let n = bytes.len().min(N);
        raw[..n].copy_from_slice(&bytes[..n]);
        self.buf.extend_from_slice(&raw);
    }

    /// Length-prefixed string. Longer than 255 bytes is truncated.
    pub fn put_var_string(&mut self, s: &str) {
        let bytes = s.as_bytes();
        debug_assert!(
            bytes.len() <= u8::MAX as usize,
            "var string of {} bytes exceeds the u8 length prefix",
            bytes.len()
        );
        let n = bytes.len().min(u8::MAX as usize);
        self.put_u8(n as u8);
        self.buf.extend_from_slice(&bytes[..n]);
    }

    pub fn put_zeros(&mut self, n: usize) {
        self.buf.resize(self.buf.len() + n, 0);
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Overwrites a `u16` that was reserved earlier.
    pub fn patch_u16(&mut self, offset: usize, v: u16) {
        self.buf[offset..offset + 2].copy_from_slice(&v.to_le_bytes());
    }
}
