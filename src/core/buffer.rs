//! # Fixed-capacity Byte Buffer
//!
//! Each connection owns two of these, one per direction. Valid bytes always
//! start at offset 0; consuming from the front shifts the remainder left so
//! the next reassembly pass sees a frame boundary at the start.

/// Byte arena with a fixed capacity and a fill cursor
pub struct FixedBuffer {
    data: Box<[u8]>,
    len: usize,
}

impl FixedBuffer {
    /// Allocate a zeroed buffer of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len >= self.data.len()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.len
    }

    /// The valid bytes
    #[inline]
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// The unused tail, for a transport to receive into
    #[inline]
    pub fn free_tail(&mut self) -> &mut [u8] {
        &mut self.data[self.len..]
    }

    /// Mark `n` bytes of the free tail as filled
    #[inline]
    pub fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.remaining());
        self.len = (self.len + n).min(self.data.len());
    }

    /// Append `bytes`, returning false (and copying nothing) if they do not fit
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.remaining() {
            return false;
        }
        self.data[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        true
    }

    /// Drop `n` bytes from the front and shift what remains to offset 0
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.len);
        if n < self.len {
            self.data.copy_within(n..self.len, 0);
        }
        self.len -= n;
    }

    /// Forget all buffered bytes
    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl std::fmt::Debug for FixedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedBuffer")
            .field("len", &self.len)
            .field("capacity", &self.data.len())
            .finish()
    }
}
