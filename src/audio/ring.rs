//! Fixed-capacity pre-roll ring buffer.
//!
//! Holds the most recent bytes of idle audio so a newly opened segment can be
//! backfilled with the onset that preceded the capture decision. `push` never
//! fails; once full the oldest bytes are overwritten.

/// Circular byte buffer with explicit head index and fill count.
#[derive(Debug)]
pub struct PreRollBuffer {
    buf: Vec<u8>,
    head: usize,
    len: usize,
}

impl PreRollBuffer {
    /// Creates a buffer holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends `bytes`, overwriting the oldest data on wraparound.
    pub fn push(&mut self, bytes: &[u8]) {
        let cap = self.buf.len();
        if cap == 0 {
            return;
        }

        // Only the last `cap` bytes of a larger input can survive anyway.
        let bytes = if bytes.len() > cap {
            &bytes[bytes.len() - cap..]
        } else {
            bytes
        };

        for &b in bytes {
            self.buf[self.head] = b;
            self.head = (self.head + 1) % cap;
        }
        self.len = (self.len + bytes.len()).min(cap);
    }

    /// Returns the buffered bytes in chronological order and clears the buffer.
    pub fn drain(&mut self) -> Vec<u8> {
        let cap = self.buf.len();
        let mut out = Vec::with_capacity(self.len);
        if self.len > 0 {
            // Oldest byte sits `len` positions behind the head.
            let start = (self.head + cap - self.len) % cap;
            for i in 0..self.len {
                out.push(self.buf[(start + i) % cap]);
            }
        }
        self.head = 0;
        self.len = 0;
        out
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}
