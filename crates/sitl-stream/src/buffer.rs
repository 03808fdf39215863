//! Fixed-capacity byte buffers backing the serial bridge.
//!
//! Both buffers are allocated once and never resized.  When full they drop
//! the newest bytes instead of erroring, the way a UART FIFO overruns.

/// Default capacity of both bridge buffers, in bytes.
pub const DEFAULT_CAPACITY: usize = 1000;

// ────────────────────────────────────────────────────────────────────────────
// InputBuffer
// ────────────────────────────────────────────────────────────────────────────

/// Linear receive buffer with separate write and read cursors.
///
/// Invariant: `read_pos <= write_pos <= capacity`.  Once every received byte
/// has been consumed both cursors rewind to zero, so space is reclaimed
/// without moving data.
#[derive(Debug, Clone)]
pub struct InputBuffer {
    data: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
}

impl InputBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes consumed so far.
    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    /// Bytes received so far.
    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    /// Number of received bytes not yet read.
    pub fn len(&self) -> usize {
        self.write_pos - self.read_pos
    }

    pub fn is_empty(&self) -> bool {
        self.read_pos == self.write_pos
    }

    /// Room left for incoming bytes.
    pub fn spare(&self) -> usize {
        self.capacity() - self.write_pos
    }

    pub fn is_full(&self) -> bool {
        self.spare() == 0
    }

    /// The unfilled tail, for receiving directly into.  Follow with
    /// [`commit`][Self::commit].
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.write_pos..]
    }

    /// Mark `n` bytes of [`spare_mut`][Self::spare_mut] as received.
    /// Clamped to the spare room.
    pub fn commit(&mut self, n: usize) {
        self.write_pos += n.min(self.spare());
    }

    /// Append as much of `bytes` as fits; returns how many were accepted.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> usize {
        let accepted = bytes.len().min(self.spare());
        self.data[self.write_pos..self.write_pos + accepted].copy_from_slice(&bytes[..accepted]);
        self.write_pos += accepted;
        accepted
    }

    pub fn peek(&self) -> Option<u8> {
        (!self.is_empty()).then(|| self.data[self.read_pos])
    }

    pub fn pop(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.read_pos += 1;
        if self.read_pos == self.write_pos {
            self.read_pos = 0;
            self.write_pos = 0;
        }
        Some(byte)
    }

    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// EchoBuffer
// ────────────────────────────────────────────────────────────────────────────

/// Diagnostic record of every byte the firmware wrote outward.
///
/// Stops accepting once full; [`clear`][Self::clear] makes room again.
#[derive(Debug, Clone)]
pub struct EchoBuffer {
    data: Box<[u8]>,
    write_pos: usize,
}

impl EchoBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            write_pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.write_pos
    }

    pub fn is_empty(&self) -> bool {
        self.write_pos == 0
    }

    pub fn is_full(&self) -> bool {
        self.write_pos == self.capacity()
    }

    /// Record `byte`; returns `false` when the buffer is already full.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.is_full() {
            return false;
        }
        self.data[self.write_pos] = byte;
        self.write_pos += 1;
        true
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.write_pos]
    }

    pub fn clear(&mut self) {
        self.write_pos = 0;
    }
}
