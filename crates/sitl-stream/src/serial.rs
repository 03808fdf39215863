//! Generic [`SerialPort`] trait – the UART surface firmware code programs
//! against.
//!
//! [`StreamBridge`][crate::bridge::StreamBridge] is the simulator-backed
//! implementation; firmware helpers that only need byte I/O should take
//! `impl SerialPort` so they run unchanged against a real UART driver.

/// Byte-oriented serial port with Arduino-style semantics.
pub trait SerialPort {
    /// Open the port at `baud`.  Informational on simulated ports.
    fn begin(&mut self, baud: u32);

    /// Close the port and discard buffered data.
    fn end(&mut self);

    /// Whether at least one unread byte is waiting.
    fn available(&mut self) -> bool;

    /// Next unread byte, or `None` when nothing is waiting.
    fn read(&mut self) -> Option<u8>;

    /// Next unread byte without consuming it.
    fn peek(&mut self) -> Option<u8>;

    /// Queue one byte for transmission; returns the number of bytes accepted.
    fn write(&mut self, byte: u8) -> usize;

    /// Queue `bytes` one at a time.
    fn write_bytes(&mut self, bytes: &[u8]) -> usize {
        bytes.iter().map(|&b| self.write(b)).sum()
    }

    /// Fill `buf` from waiting data; stops early when nothing is waiting.
    fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        while n < buf.len() {
            match self.read() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    /// Like [`read_bytes`][Self::read_bytes] but also stops at `terminator`,
    /// which is consumed and not stored.
    fn read_bytes_until(&mut self, terminator: u8, buf: &mut [u8]) -> usize {
        let mut n = 0;
        while n < buf.len() {
            match self.read() {
                Some(byte) if byte == terminator => break,
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }
}
