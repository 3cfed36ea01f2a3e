use super::Transport;

/// Incremental parser for fixed-size command packets.
///
/// Keeps its partial packet across calls. When a full window fails the
/// integrity check, the oldest byte is dropped and the window slides forward by
/// one, so a packet preceded by noise is still found.
pub struct Reassembler<const P: usize> {
    buf: [u8; P],
    cursor: usize,
}

impl<const P: usize> Reassembler<P> {
    pub const fn new() -> Self {
        Self {
            buf: [0; P],
            cursor: 0,
        }
    }

    /// Number of bytes currently held
    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    /// Append one byte, returning the packet if the window is now a valid one
    pub fn push(&mut self, byte: u8, is_valid: fn(&[u8; P]) -> bool) -> Option<[u8; P]> {
        self.buf[self.cursor] = byte;
        self.cursor += 1;

        if self.cursor < P {
            return None;
        }

        if is_valid(&self.buf) {
            self.cursor = 0;
            Some(self.buf)
        } else {
            // Resync
            self.cursor -= 1;
            self.buf.copy_within(1.., 0);
            None
        }
    }

    /// Read every available byte until a valid packet completes.
    ///
    /// Bytes after a valid packet are left in the transport for the next call.
    pub fn drain<T: Transport>(
        &mut self,
        transport: &mut T,
        is_valid: fn(&[u8; P]) -> bool,
    ) -> Option<[u8; P]> {
        while transport.bytes_available() != 0 {
            let byte = transport.read_byte();
            if let Some(packet) = self.push(byte, is_valid) {
                return Some(packet);
            }
        }
        None
    }
}

impl<const P: usize> Default for Reassembler<P> {
    fn default() -> Self {
        Self::new()
    }
}
