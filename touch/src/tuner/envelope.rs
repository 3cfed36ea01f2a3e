//! Outbound telemetry framing
//!
//! Layout: `0D 0A <snapshot> 00 FF FF`

use super::UpBuffer;

pub const HEADER: [u8; 2] = [0x0D, 0x0A];
pub const TRAILER: [u8; 3] = [0x00, 0xFF, 0xFF];
pub const ENVELOPE_OVERHEAD: usize = HEADER.len() + TRAILER.len();

/// Total bytes of an envelope around an `S` byte snapshot
pub const fn envelope_len(snapshot_len: usize) -> usize {
    snapshot_len + ENVELOPE_OVERHEAD
}

/// Storage for one envelope, suitable as the backing memory of a transport up buffer.
///
/// One extra byte is reserved so a ring buffer reader can tell a full buffer from an
/// empty one.
#[repr(C)]
pub struct EnvelopeStorage<const S: usize> {
    pub header: [u8; 2],
    pub payload: [u8; S],
    pub trailer: [u8; 3],
    pad: u8,
}

impl<const S: usize> EnvelopeStorage<S> {
    pub const fn new() -> Self {
        Self {
            header: HEADER,
            payload: [0; S],
            trailer: TRAILER,
            pad: 0,
        }
    }
}

/// Write the constant header and trailer around the payload region.
///
/// Done once at startup; publishing only touches the payload afterwards.
pub fn frame<const S: usize>(up: UpBuffer<'_>) {
    let region = up.region;
    region[..HEADER.len()].copy_from_slice(&HEADER);
    let tail = HEADER.len() + S;
    region[tail..tail + TRAILER.len()].copy_from_slice(&TRAILER);
    *up.read_offset = 0;
    *up.write_offset = 0;
}

/// Replace the payload and mark the whole envelope as unread.
///
/// Both steps happen under the caller's lock so the host never sees a fresh
/// length paired with a stale payload.
pub fn publish<const S: usize>(up: UpBuffer<'_>, snapshot: &[u8; S]) {
    *up.read_offset = 0;
    *up.write_offset = envelope_len(S);
    up.region[HEADER.len()..HEADER.len() + S].copy_from_slice(snapshot);
}
