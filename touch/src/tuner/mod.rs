//! Tuner protocol plumbing over a debug transport.
//!
//! Outbound, the telemetry snapshot is published inside a fixed envelope.
//! Inbound, bytes are reassembled into fixed-size command packets with a
//! sliding-window resync on integrity failures.

pub mod channel;
pub mod command;
pub mod envelope;
pub mod reassembler;

pub use channel::TunerChannel;
pub use command::{Command, COMMAND_PACKET_SIZE};
pub use envelope::{ENVELOPE_OVERHEAD, HEADER, TRAILER};
pub use reassembler::Reassembler;

/// View of the outbound buffer descriptor, only handed out under the transport lock
pub struct UpBuffer<'a> {
    /// Memory the host reads the envelope from
    pub region: &'a mut [u8],
    pub read_offset: &'a mut usize,
    pub write_offset: &'a mut usize,
}

/// Byte-oriented duplex channel to the tuner host
pub trait Transport {
    /// Run `f` with exclusive access to the outbound buffer descriptor
    fn locked<R>(&mut self, f: impl FnOnce(UpBuffer<'_>) -> R) -> R;

    /// Number of inbound bytes waiting to be read
    fn bytes_available(&self) -> usize;

    /// Read one inbound byte. Only called when `bytes_available` is non-zero.
    fn read_byte(&mut self) -> u8;
}

/// The two hooks a sensing engine calls during its tuner synchronization.
///
/// `S` is the telemetry snapshot size, `P` the command packet size.
pub trait TunerLink<const S: usize, const P: usize> {
    /// Publish the snapshot to the host
    fn send(&mut self, snapshot: &[u8; S]);

    /// Drain inbound bytes, returning a packet once one passes `is_valid`
    fn receive(&mut self, is_valid: fn(&[u8; P]) -> bool) -> Option<[u8; P]>;
}
