use super::envelope;
use super::{Reassembler, Transport, TunerLink};

/// Tuner link over a transport channel: envelope publisher plus command reassembler
pub struct TunerChannel<T, const P: usize> {
    transport: T,
    reassembler: Reassembler<P>,
}

impl<T: Transport, const P: usize> TunerChannel<T, P> {
    /// Take over the transport. Writes the envelope header and trailer for an
    /// `S` byte snapshot; they are never touched again.
    pub fn new<const S: usize>(mut transport: T) -> Self {
        transport.locked(envelope::frame::<S>);
        Self {
            transport,
            reassembler: Reassembler::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

impl<T: Transport, const S: usize, const P: usize> TunerLink<S, P> for TunerChannel<T, P> {
    fn send(&mut self, snapshot: &[u8; S]) {
        self.transport.locked(|up| envelope::publish(up, snapshot));
    }

    fn receive(&mut self, is_valid: fn(&[u8; P]) -> bool) -> Option<[u8; P]> {
        self.reassembler.drain(&mut self.transport, is_valid)
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::tuner::command::{check_integrity, Command, COMMAND_PACKET_SIZE};
    use crate::tuner::UpBuffer;
    use std::collections::VecDeque;
    use std::vec::Vec;

    /// Loopback transport with a fixed up region and a host-fed down queue
    pub struct FakeTransport {
        pub region: [u8; 16],
        pub read_offset: usize,
        pub write_offset: usize,
        pub down: VecDeque<u8>,
        pub locks: usize,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self {
                region: [0; 16],
                read_offset: 5,
                write_offset: 9,
                down: VecDeque::new(),
                locks: 0,
            }
        }

        /// Bytes the host would read from the up buffer
        pub fn unread(&self) -> Vec<u8> {
            self.region[self.read_offset..self.write_offset].to_vec()
        }
    }

    impl Transport for FakeTransport {
        fn locked<R>(&mut self, f: impl FnOnce(UpBuffer<'_>) -> R) -> R {
            self.locks += 1;
            f(UpBuffer {
                region: &mut self.region,
                read_offset: &mut self.read_offset,
                write_offset: &mut self.write_offset,
            })
        }

        fn bytes_available(&self) -> usize {
            self.down.len()
        }

        fn read_byte(&mut self) -> u8 {
            self.down.pop_front().unwrap_or(0)
        }
    }

    #[test]
    fn test_send_publishes_envelope() {
        let mut link = TunerChannel::<_, COMMAND_PACKET_SIZE>::new::<2>(FakeTransport::new());
        link.send(&[0x01, 0x02]);

        let t = link.transport();
        assert_eq!(t.unread(), [0x0D, 0x0A, 0x01, 0x02, 0x00, 0xFF, 0xFF]);
        assert_eq!(t.locks, 2);
    }

    #[test]
    fn test_send_is_idempotent() {
        let mut link = TunerChannel::<_, COMMAND_PACKET_SIZE>::new::<4>(FakeTransport::new());
        let snapshot = [9, 8, 7, 6];

        link.send(&snapshot);
        let first = link.transport().unread();
        for _ in 0..5 {
            // Host consumed the previous frame
            link.transport_mut().read_offset = 9;
            link.send(&snapshot);
            assert_eq!(link.transport().unread(), first);
        }

        link.send(&[0xFF; 4]);
        let frame = link.transport().unread();
        assert_eq!(frame[..2], [0x0D, 0x0A]);
        assert_eq!(frame[6..], [0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn test_receive_reassembles_from_transport() {
        let mut link = TunerChannel::<_, COMMAND_PACKET_SIZE>::new::<2>(FakeTransport::new());
        let receive = |link: &mut TunerChannel<FakeTransport, COMMAND_PACKET_SIZE>| {
            TunerLink::<2, COMMAND_PACKET_SIZE>::receive(link, check_integrity)
        };

        assert_eq!(receive(&mut link), None);

        let packet = Command::Resume.encode(3);
        link.transport_mut().down.extend([0x00, 0x13]);
        link.transport_mut().down.extend(packet);
        assert_eq!(receive(&mut link), Some(packet));
        assert_eq!(receive(&mut link), None);
    }
}
