//! Tuner command packets
//!
//! | index  | field                                   |
//! |--------|-----------------------------------------|
//! | 0..2   | header `0D 0A`                          |
//! | 2      | command code                            |
//! | 3      | rolling counter, ignored                |
//! | 4      | data size, 0..=4                        |
//! | 5..7   | telemetry offset, little-endian         |
//! | 7..11  | data                                    |
//! | 11..13 | CRC-16/CCITT-FALSE of bytes 2..11, LE   |
//! | 13..16 | trailer `00 FF FF`                      |

use super::envelope::{HEADER, TRAILER};

pub const COMMAND_PACKET_SIZE: usize = 16;
pub const MAX_WRITE_SIZE: usize = 4;

const CODE_IDX: usize = 2;
const COUNTER_IDX: usize = 3;
const SIZE_IDX: usize = 4;
const OFFSET_IDX: usize = 5;
const DATA_IDX: usize = 7;
const CRC_IDX: usize = 11;
const TRAILER_IDX: usize = 13;

const SUSPEND: u8 = 1;
const RESUME: u8 = 2;
const RESTART: u8 = 3;
const PING: u8 = 5;
const ONE_SCAN: u8 = 6;
const WRITE: u8 = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Suspend,
    Resume,
    Restart,
    Ping,
    OneScan,
    /// Overwrite `size` bytes of the telemetry snapshot at `offset`
    Write { offset: u16, size: u8, data: [u8; MAX_WRITE_SIZE] },
    /// Well-formed packet with a code this firmware does not handle
    Unknown(u8),
}

/// CRC-16/CCITT-FALSE
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Integrity predicate for a full command window
pub fn check_integrity(packet: &[u8; COMMAND_PACKET_SIZE]) -> bool {
    let crc = u16::from_le_bytes([packet[CRC_IDX], packet[CRC_IDX + 1]]);
    packet[..CODE_IDX] == HEADER
        && packet[TRAILER_IDX..] == TRAILER
        && packet[SIZE_IDX] as usize <= MAX_WRITE_SIZE
        && crc16(&packet[CODE_IDX..CRC_IDX]) == crc
}

impl Command {
    /// Decode a packet that already passed `check_integrity`
    pub fn decode(packet: &[u8; COMMAND_PACKET_SIZE]) -> Self {
        match packet[CODE_IDX] {
            SUSPEND => Self::Suspend,
            RESUME => Self::Resume,
            RESTART => Self::Restart,
            PING => Self::Ping,
            ONE_SCAN => Self::OneScan,
            WRITE => {
                let mut data = [0; MAX_WRITE_SIZE];
                data.copy_from_slice(&packet[DATA_IDX..DATA_IDX + MAX_WRITE_SIZE]);
                Self::Write {
                    offset: u16::from_le_bytes([packet[OFFSET_IDX], packet[OFFSET_IDX + 1]]),
                    size: packet[SIZE_IDX],
                    data,
                }
            }
            code => Self::Unknown(code),
        }
    }

    /// Build a framed packet, as the host tool would send it
    pub fn encode(&self, counter: u8) -> [u8; COMMAND_PACKET_SIZE] {
        let mut packet = [0u8; COMMAND_PACKET_SIZE];
        packet[..CODE_IDX].copy_from_slice(&HEADER);
        packet[CODE_IDX] = match self {
            Self::Suspend => SUSPEND,
            Self::Resume => RESUME,
            Self::Restart => RESTART,
            Self::Ping => PING,
            Self::OneScan => ONE_SCAN,
            Self::Write { .. } => WRITE,
            Self::Unknown(code) => *code,
        };
        packet[COUNTER_IDX] = counter;
        if let Self::Write { offset, size, data } = self {
            packet[SIZE_IDX] = *size;
            packet[OFFSET_IDX..OFFSET_IDX + 2].copy_from_slice(&offset.to_le_bytes());
            packet[DATA_IDX..CRC_IDX].copy_from_slice(data);
        }
        let crc = crc16(&packet[CODE_IDX..CRC_IDX]);
        packet[CRC_IDX..TRAILER_IDX].copy_from_slice(&crc.to_le_bytes());
        packet[TRAILER_IDX..].copy_from_slice(&TRAILER);
        packet
    }
}
