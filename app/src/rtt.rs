//! SEGGER RTT control block
//!
//! The debug probe finds `_SEGGER_RTT` in RAM by its id string and then reads and
//! writes the ring buffers directly, while the core keeps running. Channel 0 carries
//! log text, channel 1 the tuner protocol.
//!
//! The tuner up buffer is backed by the envelope storage itself. Publishing a
//! snapshot rewrites the payload and rewinds the offsets so the host always reads
//! one whole envelope.

use core::fmt;
use core::mem::size_of;
use core::ptr::{self, addr_of, addr_of_mut};

use cortex_m::interrupt;
use touch::capsense::TELEMETRY_SIZE;
use touch::tuner::envelope::EnvelopeStorage;
use touch::tuner::{Transport, UpBuffer};

const TERMINAL: usize = 0;
const TUNER: usize = 1;

const TERMINAL_UP_SIZE: usize = 256;
const TUNER_DOWN_SIZE: usize = 32;

const MODE_NO_BLOCK_SKIP: u32 = 0;
const MODE_NO_BLOCK_TRIM: u32 = 1;
const MODE_BLOCK_IF_FIFO_FULL: u32 = 2;

/// Ring buffer descriptor, identical for up and down channels
#[repr(C)]
#[allow(dead_code)] // `name` and `flags` are read by the probe
struct Buffer {
    name: *const u8,
    buffer: *mut u8,
    size: usize,
    write: usize,
    read: usize,
    flags: u32,
}

impl Buffer {
    const fn empty() -> Self {
        Self {
            name: ptr::null(),
            buffer: ptr::null_mut(),
            size: 0,
            write: 0,
            read: 0,
            flags: 0,
        }
    }

    fn configure(&mut self, name: &'static [u8], buffer: *mut u8, size: usize, flags: u32) {
        self.name = name.as_ptr();
        self.buffer = buffer;
        self.size = size;
        self.set_write_offset(0);
        self.set_read_offset(0);
        self.flags = flags;
    }

    // The host updates one of the two offsets at any time
    fn read_offset(&self) -> usize {
        unsafe { ptr::read_volatile(&self.read) }
    }

    fn write_offset(&self) -> usize {
        unsafe { ptr::read_volatile(&self.write) }
    }

    fn set_read_offset(&mut self, offset: usize) {
        unsafe { ptr::write_volatile(&mut self.read, offset) }
    }

    fn set_write_offset(&mut self, offset: usize) {
        unsafe { ptr::write_volatile(&mut self.write, offset) }
    }

    /// Bytes written but not yet read
    fn available(&self) -> usize {
        let (rd, wr) = (self.read_offset(), self.write_offset());
        if wr >= rd {
            wr - rd
        } else {
            self.size - rd + wr
        }
    }

    /// Room left; one slot stays empty to tell full from empty
    fn free(&self) -> usize {
        if self.size == 0 {
            return 0;
        }
        let (rd, wr) = (self.read_offset(), self.write_offset());
        if rd > wr {
            rd - wr - 1
        } else {
            self.size - (wr - rd) - 1
        }
    }

    /// Write all of `bytes` or, if they do not fit, nothing
    fn write_or_skip(&mut self, bytes: &[u8]) {
        if bytes.len() > self.free() {
            return;
        }
        let mut wr = self.write_offset();
        for &b in bytes {
            unsafe { ptr::write_volatile(self.buffer.add(wr), b) };
            wr = (wr + 1) % self.size;
        }
        self.set_write_offset(wr);
    }

    fn read_byte(&mut self) -> u8 {
        let rd = self.read_offset();
        let b = unsafe { ptr::read_volatile(self.buffer.add(rd)) };
        self.set_read_offset((rd + 1) % self.size);
        b
    }
}

#[repr(C)]
#[allow(dead_code)]
struct ControlBlock {
    id: [u8; 16],
    max_up: i32,
    max_down: i32,
    up: [Buffer; 2],
    down: [Buffer; 2],
}

#[no_mangle]
#[used]
static mut _SEGGER_RTT: ControlBlock = ControlBlock {
    id: [0; 16],
    max_up: 2,
    max_down: 2,
    up: [Buffer::empty(), Buffer::empty()],
    down: [Buffer::empty(), Buffer::empty()],
};

static mut TERMINAL_UP: [u8; TERMINAL_UP_SIZE] = [0; TERMINAL_UP_SIZE];
static mut TUNER_UP: EnvelopeStorage<TELEMETRY_SIZE> = EnvelopeStorage::new();
static mut TUNER_DOWN: [u8; TUNER_DOWN_SIZE] = [0; TUNER_DOWN_SIZE];

const ID: &[u8; 16] = b"SEGGER RTT\0\0\0\0\0\0";

/// Set up the control block and return the tuner channel.
///
/// Must be called once, before anything is logged.
pub fn init() -> TunerRtt {
    interrupt::free(|_| unsafe {
        let cb = &mut *addr_of_mut!(_SEGGER_RTT);
        cb.up[TERMINAL].configure(
            b"Terminal\0",
            addr_of_mut!(TERMINAL_UP) as *mut u8,
            TERMINAL_UP_SIZE,
            MODE_NO_BLOCK_SKIP,
        );
        cb.up[TUNER].configure(
            b"tuner\0",
            addr_of_mut!(TUNER_UP) as *mut u8,
            size_of::<EnvelopeStorage<TELEMETRY_SIZE>>(),
            MODE_NO_BLOCK_TRIM,
        );
        cb.down[TUNER].configure(
            b"tuner\0",
            addr_of_mut!(TUNER_DOWN) as *mut u8,
            TUNER_DOWN_SIZE,
            MODE_BLOCK_IF_FIFO_FULL,
        );

        // Id goes in last so the probe never picks up a half configured block
        for (i, b) in ID.iter().enumerate() {
            ptr::write_volatile(addr_of_mut!(cb.id[i]), *b);
        }
    });
    TunerRtt { _private: () }
}

/// Channel 1, the tuner link transport
pub struct TunerRtt {
    _private: (),
}

impl Transport for TunerRtt {
    fn locked<R>(&mut self, f: impl FnOnce(UpBuffer<'_>) -> R) -> R {
        interrupt::free(|_| {
            let up = unsafe { &mut (*addr_of_mut!(_SEGGER_RTT)).up[TUNER] };
            let mut read_offset = up.read_offset();
            let mut write_offset = up.write_offset();
            let region = unsafe { core::slice::from_raw_parts_mut(up.buffer, up.size) };

            let out = f(UpBuffer {
                region,
                read_offset: &mut read_offset,
                write_offset: &mut write_offset,
            });

            up.set_read_offset(read_offset);
            up.set_write_offset(write_offset);
            out
        })
    }

    fn bytes_available(&self) -> usize {
        let down = unsafe { &(*addr_of!(_SEGGER_RTT)).down[TUNER] };
        down.available()
    }

    fn read_byte(&mut self) -> u8 {
        let down = unsafe { &mut (*addr_of_mut!(_SEGGER_RTT)).down[TUNER] };
        down.read_byte()
    }
}

/// Channel 0 log output. Text that does not fit is dropped.
pub struct Terminal;

impl fmt::Write for Terminal {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        interrupt::free(|_| {
            let up = unsafe { &mut (*addr_of_mut!(_SEGGER_RTT)).up[TERMINAL] };
            up.write_or_skip(s.as_bytes());
        });
        Ok(())
    }
}

macro_rules! log {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        writeln!($crate::rtt::Terminal, $($arg)*).ok();
    }};
}
