//! Touch Sensing Controller driver for the STM32F0.
//!
//! The driver reaches the TSC and RCC registers through the PAC pointers instead
//! of taking ownership of them, so the `touch` crate does not have to agree with
//! the application on a PAC version. Nothing else in the firmware may touch the
//! TSC registers.
//!
//! Acquisitions are interrupt driven. The foreground starts a scan through
//! [`TscScan`], and the TSC interrupt reads the counts back through a
//! [`TscCompletion`] handle.

use crate::engine::Acquisition;

use stm32f0::stm32f0x1 as pac;

/// Number of I/O groups on the F0 TSC
pub const GROUPS: usize = 6;

/// An I/O of the TSC, encoded as `group << 4 | io`, both starting at 1
#[derive(Clone, Copy, Debug)]
pub enum Channel {
    G1Ch1 = 0x11,
    G1Ch2 = 0x12,
    G1Ch3 = 0x13,
    G1Ch4 = 0x14,
    G2Ch1 = 0x21,
    G2Ch2 = 0x22,
    G2Ch3 = 0x23,
    G2Ch4 = 0x24,
    G3Ch1 = 0x31,
    G3Ch2 = 0x32,
    G3Ch3 = 0x33,
    G3Ch4 = 0x34,
    G4Ch1 = 0x41,
    G4Ch2 = 0x42,
    G4Ch3 = 0x43,
    G4Ch4 = 0x44,
    G5Ch1 = 0x51,
    G5Ch2 = 0x52,
    G5Ch3 = 0x53,
    G5Ch4 = 0x54,
    G6Ch1 = 0x61,
    G6Ch2 = 0x62,
    G6Ch3 = 0x63,
    G6Ch4 = 0x64,
}

impl Channel {
    const fn group(self) -> usize {
        (self as u8 >> 4) as usize
    }

    const fn io(self) -> u8 {
        self as u8 & 0xf
    }
}

/// Which groups take part in a scan, and with which sample and sensing I/Os.
///
/// Built at compile time:
///
/// ```ignore
/// SampleConfig::new().sample(Channel::G1Ch2).channel(Channel::G1Ch1)
/// ```
#[derive(Clone, Copy, Debug)]
pub struct SampleConfig {
    // Per group: bit 7 enabled, bits 6:4 sample I/O, bits 3:0 sensing I/O mask
    groups: [u8; GROUPS],
}

impl SampleConfig {
    pub const fn new() -> Self {
        Self { groups: [0; GROUPS] }
    }

    /// Enable the group of `sample` with `sample` as its sampling capacitor I/O
    pub const fn sample(mut self, sample: Channel) -> Self {
        let g = sample.group() - 1;
        assert!(self.groups[g] == 0);
        self.groups[g] = 0x80 | (sample.io() << 4);
        self
    }

    /// Sense `channel`. Its group must already have a sample I/O.
    ///
    /// Groups are acquired in parallel, so a scan yields one count per enabled group.
    pub const fn channel(mut self, channel: Channel) -> Self {
        let g = channel.group() - 1;
        assert!(self.groups[g] != 0);
        assert!((self.groups[g] >> 4) & 0x7 != channel.io());
        self.groups[g] |= 1 << (channel.io() - 1);
        self
    }

    /// Enabled group numbers, starting at 1, in ascending order
    pub fn enabled_groups(&self) -> impl Iterator<Item = u8> + '_ {
        (1..=GROUPS as u8).filter(move |g| self.groups[*g as usize - 1] != 0)
    }

    /// Register values for IOGCSR, IOSCR and IOCCR
    fn io_masks(&self) -> (u32, u32, u32) {
        let mut iogcsr = 0;
        let mut ioscr = 0;
        let mut ioccr = 0;
        for (g, &bits) in self.groups.iter().enumerate().filter(|(_, b)| **b != 0) {
            let sample = ((bits >> 4) & 0x7) as usize;
            iogcsr |= 1 << g;
            ioscr |= 1 << (g * 4 + sample - 1);
            ioccr |= ((bits & 0xf) as u32) << (g * 4);
        }
        (iogcsr, ioscr, ioccr)
    }
}

/// Unset fields take the driver defaults
#[derive(Clone, Copy, Debug, Default)]
pub struct Config {
    pub clock_prescale: Option<ClockPrescaler>,
    pub max_count: Option<MaxCount>,
    pub charge_transfer_high: Option<ChargeDischargeTime>,
    pub charge_transfer_low: Option<ChargeDischargeTime>,
}

/// TSC clock divider from HCLK
#[derive(Clone, Copy, Debug)]
pub enum ClockPrescaler {
    Hclk = 0,
    HclkDiv2 = 1,
    HclkDiv4 = 2,
    HclkDiv8 = 3,
    HclkDiv16 = 4,
    HclkDiv32 = 5,
    HclkDiv64 = 6,
    HclkDiv128 = 7,
}

/// Charge transfer pulse length in TSC clock cycles
#[derive(Clone, Copy, Debug)]
pub enum ChargeDischargeTime {
    C1 = 0,
    C2 = 1,
    C3 = 2,
    C4 = 3,
    C5 = 4,
    C6 = 5,
    C7 = 6,
    C8 = 7,
    C9 = 8,
    C10 = 9,
    C11 = 10,
    C12 = 11,
    C13 = 12,
    C14 = 13,
    C15 = 14,
    C16 = 15,
}

/// Count at which an acquisition gives up
#[derive(Clone, Copy, Debug)]
pub enum MaxCount {
    U255 = 0,
    U511 = 1,
    U1023 = 2,
    U2047 = 3,
    U4095 = 4,
    U8191 = 5,
    U16383 = 6,
}

impl MaxCount {
    pub fn to_count(self) -> u16 {
        (256u16 << self as u16) - 1
    }
}

const DEFAULT_CTPH: ChargeDischargeTime = ChargeDischargeTime::C2;
const DEFAULT_CTPL: ChargeDischargeTime = ChargeDischargeTime::C2;
const DEFAULT_PRESCALE: ClockPrescaler = ClockPrescaler::HclkDiv16;
const DEFAULT_MAX_COUNT: MaxCount = MaxCount::U8191;

/// Spread spectrum deviation, in TSC clock cycles
const SPREAD_SPECTRUM_DEVIATION: u8 = 16;

pub struct Tsc {
    tsc: &'static pac::tsc::RegisterBlock,
    max_count: u16,
}

impl Tsc {
    /// Clock, reset and configure the TSC
    pub fn new(config: Option<Config>) -> Self {
        let rcc = unsafe { &*pac::RCC::ptr() };
        rcc.ahbenr.modify(|_, w| w.tscen().set_bit());
        rcc.ahbrstr.modify(|_, w| w.tscrst().set_bit());
        rcc.ahbrstr.modify(|_, w| w.tscrst().clear_bit());

        let config = config.unwrap_or_default();
        let max_count = config.max_count.unwrap_or(DEFAULT_MAX_COUNT);
        let tsc = unsafe { &*pac::TSC::ptr() };

        tsc.cr.write(|w| unsafe {
            w.ctph().bits(config.charge_transfer_high.unwrap_or(DEFAULT_CTPH) as u8)
                .ctpl().bits(config.charge_transfer_low.unwrap_or(DEFAULT_CTPL) as u8)
                .sse().set_bit()
                .ssd().bits(SPREAD_SPECTRUM_DEVIATION)
                .pgpsc().bits(config.clock_prescale.unwrap_or(DEFAULT_PRESCALE) as u8)
                .mcv().bits(max_count as u8)
                .tsce().set_bit()
        });

        Self {
            tsc,
            max_count: max_count.to_count(),
        }
    }

    /// Route the I/Os of `sample_config` and start an acquisition
    pub fn start(&mut self, sample_config: &SampleConfig) {
        let (iogcsr, ioscr, ioccr) = sample_config.io_masks();
        self.tsc.iogcsr.write(|w| unsafe { w.bits(iogcsr) });
        self.tsc.ioscr.write(|w| unsafe { w.bits(ioscr) });
        self.tsc.ioccr.write(|w| unsafe { w.bits(ioccr) });

        self.completion().clear_flags();
        self.tsc.cr.modify(|_, w| w.iodef().clear_bit());
        self.tsc.cr.modify(|_, w| w.start().set_bit());
    }

    /// Handle for the end-of-acquisition interrupt
    pub fn completion(&self) -> TscCompletion {
        TscCompletion {
            tsc: self.tsc,
            max_count: self.max_count,
        }
    }

    /// Interrupt on end of acquisition and on max count error
    pub fn listen(&mut self) {
        self.tsc.ier.write(|w| w.eoaie().set_bit().mceie().set_bit());
    }
}

/// Interrupt-side access to a finished acquisition
pub struct TscCompletion {
    tsc: &'static pac::tsc::RegisterBlock,
    max_count: u16,
}

impl TscCompletion {
    pub fn is_finished(&self) -> bool {
        let isr = self.tsc.isr.read();
        isr.eoaf().bit_is_set() || isr.mcef().bit_is_set()
    }

    /// Count of `group` (starting at 1) from the last acquisition.
    ///
    /// A group that hit the max count before its sample cap charged reads as
    /// `max_count + 1`.
    pub fn read_group(&self, group: u8) -> u16 {
        let completed = self.tsc.iogcsr.read().bits() >> 16;
        if completed & (1 << (group - 1)) == 0 {
            return self.max_count + 1;
        }
        match group {
            1 => self.tsc.iog1cr.read().cnt().bits(),
            2 => self.tsc.iog2cr.read().cnt().bits(),
            3 => self.tsc.iog3cr.read().cnt().bits(),
            4 => self.tsc.iog4cr.read().cnt().bits(),
            5 => self.tsc.iog5cr.read().cnt().bits(),
            6 => self.tsc.iog6cr.read().cnt().bits(),
            _ => self.max_count + 1,
        }
    }

    /// Read one count per enabled group, in group order, and acknowledge the interrupt
    pub fn finish<const N: usize>(&mut self, sample_config: &SampleConfig) -> [u16; N] {
        let mut counts = [self.max_count + 1; N];
        for (count, group) in counts.iter_mut().zip(sample_config.enabled_groups()) {
            *count = self.read_group(group);
        }
        self.clear_flags();
        counts
    }

    pub fn clear_flags(&mut self) {
        self.tsc.icr.write(|w| w.eoaic().set_bit().mceic().set_bit());
    }
}

/// A TSC bound to the sample configuration it scans with
pub struct TscScan {
    pub tsc: Tsc,
    pub sample_config: SampleConfig,
}

impl Acquisition for TscScan {
    fn start(&mut self) {
        self.tsc.start(&self.sample_config);
    }
}
