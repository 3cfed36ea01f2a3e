#![cfg_attr(not(test), no_std)]

pub mod capsense;
pub mod engine;
pub mod scheduler;
pub mod tuner;
pub mod widget;
#[cfg(feature = "stm32f0x1")]
pub mod tsc;

/// Enumeration of touch activity states

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TouchState {
    Startup(u16),
    Calibrate(u16),
    Idle(u16),
    Active,
}

impl TouchState {
    /// Single byte code reported to the tuner
    pub fn code(&self) -> u8 {
        match self {
            Self::Startup(_) => 0,
            Self::Calibrate(_) => 1,
            Self::Idle(_) => 2,
            Self::Active => 3,
        }
    }
}

/// Configuration structure for all touch inputs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TouchConfig {
    /// The number of counts of delta capacitance required to active the button
    pub detect_threshold: u16,
    /// The hysteresis in deactivation. Once active, counts must fall below `detect_threshold -
    /// detect_hysteresis` in order to deactivate.
    pub detect_hysteresis: u16,
    /// Number of samples to wait after initialization before starting calibration
    pub calibration_delay: u16,
    /// Number of sample to collect for reference level calibration
    pub calibration_samples: u16,
    /// Number of positive samples required to transition to Active state
    pub debounce: u16,
}

impl TouchConfig {
    /// Size of the config when stored in the telemetry snapshot
    pub const ENCODED_SIZE: usize = 10;

    const fn default() -> Self {
        Self {
            detect_threshold: 100,
            detect_hysteresis: 5,
            calibration_delay: 10,
            calibration_samples: 16,
            debounce: 2,
        }
    }

    /// A config is usable when the release level stays above zero and calibration
    /// averages at least one sample.
    pub fn is_valid(&self) -> bool {
        self.detect_hysteresis < self.detect_threshold
            && self.calibration_samples > 0
            && self.debounce > 0
    }

    pub fn to_bytes(&self) -> [u8; Self::ENCODED_SIZE] {
        let mut out = [0u8; Self::ENCODED_SIZE];
        let fields = [
            self.detect_threshold,
            self.detect_hysteresis,
            self.calibration_delay,
            self.calibration_samples,
            self.debounce,
        ];
        for (chunk, field) in out.chunks_exact_mut(2).zip(fields) {
            chunk.copy_from_slice(&field.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8; Self::ENCODED_SIZE]) -> Self {
        let field = |i: usize| u16::from_le_bytes([bytes[2 * i], bytes[2 * i + 1]]);
        Self {
            detect_threshold: field(0),
            detect_hysteresis: field(1),
            calibration_delay: field(2),
            calibration_samples: field(3),
            debounce: field(4),
        }
    }
}

pub const DEFAULT_TOUCH_CONFIG: TouchConfig = TouchConfig::default();
pub const FULL_SCALE: u16 = 1024;
