//! Buttons and sliders built from one or more sensors.
//!
//! Every widget starts by waiting out `calibration_delay` scans, then averages
//! `calibration_samples` scans into a reference count per sensor. A touch pulls
//! the count below the reference; `diff` is that drop.

use crate::{TouchConfig, TouchState, FULL_SCALE};

/// Per-electrode measurement state
#[derive(Clone, Copy, Debug, Default)]
pub struct Sensor {
    pub raw: u16,
    pub reference: u32,
    pub diff: u16,
}

impl Sensor {
    pub fn update(&mut self, raw: u16) {
        self.raw = raw;
        self.diff = u16::try_from(self.reference).map_or(0, |r| r.saturating_sub(raw));
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WidgetKind {
    /// Active when any of its sensors is touched
    Button,
    /// Half-ended linear slider. See [`slider_position`].
    Slider,
}

/// Static description of a widget: a kind and a contiguous run of sensors
#[derive(Clone, Copy, Debug)]
pub struct WidgetConfig {
    pub kind: WidgetKind,
    pub first: usize,
    pub count: usize,
}

impl WidgetConfig {
    pub const fn button(sensor: usize) -> Self {
        Self { kind: WidgetKind::Button, first: sensor, count: 1 }
    }

    pub const fn slider(first: usize, count: usize) -> Self {
        Self { kind: WidgetKind::Slider, first, count }
    }

    pub fn sensors(&self) -> core::ops::Range<usize> {
        self.first..self.first + self.count
    }
}

pub struct Widget {
    pub config: WidgetConfig,
    pub state: TouchState,
    pub position: Option<u16>,
    /// Samples averaged by the calibration in progress
    samples: u16,
}

impl Widget {
    pub fn new(config: WidgetConfig, touch: &TouchConfig) -> Self {
        Self {
            config,
            state: TouchState::Startup(touch.calibration_delay),
            position: None,
            samples: touch.calibration_samples,
        }
    }

    pub fn active(&self) -> bool {
        self.state == TouchState::Active
    }

    /// Advance the state machine with freshly updated `sensors`.
    ///
    /// `sensors` is this widget's own run of sensors. A calibration averages the
    /// sample count in effect when it started, even if `touch` changes meanwhile.
    pub fn process(&mut self, sensors: &mut [Sensor], touch: &TouchConfig) -> TouchState {
        let release = touch.detect_threshold - touch.detect_hysteresis;

        self.state = match self.state {
            TouchState::Startup(0) => {
                self.samples = touch.calibration_samples;
                TouchState::Calibrate(self.samples)
            }
            TouchState::Startup(n) => TouchState::Startup(n - 1),
            TouchState::Calibrate(n) => {
                for s in sensors.iter_mut() {
                    s.reference += s.raw as u32;
                    s.diff = 0;
                }
                if n > 1 {
                    TouchState::Calibrate(n - 1)
                } else {
                    for s in sensors.iter_mut() {
                        s.reference /= self.samples as u32;
                        s.diff = 0;
                    }
                    TouchState::Idle(touch.debounce)
                }
            }
            TouchState::Idle(n) => {
                if !sensors.iter().any(|s| s.diff >= touch.detect_threshold) {
                    TouchState::Idle(touch.debounce)
                } else if n <= 1 {
                    TouchState::Active
                } else {
                    TouchState::Idle(n - 1)
                }
            }
            TouchState::Active => {
                if sensors.iter().all(|s| s.diff < release) {
                    TouchState::Idle(touch.debounce)
                } else {
                    TouchState::Active
                }
            }
        };

        self.position = match (self.config.kind, self.state) {
            (WidgetKind::Slider, TouchState::Active) => {
                let mut diffs = [0u16; crate::capsense::MAX_SENSORS];
                for (d, s) in diffs.iter_mut().zip(sensors.iter()) {
                    *d = s.diff;
                }
                slider_position(&diffs[..sensors.len()], touch.detect_threshold)
            }
            _ => None,
        };

        self.state
    }
}

/// Position of a touch on a half-ended slider, 0 to `FULL_SCALE - 1`.
///
/// The first electrode is split in two halves at both ends of the strip and
/// both halves are wired to sensor 0:
///
/// ---------------------------
/// | 0 |  1  | ... | N-1 | 0 |
/// ---------------------------
///
/// The two strongest electrodes must be neighbours and both above
/// `detect_threshold`; the position is the centroid of the three strongest.
pub fn slider_position(diffs: &[u16], detect_threshold: u16) -> Option<u16> {
    // (diff, index), strongest first. Ties go to the later electrode.
    let mut top = [(0i32, 0usize); 3];
    for (i, &d) in diffs.iter().enumerate() {
        let d = d as i32;
        if d >= top[0].0 {
            top = [(d, i), top[0], top[1]];
        } else if d >= top[1].0 {
            top = [top[0], (d, i), top[1]];
        } else if d >= top[2].0 {
            top[2] = (d, i);
        }
    }
    let [(d_high, i_high), (d_mid, i_mid), (d_low, i_low)] = top;

    if d_mid < detect_threshold as i32 {
        return None;
    }

    let last = diffs.len() - 1;
    let neighbours = i_high.abs_diff(i_mid) == 1
        || (i_high.min(i_mid) == 0 && i_high.max(i_mid) == last);
    if !neighbours {
        return None;
    }

    let full = FULL_SCALE as i32;
    let segment = full / last as i32;
    // Electrode 0 sits at whichever end its partner is closest to
    let centre = |index: usize, partner: usize| -> i32 {
        if index != 0 {
            segment * index as i32 - segment / 2
        } else if partner == 1 {
            -(segment / 2)
        } else {
            full + segment / 2
        }
    };

    let x_low = centre(i_low, i_high);
    let x_mid = centre(i_mid, i_high);
    let x_high = centre(i_high, i_mid);

    // Positions are 11 bits, diffs at most 14 bits; i32 does not overflow.
    let weighted = (x_low * d_low + x_mid * d_mid + x_high * d_high) / (d_low + d_mid + d_high);

    Some(weighted.clamp(0, full - 1) as u16)
}
