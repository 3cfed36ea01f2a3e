//! Reference sensing engine: TSC counts in, widget states and tuner telemetry out.
//!
//! Telemetry snapshot layout, little-endian:
//!
//! | offset | size | content                                           |
//! |--------|------|---------------------------------------------------|
//! | 0      | 1    | flags: bit 0 suspended, bit 1 any widget active   |
//! | 1      | 1    | sensor count                                      |
//! | 2      | 2    | completed scans, wrapping                         |
//! | 4      | 10   | [`TouchConfig`], writable by the tuner            |
//! | 14     | 32   | per sensor: raw u16, diff u16                     |
//! | 46     | 12   | per widget: state u8, position u16 (FFFF = none)  |
//! | 58     | 6    | reserved                                          |

use heapless::Vec;

use crate::engine::{Acquisition, EngineError, ScanResults, SensingEngine};
use crate::tuner::command::{self, Command, COMMAND_PACKET_SIZE};
use crate::tuner::TunerLink;
use crate::widget::{Sensor, Widget, WidgetConfig};
use crate::TouchConfig;

pub const MAX_SENSORS: usize = 8;
pub const MAX_WIDGETS: usize = 4;
pub const TELEMETRY_SIZE: usize = 64;

pub type Snapshot = [u8; TELEMETRY_SIZE];

const FLAGS: usize = 0;
const SENSOR_COUNT: usize = 1;
const SCANS: usize = 2;
pub const CONFIG: usize = 4;
const SENSORS: usize = CONFIG + TouchConfig::ENCODED_SIZE;
const SENSOR_STRIDE: usize = 4;
const WIDGETS: usize = SENSORS + MAX_SENSORS * SENSOR_STRIDE;
const WIDGET_STRIDE: usize = 3;

const FLAG_SUSPENDED: u8 = 1 << 0;
const FLAG_ACTIVE: u8 = 1 << 1;

const NO_POSITION: u16 = 0xFFFF;

pub struct CapSense<'q, A, L, const N: usize> {
    acquisition: A,
    link: L,
    results: ScanResults<'q, N>,
    widget_table: &'static [WidgetConfig],
    config: TouchConfig,
    sensors: [Sensor; N],
    widgets: Vec<Widget, MAX_WIDGETS>,
    telemetry: Snapshot,
    initialized: bool,
    scanning: bool,
    suspended: bool,
    scans: u16,
}

impl<'q, A, L, const N: usize> CapSense<'q, A, L, N>
where
    A: Acquisition,
    L: TunerLink<TELEMETRY_SIZE, COMMAND_PACKET_SIZE>,
{
    pub fn new(
        acquisition: A,
        link: L,
        results: ScanResults<'q, N>,
        widget_table: &'static [WidgetConfig],
        config: TouchConfig,
    ) -> Self {
        Self {
            acquisition,
            link,
            results,
            widget_table,
            config,
            sensors: [Sensor::default(); N],
            widgets: Vec::new(),
            telemetry: [0; TELEMETRY_SIZE],
            initialized: false,
            scanning: false,
            suspended: false,
            scans: 0,
        }
    }

    /// Integrity predicate handed to the tuner link
    pub fn check_command_integrity(packet: &[u8; COMMAND_PACKET_SIZE]) -> bool {
        command::check_integrity(packet)
    }

    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Suspend => self.suspended = true,
            Command::Resume => self.suspended = false,
            Command::Restart => {
                // The config only ever changes to a validated one, so this cannot fail
                // where the first start succeeded.
                self.init().and_then(|_| self.enable()).ok();
            }
            Command::OneScan if self.suspended => {
                self.scan_all();
                while self.is_busy() {}
                self.process_all();
            }
            Command::Write { offset, size, data } => self.write_config(offset as usize, &data[..size as usize]),
            Command::OneScan | Command::Ping | Command::Unknown(_) => {}
        }
        self.refresh_telemetry();
    }

    /// Apply a tuner write. Only whole writes inside the config region that leave
    /// a valid config are accepted.
    fn write_config(&mut self, offset: usize, data: &[u8]) {
        let region = CONFIG..CONFIG + TouchConfig::ENCODED_SIZE;
        let end = offset + data.len();
        if data.is_empty() || offset < region.start || end > region.end {
            return;
        }

        let mut bytes = self.config.to_bytes();
        bytes[offset - CONFIG..end - CONFIG].copy_from_slice(data);
        let config = TouchConfig::from_bytes(&bytes);
        if config.is_valid() {
            self.config = config;
        }
    }

    fn refresh_telemetry(&mut self) {
        let t = &mut self.telemetry;

        let mut flags = 0;
        if self.suspended {
            flags |= FLAG_SUSPENDED;
        }
        if self.widgets.iter().any(|w| w.active()) {
            flags |= FLAG_ACTIVE;
        }
        t[FLAGS] = flags;
        t[SENSOR_COUNT] = N as u8;
        t[SCANS..SCANS + 2].copy_from_slice(&self.scans.to_le_bytes());
        t[CONFIG..SENSORS].copy_from_slice(&self.config.to_bytes());

        for (chunk, s) in t[SENSORS..WIDGETS].chunks_exact_mut(SENSOR_STRIDE).zip(self.sensors.iter()) {
            chunk[..2].copy_from_slice(&s.raw.to_le_bytes());
            chunk[2..].copy_from_slice(&s.diff.to_le_bytes());
        }

        let widgets_end = WIDGETS + MAX_WIDGETS * WIDGET_STRIDE;
        for (chunk, w) in t[WIDGETS..widgets_end].chunks_exact_mut(WIDGET_STRIDE).zip(self.widgets.iter()) {
            chunk[0] = w.state.code();
            chunk[1..].copy_from_slice(&w.position.unwrap_or(NO_POSITION).to_le_bytes());
        }
    }
}

impl<'q, A, L, const N: usize> SensingEngine for CapSense<'q, A, L, N>
where
    A: Acquisition,
    L: TunerLink<TELEMETRY_SIZE, COMMAND_PACKET_SIZE>,
{
    fn init(&mut self) -> Result<(), EngineError> {
        self.initialized = false;

        if N > MAX_SENSORS {
            return Err(EngineError::TooManySensors);
        }
        if self.widget_table.len() > MAX_WIDGETS {
            return Err(EngineError::TooManyWidgets);
        }
        if self.widget_table.iter().any(|w| w.count == 0 || w.first + w.count > N) {
            return Err(EngineError::WidgetOutOfRange);
        }
        if !self.config.is_valid() {
            return Err(EngineError::InvalidConfig);
        }

        self.sensors = [Sensor::default(); N];
        self.widgets.clear();
        self.telemetry = [0; TELEMETRY_SIZE];
        self.scanning = false;
        self.scans = 0;
        // Drop a result that completed after the last processing
        while self.results.dequeue().is_some() {}

        self.initialized = true;
        Ok(())
    }

    fn enable(&mut self) -> Result<(), EngineError> {
        if !self.initialized {
            return Err(EngineError::NotInitialized);
        }

        for w in self.widget_table {
            self.widgets
                .push(Widget::new(*w, &self.config))
                .map_err(|_| EngineError::TooManyWidgets)?;
        }
        self.refresh_telemetry();
        Ok(())
    }

    fn scan_all(&mut self) {
        self.scanning = true;
        self.acquisition.start();
    }

    fn is_busy(&self) -> bool {
        self.scanning && !self.results.ready()
    }

    fn process_all(&mut self) {
        if let Some(counts) = self.results.dequeue() {
            self.scanning = false;
            for (sensor, raw) in self.sensors.iter_mut().zip(counts) {
                sensor.update(raw);
            }
            for w in self.widgets.iter_mut() {
                let range = w.config.sensors();
                w.process(&mut self.sensors[range], &self.config);
            }
            self.scans = self.scans.wrapping_add(1);
        }
        self.refresh_telemetry();
    }

    fn run_tuner(&mut self) {
        loop {
            self.link.send(&self.telemetry);
            if let Some(packet) = self.link.receive(Self::check_command_integrity) {
                self.apply(Command::decode(&packet));
            }
            if !self.suspended {
                break;
            }
        }
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::engine::{scan_channel, ScanCompletion, ScanQueue};
    use crate::scheduler::Scheduler;
    use crate::{TouchState, DEFAULT_TOUCH_CONFIG};
    use heapless::spsc::Queue;
    use std::collections::VecDeque;

    const REF: u16 = 2000;

    static WIDGETS_3: [WidgetConfig; 2] = [WidgetConfig::slider(0, 2), WidgetConfig::button(2)];
    static OUT_OF_RANGE: [WidgetConfig; 1] = [WidgetConfig::slider(1, 3)];

    /// Completes every scan immediately with the configured counts
    struct FakeAcquisition<'q> {
        completion: ScanCompletion<'q, 3>,
        counts: [u16; 3],
        starts: usize,
    }

    impl<'q> Acquisition for FakeAcquisition<'q> {
        fn start(&mut self) {
            self.starts += 1;
            self.completion.complete(self.counts);
        }
    }

    #[derive(Default)]
    struct FakeLink {
        sent: usize,
        last: Option<Snapshot>,
        inbound: VecDeque<[u8; COMMAND_PACKET_SIZE]>,
    }

    impl TunerLink<TELEMETRY_SIZE, COMMAND_PACKET_SIZE> for FakeLink {
        fn send(&mut self, snapshot: &Snapshot) {
            self.sent += 1;
            self.last = Some(*snapshot);
        }

        fn receive(&mut self, is_valid: fn(&[u8; COMMAND_PACKET_SIZE]) -> bool) -> Option<[u8; COMMAND_PACKET_SIZE]> {
            self.inbound.pop_front().filter(|p| is_valid(p))
        }
    }

    type Engine<'q> = CapSense<'q, FakeAcquisition<'q>, FakeLink, 3>;

    fn engine<'q>(queue: &'q mut ScanQueue<3>, table: &'static [WidgetConfig]) -> Engine<'q> {
        let (completion, results) = scan_channel(queue);
        let acquisition = FakeAcquisition { completion, counts: [REF; 3], starts: 0 };
        CapSense::new(acquisition, FakeLink::default(), results, table, DEFAULT_TOUCH_CONFIG)
    }

    fn cycle(e: &mut Engine<'_>) {
        assert!(!e.is_busy());
        e.process_all();
        e.run_tuner();
        e.scan_all();
    }

    fn calibrate(e: &mut Engine<'_>) {
        e.init().unwrap();
        e.enable().unwrap();
        e.scan_all();
        let c = DEFAULT_TOUCH_CONFIG;
        for _ in 0..c.calibration_delay + c.calibration_samples + 1 {
            cycle(e);
        }
    }

    #[test]
    fn test_init_validation() {
        let mut queue: ScanQueue<3> = Queue::new();
        let mut e = engine(&mut queue, &OUT_OF_RANGE);
        assert_eq!(e.enable(), Err(EngineError::NotInitialized));
        assert_eq!(e.init(), Err(EngineError::WidgetOutOfRange));

        let mut queue: ScanQueue<3> = Queue::new();
        let (completion, results) = scan_channel(&mut queue);
        let acquisition = FakeAcquisition { completion, counts: [REF; 3], starts: 0 };
        let mut config = DEFAULT_TOUCH_CONFIG;
        config.calibration_samples = 0;
        let mut e = CapSense::new(acquisition, FakeLink::default(), results, &WIDGETS_3, config);
        assert_eq!(e.init(), Err(EngineError::InvalidConfig));
    }

    #[test]
    fn test_busy_until_completion() {
        let mut queue: ScanQueue<3> = Queue::new();
        let (completion, results) = scan_channel(&mut queue);
        let mut completion = Some(completion);

        struct Manual(u32);
        impl Acquisition for Manual {
            fn start(&mut self) {
                self.0 += 1;
            }
        }

        let mut e = CapSense::new(Manual(0), FakeLink::default(), results, &WIDGETS_3, DEFAULT_TOUCH_CONFIG);
        e.init().unwrap();
        e.enable().unwrap();
        assert!(!e.is_busy());

        e.scan_all();
        assert!(e.is_busy());
        completion.as_mut().unwrap().complete([1, 2, 3]);
        assert!(!e.is_busy());

        e.process_all();
        assert_eq!(e.sensors[2].raw, 3);
        assert_eq!(e.telemetry[2], 1, "Scan counter");
    }

    #[test]
    fn test_scheduler_drives_engine() {
        let mut queue: ScanQueue<3> = Queue::new();
        let e = engine(&mut queue, &WIDGETS_3);
        let mut scheduler = Scheduler::new(e).unwrap();
        scheduler.begin();
        for _ in 0..5 {
            assert!(scheduler.poll());
        }
        let e = scheduler.engine();
        assert_eq!(e.link.sent, 5);
        assert_eq!(e.telemetry[SCANS], 5);
        assert_eq!(e.telemetry[SENSOR_COUNT], 3);
    }

    #[test]
    fn test_button_touch_in_telemetry() {
        let mut queue: ScanQueue<3> = Queue::new();
        let mut e = engine(&mut queue, &WIDGETS_3);
        calibrate(&mut e);
        assert_eq!(e.widgets[1].state, TouchState::Idle(DEFAULT_TOUCH_CONFIG.debounce));

        e.acquisition.counts = [REF, REF, REF - 150];
        for _ in 0..DEFAULT_TOUCH_CONFIG.debounce + 1 {
            cycle(&mut e);
        }
        assert!(e.widgets[1].active());
        assert!(!e.widgets[0].active());

        let t = e.link.last.unwrap();
        assert_eq!(t[FLAGS] & FLAG_ACTIVE, FLAG_ACTIVE);
        let sensor2 = SENSORS + 2 * SENSOR_STRIDE;
        assert_eq!(t[sensor2..sensor2 + 4], [0x3A, 0x07, 150, 0]);
        let button = WIDGETS + WIDGET_STRIDE;
        assert_eq!(t[button..button + 3], [3, 0xFF, 0xFF]);
    }

    #[test]
    fn test_suspend_holds_until_resume() {
        let mut queue: ScanQueue<3> = Queue::new();
        let mut e = engine(&mut queue, &WIDGETS_3);
        e.init().unwrap();
        e.enable().unwrap();

        let link = &mut e.link;
        link.inbound.push_back(Command::Suspend.encode(0));
        link.inbound.push_back(Command::Ping.encode(1));
        link.inbound.push_back(Command::OneScan.encode(2));
        link.inbound.push_back(Command::Resume.encode(3));

        e.run_tuner();
        assert!(!e.suspended);
        assert_eq!(e.link.sent, 4);
        assert_eq!(e.acquisition.starts, 1, "One-scan while suspended");
        assert_eq!(e.telemetry[SCANS], 1);
        assert_eq!(e.telemetry[FLAGS] & FLAG_SUSPENDED, 0);
    }

    #[test]
    fn test_one_scan_ignored_when_running() {
        let mut queue: ScanQueue<3> = Queue::new();
        let mut e = engine(&mut queue, &WIDGETS_3);
        e.init().unwrap();
        e.enable().unwrap();
        e.link.inbound.push_back(Command::OneScan.encode(0));
        e.run_tuner();
        assert_eq!(e.acquisition.starts, 0);
    }

    #[test]
    fn test_write_updates_config() {
        let mut queue: ScanQueue<3> = Queue::new();
        let mut e = engine(&mut queue, &WIDGETS_3);
        e.init().unwrap();
        e.enable().unwrap();

        let write = |offset: u16, bytes: &[u8]| {
            let mut data = [0; 4];
            data[..bytes.len()].copy_from_slice(bytes);
            Command::Write { offset, size: bytes.len() as u8, data }.encode(0)
        };

        // Threshold to 200
        e.link.inbound.push_back(write(CONFIG as u16, &[200, 0]));
        e.run_tuner();
        assert_eq!(e.config.detect_threshold, 200);
        assert_eq!(e.telemetry[CONFIG..CONFIG + 2], [200, 0]);

        // Hysteresis above threshold is refused
        e.link.inbound.push_back(write(CONFIG as u16 + 2, &[0x00, 0x01]));
        e.run_tuner();
        assert_eq!(e.config.detect_hysteresis, DEFAULT_TOUCH_CONFIG.detect_hysteresis);

        // Outside the config region is refused
        e.link.inbound.push_back(write(0, &[0xFF]));
        e.link.inbound.push_back(write(SENSORS as u16 - 1, &[1, 1]));
        e.run_tuner();
        e.run_tuner();
        assert_eq!(e.telemetry[FLAGS], 0);
        assert_eq!(e.config.detect_threshold, 200);
        assert_eq!(e.config.debounce, DEFAULT_TOUCH_CONFIG.debounce);
    }

    #[test]
    fn test_sample_count_write_during_calibration() {
        let mut queue: ScanQueue<3> = Queue::new();
        let mut e = engine(&mut queue, &WIDGETS_3);
        e.init().unwrap();
        e.enable().unwrap();
        e.scan_all();
        let c = DEFAULT_TOUCH_CONFIG;
        for _ in 0..c.calibration_delay + 1 + 4 {
            cycle(&mut e);
        }
        assert_eq!(e.widgets[1].state, TouchState::Calibrate(c.calibration_samples - 4));

        // Calibration samples down to 4
        let write = Command::Write { offset: CONFIG as u16 + 6, size: 2, data: [4, 0, 0, 0] };
        e.link.inbound.push_back(write.encode(0));
        for _ in 0..c.calibration_samples + c.debounce {
            cycle(&mut e);
        }
        assert_eq!(e.config.calibration_samples, 4);
        assert_eq!(e.sensors[2].reference, REF as u32);
        assert_eq!(e.sensors[2].diff, 0);
        assert!(!e.widgets[1].active(), "Touch reported without a touch");
    }

    #[test]
    fn test_restart_recalibrates() {
        let mut queue: ScanQueue<3> = Queue::new();
        let mut e = engine(&mut queue, &WIDGETS_3);
        calibrate(&mut e);
        assert_eq!(e.sensors[0].reference, REF as u32);

        e.link.inbound.push_back(Command::Restart.encode(0));
        e.run_tuner();
        assert_eq!(e.sensors[0].reference, 0);
        assert_eq!(e.widgets[0].state, TouchState::Startup(DEFAULT_TOUCH_CONFIG.calibration_delay));
        assert_eq!(e.telemetry[SCANS], 0);
    }

    #[test]
    fn test_corrupt_command_ignored() {
        let mut queue: ScanQueue<3> = Queue::new();
        let mut e = engine(&mut queue, &WIDGETS_3);
        e.init().unwrap();
        e.enable().unwrap();
        let mut packet = Command::Suspend.encode(0);
        packet[12] ^= 0x55;
        e.link.inbound.push_back(packet);
        e.run_tuner();
        assert!(!e.suspended);
    }
}
