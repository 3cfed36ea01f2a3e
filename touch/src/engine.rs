//! Capabilities the scan loop needs from a capacitive sensing engine.
//!
//! Acquisition completes in interrupt context. The interrupt side only ever
//! holds a [`ScanCompletion`], which posts the finished counts into a single
//! slot queue. The foreground engine reads that queue in `is_busy` without
//! blocking, so nothing else has to be shared with the interrupt.

use core::fmt;

use heapless::spsc::{Consumer, Producer, Queue};

/// Queue carrying one finished scan from the interrupt to the foreground.
///
/// heapless queues hold `N - 1` elements, so this is a single slot.
pub type ScanQueue<const N: usize> = Queue<[u16; N], 2>;
pub type ScanResults<'q, const N: usize> = Consumer<'q, [u16; N], 2>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineError {
    /// `enable` was called before a successful `init`
    NotInitialized,
    /// More sensors than the telemetry snapshot has room for
    TooManySensors,
    /// More widgets than the telemetry snapshot has room for
    TooManyWidgets,
    /// A widget refers to sensors that do not exist
    WidgetOutOfRange,
    /// The touch configuration cannot work, e.g. hysteresis above threshold
    InvalidConfig,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::NotInitialized => "engine not initialized",
            Self::TooManySensors => "too many sensors",
            Self::TooManyWidgets => "too many widgets",
            Self::WidgetOutOfRange => "widget sensor range out of bounds",
            Self::InvalidConfig => "invalid touch configuration",
        };
        f.write_str(msg)
    }
}

/// The sensing engine as seen by the scan scheduler
pub trait SensingEngine {
    /// Bring the sensing block to its default state
    fn init(&mut self) -> Result<(), EngineError>;

    /// Start the firmware modules. Must follow a successful `init`.
    fn enable(&mut self) -> Result<(), EngineError>;

    /// Start scanning all sensors. Returns immediately; completion arrives by interrupt.
    fn scan_all(&mut self);

    /// True while a started scan has not completed
    fn is_busy(&self) -> bool;

    /// Turn the results of the last completed scan into widget states and telemetry
    fn process_all(&mut self);

    /// Exchange telemetry and commands with the tuner
    fn run_tuner(&mut self);
}

/// Hardware that can start a charge-transfer acquisition of all sensors
pub trait Acquisition {
    fn start(&mut self);
}

/// Interrupt side of the scan queue
pub struct ScanCompletion<'q, const N: usize> {
    producer: Producer<'q, [u16; N], 2>,
}

impl<'q, const N: usize> ScanCompletion<'q, N> {
    pub fn new(producer: Producer<'q, [u16; N], 2>) -> Self {
        Self { producer }
    }

    /// Post the counts of a finished acquisition.
    ///
    /// A scan is only ever started after the previous one was consumed, so the
    /// slot is free. If it is not, the newer result is dropped.
    pub fn complete(&mut self, counts: [u16; N]) {
        self.producer.enqueue(counts).ok();
    }
}

/// Split a scan queue into the interrupt and foreground halves
pub fn scan_channel<const N: usize>(
    queue: &mut ScanQueue<N>,
) -> (ScanCompletion<'_, N>, ScanResults<'_, N>) {
    let (producer, consumer) = queue.split();
    (ScanCompletion::new(producer), consumer)
}

#[cfg(test)]
pub mod test {
    use super::*;

    #[test]
    fn test_scan_channel_single_slot() {
        let mut queue: ScanQueue<2> = Queue::new();
        let (mut completion, mut results) = scan_channel(&mut queue);

        assert!(!results.ready());
        completion.complete([1, 2]);
        completion.complete([3, 4]);
        assert_eq!(results.dequeue(), Some([1, 2]));
        assert_eq!(results.dequeue(), None);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            std::format!("{}", EngineError::InvalidConfig),
            "invalid touch configuration"
        );
    }
}
