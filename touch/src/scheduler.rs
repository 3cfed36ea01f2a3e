//! Cooperative scan loop
//!
//! The busy poll is the only synchronization with the acquisition interrupt:
//! results are processed after their scan completed, and the next scan is only
//! started once processing and the tuner exchange are done.

use crate::engine::{EngineError, SensingEngine};

pub struct Scheduler<E> {
    engine: E,
}

impl<E: SensingEngine> Scheduler<E> {
    /// Initialize and enable the engine.
    ///
    /// A failure here is not recoverable; the firmware is expected to halt.
    pub fn new(mut engine: E) -> Result<Self, EngineError> {
        engine.init()?;
        engine.enable()?;
        Ok(Self { engine })
    }

    /// Kick off the first scan
    pub fn begin(&mut self) {
        self.engine.scan_all();
    }

    /// Run one cycle if the engine is idle
    ///
    /// Returns true if a cycle ran
    pub fn poll(&mut self) -> bool {
        if self.engine.is_busy() {
            return false;
        }

        self.engine.process_all();
        self.engine.run_tuner();
        self.engine.scan_all();
        true
    }

    pub fn run_forever(mut self) -> ! {
        self.begin();
        loop {
            self.poll();
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}
