#![no_main]
#![no_std]

use core::ptr::addr_of_mut;
use cortex_m_rt::entry;
use heapless::spsc::Queue;
use panic_halt as _;

use stm32f0xx_hal as hal;

use touch::capsense::{CapSense, TELEMETRY_SIZE};
use touch::engine::{scan_channel, ScanCompletion, ScanQueue};
use touch::scheduler::Scheduler;
use touch::tsc::{self, Channel, SampleConfig, Tsc, TscCompletion, TscScan};
use touch::tuner::{TunerChannel, COMMAND_PACKET_SIZE};
use touch::widget::WidgetConfig;
use touch::TouchConfig;

use crate::hal::pac;
use crate::hal::pac::interrupt;
use crate::hal::prelude::*;

#[macro_use]
mod rtt;

const SENSORS: usize = 4;

/// Priority 3 of 4; the F0 NVIC only implements the top two bits
const TSC_IRQ_PRIORITY: u8 = 3 << 6;

/// One channel per group so all four are acquired in a single scan
static SAMPLE_CONFIG: SampleConfig = SampleConfig::new()
    .sample(Channel::G1Ch2).channel(Channel::G1Ch1) // Slider 1
    .sample(Channel::G2Ch3).channel(Channel::G2Ch1) // Slider 2
    .sample(Channel::G3Ch4).channel(Channel::G3Ch2) // Slider 3
    .sample(Channel::G6Ch2).channel(Channel::G6Ch1); // Button

static WIDGETS: [WidgetConfig; 2] = [
    WidgetConfig::slider(0, 3),
    WidgetConfig::button(3),
];

static TOUCH_CONFIG: TouchConfig = TouchConfig {
    detect_threshold: 100,
    detect_hysteresis: 5,
    calibration_delay: 10,
    calibration_samples: 10,
    debounce: 3,
};

static TSC_CONFIG: tsc::Config = tsc::Config {
    clock_prescale: None,
    max_count: Some(tsc::MaxCount::U8191),
    charge_transfer_high: None,
    charge_transfer_low: None,
};

static mut SCAN_QUEUE: ScanQueue<SENSORS> = Queue::new();
static mut TSC_IRQ: Option<(TscCompletion, ScanCompletion<'static, SENSORS>)> = None;

#[entry]
fn main() -> ! {
    let tuner = rtt::init();
    log!("touch-tuner starting");

    let dp = pac::Peripherals::take().unwrap();
    let cp = cortex_m::Peripherals::take().unwrap();
    let mut nvic = cp.NVIC;

    let mut flash = dp.FLASH;
    let mut rcc = dp.RCC.configure().sysclk(48.mhz()).freeze(&mut flash);
    let gpioa = dp.GPIOA.split(&mut rcc);
    let gpiob = dp.GPIOB.split(&mut rcc);

    // A library requiring a critical section to set a gpio AF register is bad and I just won't.
    let fake_cs = unsafe { cortex_m::interrupt::CriticalSection::new() };

    // Touch electrodes and sample caps
    let _slider1 = gpioa.pa0.into_alternate_af3(&fake_cs);
    let _slider2 = gpioa.pa4.into_alternate_af3(&fake_cs);
    let _slider3 = gpiob.pb0.into_alternate_af3(&fake_cs);
    let _button = gpiob.pb11.into_alternate_af3(&fake_cs);
    let _g1_cap = gpioa.pa1.into_alternate_af3(&fake_cs);
    let _g2_cap = gpioa.pa6.into_alternate_af3(&fake_cs);
    let _g3_cap = gpiob.pb2.into_alternate_af3(&fake_cs);
    let _g6_cap = gpiob.pb12.into_alternate_af3(&fake_cs);

    let mut tsc = Tsc::new(Some(TSC_CONFIG));
    tsc.listen();

    let (completion, results) = scan_channel(unsafe { &mut *addr_of_mut!(SCAN_QUEUE) });
    unsafe {
        TSC_IRQ = Some((tsc.completion(), completion));
        nvic.set_priority(pac::Interrupt::TSC, TSC_IRQ_PRIORITY);
        cortex_m::peripheral::NVIC::unmask(pac::Interrupt::TSC);
    }

    let link = TunerChannel::<_, COMMAND_PACKET_SIZE>::new::<TELEMETRY_SIZE>(tuner);
    let acquisition = TscScan {
        tsc,
        sample_config: SAMPLE_CONFIG,
    };
    let engine = CapSense::new(acquisition, link, results, &WIDGETS, TOUCH_CONFIG);

    let scheduler = match Scheduler::new(engine) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            log!("capsense start failed: {}", e);
            panic!();
        }
    };

    log!("scanning {} sensors", SENSORS);
    scheduler.run_forever()
}

#[interrupt]
fn TSC() {
    // Only this handler touches TSC_IRQ after init
    let (tsc, completion) = unsafe { (*addr_of_mut!(TSC_IRQ)).as_mut().unwrap_unchecked() };
    if tsc.is_finished() {
        completion.complete(tsc.finish(&SAMPLE_CONFIG));
    }
}
