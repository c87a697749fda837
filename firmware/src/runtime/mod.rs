//! Embassy runtime: brings up the PIO blocks, owns the shared encoder stack,
//! and runs the reporting loop.

use core::cell::RefCell;

use defmt::{info, unwrap, warn};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::Timer;

use encoder_core::{ChannelArbiter, EncoderSession, SessionId};

use crate::telemetry;

mod pio_block;
mod watchdog;

use pio_block::PioChannelBlock;
use watchdog::{EpochWatchdog, WatchdogControl};

/// Demo encoders: (base pin, stall timeout in microseconds).
const ENCODERS: [(u8, u64); 2] = [(2, 35_000), (4, 20_000)];

/// Upper bound on sessions; one per hardware channel slot.
pub const MAX_SESSIONS: usize = 8;

/// State shared between the capture interrupts, the watchdog tasks, and the
/// reporting loop. One critical section serializes all of them, which is the
/// exclusion domain the session handlers rely on.
pub struct EncoderStack {
    pub driver: PioChannelBlock,
    pub arbiter: ChannelArbiter,
    pub sessions: [Option<EncoderSession<EpochWatchdog>>; MAX_SESSIONS],
}

pub static STACK: Mutex<CriticalSectionRawMutex, RefCell<Option<EncoderStack>>> =
    Mutex::new(RefCell::new(None));

static WATCHDOGS: [WatchdogControl; MAX_SESSIONS] =
    [const { WatchdogControl::new() }; MAX_SESSIONS];

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let _peripherals = embassy_rp::init(embassy_rp::config::Config::default());

    let mut stack = EncoderStack {
        driver: PioChannelBlock::new(),
        arbiter: ChannelArbiter::new(),
        sessions: [const { None }; MAX_SESSIONS],
    };

    for (index, &(base_pin, timeout_us)) in ENCODERS.iter().enumerate() {
        let mut session =
            EncoderSession::new(base_pin, timeout_us, EpochWatchdog::new(&WATCHDOGS[index]));
        match session.init(&mut stack.arbiter, &mut stack.driver, SessionId::new(index)) {
            Ok(()) => {
                info!(
                    "encoder {}: pins {}+{}, {}",
                    index,
                    base_pin,
                    base_pin + 1,
                    session.assigned_bank()
                );
                unwrap!(spawner.spawn(watchdog::expiry_task(
                    index,
                    &WATCHDOGS[index],
                    timeout_us
                )));
            }
            Err(error) => warn!("encoder {}: {}", index, error),
        }
        stack.sessions[index] = Some(session);
    }

    STACK.lock(|cell| *cell.borrow_mut() = Some(stack));
    pio_block::enable_capture_interrupts();

    loop {
        Timer::after_millis(100).await;
        STACK.lock(|cell| {
            let guard = cell.borrow();
            let Some(stack) = guard.as_ref() else { return };
            for (index, session) in stack.sessions.iter().enumerate() {
                let Some(session) = session else { continue };
                if !session.is_initialized() {
                    continue;
                }
                let line =
                    telemetry::reading_line(index, session.direction(), session.period_us());
                info!("{=str}", line.as_str());
            }
        });
    }
}
