//! Software watchdog raced against the hardware capture.
//!
//! Each session gets a control block and one expiry task. `start` and
//! `cancel` bump an epoch counter and feed the task's signal; the task fires
//! an expiry only when the epoch it slept on is still current. A capture that
//! won the race bumps the epoch inside the shared critical section, so a
//! stale timeout can never zero the reading it just refreshed.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, with_timeout};
use portable_atomic::{AtomicU32, Ordering};

use encoder_core::WatchdogTimer;

use crate::runtime::STACK;

/// State shared between a session's watchdog handle and its expiry task.
pub struct WatchdogControl {
    epoch: AtomicU32,
    feed: Signal<CriticalSectionRawMutex, ()>,
}

impl WatchdogControl {
    pub const fn new() -> Self {
        Self {
            epoch: AtomicU32::new(0),
            feed: Signal::new(),
        }
    }

    fn refresh(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.feed.signal(());
    }

    fn epoch(&self) -> u32 {
        self.epoch.load(Ordering::Acquire)
    }
}

impl Default for WatchdogControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Session-side handle stored inside the `EncoderSession`.
pub struct EpochWatchdog {
    control: &'static WatchdogControl,
}

impl EpochWatchdog {
    pub const fn new(control: &'static WatchdogControl) -> Self {
        Self { control }
    }
}

impl WatchdogTimer for EpochWatchdog {
    // The expiry task owns the window length; starting a fresh window only
    // needs to invalidate whatever expiry is already in flight.
    fn start(&mut self, _timeout_us: u64) {
        self.control.refresh();
    }

    fn cancel(&mut self) {
        self.control.refresh();
    }
}

#[embassy_executor::task(pool_size = 8)]
pub async fn expiry_task(index: usize, control: &'static WatchdogControl, timeout_us: u64) {
    let window = Duration::from_micros(timeout_us);
    loop {
        let epoch = control.epoch();
        if with_timeout(window, control.feed.wait()).await.is_ok() {
            // Fed: a capture or a rearm refreshed the window.
            continue;
        }
        STACK.lock(|cell| {
            let mut guard = cell.borrow_mut();
            let Some(stack) = guard.as_mut() else { return };
            // A capture may have refreshed the reading while this task was
            // waiting its turn for the critical section.
            if control.epoch() != epoch {
                return;
            }
            if let Some(session) = stack.sessions[index].as_mut() {
                session.on_watchdog_expiry();
            }
        });
    }
}
