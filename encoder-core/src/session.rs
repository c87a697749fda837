//! Per-encoder timing state machine.
//!
//! A session owns one timing channel end to end: it claims the channel
//! through the arbiter, computes period and direction from captured values,
//! and races a watchdog against the hardware capture to report a stalled
//! shaft as a zero period.
//!
//! Two events drive an initialized session: an edge capture routed in by the
//! interrupt path, and a watchdog expiry. Their handlers never run
//! concurrently with each other or with the accessors; the host provides that
//! exclusion (a critical section on the MCU, plain `&mut` everywhere else).

use crate::arbiter::{Allocation, ChannelArbiter, ChannelExhausted, SessionId};
use crate::channel::{ALL_CHANNELS_MASK, BankId, ChannelBlock, WatchdogTimer};

/// Fixed clock rate of the timing channels, in ticks per second.
pub const CLOCK_HZ: u32 = 125_000_000;

/// Bit of the first captured word that is set when `base_pin + 1` led
/// `base_pin` at the captured edge.
const RAW_DIRECTION_BIT: u32 = 0b10;

/// Measures the rotational period and direction of one motor encoder.
///
/// Construction does no hardware work; [`init`](Self::init) binds the session
/// to a channel slot, after which the binding is immutable for the rest of
/// the process. Sessions are never torn down.
#[derive(Debug)]
pub struct EncoderSession<W> {
    base_pin: u8,
    timeout_us: u64,
    max_counter: u32,
    binding: Option<Allocation>,
    period_us: f64,
    direction: bool,
    watchdog: W,
}

impl<W: WatchdogTimer> EncoderSession<W> {
    /// Creates a session reading the pulse pair on `base_pin` and
    /// `base_pin + 1`, reporting a stall once `timeout_us` passes without an
    /// edge.
    #[must_use]
    pub fn new(base_pin: u8, timeout_us: u64, watchdog: W) -> Self {
        Self {
            base_pin,
            timeout_us,
            max_counter: max_counter_for(timeout_us),
            binding: None,
            period_us: 0.0,
            direction: false,
            watchdog,
        }
    }

    /// Claims a channel and starts the acquisition.
    ///
    /// On success the channel is programmed, armed with the timeout countdown,
    /// and the watchdog is running; the session then only reacts to capture
    /// and expiry events. On [`ChannelExhausted`] the session stays
    /// uninitialized and the accessors keep their neutral defaults.
    pub fn init<D: ChannelBlock>(
        &mut self,
        arbiter: &mut ChannelArbiter,
        driver: &mut D,
        id: SessionId,
    ) -> Result<(), ChannelExhausted> {
        debug_assert!(self.binding.is_none(), "session initialized twice");

        let allocation = arbiter.allocate(driver, id)?;
        driver.configure(allocation.slot, allocation.program_offset, self.base_pin);
        driver.enable(allocation.slot);
        driver.clear(allocation.slot);
        driver.enable_interrupt_lines(allocation.slot.bank, ALL_CHANNELS_MASK);
        self.binding = Some(allocation);

        self.watchdog.start(self.timeout_us);
        driver.arm(allocation.slot, self.max_counter);
        Ok(())
    }

    /// Handles an edge capture on this session's channel.
    ///
    /// The watchdog is cancelled first so a stale expiry cannot zero the
    /// reading computed here; rearming the channel and restarting the
    /// watchdog are the last steps so no capture window is lost.
    pub fn on_capture<D: ChannelBlock>(&mut self, driver: &mut D) {
        let Some(binding) = self.binding else {
            // The arbiter only routes interrupts to registered sessions.
            panic!("capture routed to an uninitialized session");
        };

        self.watchdog.cancel();

        let flags = driver.read_value(binding.slot);
        self.direction = flags & RAW_DIRECTION_BIT == 0;

        let remaining = driver.read_value(binding.slot);
        self.period_us = period_us_from_count(self.max_counter, remaining);

        driver.clear_interrupt_flag(binding.slot);
        driver.arm(binding.slot, self.max_counter);
        self.watchdog.start(self.timeout_us);
    }

    /// Handles a watchdog expiry: no edge arrived within the timeout window.
    ///
    /// Zeroes the reported period and nothing else. The last known direction
    /// is preserved and the channel keeps its own countdown running; rearming
    /// happens only on the next capture.
    pub fn on_watchdog_expiry(&mut self) {
        self.period_us = 0.0;
    }

    /// Last latched turning direction. `true` when the pulse on the base pin
    /// occurred before the one on `base_pin + 1`.
    #[must_use]
    pub fn direction(&self) -> bool {
        self.direction
    }

    /// Last computed full-cycle period in microseconds; `0` means no recent
    /// edge (stalled or never initialized).
    #[must_use]
    pub fn period_us(&self) -> f64 {
        self.period_us
    }

    /// Bank this session was bound to, for diagnostics.
    #[must_use]
    pub fn assigned_bank(&self) -> Option<BankId> {
        self.binding.map(|allocation| allocation.slot.bank)
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.binding.is_some()
    }

    /// First input pin of the pulse pair.
    #[must_use]
    pub fn base_pin(&self) -> u8 {
        self.base_pin
    }

    /// Configured stall window in microseconds.
    #[must_use]
    pub fn timeout_us(&self) -> u64 {
        self.timeout_us
    }

    /// Countdown value the channel is armed with on every rearm.
    #[must_use]
    pub fn max_counter(&self) -> u32 {
        self.max_counter
    }
}

/// Countdown ticks covering `timeout_us` at half the channel clock; the
/// microprogram spends two clocks per decrement.
fn max_counter_for(timeout_us: u64) -> u32 {
    (timeout_us as f64 * (f64::from(CLOCK_HZ) / 2e6)) as u32
}

/// Converts ticks-since-arm into a full-cycle period in microseconds.
fn period_us_from_count(max_counter: u32, remaining: u32) -> f64 {
    (f64::from(max_counter) - f64::from(remaining)) * 2.0 / f64::from(CLOCK_HZ) * 1e6
}
