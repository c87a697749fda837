//! Timing-channel collaborator abstractions shared between firmware and host
//! targets.
//!
//! The hardware exposes two banks of four countdown channels. Each bank holds
//! one resident microprogram; each channel can be armed with a starting count,
//! counts down while waiting for a qualifying edge, and latches a direction
//! word plus the remaining count when the edge arrives. This module names the
//! pieces of that surface so the arbiter and the sessions never touch a
//! register directly.

use core::fmt;

/// Number of timing-channel banks provided by the hardware.
pub const BANK_COUNT: usize = 2;

/// Number of channels in each bank.
pub const CHANNELS_PER_BANK: usize = 4;

/// Total number of channel slots system-wide.
pub const SLOT_COUNT: usize = BANK_COUNT * CHANNELS_PER_BANK;

/// Interrupt-line mask covering every channel position of a bank.
pub const ALL_CHANNELS_MASK: u8 = 0b1111;

/// One of the two timing-channel banks.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BankId {
    Bank0,
    Bank1,
}

impl BankId {
    /// Both banks, in the fixed allocation preference order.
    pub const ALL: [BankId; BANK_COUNT] = [BankId::Bank0, BankId::Bank1];

    /// Returns the table index of this bank.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            BankId::Bank0 => 0,
            BankId::Bank1 => 1,
        }
    }

    /// Returns the sibling bank.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            BankId::Bank0 => BankId::Bank1,
            BankId::Bank1 => BankId::Bank0,
        }
    }
}

impl fmt::Display for BankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bank{}", self.index())
    }
}

/// Channel position within a bank.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelId(u8);

impl ChannelId {
    /// Every channel position of a bank, lowest first.
    pub const ALL: [ChannelId; CHANNELS_PER_BANK] =
        [ChannelId(0), ChannelId(1), ChannelId(2), ChannelId(3)];

    /// Wraps a raw channel index, rejecting values outside the bank.
    #[must_use]
    pub const fn new(raw: u8) -> Option<Self> {
        if (raw as usize) < CHANNELS_PER_BANK {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// Returns the raw channel index.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

/// System-wide identity of one timing channel.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Slot {
    pub bank: BankId,
    pub channel: ChannelId,
}

impl Slot {
    /// Builds a slot from its bank and channel.
    #[must_use]
    pub const fn new(bank: BankId, channel: ChannelId) -> Self {
        Self { bank, channel }
    }

    /// Returns the global slot index, `bank * 4 + channel`.
    #[must_use]
    pub const fn index(self) -> usize {
        self.bank.index() * CHANNELS_PER_BANK + self.channel.raw() as usize
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/ch{}", self.bank, self.channel.raw())
    }
}

/// Instruction-memory offset of the microprogram resident in a bank.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProgramOffset(u32);

impl ProgramOffset {
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Operations the core consumes from the timing-channel hardware.
///
/// The firmware implements this over the two RP2040 PIO blocks; tests and the
/// emulator provide scripted doubles. Reservation and program loading are the
/// only stateful queries the arbiter relies on, so an implementation must
/// track them faithfully: `try_reserve` hands out each channel at most once
/// and `load_program` is called only after `can_load_program` returned `true`
/// and a channel reservation in that bank succeeded.
pub trait ChannelBlock {
    /// Claims a free channel in the bank, lowest position first.
    fn try_reserve(&mut self, bank: BankId) -> Option<ChannelId>;

    /// Reports whether the bank can still host the shared microprogram.
    fn can_load_program(&self, bank: BankId) -> bool;

    /// Loads the shared microprogram into the bank and returns its offset.
    fn load_program(&mut self, bank: BankId) -> ProgramOffset;

    /// Programs the channel: routes `base_pin` and `base_pin + 1` into it as
    /// pulled-down inputs and points it at the resident program.
    fn configure(&mut self, slot: Slot, offset: ProgramOffset, base_pin: u8);

    /// Starts the channel running.
    fn enable(&mut self, slot: Slot);

    /// Discards any stale captured values held by the channel.
    fn clear(&mut self, slot: Slot);

    /// Arms the channel with a fresh countdown value.
    fn arm(&mut self, slot: Slot, count: u32);

    /// Pops the next captured value. Consumed twice per capture: the
    /// direction-bearing word first, then the remaining count.
    fn read_value(&mut self, slot: Slot) -> u32;

    /// Acknowledges the channel's capture interrupt.
    fn clear_interrupt_flag(&mut self, slot: Slot);

    /// Enables the bank-level interrupt lines selected by `channel_mask`.
    /// Idempotent; re-enabling already-enabled lines is harmless.
    fn enable_interrupt_lines(&mut self, bank: BankId, channel_mask: u8);
}

/// Stall-detection timer raced against the hardware capture.
///
/// `cancel` must be race-free: once it returns, an expiry scheduled for the
/// cancelled window may no longer run. Callers serialize `start`/`cancel`
/// with the expiry handler through the session's exclusion domain.
pub trait WatchdogTimer {
    /// Schedules (or reschedules) an expiry `timeout_us` from now.
    fn start(&mut self, timeout_us: u64);

    /// Revokes the pending expiry, if any.
    fn cancel(&mut self);
}

/// Watchdog that performs no scheduling, for hosts that drive expiry
/// explicitly.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopWatchdog;

impl NoopWatchdog {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl WatchdogTimer for NoopWatchdog {
    fn start(&mut self, _timeout_us: u64) {}

    fn cancel(&mut self) {}
}
