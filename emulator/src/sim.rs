//! Simulated timing channels driving `encoder-core` without hardware.

use std::collections::VecDeque;

use encoder_core::channel::{
    BANK_COUNT, BankId, ChannelBlock, ChannelId, NoopWatchdog, ProgramOffset, SLOT_COUNT, Slot,
};
use encoder_core::{CLOCK_HZ, ChannelArbiter, ChannelExhausted, EncoderSession, SessionId};

/// Countdown ticks one microsecond of signal period costs.
const TICKS_PER_US: f64 = CLOCK_HZ as f64 / 2e6;

/// In-memory stand-in for the two PIO banks: tracks reservations, program
/// residency, the armed countdown per slot, and a capture FIFO per slot.
pub struct SimChannelBlock {
    reserved: [bool; SLOT_COUNT],
    resident: [bool; BANK_COUNT],
    armed: [u32; SLOT_COUNT],
    fifos: Vec<VecDeque<u32>>,
}

impl SimChannelBlock {
    pub fn new() -> Self {
        Self {
            reserved: [false; SLOT_COUNT],
            resident: [false; BANK_COUNT],
            armed: [0; SLOT_COUNT],
            fifos: vec![VecDeque::new(); SLOT_COUNT],
        }
    }

    /// Latches a capture on `slot` as the hardware would: the raw direction
    /// word first (bit 1 set when `base_pin + 1` led), then the countdown
    /// remainder for a cycle of `period_us`.
    fn latch_capture(&mut self, slot: Slot, base_leads: bool, period_us: f64) {
        let flags = if base_leads { 0 } else { 0b10 };
        let elapsed = (period_us * TICKS_PER_US) as u32;
        let remaining = self.armed[slot.index()].saturating_sub(elapsed);
        let fifo = &mut self.fifos[slot.index()];
        fifo.push_back(flags);
        fifo.push_back(remaining);
    }
}

impl Default for SimChannelBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelBlock for SimChannelBlock {
    fn try_reserve(&mut self, bank: BankId) -> Option<ChannelId> {
        for channel in ChannelId::ALL {
            let index = Slot::new(bank, channel).index();
            if !self.reserved[index] {
                self.reserved[index] = true;
                return Some(channel);
            }
        }
        None
    }

    fn can_load_program(&self, bank: BankId) -> bool {
        !self.resident[bank.index()]
    }

    fn load_program(&mut self, bank: BankId) -> ProgramOffset {
        self.resident[bank.index()] = true;
        ProgramOffset::new(0)
    }

    fn configure(&mut self, _: Slot, _: ProgramOffset, _: u8) {}
    fn enable(&mut self, _: Slot) {}

    fn clear(&mut self, slot: Slot) {
        self.fifos[slot.index()].clear();
    }

    fn arm(&mut self, slot: Slot, count: u32) {
        self.armed[slot.index()] = count;
    }

    fn read_value(&mut self, slot: Slot) -> u32 {
        self.fifos[slot.index()]
            .pop_front()
            .expect("capture FIFO underrun")
    }

    fn clear_interrupt_flag(&mut self, _: Slot) {}
    fn enable_interrupt_lines(&mut self, _: BankId, _: u8) {}
}

/// One arbiter, one simulated channel block, and an arena of sessions.
pub struct Rig {
    arbiter: ChannelArbiter,
    driver: SimChannelBlock,
    sessions: Vec<EncoderSession<NoopWatchdog>>,
}

impl Rig {
    pub fn new() -> Self {
        Self {
            arbiter: ChannelArbiter::new(),
            driver: SimChannelBlock::new(),
            sessions: Vec::new(),
        }
    }

    /// Creates and initializes a session; the rig index doubles as its
    /// arbiter-side identity.
    pub fn add_encoder(&mut self, base_pin: u8, timeout_us: u64) -> Result<usize, ChannelExhausted> {
        let index = self.sessions.len();
        let mut session = EncoderSession::new(base_pin, timeout_us, NoopWatchdog::new());
        session.init(&mut self.arbiter, &mut self.driver, SessionId::new(index))?;
        self.sessions.push(session);
        Ok(index)
    }

    /// Simulates one full encoder cycle followed by the capture interrupt,
    /// routed through the arbiter exactly like the firmware's handler.
    pub fn capture(&mut self, index: usize, base_leads: bool, period_us: f64) {
        let slot = self
            .slot_of(index)
            .expect("capture on an uninitialized encoder");
        self.driver.latch_capture(slot, base_leads, period_us);

        let owner = self.arbiter.resolve(slot).expect("unowned slot");
        self.sessions[owner.index()].on_capture(&mut self.driver);
    }

    /// Simulates the watchdog window elapsing with no edge.
    pub fn stall(&mut self, index: usize) {
        self.sessions[index].on_watchdog_expiry();
    }

    pub fn session(&self, index: usize) -> &EncoderSession<NoopWatchdog> {
        &self.sessions[index]
    }

    fn slot_of(&self, index: usize) -> Option<Slot> {
        let id = SessionId::new(index);
        for bank in BankId::ALL {
            for channel in ChannelId::ALL {
                let slot = Slot::new(bank, channel);
                if self.arbiter.resolve(slot) == Some(id) {
                    return Some(slot);
                }
            }
        }
        None
    }
}

impl Default for Rig {
    fn default() -> Self {
        Self::new()
    }
}
