//! Scripted collaborator doubles shared by the integration suites.

// Not every suite uses every helper.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use encoder_core::channel::{
    BANK_COUNT, BankId, ChannelBlock, ChannelId, ProgramOffset, SLOT_COUNT, Slot, WatchdogTimer,
};

/// Raw direction bit of the first captured word: set when `base_pin + 1` led.
pub const RAW_LEAD_BIT: u32 = 0b10;

/// Every call a session or the arbiter makes into the channel hardware.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DriverCall {
    LoadProgram(BankId),
    Configure(Slot, u32, u8),
    Enable(Slot),
    Clear(Slot),
    Arm(Slot, u32),
    Read(Slot),
    ClearInterrupt(Slot),
    EnableInterruptLines(BankId, u8),
}

/// In-memory channel block with a call log and a program-load probe.
pub struct MockChannels {
    reserved: [bool; SLOT_COUNT],
    resident: [bool; BANK_COUNT],
    pub load_counts: [usize; BANK_COUNT],
    pub calls: Vec<DriverCall>,
    pub rx: VecDeque<u32>,
}

impl MockChannels {
    pub fn new() -> Self {
        Self {
            reserved: [false; SLOT_COUNT],
            resident: [false; BANK_COUNT],
            load_counts: [0; BANK_COUNT],
            calls: Vec::new(),
            rx: VecDeque::new(),
        }
    }

    /// Marks every channel of `bank` as already claimed by someone else.
    pub fn occupy_bank(&mut self, bank: BankId) {
        for channel in ChannelId::ALL {
            self.reserved[Slot::new(bank, channel).index()] = true;
        }
    }

    /// Queues the two FIFO words one hardware capture produces.
    pub fn queue_capture(&mut self, plus_pin_led: bool, remaining: u32) {
        let flags = if plus_pin_led { RAW_LEAD_BIT } else { 0 };
        self.rx.push_back(flags);
        self.rx.push_back(remaining);
    }

}

impl Default for MockChannels {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelBlock for MockChannels {
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
        assert!(!self.resident[bank.index()], "program loaded twice");
        self.resident[bank.index()] = true;
        self.load_counts[bank.index()] += 1;
        self.calls.push(DriverCall::LoadProgram(bank));
        // Distinct per-bank offsets so reuse is observable.
        ProgramOffset::new(bank.index() as u32 * 16)
    }

    fn configure(&mut self, slot: Slot, offset: ProgramOffset, base_pin: u8) {
        self.calls
            .push(DriverCall::Configure(slot, offset.raw(), base_pin));
    }

    fn enable(&mut self, slot: Slot) {
        self.calls.push(DriverCall::Enable(slot));
    }

    fn clear(&mut self, slot: Slot) {
        self.calls.push(DriverCall::Clear(slot));
    }

    fn arm(&mut self, slot: Slot, count: u32) {
        self.calls.push(DriverCall::Arm(slot, count));
    }

    fn read_value(&mut self, slot: Slot) -> u32 {
        self.calls.push(DriverCall::Read(slot));
        self.rx.pop_front().expect("capture FIFO underrun")
    }

    fn clear_interrupt_flag(&mut self, slot: Slot) {
        self.calls.push(DriverCall::ClearInterrupt(slot));
    }

    fn enable_interrupt_lines(&mut self, bank: BankId, channel_mask: u8) {
        self.calls
            .push(DriverCall::EnableInterruptLines(bank, channel_mask));
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WatchdogEvent {
    Started(u64),
    Cancelled,
}

/// Watchdog double logging into storage the test keeps a handle to.
#[derive(Clone)]
pub struct RecordingWatchdog {
    log: Rc<RefCell<Vec<WatchdogEvent>>>,
}

impl RecordingWatchdog {
    pub fn new() -> (Self, Rc<RefCell<Vec<WatchdogEvent>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        (Self { log: Rc::clone(&log) }, log)
    }
}

impl WatchdogTimer for RecordingWatchdog {
    fn start(&mut self, timeout_us: u64) {
        self.log.borrow_mut().push(WatchdogEvent::Started(timeout_us));
    }

    fn cancel(&mut self) {
        self.log.borrow_mut().push(WatchdogEvent::Cancelled);
    }
}
