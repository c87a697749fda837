//! Process-wide arbitration of the shared timing channels.
//!
//! The arbiter is the single authority over which session owns which channel
//! slot and which bank already holds the shared microprogram. Centralizing
//! both decisions keeps the program resident at most once per bank and gives
//! the interrupt path an O(1) route from a raw `(bank, channel)` source back
//! to the owning session.
//!
//! The arbiter is handed to sessions explicitly rather than reached through a
//! global, so tests can run several independent instances; a real system
//! still creates exactly one per hardware boundary.

use core::fmt;

use crate::channel::{BANK_COUNT, BankId, ChannelBlock, ProgramOffset, SLOT_COUNT, Slot};

/// Stable arena index of an encoder session.
///
/// The owner table stores these indices instead of references, so sessions
/// can live wherever the host keeps them without the table dangling.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionId(usize);

impl SessionId {
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Channel binding handed out by a successful allocation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Allocation {
    pub slot: Slot,
    pub program_offset: ProgramOffset,
}

/// Every channel slot is claimed and no bank can host a fresh program.
///
/// Terminal condition signaling hardware exhaustion; the host must not create
/// more sessions than there are channels.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelExhausted;

impl fmt::Display for ChannelExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("no timing channel available")
    }
}

/// Allocation table for the eight channel slots and the two bank programs.
#[derive(Clone, Debug, Default)]
pub struct ChannelArbiter {
    owners: [Option<SessionId>; SLOT_COUNT],
    program_offsets: [Option<ProgramOffset>; BANK_COUNT],
}

impl ChannelArbiter {
    /// Creates an arbiter with every slot free and no program resident.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            owners: [None; SLOT_COUNT],
            program_offsets: [None; BANK_COUNT],
        }
    }

    /// Claims a channel slot for `owner`.
    ///
    /// Allocation policy, evaluated in order:
    ///
    /// 1. If some bank already hosts sessions of this arbiter, claim a free
    ///    channel there first; that reuses the resident program and leaves
    ///    the other bank untouched for as long as possible.
    /// 2. Otherwise try the sibling bank: reuse its program when it is
    ///    already in use, load a fresh copy when it is not.
    /// 3. When nothing is claimed yet, take the first bank that can host the
    ///    program and has a free channel, in fixed order.
    ///
    /// A failed allocation performs no externally visible side effect: the
    /// program is loaded only after a channel reservation in that bank has
    /// already succeeded. Callers serialize concurrent allocations through
    /// the exclusive borrow.
    pub fn allocate<D: ChannelBlock>(
        &mut self,
        driver: &mut D,
        owner: SessionId,
    ) -> Result<Allocation, ChannelExhausted> {
        if let Some(preferred) = self.used_bank() {
            if let Some(allocation) = self.claim_in_use(driver, preferred, owner) {
                return Ok(allocation);
            }
            let other = preferred.other();
            let spill = if self.bank_in_use(other) {
                self.claim_in_use(driver, other, owner)
            } else {
                self.claim_fresh(driver, other, owner)
            };
            return spill.ok_or(ChannelExhausted);
        }

        for bank in BankId::ALL {
            if let Some(allocation) = self.claim_fresh(driver, bank, owner) {
                return Ok(allocation);
            }
        }
        Err(ChannelExhausted)
    }

    /// Maps a raw interrupt source back to the owning session.
    #[must_use]
    pub fn resolve(&self, slot: Slot) -> Option<SessionId> {
        self.owners[slot.index()]
    }

    /// Reports whether any session of this arbiter owns a slot in `bank`.
    #[must_use]
    pub fn bank_in_use(&self, bank: BankId) -> bool {
        let base = bank.index() * crate::channel::CHANNELS_PER_BANK;
        self.owners[base..base + crate::channel::CHANNELS_PER_BANK]
            .iter()
            .any(Option::is_some)
    }

    /// Returns the offset of the program resident in `bank`, if any.
    #[must_use]
    pub fn program_offset(&self, bank: BankId) -> Option<ProgramOffset> {
        self.program_offsets[bank.index()]
    }

    /// Returns the first bank hosting a session, in fixed order.
    fn used_bank(&self) -> Option<BankId> {
        BankId::ALL.into_iter().find(|bank| self.bank_in_use(*bank))
    }

    /// Claims a channel in a bank whose program is already resident.
    fn claim_in_use<D: ChannelBlock>(
        &mut self,
        driver: &mut D,
        bank: BankId,
        owner: SessionId,
    ) -> Option<Allocation> {
        let channel = driver.try_reserve(bank)?;
        // A bank in use always has a recorded offset; set by claim_fresh.
        let program_offset = self.program_offset(bank)?;
        Some(self.record(Slot::new(bank, channel), program_offset, owner))
    }

    /// Loads the program into an unused bank and claims a channel there.
    fn claim_fresh<D: ChannelBlock>(
        &mut self,
        driver: &mut D,
        bank: BankId,
        owner: SessionId,
    ) -> Option<Allocation> {
        if !driver.can_load_program(bank) {
            return None;
        }
        let channel = driver.try_reserve(bank)?;
        let program_offset = driver.load_program(bank);
        self.program_offsets[bank.index()] = Some(program_offset);
        Some(self.record(Slot::new(bank, channel), program_offset, owner))
    }

    fn record(&mut self, slot: Slot, program_offset: ProgramOffset, owner: SessionId) -> Allocation {
        debug_assert!(self.owners[slot.index()].is_none(), "slot claimed twice");
        self.owners[slot.index()] = Some(owner);
        Allocation {
            slot,
            program_offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelId;

    /// Minimal in-memory channel block for table-level checks. The full
    /// scripted double lives with the integration tests.
    struct FlatChannels {
        reserved: [bool; SLOT_COUNT],
        resident: [bool; BANK_COUNT],
    }

    impl FlatChannels {
        fn new() -> Self {
            Self {
                reserved: [false; SLOT_COUNT],
                resident: [false; BANK_COUNT],
            }
        }
    }

    impl ChannelBlock for FlatChannels {
        fn try_reserve(&mut self, bank: BankId) -> Option<ChannelId> {
            ChannelId::ALL.into_iter().find(|channel| {
                let index = Slot::new(bank, *channel).index();
                if self.reserved[index] {
                    return false;
                }
                self.reserved[index] = true;
                true
            })
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
        fn clear(&mut self, _: Slot) {}
        fn arm(&mut self, _: Slot, _: u32) {}

        fn read_value(&mut self, _: Slot) -> u32 {
            0
        }

        fn clear_interrupt_flag(&mut self, _: Slot) {}
        fn enable_interrupt_lines(&mut self, _: BankId, _: u8) {}
    }

    #[test]
    fn first_allocation_lands_on_the_first_bank() {
        let mut arbiter = ChannelArbiter::new();
        let mut driver = FlatChannels::new();

        let allocation = arbiter
            .allocate(&mut driver, SessionId::new(0))
            .expect("first allocation");
        assert_eq!(allocation.slot.bank, BankId::Bank0);
        assert_eq!(allocation.slot.channel.raw(), 0);
        assert!(arbiter.bank_in_use(BankId::Bank0));
        assert!(!arbiter.bank_in_use(BankId::Bank1));
    }

    #[test]
    fn resolve_reports_the_recorded_owner() {
        let mut arbiter = ChannelArbiter::new();
        let mut driver = FlatChannels::new();

        let owner = SessionId::new(3);
        let allocation = arbiter.allocate(&mut driver, owner).expect("allocation");
        assert_eq!(arbiter.resolve(allocation.slot), Some(owner));

        let unclaimed = Slot::new(BankId::Bank1, ChannelId::ALL[2]);
        assert_eq!(arbiter.resolve(unclaimed), None);
    }

    #[test]
    fn program_offset_is_unset_until_a_bank_is_claimed() {
        let mut arbiter = ChannelArbiter::new();
        let mut driver = FlatChannels::new();

        assert_eq!(arbiter.program_offset(BankId::Bank0), None);
        arbiter
            .allocate(&mut driver, SessionId::new(0))
            .expect("allocation");
        assert_eq!(
            arbiter.program_offset(BankId::Bank0),
            Some(ProgramOffset::new(0))
        );
        assert_eq!(arbiter.program_offset(BankId::Bank1), None);
    }
}
