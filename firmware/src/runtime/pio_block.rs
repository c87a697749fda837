//! `ChannelBlock` implementation over the two RP2040 PIO blocks.
//!
//! Each PIO block is one bank: its four state machines share a single
//! resident copy of the capture microprogram and one interrupt line.
//! Registers are driven directly through the PAC because the arbitration
//! layer needs the raw claim/load/arm surface rather than a high-level
//! driver. The capture program is the only tenant of a bank's instruction
//! memory and always loads at offset 0.

use embassy_rp::pac;
use embassy_rp::pac::Interrupt;

use encoder_core::channel::{
    BANK_COUNT, BankId, ChannelBlock, ChannelId, ProgramOffset, SLOT_COUNT, Slot,
};

use crate::runtime::{EncoderStack, STACK};

/// Capture microprogram, hand-assembled.
///
/// ```text
///  0: pull block          ; countdown arrives through the TX FIFO
///  1: mov x, osr
///  2: wait 0 pin 0        ; settle low, then
///  3: wait 1 pin 0        ; start the cycle on a rising edge
///  4: jmp pin, 6          ; high phase: still high -> count
///  5: jmp 8               ; fell -> low phase
///  6: jmp x--, 4          ; two clocks per decrement
///  7: jmp 10              ; countdown exhausted -> capture anyway
///  8: jmp pin, 10         ; rose again -> full cycle complete
///  9: jmp x--, 8          ; two clocks per decrement
/// 10: in pins, 2          ; sample the pair; bit 1 = base_pin + 1
/// 11: push block
/// 12: mov isr, x          ; remaining count
/// 13: push block
/// 14: irq wait 0 rel      ; flag the channel, stall until serviced
///     .wrap to 0
/// ```
const CAPTURE_PROGRAM: [u16; 15] = [
    0x80a0, 0xa027, 0x2020, 0x20a0, 0x00c6, 0x0008, 0x0044, 0x000a, 0x00ca, 0x0048, 0x4002,
    0x8020, 0xa0c1, 0x8020, 0xc030,
];

const PROGRAM_ORIGIN: u32 = 0;
const WRAP_TOP: u8 = (CAPTURE_PROGRAM.len() - 1) as u8;

/// GPIO function select routing a pad into PIO0 / PIO1.
const FUNCSEL_PIO: [u8; BANK_COUNT] = [6, 7];

fn regs(bank: BankId) -> pac::pio::Pio {
    match bank {
        BankId::Bank0 => pac::PIO0,
        BankId::Bank1 => pac::PIO1,
    }
}

/// Claim and program-residency bookkeeping over both PIO blocks.
pub struct PioChannelBlock {
    reserved: [bool; SLOT_COUNT],
    resident: [bool; BANK_COUNT],
}

impl PioChannelBlock {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reserved: [false; SLOT_COUNT],
            resident: [false; BANK_COUNT],
        }
    }
}

impl Default for PioChannelBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelBlock for PioChannelBlock {
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
        let pio = regs(bank);
        for (index, instruction) in CAPTURE_PROGRAM.iter().enumerate() {
            pio.instr_mem(PROGRAM_ORIGIN as usize + index)
                .write(|w| w.set_instr_mem(*instruction));
        }
        self.resident[bank.index()] = true;
        ProgramOffset::new(PROGRAM_ORIGIN)
    }

    fn configure(&mut self, slot: Slot, offset: ProgramOffset, base_pin: u8) {
        for pin in [base_pin, base_pin + 1] {
            pac::PADS_BANK0.gpio(pin as usize).modify(|w| {
                w.set_ie(true);
                w.set_pde(true);
                w.set_pue(false);
            });
            pac::IO_BANK0
                .gpio(pin as usize)
                .ctrl()
                .write(|w| w.set_funcsel(FUNCSEL_PIO[slot.bank.index()]));
        }

        let pio = regs(slot.bank);
        let channel = slot.channel.raw() as usize;
        let sm = pio.sm(channel);
        sm.clkdiv().write(|w| w.set_int(1));
        sm.execctrl().write(|w| {
            w.set_jmp_pin(base_pin);
            w.set_wrap_bottom(offset.raw() as u8);
            w.set_wrap_top(offset.raw() as u8 + WRAP_TOP);
        });
        sm.shiftctrl().write(|w| {
            // Shift left so the sampled pin pair lands in the low bits.
            w.set_in_shiftdir(false);
            w.set_autopush(false);
        });
        sm.pinctrl().write(|w| w.set_in_base(base_pin));

        // Restart the state machine and park it at the program origin.
        pio.ctrl()
            .modify(|w| w.set_sm_restart(1 << slot.channel.raw()));
        sm.instr().write(|w| w.set_instr(offset.raw() as u16));
    }

    fn enable(&mut self, slot: Slot) {
        let pio = regs(slot.bank);
        pio.ctrl()
            .modify(|w| w.set_sm_enable(w.sm_enable() | (1 << slot.channel.raw())));
    }

    fn clear(&mut self, slot: Slot) {
        let pio = regs(slot.bank);
        let channel = slot.channel.raw() as usize;
        while pio.fstat().read().rxempty() & (1 << slot.channel.raw()) == 0 {
            let _ = pio.rxf(channel).read();
        }
    }

    fn arm(&mut self, slot: Slot, count: u32) {
        regs(slot.bank)
            .txf(slot.channel.raw() as usize)
            .write_value(count);
    }

    fn read_value(&mut self, slot: Slot) -> u32 {
        let pio = regs(slot.bank);
        // The program pushes both words before raising the interrupt, so
        // this spin only covers the store buffer, not a pending capture.
        while pio.fstat().read().rxempty() & (1 << slot.channel.raw()) != 0 {}
        pio.rxf(slot.channel.raw() as usize).read()
    }

    fn clear_interrupt_flag(&mut self, slot: Slot) {
        regs(slot.bank)
            .irq()
            .write(|w| w.set_irq(1 << slot.channel.raw()));
    }

    fn enable_interrupt_lines(&mut self, bank: BankId, channel_mask: u8) {
        // Channel capture flags sit at bits 8..=11 of the bank's INTE0.
        regs(bank)
            .irqs(0)
            .inte()
            .modify(|w| w.0 |= u32::from(channel_mask) << 8);
    }
}

/// Routes a bank's pending channel interrupts to the owning sessions.
fn dispatch(bank: BankId) {
    STACK.lock(|cell| {
        let mut guard = cell.borrow_mut();
        let Some(stack) = guard.as_mut() else { return };
        let flags = regs(bank).irq().read().irq();
        let EncoderStack {
            driver,
            arbiter,
            sessions,
        } = stack;
        for channel in ChannelId::ALL {
            if flags & (1 << channel.raw()) == 0 {
                continue;
            }
            let slot = Slot::new(bank, channel);
            // An interrupt from a slot nobody owns means the arbitration
            // tables and the hardware disagree; there is no sane recovery.
            let owner = arbiter
                .resolve(slot)
                .expect("capture interrupt on an unowned channel");
            let session = sessions[owner.index()]
                .as_mut()
                .expect("owner without a session");
            session.on_capture(driver);
        }
    });
}

#[allow(non_snake_case)]
#[unsafe(no_mangle)]
extern "C" fn PIO0_IRQ_0() {
    dispatch(BankId::Bank0);
}

#[allow(non_snake_case)]
#[unsafe(no_mangle)]
extern "C" fn PIO1_IRQ_0() {
    dispatch(BankId::Bank1);
}

/// Unmasks both banks' capture interrupt lines in the NVIC.
pub fn enable_capture_interrupts() {
    unsafe {
        cortex_m::peripheral::NVIC::unmask(Interrupt::PIO0_IRQ_0);
        cortex_m::peripheral::NVIC::unmask(Interrupt::PIO1_IRQ_0);
    }
}
