#![no_std]

// Shared acquisition logic for the PIO motor encoder stack.
//
// This crate stays portable across MCU firmware and host tooling by avoiding
// the Rust standard library and expressing the hardware boundary as traits the
// other crates implement: the firmware binds them to the RP2040 PIO blocks,
// the emulator and the test suite to scripted doubles.

pub mod arbiter;
pub mod channel;
pub mod session;

pub use arbiter::{Allocation, ChannelArbiter, ChannelExhausted, SessionId};
pub use channel::{BankId, ChannelBlock, ChannelId, ProgramOffset, Slot, WatchdogTimer};
pub use session::{CLOCK_HZ, EncoderSession};
