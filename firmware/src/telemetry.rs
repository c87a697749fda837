//! Telemetry line formatting shared with host-side checks.

// Only the embedded reporting loop calls this outside of tests.
#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::fmt::Write;

use heapless::String;

/// Longest reading line the reporting loop produces.
pub const MAX_LINE: usize = 64;

/// Formats one encoder reading the way the reporting loop prints it.
///
/// Direction is rendered as `0`/`1` and the period in milliseconds, matching
/// the serial telemetry the board has always emitted.
pub fn reading_line(index: usize, direction: bool, period_us: f64) -> String<MAX_LINE> {
    let mut line = String::new();
    let _ = write!(
        line,
        "encoder {}: {}, {} ms",
        index,
        u8::from(direction),
        period_us / 1e3
    );
    line
}
