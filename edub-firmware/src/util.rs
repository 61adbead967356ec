//! Utility functions.

use cortex_m::peripheral::DWT;
use stm32f1xx_hal::rcc::Clocks;

/// Busy-wait delay using the DWT cycle counter.
///
/// The cycle counter must be enabled.
#[derive(Clone, Copy)]
pub struct DwtDelay {
    cycles_per_us: u32,
}

impl DwtDelay {
    /// Creates a delay for the configured system clock.
    pub fn new(clocks: &Clocks) -> Self {
        Self { cycles_per_us: clocks.sysclk().raw() / 1_000_000 }
    }

    /// Waits for the specified number of microseconds.
    pub fn delay(&self, us: u32) {
        let start = DWT::cycle_count();
        let cycles = us.saturating_mul(self.cycles_per_us);
        while DWT::cycle_count().wrapping_sub(start) < cycles {}
    }
}
