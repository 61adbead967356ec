//! Reset cause.

use edub_core::boot::ResetCause;
use stm32f1::stm32f103::Peripherals;

/// Reads and clears the reset flags.
pub fn take_reset_cause() -> ResetCause {
    let dp = unsafe { Peripherals::steal() };

    let cause = ResetCause::from_rcc_csr(dp.RCC.csr.read().bits());
    dp.RCC.csr.modify(|_, w| w.rmvf().clear());
    dp.RCC.csr.modify(|_, w| w.rmvf().clear_bit());

    cause
}
