//! Bus transaction timing.
//!
//! Blocking I2C drivers bound each phase of a transaction separately: the start
//! condition (with retries), the address and every data byte. [BusTimeouts]
//! splits one transaction timeout over these phases so that a complete write,
//! including a bus recovery after it, never outlasts that timeout.

use crate::{Duration, Error};

/// Start condition attempts after the first one.
pub const START_RETRIES: u8 = 1;

/// Per-phase timeouts of a blocking I2C write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusTimeouts {
    /// Wait for the start condition in microseconds.
    pub start_us: u32,
    /// Start condition retries.
    pub start_retries: u8,
    /// Wait for the address acknowledge in microseconds.
    pub addr_us: u32,
    /// Wait per data byte in microseconds.
    pub data_us: u32,
}

impl BusTimeouts {
    /// Splits `timeout` over the phases of a write of `len` bytes.
    ///
    /// `reserve_us` is kept free for bus recovery.
    pub fn for_write(timeout: Duration, len: usize, reserve_us: u32) -> Result<Self, Error> {
        let budget = timeout.to_micros().saturating_sub(reserve_us.into());
        let slice = budget / Self::phases(START_RETRIES, len);
        let slice = u32::try_from(slice).unwrap_or(u32::MAX);
        if slice == 0 {
            return Err(Error::TimeoutTooShort);
        }

        Ok(Self { start_us: slice, start_retries: START_RETRIES, addr_us: slice, data_us: slice })
    }

    /// Longest time a write of `len` bytes can take in microseconds.
    pub fn worst_case_us(&self, len: usize) -> u64 {
        let starts = u64::from(self.start_retries) + 1;
        // The last byte additionally waits for the transfer to finish.
        let data = len as u64 + 1;
        starts * u64::from(self.start_us) + u64::from(self.addr_us) + data * u64::from(self.data_us)
    }

    /// Whether a write of `len` bytes followed by `reserve_us` of recovery fits into `timeout`.
    pub fn fits(&self, len: usize, reserve_us: u32, timeout: Duration) -> bool {
        self.worst_case_us(len) + u64::from(reserve_us) <= timeout.to_micros()
    }

    fn phases(start_retries: u8, len: usize) -> u64 {
        u64::from(start_retries) + 1 + 1 + len as u64 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{app::Config, waveform::FAST_WRITE_LEN};

    #[test]
    fn write_and_recovery_fit_into_timeout() {
        let timeout = Duration::millis(50);
        let t = BusTimeouts::for_write(timeout, 2, 500).unwrap();

        assert_eq!(t.start_retries, START_RETRIES);
        assert!(t.worst_case_us(2) + 500 <= 50_000);
        assert!(t.fits(2, 500, timeout));
        assert!(!t.fits(2, 500, Duration::millis(10)));
    }

    #[test]
    fn uses_most_of_the_budget() {
        let t = BusTimeouts::for_write(Duration::millis(60), 2, 0).unwrap();
        // Two starts, address and three data waits.
        assert_eq!(t.start_us, 10_000);
        assert_eq!(t.worst_case_us(2), 60_000);
    }

    #[test]
    fn longer_payload_gets_shorter_phases() {
        let short = BusTimeouts::for_write(Duration::millis(50), 2, 0).unwrap();
        let long = BusTimeouts::for_write(Duration::millis(50), 16, 0).unwrap();
        assert!(long.data_us < short.data_us);
        assert!(long.worst_case_us(16) <= 50_000);
    }

    #[test]
    fn default_actuator_timeout_covers_fast_write() {
        let timeout = Config::DEFAULT.actuator_timeout;
        let t = BusTimeouts::for_write(timeout, FAST_WRITE_LEN, 340).unwrap();
        assert!(t.fits(FAST_WRITE_LEN, 340, timeout));
        assert!(t.worst_case_us(FAST_WRITE_LEN) < Config::DEFAULT.safety_margin.to_micros());
    }

    #[test]
    fn timeout_below_reserve_rejected() {
        assert_eq!(BusTimeouts::for_write(Duration::millis(0), 2, 0), Err(Error::TimeoutTooShort));
        assert_eq!(BusTimeouts::for_write(Duration::millis(1), 2, 1_000), Err(Error::TimeoutTooShort));
    }
}
