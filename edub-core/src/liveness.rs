//! Watchdog management.
//!
//! The watchdog resets the whole system unless it is refreshed within its window.
//! A reset while an actuator transaction is in flight can leave the device
//! latched to a partial command, so such transactions are only started when the
//! remaining time exceeds a [SafetyMargin].

use crate::{hw::LivenessTimer, Duration, Error};

/// Minimum remaining watchdog time for starting an actuator transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SafetyMargin {
    margin: Duration,
    timeout: Duration,
}

impl SafetyMargin {
    /// Creates a safety margin for transactions with the specified timeout.
    ///
    /// The margin must be strictly greater than the transaction timeout.
    pub fn new(margin: Duration, transaction_timeout: Duration) -> Result<Self, Error> {
        if margin <= transaction_timeout {
            return Err(Error::MarginTooSmall);
        }
        Ok(Self { margin, timeout: transaction_timeout })
    }

    /// Safety margin.
    pub fn margin(&self) -> Duration {
        self.margin
    }

    /// Transaction timeout.
    pub fn transaction_timeout(&self) -> Duration {
        self.timeout
    }

    /// Checks whether a transaction may start when `remaining` time is left before reset.
    pub fn clearance(&self, remaining: Duration) -> Result<(), Error> {
        if remaining > self.margin {
            Ok(())
        } else {
            Err(Error::DeadlineTooClose)
        }
    }
}

/// Watchdog manager.
///
/// Wraps the hardware watchdog and counts refreshes.
pub struct LivenessMonitor<T> {
    timer: T,
    refreshes: u32,
}

impl<T: LivenessTimer> LivenessMonitor<T> {
    /// Takes over a started watchdog and refreshes it once.
    pub fn new(mut timer: T) -> Self {
        timer.refresh();
        info!("watchdog window is {} ms", timer.window().to_millis());
        Self { timer, refreshes: 0 }
    }

    /// Proves forward progress to the watchdog.
    pub fn refresh(&mut self) {
        self.timer.refresh();
        self.refreshes = self.refreshes.wrapping_add(1);
    }

    /// Time left before the watchdog resets the system.
    pub fn time_remaining(&self) -> Duration {
        self.timer.time_remaining()
    }

    /// Watchdog window.
    pub fn window(&self) -> Duration {
        self.timer.window()
    }

    /// Number of refreshes since creation.
    pub fn refreshes(&self) -> u32 {
        self.refreshes
    }

    /// Checks whether a transaction guarded by `margin` may start now.
    pub fn clearance(&self, margin: &SafetyMargin) -> Result<(), Error> {
        margin.clearance(self.time_remaining())
    }

    /// Hardware watchdog.
    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Mutable access to the hardware watchdog.
    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }
}
