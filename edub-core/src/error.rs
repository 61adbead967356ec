//! Configuration errors.

/// EDUB core error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, displaydoc::Display)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// ticker period must not be zero
    ZeroPeriod,
    /// step range is empty or does not contain the initial step
    InvalidStepRange,
    /// safety margin must exceed the transaction timeout
    MarginTooSmall,
    /// remaining time before watchdog reset does not exceed the safety margin
    DeadlineTooClose,
    /// write attempts must not be zero
    NoWriteAttempts,
    /// watchdog window must exceed the ticker period
    WindowTooShort,
    /// transaction timeout is too short for the bus phases
    TimeoutTooShort,
}
