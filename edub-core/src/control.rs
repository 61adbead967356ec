//! Serial control protocol.
//!
//! `'+'` and `'-'` adjust the step parameter by one within its range and are
//! never echoed. Every other byte is echoed unchanged.

use crate::Error;

/// Raises the step.
pub const INCREMENT: u8 = b'+';

/// Lowers the step.
pub const DECREMENT: u8 = b'-';

/// Result of handling one received byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Input {
    /// Control byte handled; holds the step afterwards.
    Adjusted(u16),
    /// Byte to be echoed.
    Echo(u8),
}

/// Step parameter bounded to an inclusive range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StepControl {
    value: u16,
    min: u16,
    max: u16,
}

impl StepControl {
    /// Creates the control with an initial value inside `min..=max`.
    pub const fn new(value: u16, min: u16, max: u16) -> Result<Self, Error> {
        if min > max || value < min || value > max {
            return Err(Error::InvalidStepRange);
        }
        Ok(Self { value, min, max })
    }

    /// Current step.
    pub const fn value(&self) -> u16 {
        self.value
    }

    /// Lowest step.
    pub const fn min(&self) -> u16 {
        self.min
    }

    /// Highest step.
    pub const fn max(&self) -> u16 {
        self.max
    }

    /// Handles a received byte.
    pub fn apply(&mut self, byte: u8) -> Input {
        match byte {
            INCREMENT => {
                if self.value < self.max {
                    self.value += 1;
                }
                Input::Adjusted(self.value)
            }
            DECREMENT => {
                if self.value > self.min {
                    self.value -= 1;
                }
                Input::Adjusted(self.value)
            }
            other => Input::Echo(other),
        }
    }
}
