//! Hardware collaborators.
//!
//! The core never touches peripheral registers. Boards implement these traits
//! for their UART, timer, watchdog, DAC and ADC. Digital outputs are
//! [embedded_hal::digital::v2::OutputPin]s that cannot fail, see [DigitalOutput].

use core::convert::Infallible;
use embedded_hal::digital::v2::{OutputPin, PinState};

use crate::{Duration, Instant};

/// Serial byte source and sink as seen from its interrupt handler.
pub trait SerialPort {
    /// A received byte is waiting in the receive register.
    fn is_readable(&self) -> bool;

    /// The transmit register can accept a byte.
    fn is_writable(&self) -> bool;

    /// Reads the receive register.
    fn read_byte(&mut self) -> u8;

    /// Writes the transmit register.
    fn write_byte(&mut self, byte: u8);

    /// Enables or disables the receive and transmit-ready interrupts.
    fn set_interrupts(&mut self, receive: bool, transmit: bool);

    /// Whether the transmit-ready interrupt is enabled.
    fn is_transmit_armed(&self) -> bool;
}

/// Arms the transmit-ready interrupt from the foreground.
///
/// Must be safe to call while the serial interrupt handler may preempt the caller.
pub trait TransmitArm {
    /// Enables the transmit-ready interrupt, leaving the receive interrupt enabled.
    fn arm_transmit(&mut self);
}

/// Hardware alarm.
pub trait Alarm {
    /// Current hardware counter value.
    fn now(&self) -> Instant;

    /// Programs the absolute counter value at which the alarm fires next.
    fn arm_at(&mut self, target: Instant);
}

/// Watchdog timer that resets the system unless refreshed in time.
pub trait LivenessTimer {
    /// Restarts the timeout window.
    fn refresh(&mut self);

    /// Time left before the watchdog resets the system.
    fn time_remaining(&self) -> Duration;

    /// Configured timeout window.
    fn window(&self) -> Duration;
}

/// Device that must never be left with a partially written command.
pub trait Actuator {
    /// Transaction error.
    type Error;

    /// Writes `payload` as one transaction that gives up after `timeout`.
    fn write(&mut self, payload: &[u8], timeout: Duration) -> Result<(), Self::Error>;
}

/// Delivers analog samples.
pub trait SampleSource {
    /// Latest conversion result, `None` if no conversion completed yet.
    fn sample(&mut self) -> Option<u16>;
}

/// Digital output line that cannot fail to switch.
///
/// Implemented for every infallible [OutputPin], which includes the GPIO
/// outputs of the STM32 HAL.
pub trait DigitalOutput: OutputPin<Error = Infallible> {
    /// Drives the line high or low.
    fn set(&mut self, high: bool) {
        match self.set_state(PinState::from(high)) {
            Ok(()) => (),
            Err(never) => match never {},
        }
    }
}

impl<P: OutputPin<Error = Infallible>> DigitalOutput for P {}

/// Output pin that is not connected.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOutput;

impl OutputPin for NoOutput {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

/// Placeholder for a board without an actuator.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoActuator;

impl Actuator for NoActuator {
    type Error = Infallible;

    fn write(&mut self, _payload: &[u8], _timeout: Duration) -> Result<(), Infallible> {
        Ok(())
    }
}

/// Placeholder for a board without an analog sensor.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSampler;

impl SampleSource for NoSampler {
    fn sample(&mut self) -> Option<u16> {
        None
    }
}
