//! Software board.
//!
//! Peripherals of the EDUB board emulated on a virtual millisecond clock.

use displaydoc::Display;
use edub_core::{
    hw::{Actuator, Alarm, LivenessTimer, SerialPort, TransmitArm},
    Duration, Instant,
};
use embedded_hal::digital::v2::OutputPin;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{cell::Cell, collections::VecDeque, convert::Infallible};
use thiserror::Error;

/// Virtual hardware counter.
#[derive(Default)]
pub struct Clock(Cell<u64>);

impl Clock {
    /// Current counter value.
    pub fn now(&self) -> Instant {
        Instant::from_ticks(self.0.get())
    }

    /// Advances the counter by one millisecond.
    pub fn tick(&self) {
        self.0.set(self.0.get() + 1);
    }
}

/// UART with single-byte receive and transmit registers.
#[derive(Debug)]
pub struct SimSerial {
    line: VecDeque<u8>,
    rx_reg: Option<u8>,
    rx_enabled: bool,
    tx_armed: bool,
    sent: Vec<u8>,
}

impl Default for SimSerial {
    fn default() -> Self {
        Self { line: VecDeque::new(), rx_reg: None, rx_enabled: true, tx_armed: false, sent: Vec::new() }
    }
}

impl SimSerial {
    /// Queues bytes arriving on the receive line.
    pub fn feed(&mut self, data: impl IntoIterator<Item = u8>) {
        self.line.extend(data);
    }

    /// Completes reception of the next frame if the receive register is free.
    pub fn clock_in(&mut self) {
        if self.rx_reg.is_none() {
            self.rx_reg = self.line.pop_front();
        }
    }

    /// Whether the serial interrupt is asserted.
    pub fn interrupt_pending(&self) -> bool {
        (self.rx_enabled && self.rx_reg.is_some()) || self.tx_armed
    }

    /// Takes the bytes transmitted so far.
    pub fn take_sent(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.sent)
    }
}

impl SerialPort for SimSerial {
    fn is_readable(&self) -> bool {
        self.rx_reg.is_some()
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn read_byte(&mut self) -> u8 {
        self.rx_reg.take().unwrap_or_default()
    }

    fn write_byte(&mut self, byte: u8) {
        self.sent.push(byte);
    }

    fn set_interrupts(&mut self, receive: bool, transmit: bool) {
        self.rx_enabled = receive;
        self.tx_armed = transmit;
    }

    fn is_transmit_armed(&self) -> bool {
        self.tx_armed
    }
}

impl TransmitArm for SimSerial {
    fn arm_transmit(&mut self) {
        self.tx_armed = true;
    }
}

/// Compare alarm on the virtual counter.
pub struct SimAlarm<'a> {
    clock: &'a Clock,
    target: Option<Instant>,
}

impl<'a> SimAlarm<'a> {
    /// Creates a disarmed alarm.
    pub fn new(clock: &'a Clock) -> Self {
        Self { clock, target: None }
    }

    /// Whether the armed target has been reached.
    pub fn due(&self) -> bool {
        self.target.is_some_and(|target| self.clock.now() >= target)
    }
}

impl Alarm for SimAlarm<'_> {
    fn now(&self) -> Instant {
        self.clock.now()
    }

    fn arm_at(&mut self, target: Instant) {
        self.target = Some(target);
    }
}

/// Independent watchdog.
pub struct SimWatchdog<'a> {
    clock: &'a Clock,
    window: Duration,
    last: Instant,
}

impl<'a> SimWatchdog<'a> {
    /// Starts the watchdog with the specified window.
    pub fn start(clock: &'a Clock, window: Duration) -> Self {
        Self { clock, window, last: clock.now() }
    }

    /// Whether the window elapsed without refresh.
    pub fn expired(&self) -> bool {
        self.clock.now() - self.last >= self.window
    }
}

impl LivenessTimer for SimWatchdog<'_> {
    fn refresh(&mut self) {
        self.last = self.clock.now();
    }

    fn time_remaining(&self) -> Duration {
        let elapsed = self.clock.now() - self.last;
        Duration::from_ticks(self.window.ticks().saturating_sub(elapsed.ticks()))
    }

    fn window(&self) -> Duration {
        self.window
    }
}

/// DAC transaction error.
#[derive(Display, Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DacError {
    /// DAC did not acknowledge
    Nack,
    /// malformed fast-write payload
    Payload,
}

/// 12-bit I2C DAC that occasionally fails to acknowledge.
pub struct SimDac {
    code: Option<u16>,
    failure_rate: f64,
    rng: StdRng,
}

impl SimDac {
    /// Creates a DAC failing with the specified probability.
    pub fn new(failure_rate: f64, seed: u64) -> Self {
        Self { code: None, failure_rate: failure_rate.clamp(0.0, 1.0), rng: StdRng::seed_from_u64(seed) }
    }

    /// Latched output code.
    pub fn code(&self) -> Option<u16> {
        self.code
    }
}

impl Actuator for SimDac {
    type Error = DacError;

    fn write(&mut self, payload: &[u8], _timeout: Duration) -> Result<(), DacError> {
        let &[high, low] = payload else { return Err(DacError::Payload) };
        if high & 0xf0 != 0 {
            return Err(DacError::Payload);
        }
        if self.rng.gen_bool(self.failure_rate) {
            return Err(DacError::Nack);
        }
        self.code = Some(u16::from_be_bytes([high, low]));
        Ok(())
    }
}

/// Free running ADC with a noisy input.
pub struct SimAdc {
    level: u16,
    rng: StdRng,
}

impl SimAdc {
    /// Creates an ADC whose input starts at `level`.
    pub fn new(level: u16, seed: u64) -> Self {
        Self { level: level.min(4095), rng: StdRng::seed_from_u64(seed) }
    }

    /// Performs `n` conversions, drifting the input by up to one count each.
    pub fn convert(&mut self, n: usize) -> Vec<u16> {
        (0..n)
            .map(|_| {
                let drift: i16 = self.rng.gen_range(-1..=1);
                self.level = self.level.saturating_add_signed(drift).min(4095);
                self.level
            })
            .collect()
    }
}

/// Digital output that logs its transitions.
pub struct SimPin {
    name: &'static str,
    high: bool,
}

impl SimPin {
    /// Creates a low output.
    pub fn new(name: &'static str) -> Self {
        Self { name, high: false }
    }

    /// Whether the output is high.
    pub fn is_high(&self) -> bool {
        self.high
    }

    fn set(&mut self, high: bool) {
        if self.high != high {
            log::trace!("{} {}", self.name, if high { "on" } else { "off" });
        }
        self.high = high;
    }
}

impl OutputPin for SimPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.set(true);
        Ok(())
    }
}
