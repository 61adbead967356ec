//! Hardware stand-ins for unit tests.

use core::{cell::Cell, convert::Infallible};
use embedded_hal::digital::v2::OutputPin;
use std::{collections::VecDeque, vec::Vec};

use crate::{
    hw::{Actuator, Alarm, LivenessTimer, SampleSource, SerialPort, TransmitArm},
    Duration, Instant,
};

pub struct MockSerial {
    pub incoming: VecDeque<u8>,
    pub sent: Vec<u8>,
    pub rx_enabled: bool,
    pub tx_armed: bool,
    /// Number of polls for which the transmit register reports ready.
    pub writable_polls: Cell<u32>,
}

impl MockSerial {
    pub fn new() -> Self {
        Self {
            incoming: VecDeque::new(),
            sent: Vec::new(),
            rx_enabled: true,
            tx_armed: false,
            writable_polls: Cell::new(u32::MAX),
        }
    }

    pub fn receive(&mut self, data: &[u8]) {
        self.incoming.extend(data);
    }
}

impl SerialPort for MockSerial {
    fn is_readable(&self) -> bool {
        self.rx_enabled && !self.incoming.is_empty()
    }

    fn is_writable(&self) -> bool {
        let polls = self.writable_polls.get();
        self.writable_polls.set(polls.saturating_sub(1));
        polls > 0
    }

    fn read_byte(&mut self) -> u8 {
        self.incoming.pop_front().unwrap_or(0)
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

impl TransmitArm for MockSerial {
    fn arm_transmit(&mut self) {
        self.tx_armed = true;
    }
}

pub struct MockAlarm {
    pub now: Instant,
    pub targets: Vec<Instant>,
}

impl MockAlarm {
    pub fn at(ms: u64) -> Self {
        Self { now: Instant::from_ticks(ms), targets: Vec::new() }
    }
}

impl Alarm for MockAlarm {
    fn now(&self) -> Instant {
        self.now
    }

    fn arm_at(&mut self, target: Instant) {
        self.targets.push(target);
    }
}

pub struct MockWatchdog {
    pub window: Duration,
    pub remaining: Duration,
    pub refreshes: u32,
}

impl MockWatchdog {
    pub fn new(window_ms: u64) -> Self {
        let window = Duration::millis(window_ms);
        Self { window, remaining: window, refreshes: 0 }
    }
}

impl LivenessTimer for MockWatchdog {
    fn refresh(&mut self) {
        self.remaining = self.window;
        self.refreshes += 1;
    }

    fn time_remaining(&self) -> Duration {
        self.remaining
    }

    fn window(&self) -> Duration {
        self.window
    }
}

#[derive(Default)]
pub struct MockDac {
    pub writes: Vec<Vec<u8>>,
    pub timeouts: Vec<Duration>,
    pub fail: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Nack;

impl Actuator for MockDac {
    type Error = Nack;

    fn write(&mut self, payload: &[u8], timeout: Duration) -> Result<(), Nack> {
        self.timeouts.push(timeout);
        if self.fail {
            return Err(Nack);
        }
        self.writes.push(payload.to_vec());
        Ok(())
    }
}

pub struct MockAdc(pub Option<u16>);

impl SampleSource for MockAdc {
    fn sample(&mut self) -> Option<u16> {
        self.0
    }
}

#[derive(Default)]
pub struct MockPin {
    pub high: bool,
    pub history: Vec<bool>,
}

impl OutputPin for MockPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.high = false;
        self.history.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.high = true;
        self.history.push(true);
        Ok(())
    }
}
