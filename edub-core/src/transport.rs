//! Half-duplex serial transport.
//!
//! One interrupt line serves both directions. The [SerialHandler] runs in that
//! interrupt and either moves one received byte into the inbound buffer or one
//! byte of the outbound buffer into the transmit register. The [SerialConsole]
//! is used by the foreground loop; it never changes the handler [Mode] and can
//! only ask for a transmission by arming the transmit-ready interrupt.
//!
//! Transmit-ready is armed only while the outbound buffer holds data and is
//! disarmed after every transmitted byte, so an idle transmitter does not keep
//! the interrupt asserted.

use core::{convert::Infallible, fmt};
use edub_ringbuf::{OverflowPolicy, RingBuffer};

use crate::{
    hw::{SerialPort, TransmitArm},
    retry,
};

/// Default number of polls of the transmit register before a byte is dropped.
pub const DEFAULT_WRITE_ATTEMPTS: u32 = 5000;

/// Mode of the serial interrupt handler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Servicing received bytes.
    #[default]
    Receiving,
    /// Sending one byte from the outbound buffer.
    Transmitting,
}

/// Event observed by the serial interrupt handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Transmit-ready interrupt is armed and the transmit register is empty.
    TransmitReady,
    /// A transmit attempt has been handled, successful or not.
    TransmitDone,
    /// A byte was read from the receive register.
    Received,
}

impl Mode {
    /// Mode after `event`.
    pub const fn on(self, event: Event) -> Self {
        match (self, event) {
            (Self::Receiving, Event::TransmitReady) => Self::Transmitting,
            (Self::Transmitting, Event::TransmitDone) => Self::Receiving,
            (mode, _) => mode,
        }
    }
}

/// Outcome of one serial interrupt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Serviced {
    /// Byte stored in the inbound buffer.
    Received(u8),
    /// Byte received but discarded because the inbound buffer is full.
    Dropped(u8),
    /// Byte written to the transmit register.
    Transmitted(u8),
    /// Byte discarded because the transmit register stayed busy.
    TransmitFailed(u8),
    /// Transmit-ready fired but the outbound buffer was empty.
    Idle,
    /// Neither a received byte nor an armed transmitter.
    Spurious,
}

/// Inbound and outbound buffers of one serial port.
///
/// Create once, usually in static storage, and [split](Self::split) into the
/// foreground and interrupt halves.
pub struct Link<const IN: usize, const OUT: usize> {
    inbound: RingBuffer<IN>,
    outbound: RingBuffer<OUT>,
}

impl<const IN: usize, const OUT: usize> Default for Link<IN, OUT> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const IN: usize, const OUT: usize> Link<IN, OUT> {
    /// Creates a link whose buffers drop the newest byte when full.
    pub const fn new() -> Self {
        Self::with_policies(OverflowPolicy::DropNewest, OverflowPolicy::DropNewest)
    }

    /// Creates a link with the specified overflow policies.
    pub const fn with_policies(inbound: OverflowPolicy, outbound: OverflowPolicy) -> Self {
        Self { inbound: RingBuffer::with_policy(inbound), outbound: RingBuffer::with_policy(outbound) }
    }

    /// Splits into the foreground console and the interrupt handler.
    ///
    /// The exclusive borrow guarantees that each buffer has exactly one producer
    /// and one consumer.
    pub fn split(&mut self) -> (SerialConsole<'_, IN, OUT>, SerialHandler<'_, IN, OUT>) {
        let Self { inbound, outbound } = self;
        let (inbound, outbound) = (&*inbound, &*outbound);
        (
            SerialConsole { inbound, outbound },
            SerialHandler { inbound, outbound, mode: Mode::Receiving, write_attempts: DEFAULT_WRITE_ATTEMPTS },
        )
    }
}

/// Interrupt half of the transport.
///
/// Produces into the inbound buffer and consumes from the outbound buffer.
pub struct SerialHandler<'a, const IN: usize, const OUT: usize> {
    inbound: &'a RingBuffer<IN>,
    outbound: &'a RingBuffer<OUT>,
    mode: Mode,
    write_attempts: u32,
}

impl<'a, const IN: usize, const OUT: usize> SerialHandler<'a, IN, OUT> {
    /// Sets how often the transmit register is polled before a byte is dropped.
    pub fn with_write_attempts(mut self, attempts: u32) -> Self {
        self.write_attempts = attempts;
        self
    }

    /// Current mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Services one serial interrupt.
    ///
    /// A waiting received byte is handled first, since the receive register
    /// would otherwise be overrun. An armed transmitter keeps its interrupt
    /// pending and is serviced on the next invocation.
    pub fn on_interrupt(&mut self, port: &mut impl SerialPort) -> Serviced {
        if self.mode == Mode::Receiving {
            if port.is_readable() {
                let byte = port.read_byte();
                self.mode = self.mode.on(Event::Received);
                return if self.inbound.push(byte) {
                    Serviced::Received(byte)
                } else {
                    warn!("inbound buffer full, dropped 0x{:02x}", byte);
                    Serviced::Dropped(byte)
                };
            }

            if !(port.is_transmit_armed() && port.is_writable()) {
                return Serviced::Spurious;
            }
            self.mode = self.mode.on(Event::TransmitReady);
        }

        self.transmit(port)
    }

    /// Sends at most one byte, then disarms the transmitter.
    fn transmit(&mut self, port: &mut impl SerialPort) -> Serviced {
        let serviced = match self.outbound.pop() {
            Some(byte) => {
                let written = retry::bounded(self.write_attempts, || -> nb::Result<(), Infallible> {
                    if port.is_writable() {
                        port.write_byte(byte);
                        Ok(())
                    } else {
                        Err(nb::Error::WouldBlock)
                    }
                });
                match written {
                    Ok(()) => Serviced::Transmitted(byte),
                    Err(_) => {
                        warn!("transmit register busy after {} attempts, dropped 0x{:02x}", self.write_attempts, byte);
                        Serviced::TransmitFailed(byte)
                    }
                }
            }
            None => Serviced::Idle,
        };

        port.set_interrupts(true, false);
        self.mode = self.mode.on(Event::TransmitDone);
        serviced
    }
}

/// Foreground half of the transport.
///
/// Consumes from the inbound buffer and produces into the outbound buffer.
pub struct SerialConsole<'a, const IN: usize, const OUT: usize> {
    inbound: &'a RingBuffer<IN>,
    outbound: &'a RingBuffer<OUT>,
}

impl<'a, const IN: usize, const OUT: usize> SerialConsole<'a, IN, OUT> {
    /// Oldest received byte.
    pub fn read(&self) -> Option<u8> {
        self.inbound.pop()
    }

    /// Queues a byte for transmission.
    ///
    /// Returns `false` if the outbound buffer rejected it.
    pub fn write(&self, byte: u8) -> bool {
        self.outbound.push(byte)
    }

    /// Queues bytes for transmission and returns how many were accepted.
    pub fn write_bytes(&self, data: &[u8]) -> usize {
        self.outbound.push_slice(data)
    }

    /// Number of bytes waiting for transmission.
    pub fn pending(&self) -> usize {
        self.outbound.len()
    }

    /// Arms the transmit-ready interrupt if there is something to send.
    ///
    /// Returns whether the transmitter was armed.
    pub fn request_transmit(&self, arm: &mut impl TransmitArm) -> bool {
        if self.outbound.is_empty() {
            return false;
        }
        arm.arm_transmit();
        true
    }

    /// Returns and resets the number of received bytes dropped due to overflow.
    pub fn take_inbound_lost(&self) -> u32 {
        self.inbound.take_lost()
    }

    /// Returns and resets the number of outbound bytes dropped due to overflow.
    pub fn take_outbound_lost(&self) -> u32 {
        self.outbound.take_lost()
    }
}

impl<const IN: usize, const OUT: usize> fmt::Write for SerialConsole<'_, IN, OUT> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.outbound.writer().write_str(s)
    }
}
