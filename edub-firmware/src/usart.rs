//! Serial console on USART1.

use edub_core::hw::{SerialPort, TransmitArm};
use stm32f1xx_hal::{
    pac::{RCC, USART1},
    rcc::{BusClock, Clocks, Enable, Reset},
};

/// USART1 on PA9 (TX) and PA10 (RX).
///
/// 8 data bits, odd parity, one stop bit.
pub struct Usart1 {
    usart: USART1,
}

impl Usart1 {
    /// Configures the peripheral and enables the receive interrupt.
    ///
    /// The pins must already be in alternate function and input mode.
    pub fn new(usart: USART1, baud_rate: u32, clocks: &Clocks) -> Self {
        let rcc = unsafe { &(*RCC::ptr()) };
        USART1::enable(rcc);
        USART1::reset(rcc);

        let pclk = USART1::clock(clocks).raw();
        usart.brr.write(|w| unsafe { w.bits((pclk + baud_rate / 2) / baud_rate) });

        // Parity takes the ninth bit.
        usart.cr1.write(|w| {
            w.ue().set_bit().m().set_bit().pce().set_bit().ps().set_bit().te().set_bit().re().set_bit().rxneie().set_bit()
        });

        Self { usart }
    }

    /// Transmit interrupt arming handle for the foreground.
    pub fn arm(&self) -> Usart1Arm {
        Usart1Arm(())
    }
}

impl SerialPort for Usart1 {
    fn is_readable(&self) -> bool {
        // An overrun also raises the receive interrupt and is cleared by reading.
        let sr = self.usart.sr.read();
        sr.rxne().bit_is_set() || sr.ore().bit_is_set()
    }

    fn is_writable(&self) -> bool {
        self.usart.sr.read().txe().bit_is_set()
    }

    fn read_byte(&mut self) -> u8 {
        let sr = self.usart.sr.read();
        if sr.ore().bit_is_set() {
            defmt::warn!("serial receive overrun");
        }
        if sr.pe().bit_is_set() {
            defmt::warn!("serial parity error");
        }
        self.usart.dr.read().dr().bits() as u8
    }

    fn write_byte(&mut self, byte: u8) {
        self.usart.dr.write(|w| unsafe { w.bits(byte.into()) });
    }

    fn set_interrupts(&mut self, receive: bool, transmit: bool) {
        self.usart.cr1.modify(|_, w| w.rxneie().bit(receive).txeie().bit(transmit));
    }

    fn is_transmit_armed(&self) -> bool {
        self.usart.cr1.read().txeie().bit_is_set()
    }
}

/// Arms the USART1 transmit interrupt.
pub struct Usart1Arm(());

impl TransmitArm for Usart1Arm {
    fn arm_transmit(&mut self) {
        // The interrupt handler modifies CR1 as well.
        cortex_m::interrupt::free(|_| {
            let usart = unsafe { &*USART1::ptr() };
            usart.cr1.modify(|_, w| w.txeie().set_bit());
        });
    }
}
