//! I2C master and the MCP4725 DAC.

use defmt::Format;
use edub_core::{bus::BusTimeouts, hw::Actuator, Duration};
use stm32f1::{
    stm32f103,
    stm32f103::{
        gpioa::odr::ODR0_A::{High, Low},
        GPIOB,
    },
};
use stm32f1xx_hal::{
    gpio::{Alternate, OpenDrain},
    i2c,
    prelude::*,
    rcc::Clocks,
};

use crate::util::DwtDelay;

/// I2C error.
#[derive(Clone, Copy, Format, PartialEq, Eq)]
pub enum I2cError {
    /// Bus error
    Bus,
    /// Arbitration loss
    Arbitration,
    /// No ack received
    Acknowledge,
    /// Overrun/underrun
    Overrun,
    /// Timeout
    Timeout,
    /// SDA line stuck low during recovery.
    SdaStuckLow,
    /// Transaction may outlast the allowed time.
    TooSlow,
    /// Other error.
    Other,
}

impl From<i2c::Error> for I2cError {
    fn from(error: i2c::Error) -> Self {
        match error {
            i2c::Error::Bus => I2cError::Bus,
            i2c::Error::Arbitration => I2cError::Arbitration,
            i2c::Error::Acknowledge => I2cError::Acknowledge,
            i2c::Error::Overrun => I2cError::Overrun,
            i2c::Error::Timeout => I2cError::Timeout,
            _ => I2cError::Other,
        }
    }
}

/// I2C 2 master.
pub type I2c2Master = i2c::BlockingI2c<
    stm32f1xx_hal::pac::I2C2,
    (
        stm32f1xx_hal::gpio::Pin<'B', 10, Alternate<OpenDrain>>,
        stm32f1xx_hal::gpio::Pin<'B', 11, Alternate<OpenDrain>>,
    ),
>;

/// Half period of the recovery clock.
const RECOVERY_HALF_PERIOD_US: u32 = 5;

/// Clock pulses that release any slave stuck in a byte transfer.
const RECOVERY_PULSES: usize = 9;

/// Time kept free for [recover] within a transaction timeout.
///
/// Covers the release check before and after each pulse and the stop condition,
/// doubled for peripheral reset and delay overhead.
pub const RECOVERY_RESERVE_US: u32 = 2 * (3 * (RECOVERY_PULSES as u32 + 1) + 4) * RECOVERY_HALF_PERIOD_US;

/// SCL (PB10) and SDA (PB11) driven as open-drain GPIOs.
///
/// The alternate function configuration is restored on drop.
struct BusLines {
    gpiob: GPIOB,
    crh: stm32f1xx_hal::pac::gpioa::crh::R,
    delay: DwtDelay,
}

impl BusLines {
    fn take(delay: DwtDelay) -> Self {
        let gpiob = unsafe { stm32f103::Peripherals::steal() }.GPIOB;
        let crh = gpiob.crh.read();
        Self { gpiob, crh, delay }
    }

    fn scl(&self, high: bool) {
        self.gpiob.odr.modify(|_, w| w.odr10().variant(if high { High } else { Low }));
        self.gpiob.crh.modify(|_, w| w.cnf10().open_drain().mode10().output());
        self.delay.delay(RECOVERY_HALF_PERIOD_US);
    }

    fn sda(&self, high: bool) {
        self.gpiob.odr.modify(|_, w| w.odr11().variant(if high { High } else { Low }));
        self.gpiob.crh.modify(|_, w| w.cnf11().open_drain().mode11().output());
        self.delay.delay(RECOVERY_HALF_PERIOD_US);
    }

    fn sda_released(&self) -> bool {
        self.gpiob.crh.modify(|_, w| w.mode11().input());
        self.delay.delay(RECOVERY_HALF_PERIOD_US);
        self.gpiob.idr.read().idr11().is_high()
    }
}

impl Drop for BusLines {
    fn drop(&mut self) {
        let crh = &self.crh;
        self.gpiob.crh.modify(|_, w| {
            w.cnf10()
                .variant(crh.cnf10().variant())
                .mode10()
                .variant(crh.mode10().variant())
                .cnf11()
                .variant(crh.cnf11().variant())
                .mode11()
                .variant(crh.mode11().variant())
        });
    }
}

/// Recovers the I2C bus after a failed transaction.
///
/// Clocks SCL until the slave releases SDA, issues a stop condition and
/// resets the I2C peripheral.
pub fn recover(i2c: &mut I2c2Master, clocks: &Clocks) -> Result<(), I2cError> {
    defmt::debug!("recovering I2C bus");
    let lines = BusLines::take(DwtDelay::new(clocks));

    lines.scl(true);
    lines.sda(true);
    let mut released = lines.sda_released();
    for _ in 0..RECOVERY_PULSES {
        if released {
            break;
        }
        lines.scl(false);
        lines.scl(true);
        released = lines.sda_released();
    }
    if !released {
        defmt::error!("I2C SDA is stuck low");
        return Err(I2cError::SdaStuckLow);
    }

    // Stop condition.
    lines.scl(false);
    lines.sda(false);
    lines.scl(true);
    lines.sda(true);
    drop(lines);

    i2c.reset();
    Ok(())
}

/// MCP4725 12-bit DAC.
pub struct Mcp4725 {
    i2c: I2c2Master,
    addr: u8,
    timeouts: BusTimeouts,
    clocks: Clocks,
}

impl Mcp4725 {
    /// Creates the DAC driver for the device at `addr`.
    ///
    /// `timeouts` must be the ones `i2c` was built with.
    pub fn new(i2c: I2c2Master, addr: u8, timeouts: BusTimeouts, clocks: Clocks) -> Self {
        Self { i2c, addr, timeouts, clocks }
    }
}

impl Actuator for Mcp4725 {
    type Error = I2cError;

    /// Writes a fast-write command.
    ///
    /// Refused without touching the bus if the bus timeouts plus a recovery
    /// could exceed `timeout`.
    fn write(&mut self, payload: &[u8], timeout: Duration) -> Result<(), I2cError> {
        if !self.timeouts.fits(payload.len(), RECOVERY_RESERVE_US, timeout) {
            defmt::error!(
                "DAC write of {} bytes may take {} us, exceeding {} us",
                payload.len(),
                self.timeouts.worst_case_us(payload.len()) + u64::from(RECOVERY_RESERVE_US),
                timeout.to_micros()
            );
            return Err(I2cError::TooSlow);
        }

        let err = match self.i2c.write(self.addr, payload) {
            Ok(()) => return Ok(()),
            Err(err) => I2cError::from(err),
        };

        defmt::warn!("DAC write failed: {}", err);
        if matches!(err, I2cError::Bus | I2cError::Arbitration | I2cError::Timeout) {
            recover(&mut self.i2c, &self.clocks)?;
        }
        Err(err)
    }
}
