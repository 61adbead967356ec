//! Board.
//!
//! STM Nucleo-F103RB with the EDUB extension board.
//!
//! | Function         | Pin          |
//! |------------------|--------------|
//! | serial console   | PA9 / PA10   |
//! | DAC (I2C 2)      | PB10 / PB11  |
//! | analog sensor    | PA0          |
//! | heartbeat LED    | PA5          |
//! | buzzer           | PA8          |
//! | watchdog LED     | PB5          |

use edub_core::{
    app::Config,
    sensor::{Lm45, Sensor},
    Duration,
};
use stm32f1xx_hal::{
    gpio::{Analog, Output, Pin, PushPull},
    i2c,
};
use systick_monotonic::fugit::Rate;

/// Serial console baud rate.
///
/// Frames are 8 data bits with odd parity and one stop bit.
pub const BAUD_RATE: u32 = 57_600;

/// Mode for I2C 2 master bus.
pub const I2C2_MODE: i2c::Mode = i2c::Mode::Standard { frequency: Rate::<u32, 1, 1>::Hz(100_000) };

/// I2C address of the MCP4725 DAC.
pub const DAC_I2C_ADDR: u8 = 0x60;

/// Sensor attached to the analog input.
pub const SENSOR: Sensor = Sensor::Lm45(Lm45::DEFAULT);

/// Interval between AD conversions.
pub const ADC_INTERVAL: Duration = Duration::millis(5);

/// Capacity of the receive buffer.
pub const INBOUND_SIZE: usize = 64;

/// Capacity of the transmit buffer.
pub const OUTBOUND_SIZE: usize = 256;

/// Core configuration.
pub const CONFIG: Config = Config { report_interval: Duration::millis(1_000), ..Config::DEFAULT };

/// Heartbeat LED.
pub type HeartbeatLed = Pin<'A', 5, Output<PushPull>>;

/// Buzzer.
pub type Buzzer = Pin<'A', 8, Output<PushPull>>;

/// Watchdog reboot indicator.
pub type WatchdogLed = Pin<'B', 5, Output<PushPull>>;

/// Analog sensor input.
pub type SensorInput = Pin<'A', 0, Analog>;
