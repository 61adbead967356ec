//
// EDUB serial core for single-core microcontrollers
// Copyright (C) 2026 EDUB developers
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//

//! EDUB Firmware.

#![no_std]
#![no_main]

mod adc;
mod board;
mod boot;
mod i2c_master;
mod usart;
mod util;
mod watchman;

use defmt_rtt as _;
use panic_probe as _;

use defmt::unwrap;
use edub_core::{
    app::Foreground,
    boot::BootKind,
    bus::BusTimeouts,
    hw::Alarm,
    liveness::LivenessMonitor,
    sensor::LatestSample,
    ticker::PeriodicTicker,
    transport::{Link, SerialHandler, Serviced},
    waveform::FAST_WRITE_LEN,
    Instant, TICK_HZ,
};
use stm32f1xx_hal::{adc::Adc, gpio::PinState, i2c::I2c, prelude::*, watchdog::IndependentWatchdog};
use systick_monotonic::*;

use crate::{
    adc::SensorAdc,
    board::{
        Buzzer, HeartbeatLed, WatchdogLed, ADC_INTERVAL, BAUD_RATE, CONFIG, DAC_I2C_ADDR, I2C2_MODE,
        INBOUND_SIZE, OUTBOUND_SIZE, SENSOR,
    },
    i2c_master::{Mcp4725, RECOVERY_RESERVE_US},
    usart::{Usart1, Usart1Arm},
    watchman::Watchman,
};

/// EDUB firmware version.
pub static VERSION: &[u8] = env!("CARGO_PKG_VERSION").as_bytes();

/// Latest AD conversion result.
static SAMPLE: LatestSample = LatestSample::new();

/// Foreground loop context.
type Fg = Foreground<'static, INBOUND_SIZE, OUTBOUND_SIZE, Mcp4725, &'static LatestSample>;

/// Alarm of the heartbeat ticker.
///
/// Arming schedules the `tick` task.
struct TickAlarm;

impl Alarm for TickAlarm {
    fn now(&self) -> Instant {
        app::monotonics::now()
    }

    fn arm_at(&mut self, target: Instant) {
        unwrap!(app::tick::spawn_at(target));
    }
}

#[rtic::app(device = stm32f1::stm32f103, peripherals = true, dispatchers = [SPI1, SPI2])]
mod app {
    use super::*;

    /// System timer.
    #[monotonic(binds = SysTick, default = true)]
    type MyMono = Systick<TICK_HZ>;

    /// Shared resources.
    #[shared]
    struct Shared {
        /// Hardware watchdog.
        monitor: LivenessMonitor<Watchman>,
    }

    /// Exclusive resources.
    #[local]
    struct Local {
        /// Interrupt half of the serial transport.
        handler: SerialHandler<'static, INBOUND_SIZE, OUTBOUND_SIZE>,
        /// Serial peripheral.
        usart: Usart1,
        /// Foreground loop.
        fg: Fg,
        /// Transmit interrupt arming for the foreground.
        arm: Usart1Arm,
        /// Heartbeat.
        ticker: PeriodicTicker<HeartbeatLed, Buzzer>,
        /// AD converter.
        adc: SensorAdc,
    }

    /// Initialization (entry point).
    #[init(local = [
        link: Link<INBOUND_SIZE, OUTBOUND_SIZE> = Link::with_policies(CONFIG.inbound_policy, CONFIG.outbound_policy)
    ])]
    fn init(mut cx: init::Context) -> (Shared, Local, init::Monotonics) {
        defmt::info!("EDUB version {:a}", VERSION);

        let cause = boot::take_reset_cause();
        cause.log();
        let kind = BootKind::from(cause);
        if let Err(err) = CONFIG.validate() {
            defmt::panic!("invalid configuration: {}", err);
        }

        // Create HAL objects.
        let rcc = cx.device.RCC.constrain();
        let mut flash = cx.device.FLASH.constrain();
        let clocks = rcc.cfgr.freeze(&mut flash.acr);
        let mono = Systick::new(cx.core.SYST, clocks.sysclk().to_Hz());
        let mut gpioa = cx.device.GPIOA.split();
        let mut gpiob = cx.device.GPIOB.split();

        // Start watchdog.
        let dog = IndependentWatchdog::new(cx.device.IWDG);
        let monitor = LivenessMonitor::new(Watchman::start(dog, CONFIG.watchdog_window));
        let _watchdog_led: WatchdogLed = gpiob
            .pb5
            .into_push_pull_output_with_state(&mut gpiob.crl, PinState::from(kind == BootKind::WatchdogReset));

        // Initialize serial console.
        let _tx = gpioa.pa9.into_alternate_push_pull(&mut gpioa.crh);
        let usart = Usart1::new(cx.device.USART1, BAUD_RATE, &clocks);
        let arm = usart.arm();
        let (console, handler) = cx.local.link.split();
        let handler = handler.with_write_attempts(CONFIG.write_attempts);

        // Initialize DAC on I2C bus 2.
        // Required for I2C timeouts and bus recovery to work.
        cx.core.DCB.enable_trace();
        cx.core.DWT.enable_cycle_counter();
        let scl = gpiob.pb10.into_alternate_open_drain(&mut gpiob.crh);
        let sda = gpiob.pb11.into_alternate_open_drain(&mut gpiob.crh);
        let timeouts =
            unwrap!(BusTimeouts::for_write(CONFIG.actuator_timeout, FAST_WRITE_LEN, RECOVERY_RESERVE_US));
        defmt::debug!("DAC bus timeouts: {}", timeouts);
        let i2c2 = I2c::i2c2(cx.device.I2C2, (scl, sda), I2C2_MODE, clocks).blocking(
            timeouts.start_us,
            timeouts.start_retries,
            timeouts.addr_us,
            timeouts.data_us,
            clocks,
        );
        let dac = Mcp4725::new(i2c2, DAC_I2C_ADDR, timeouts, clocks);

        // Start sampling.
        let input = gpioa.pa0.into_analog(&mut gpioa.crl);
        let adc = SensorAdc::new(Adc::adc1(cx.device.ADC1, clocks), input);
        unwrap!(adc_convert::spawn());

        // Start heartbeat.
        let led = gpioa.pa5.into_push_pull_output(&mut gpioa.crl);
        let buzzer = gpioa.pa8.into_push_pull_output(&mut gpioa.crh);
        let mut ticker = unwrap!(PeriodicTicker::new(CONFIG.tick_period, led)).with_buzzer(buzzer);
        ticker.start(&mut TickAlarm);

        // Boot report goes out before anything else.
        let mut fg = unwrap!(Foreground::new(console, &CONFIG)).with_actuator(dac).with_sensor(&SAMPLE, SENSOR);
        fg.announce(kind);

        defmt::debug!("init done");
        (
            Shared { monitor },
            Local { handler, usart, fg, arm, ticker, adc },
            init::Monotonics(mono),
        )
    }

    /// Foreground loop.
    #[idle(local = [fg, arm], shared = [monitor])]
    fn idle(cx: idle::Context) -> ! {
        let idle::LocalResources { fg, arm } = cx.local;
        let mut monitor = cx.shared.monitor;
        loop {
            fg.poll(monotonics::now(), || monitor.lock(|monitor| monitor.time_remaining()), arm);
        }
    }

    /// Toggles the heartbeat LED and refreshes the watchdog.
    #[task(local = [ticker], shared = [monitor], priority = 2)]
    fn tick(mut cx: tick::Context) {
        let sound = SAMPLE.load().is_some_and(|sample| SENSOR.alarm(sample));
        let ticker = cx.local.ticker;
        cx.shared.monitor.lock(|monitor| ticker.fire(&mut TickAlarm, monitor, sound));
    }

    /// Stores a new AD conversion result.
    #[task(local = [adc], priority = 1)]
    fn adc_convert(cx: adc_convert::Context) {
        if let Some(sample) = cx.local.adc.convert() {
            SAMPLE.store(sample);
        }
        unwrap!(adc_convert::spawn_after(ADC_INTERVAL));
    }

    /// Serial receive and transmit-ready interrupt.
    #[task(binds = USART1, local = [handler, usart], shared = [monitor], priority = 3)]
    fn usart1(mut cx: usart1::Context) {
        let serviced = cx.local.handler.on_interrupt(cx.local.usart);
        if CONFIG.refresh_on_receive && matches!(serviced, Serviced::Received(_)) {
            cx.shared.monitor.lock(|monitor| monitor.refresh());
        }
    }
}
