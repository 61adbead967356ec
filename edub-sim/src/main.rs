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

//! EDUB board simulator.
//!
//! Runs the EDUB core against software peripherals. Standard input is the
//! receive line of the serial console, standard output its transmit line.
//! Log messages go to standard error.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use edub_core::{
    app::Config,
    sensor::{Lm45, Sensor},
    Duration, OverflowPolicy,
};
use log::LevelFilter;
use std::{
    io::{self, Read},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver},
    },
    thread,
};

mod board;
mod sim;

use sim::{Exit, SimOptions, Simulator};

static STOP: AtomicBool = AtomicBool::new(false);

/// Sensor attached to the ADC input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SensorKind {
    /// Nothing attached.
    None,
    /// Potentiometer.
    Voltage,
    /// LM45 temperature sensor.
    Lm45,
}

/// EDUB board simulator.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Opts {
    /// Log level.
    #[arg(short, long, default_value_t = LevelFilter::Info, env = "EDUB_LOG_LEVEL")]
    level: LevelFilter,
    /// Sensor attached to the ADC input.
    #[arg(short, long, value_enum, default_value_t = SensorKind::None, env = "EDUB_SENSOR")]
    sensor: SensorKind,
    /// Raw ADC input level at boot.
    #[arg(long, default_value_t = 2048)]
    adc_level: u16,
    /// LM45 alarm temperature in °F.
    #[arg(long, default_value_t = Lm45::DEFAULT.alarm_f)]
    alarm_f: f32,
    /// Drive an I2C DAC with the triangle waveform.
    #[arg(short, long, env = "EDUB_DAC")]
    dac: bool,
    /// Probability that a DAC transaction is not acknowledged.
    #[arg(long, default_value_t = 0.0)]
    dac_failure_rate: f64,
    /// Lowest waveform step.
    #[arg(long, default_value_t = Config::DEFAULT.step_min)]
    step_min: u16,
    /// Highest waveform step.
    #[arg(long, default_value_t = Config::DEFAULT.step_max)]
    step_max: u16,
    /// Heartbeat period in milliseconds.
    #[arg(long, default_value_t = 500, env = "EDUB_TICK_MS")]
    tick_ms: u64,
    /// Watchdog window in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "EDUB_WATCHDOG_MS")]
    watchdog_ms: u64,
    /// Watchdog time that must be left to start a DAC transaction, in milliseconds.
    #[arg(long, default_value_t = 1_000)]
    margin_ms: u64,
    /// Sensor report interval in milliseconds.
    #[arg(long, default_value_t = 100, env = "EDUB_REPORT_MS")]
    report_ms: u64,
    /// Refresh the watchdog on every received byte as well.
    #[arg(long)]
    refresh_on_receive: bool,
    /// Evict the oldest byte instead of dropping new ones when a buffer is full.
    #[arg(long)]
    drop_oldest: bool,
    /// Stop the heartbeat after this many milliseconds to provoke a watchdog reset.
    #[arg(long)]
    stall_ms: Option<u64>,
    /// Exit after this many milliseconds of simulated time.
    #[arg(long)]
    duration_ms: Option<u64>,
    /// Run as fast as possible instead of in real time.
    #[arg(short, long)]
    fast: bool,
    /// Random seed for sensor noise and DAC failures.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

impl Opts {
    fn sim_options(&self) -> SimOptions {
        let policy = if self.drop_oldest { OverflowPolicy::DropOldest } else { OverflowPolicy::DropNewest };
        let config = Config {
            step_min: self.step_min,
            step_max: self.step_max,
            step_initial: self.step_min,
            tick_period: Duration::millis(self.tick_ms),
            watchdog_window: Duration::millis(self.watchdog_ms),
            safety_margin: Duration::millis(self.margin_ms),
            report_interval: Duration::millis(self.report_ms),
            refresh_on_receive: self.refresh_on_receive,
            inbound_policy: policy,
            outbound_policy: policy,
            ..Config::DEFAULT
        };
        let sensor = match self.sensor {
            SensorKind::None => None,
            SensorKind::Voltage => Some(Sensor::Voltage),
            SensorKind::Lm45 => Some(Sensor::Lm45(Lm45 { alarm_f: self.alarm_f, ..Lm45::DEFAULT })),
        };

        SimOptions {
            config,
            sensor,
            dac: self.dac,
            dac_failure_rate: self.dac_failure_rate,
            adc_level: self.adc_level,
            stall_at: self.stall_ms,
            duration: self.duration_ms,
            realtime: !self.fast,
            seed: self.seed,
        }
    }
}

/// Forwards standard input to the receive line.
fn spawn_stdin() -> Receiver<u8> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut stdin = io::stdin().lock();
        let mut buf = [0; 64];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    for &byte in &buf[..n] {
                        if tx.send(byte).is_err() {
                            return;
                        }
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => (),
                Err(err) => {
                    log::warn!("cannot read standard input: {err}");
                    break;
                }
            }
        }
        log::debug!("standard input closed");
    });
    rx
}

fn main() -> Result<()> {
    ctrlc::set_handler(|| STOP.store(true, Ordering::SeqCst))?;

    let opts = Opts::parse();

    // Initialize logger.
    env_logger::builder().filter_level(opts.level).format_timestamp_millis().init();

    let mut sim = Simulator::new(opts.sim_options(), &STOP).context("cannot start simulation")?;
    let input = spawn_stdin();
    let res = sim.run(&input, &mut io::stdout().lock());

    match &res {
        Ok(exit) => {
            let how = match exit {
                Exit::Finished => "finished",
                Exit::Stopped => "stopped",
                Exit::WatchdogReset => "reset",
            };
            log::info!("======== simulation {how} after {} ms and {} boots ========", sim.elapsed(), sim.boots())
        }
        Err(err) => log::error!("======== simulation failed: {err} ========"),
    }
    res?;

    Ok(())
}
