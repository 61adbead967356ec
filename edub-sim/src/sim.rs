//! Simulation loop.
//!
//! Each simulated millisecond advances the clock, runs due interrupts and lets
//! the foreground loop spin a few times, interleaved with serial interrupts the
//! way they would preempt it on the target.

use anyhow::{anyhow, Result};
use edub_core::{
    app::{Config, Foreground},
    boot::{BootKind, ResetCause},
    hw::{Actuator, SampleSource},
    liveness::LivenessMonitor,
    sensor::{LatestSample, Sensor},
    ticker::PeriodicTicker,
    transport::{Link, SerialHandler, Serviced},
};
use std::{
    io::Write,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::Receiver,
    },
    thread::sleep,
    time,
};

use crate::board::{Clock, SimAdc, SimAlarm, SimDac, SimPin, SimSerial, SimWatchdog};

/// Inbound buffer capacity.
pub const INBOUND_SIZE: usize = 256;

/// Outbound buffer capacity.
pub const OUTBOUND_SIZE: usize = 256;

/// Foreground iterations per millisecond.
const POLLS_PER_MS: usize = 8;

/// ADC conversions per millisecond.
const CONVERSIONS_PER_MS: usize = 4;

/// Simulation options.
#[derive(Clone, Debug)]
pub struct SimOptions {
    /// Core configuration.
    pub config: Config,
    /// Attached analog sensor.
    pub sensor: Option<Sensor>,
    /// Whether a DAC is attached.
    pub dac: bool,
    /// Probability of a DAC transaction failing.
    pub dac_failure_rate: f64,
    /// Initial raw ADC input.
    pub adc_level: u16,
    /// Heartbeat stops at this time of the first boot, in ms.
    pub stall_at: Option<u64>,
    /// Total simulated time, in ms.
    pub duration: Option<u64>,
    /// Pace the simulation to the wall clock.
    pub realtime: bool,
    /// Random seed.
    pub seed: u64,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            config: Config::DEFAULT,
            sensor: None,
            dac: false,
            dac_failure_rate: 0.0,
            adc_level: 2048,
            stall_at: None,
            duration: None,
            realtime: true,
            seed: 0,
        }
    }
}

/// Why the simulation ended a boot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exit {
    /// Simulated time limit reached.
    Finished,
    /// Stopped by signal.
    Stopped,
    /// Watchdog expired.
    WatchdogReset,
}

/// Peripherals and interrupt-side state of one boot.
struct Board<'a> {
    clock: &'a Clock,
    serial: SimSerial,
    handler: SerialHandler<'a, INBOUND_SIZE, OUTBOUND_SIZE>,
    alarm: SimAlarm<'a>,
    monitor: LivenessMonitor<SimWatchdog<'a>>,
    ticker: PeriodicTicker<SimPin, SimPin>,
    adc: SimAdc,
    latest: &'a LatestSample,
    sensor: Option<Sensor>,
    refresh_on_receive: bool,
    stall_at: Option<u64>,
    stalled: bool,
}

impl<'a> Board<'a> {
    /// Simulates one millisecond.
    fn step<A: Actuator, S: SampleSource>(
        &mut self, fg: &mut Foreground<'_, INBOUND_SIZE, OUTBOUND_SIZE, A, S>,
    ) {
        self.clock.tick();

        // ADC FIFO drain interrupt.
        self.latest.store_drained(self.adc.convert(CONVERSIONS_PER_MS));

        // Alarm interrupt.
        if !self.stalled && self.stall_at.is_some_and(|at| self.clock.now().ticks() >= at) {
            log::warn!("heartbeat stalled at {} ms", self.clock.now().ticks());
            self.stalled = true;
        }
        if self.alarm.due() && !self.stalled {
            let sound = match (self.sensor, self.latest.load()) {
                (Some(sensor), Some(sample)) => sensor.alarm(sample),
                _ => false,
            };
            self.ticker.fire(&mut self.alarm, &mut self.monitor, sound);
        }

        // Foreground loop, preempted by the serial interrupt.
        self.serial.clock_in();
        for _ in 0..POLLS_PER_MS {
            if self.serial.interrupt_pending() {
                let serviced = self.handler.on_interrupt(&mut self.serial);
                if self.refresh_on_receive && matches!(serviced, Serviced::Received(_)) {
                    self.monitor.refresh();
                }
            }

            let monitor = &self.monitor;
            fg.poll(self.clock.now(), || monitor.time_remaining(), &mut self.serial);
        }
    }
}

/// Simulated EDUB board.
pub struct Simulator<'s> {
    opts: SimOptions,
    stop: &'s AtomicBool,
    elapsed: u64,
    boots: u32,
}

impl<'s> Simulator<'s> {
    /// Creates a simulator that ends when `stop` is set.
    pub fn new(opts: SimOptions, stop: &'s AtomicBool) -> Result<Self> {
        opts.config.validate().map_err(|err| anyhow!("invalid configuration: {err}"))?;
        Ok(Self { opts, stop, elapsed: 0, boots: 0 })
    }

    /// Simulated time in ms.
    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    /// Number of boots.
    pub fn boots(&self) -> u32 {
        self.boots
    }

    /// Runs until stopped or the time limit is reached, rebooting on watchdog expiry.
    pub fn run(&mut self, input: &Receiver<u8>, out: &mut impl Write) -> Result<Exit> {
        let mut cause = ResetCause::PowerOn;
        loop {
            match self.boot(cause, input, out)? {
                Exit::WatchdogReset => cause = ResetCause::Watchdog,
                exit => return Ok(exit),
            }
        }
    }

    fn boot(&mut self, cause: ResetCause, input: &Receiver<u8>, out: &mut impl Write) -> Result<Exit> {
        self.boots += 1;
        log::info!("======== boot {} ========", self.boots);
        cause.log();

        let cfg = self.opts.config;
        let seed = self.opts.seed.wrapping_add(self.boots.into());
        let clock = Clock::default();
        let latest = LatestSample::new();
        let mut link = Link::<INBOUND_SIZE, OUTBOUND_SIZE>::with_policies(cfg.inbound_policy, cfg.outbound_policy);
        let (console, handler) = link.split();

        let ticker = PeriodicTicker::new(cfg.tick_period, SimPin::new("led"))
            .map_err(|err| anyhow!("cannot create ticker: {err}"))?
            .with_buzzer(SimPin::new("buzzer"));
        let mut board = Board {
            clock: &clock,
            serial: SimSerial::default(),
            handler: handler.with_write_attempts(cfg.write_attempts),
            alarm: SimAlarm::new(&clock),
            monitor: LivenessMonitor::new(SimWatchdog::start(&clock, cfg.watchdog_window)),
            ticker,
            adc: SimAdc::new(self.opts.adc_level, seed),
            latest: &latest,
            sensor: self.opts.sensor,
            refresh_on_receive: cfg.refresh_on_receive,
            stall_at: if self.boots == 1 { self.opts.stall_at } else { None },
            stalled: false,
        };

        let kind = BootKind::from(cause);
        let fg = Foreground::new(console, &cfg).map_err(|err| anyhow!("cannot create foreground: {err}"))?;
        let dac = SimDac::new(self.opts.dac_failure_rate, seed);
        match (self.opts.dac, self.opts.sensor) {
            (true, Some(sensor)) => self.drive(&mut board, fg.with_actuator(dac).with_sensor(&latest, sensor), kind, input, out),
            (true, None) => self.drive(&mut board, fg.with_actuator(dac), kind, input, out),
            (false, Some(sensor)) => self.drive(&mut board, fg.with_sensor(&latest, sensor), kind, input, out),
            (false, None) => self.drive(&mut board, fg, kind, input, out),
        }
    }

    fn drive<A: Actuator, S: SampleSource>(
        &mut self, board: &mut Board<'_>, mut fg: Foreground<'_, INBOUND_SIZE, OUTBOUND_SIZE, A, S>,
        kind: BootKind, input: &Receiver<u8>, out: &mut impl Write,
    ) -> Result<Exit> {
        fg.announce(kind);
        board.ticker.start(&mut board.alarm);

        let started = time::Instant::now();
        let mut ms = 0;
        let exit = loop {
            if self.stop.load(Ordering::SeqCst) {
                break Exit::Stopped;
            }
            if self.opts.duration.is_some_and(|limit| self.elapsed >= limit) {
                break Exit::Finished;
            }

            board.serial.feed(input.try_iter());
            board.step(&mut fg);
            out.write_all(&board.serial.take_sent())?;
            out.flush()?;
            self.elapsed += 1;
            ms += 1;

            if board.monitor.timer().expired() {
                log::error!("watchdog expired, {} ms without refresh", board.monitor.window().to_millis());
                break Exit::WatchdogReset;
            }

            if self.opts.realtime {
                let due = started + time::Duration::from_millis(ms);
                if let Some(wait) = due.checked_duration_since(time::Instant::now()) {
                    sleep(wait);
                }
            }
        };

        let lost = (fg.console().take_inbound_lost(), fg.console().take_outbound_lost());
        log::info!("foreground: {:?}, step {}", fg.stats(), fg.step().value());
        log::info!("heartbeat: {} ticks, {} watchdog refreshes", board.ticker.fired(), board.monitor.refreshes());
        if lost != (0, 0) {
            log::warn!("buffer overflow: {} inbound and {} outbound bytes lost", lost.0, lost.1);
        }

        Ok(exit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edub_core::{
        boot::{CLEAN_BANNER, INTRO, WATCHDOG_BANNER},
        Duration,
    };
    use std::sync::mpsc;

    fn simulate(opts: SimOptions, input: &[u8]) -> (Exit, u32, String) {
        let stop = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel();
        for &byte in input {
            tx.send(byte).unwrap();
        }

        let mut out = Vec::new();
        let mut sim = Simulator::new(opts, &stop).unwrap();
        let exit = sim.run(&rx, &mut out).unwrap();
        (exit, sim.boots(), String::from_utf8(out).unwrap())
    }

    fn fast(duration: u64) -> SimOptions {
        SimOptions { duration: Some(duration), realtime: false, ..SimOptions::default() }
    }

    #[test]
    fn clean_boot_announces_itself() {
        let (exit, boots, out) = simulate(fast(100), b"");
        assert_eq!(exit, Exit::Finished);
        assert_eq!(boots, 1);
        assert_eq!(out, format!("{CLEAN_BANNER}{INTRO}"));
    }

    #[test]
    fn echoes_input_but_not_controls() {
        let (_, _, out) = simulate(fast(100), b"h+i-+\r");
        let echoed = out.strip_prefix(&format!("{CLEAN_BANNER}{INTRO}")).unwrap();
        assert_eq!(echoed, "hi\r");
    }

    #[test]
    fn stalled_heartbeat_causes_watchdog_reboot() {
        let config = Config {
            tick_period: Duration::millis(100),
            watchdog_window: Duration::millis(1_000),
            safety_margin: Duration::millis(200),
            ..Config::DEFAULT
        };
        let opts = SimOptions { config, stall_at: Some(300), ..fast(3_000) };

        let (exit, boots, out) = simulate(opts, b"");
        assert_eq!(exit, Exit::Finished);
        assert_eq!(boots, 2);
        assert_eq!(out, format!("{CLEAN_BANNER}{INTRO}{WATCHDOG_BANNER}{INTRO}"));
    }

    #[test]
    fn received_bytes_keep_stalled_board_alive() {
        let config = Config {
            tick_period: Duration::millis(100),
            watchdog_window: Duration::millis(1_000),
            safety_margin: Duration::millis(200),
            refresh_on_receive: true,
            ..Config::DEFAULT
        };
        let opts = SimOptions { config, stall_at: Some(300), ..fast(3_000) };
        // One byte arrives per millisecond for the whole run.
        let input = vec![b'x'; 3_000];

        let (exit, boots, out) = simulate(opts.clone(), &input);
        assert_eq!(exit, Exit::Finished);
        assert_eq!(boots, 1);
        assert!(out.starts_with(&format!("{CLEAN_BANNER}{INTRO}")));
        assert!(!out.contains(WATCHDOG_BANNER));

        let opts = SimOptions { config: Config { refresh_on_receive: false, ..config }, ..opts };
        let (_, boots, out) = simulate(opts, &input);
        assert_eq!(boots, 2);
        assert!(out.contains(WATCHDOG_BANNER));
    }

    #[test]
    fn reports_voltage() {
        let config = Config { report_interval: Duration::millis(10), ..Config::DEFAULT };
        let opts = SimOptions { config, sensor: Some(Sensor::Voltage), adc_level: 2048, ..fast(100) };

        let (_, _, out) = simulate(opts, b"");
        let reports = out.strip_prefix(&format!("{CLEAN_BANNER}{INTRO}")).unwrap();
        let values: Vec<f32> = reports
            .split_inclusive('\r')
            .filter_map(|line| line.strip_suffix(" V\r"))
            .map(|value| value.trim().parse().unwrap())
            .collect();
        assert!(values.len() >= 5);
        assert!(values.iter().all(|v| (1.55..1.75).contains(v)), "{values:?}");
    }

    #[test]
    fn failing_dac_does_not_stop_simulation() {
        let opts = SimOptions { dac: true, dac_failure_rate: 1.0, ..fast(50) };
        let (exit, boots, _) = simulate(opts, b"");
        assert_eq!(exit, Exit::Finished);
        assert_eq!(boots, 1);
    }
}
