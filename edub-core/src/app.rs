//! Foreground loop.

use crate::{
    boot::{BootKind, INTRO},
    control::{Input, StepControl},
    hw::{Actuator, NoActuator, NoSampler, SampleSource, TransmitArm},
    liveness::SafetyMargin,
    sensor::{Reading, Sensor},
    transport::{SerialConsole, DEFAULT_WRITE_ATTEMPTS},
    waveform::{fast_write_payload, Triangle},
    Duration, Error, Instant, OverflowPolicy,
};

/// Configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Lowest step.
    pub step_min: u16,
    /// Highest step.
    pub step_max: u16,
    /// Step after boot.
    pub step_initial: u16,
    /// Heartbeat period.
    pub tick_period: Duration,
    /// Watchdog window.
    pub watchdog_window: Duration,
    /// Timeout of one actuator transaction.
    pub actuator_timeout: Duration,
    /// Remaining watchdog time required to start an actuator transaction.
    pub safety_margin: Duration,
    /// Polls of the transmit register before a byte is dropped.
    pub write_attempts: u32,
    /// Interval between sensor reports.
    pub report_interval: Duration,
    /// Refresh the watchdog on every received byte as well.
    pub refresh_on_receive: bool,
    /// Overflow policy of the inbound buffer.
    pub inbound_policy: OverflowPolicy,
    /// Overflow policy of the outbound buffer.
    pub outbound_policy: OverflowPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Config {
    /// Default configuration.
    pub const DEFAULT: Self = Self {
        step_min: 1,
        step_max: 200,
        step_initial: 1,
        tick_period: Duration::millis(500),
        watchdog_window: Duration::millis(10_000),
        actuator_timeout: Duration::millis(50),
        safety_margin: Duration::millis(1_000),
        write_attempts: DEFAULT_WRITE_ATTEMPTS,
        report_interval: Duration::millis(10),
        refresh_on_receive: false,
        inbound_policy: OverflowPolicy::DropNewest,
        outbound_policy: OverflowPolicy::DropNewest,
    };

    /// Checks the configuration for consistency.
    pub fn validate(&self) -> Result<(), Error> {
        if self.tick_period.ticks() == 0 {
            return Err(Error::ZeroPeriod);
        }
        if self.watchdog_window <= self.tick_period {
            return Err(Error::WindowTooShort);
        }
        if self.write_attempts == 0 {
            return Err(Error::NoWriteAttempts);
        }
        self.step_control()?;
        self.margin()?;
        if self.safety_margin >= self.watchdog_window {
            return Err(Error::DeadlineTooClose);
        }
        Ok(())
    }

    fn step_control(&self) -> Result<StepControl, Error> {
        StepControl::new(self.step_initial, self.step_min, self.step_max)
    }

    /// Safety margin for actuator transactions.
    pub fn margin(&self) -> Result<SafetyMargin, Error> {
        SafetyMargin::new(self.safety_margin, self.actuator_timeout)
    }
}

/// Outcome of driving the actuator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Drive {
    /// No actuator attached.
    Idle,
    /// Code written.
    Written(u16),
    /// Transaction failed.
    Failed(u16),
    /// Transaction not started because the watchdog deadline is too close.
    Skipped(u16),
}

/// Outcome of one foreground iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Poll {
    /// Handled input byte.
    pub input: Option<Input>,
    /// Actuator outcome.
    pub drive: Drive,
    /// Reading queued for output.
    pub reading: Option<Reading>,
    /// Whether transmission was requested.
    pub transmit: bool,
}

/// Foreground counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Stats {
    /// Bytes echoed.
    pub echoed: u32,
    /// Control bytes handled.
    pub adjusted: u32,
    /// Echoes lost because the outbound buffer was full.
    pub echo_dropped: u32,
    /// Successful actuator transactions.
    pub drive_ok: u32,
    /// Failed actuator transactions.
    pub drive_failed: u32,
    /// Actuator transactions skipped near the watchdog deadline.
    pub drive_skipped: u32,
    /// Sensor reports queued.
    pub reports: u32,
    /// Sensor reports truncated because the outbound buffer was full.
    pub report_dropped: u32,
}

/// Foreground loop context.
///
/// Owns the console half of the serial transport and the peripherals only the
/// foreground uses.
pub struct Foreground<'a, const IN: usize, const OUT: usize, A = NoActuator, S = NoSampler> {
    console: SerialConsole<'a, IN, OUT>,
    step: StepControl,
    wave: Triangle,
    margin: SafetyMargin,
    actuator: Option<A>,
    sensor: Option<(S, Sensor)>,
    report_interval: Duration,
    next_report: Option<Instant>,
    stats: Stats,
}

impl<'a, const IN: usize, const OUT: usize> Foreground<'a, IN, OUT> {
    /// Creates the foreground context without actuator and sensor.
    pub fn new(console: SerialConsole<'a, IN, OUT>, config: &Config) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            console,
            step: config.step_control()?,
            wave: Triangle::new(),
            margin: config.margin()?,
            actuator: None,
            sensor: None,
            report_interval: config.report_interval,
            next_report: None,
            stats: Stats::default(),
        })
    }
}

impl<'a, const IN: usize, const OUT: usize, A, S> Foreground<'a, IN, OUT, A, S>
where
    A: Actuator,
    S: SampleSource,
{
    /// Drives `actuator` with the triangle waveform.
    pub fn with_actuator<A2: Actuator>(self, actuator: A2) -> Foreground<'a, IN, OUT, A2, S> {
        let Self { console, step, wave, margin, sensor, report_interval, next_report, stats, .. } = self;
        Foreground {
            console,
            step,
            wave,
            margin,
            actuator: Some(actuator),
            sensor,
            report_interval,
            next_report,
            stats,
        }
    }

    /// Reports samples of `source` converted for `sensor`.
    pub fn with_sensor<S2: SampleSource>(self, source: S2, sensor: Sensor) -> Foreground<'a, IN, OUT, A, S2> {
        let Self { console, step, wave, margin, actuator, report_interval, next_report, stats, .. } = self;
        Foreground {
            console,
            step,
            wave,
            margin,
            actuator,
            sensor: Some((source, sensor)),
            report_interval,
            next_report,
            stats,
        }
    }

    /// Serial console.
    pub fn console(&self) -> &SerialConsole<'a, IN, OUT> {
        &self.console
    }

    /// Step control.
    pub fn step(&self) -> &StepControl {
        &self.step
    }

    /// Waveform generator.
    pub fn wave(&self) -> &Triangle {
        &self.wave
    }

    /// Counters.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Actuator.
    pub fn actuator(&self) -> Option<&A> {
        self.actuator.as_ref()
    }

    /// Queues the boot banner and the introduction.
    ///
    /// Must be called before anything else is written to the console.
    pub fn announce(&mut self, kind: BootKind) {
        match kind {
            BootKind::Clean => info!("clean boot"),
            BootKind::WatchdogReset => warn!("watchdog reboot"),
        }
        for text in [kind.banner(), INTRO] {
            if self.console.write_bytes(text.as_bytes()) < text.len() {
                warn!("outbound buffer too small for boot report");
            }
        }
    }

    /// Runs one foreground iteration.
    ///
    /// `time_remaining` is asked for the time left before a watchdog reset right
    /// before an actuator transaction would start.
    pub fn poll(
        &mut self, now: Instant, time_remaining: impl FnOnce() -> Duration, arm: &mut impl TransmitArm,
    ) -> Poll {
        let input = self.service_input();
        let drive = self.drive(time_remaining);
        let reading = self.report(now);
        let transmit = self.console.request_transmit(arm);
        Poll { input, drive, reading, transmit }
    }

    /// Handles at most one received byte.
    pub fn service_input(&mut self) -> Option<Input> {
        let byte = self.console.read()?;
        let input = self.step.apply(byte);
        match input {
            Input::Adjusted(step) => {
                self.stats.adjusted += 1;
                debug!("step is {}", step);
            }
            Input::Echo(byte) => {
                if self.console.write(byte) {
                    self.stats.echoed += 1;
                } else {
                    self.stats.echo_dropped += 1;
                    warn!("outbound buffer full, echo dropped");
                }
            }
        }
        Some(input)
    }

    /// Advances the waveform and writes it to the actuator if the watchdog deadline permits.
    pub fn drive(&mut self, time_remaining: impl FnOnce() -> Duration) -> Drive {
        let Some(actuator) = self.actuator.as_mut() else { return Drive::Idle };

        let code = self.wave.advance(self.step.value());
        if self.margin.clearance(time_remaining()).is_err() {
            self.stats.drive_skipped += 1;
            debug!("watchdog deadline too close, skipping actuator write");
            return Drive::Skipped(code);
        }

        match actuator.write(&fast_write_payload(code), self.margin.transaction_timeout()) {
            Ok(()) => {
                self.stats.drive_ok += 1;
                Drive::Written(code)
            }
            Err(_) => {
                self.stats.drive_failed += 1;
                warn!("actuator write failed ({} failures)", self.stats.drive_failed);
                Drive::Failed(code)
            }
        }
    }

    /// Queues a sensor reading when the report interval has elapsed.
    pub fn report(&mut self, now: Instant) -> Option<Reading> {
        let (source, sensor) = self.sensor.as_mut()?;
        if self.next_report.is_some_and(|next| now < next) {
            return None;
        }
        self.next_report = Some(now + self.report_interval);

        let reading = sensor.reading(source.sample()?);
        let line = reading.line();
        if self.console.write_bytes(line.as_bytes()) < line.len() {
            self.stats.report_dropped += 1;
            warn!("outbound buffer full, report truncated");
        } else {
            self.stats.reports += 1;
        }
        Some(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mock::{MockAdc, MockDac, MockSerial},
        sensor::Lm45,
        transport::{Link, SerialHandler, Serviced},
    };
    use std::vec::Vec;

    fn ms(v: u64) -> Duration {
        Duration::millis(v)
    }

    fn at(v: u64) -> Instant {
        Instant::from_ticks(v)
    }

    fn plenty() -> Duration {
        ms(10_000)
    }

    /// Lets the handler send everything the foreground queued.
    fn drain<const IN: usize, const OUT: usize, A: Actuator, S: SampleSource>(
        handler: &mut SerialHandler<'_, IN, OUT>, fg: &Foreground<'_, IN, OUT, A, S>, port: &mut MockSerial,
    ) -> Vec<u8> {
        loop {
            fg.console().request_transmit(port);
            if handler.on_interrupt(port) == Serviced::Spurious {
                break;
            }
        }
        core::mem::take(&mut port.sent)
    }

    #[test]
    fn default_config_is_valid() {
        assert_eq!(Config::DEFAULT.validate(), Ok(()));
    }

    #[test]
    fn invalid_configs_rejected() {
        let cfg = Config { tick_period: ms(0), ..Config::DEFAULT };
        assert_eq!(cfg.validate(), Err(Error::ZeroPeriod));

        let cfg = Config { watchdog_window: ms(500), ..Config::DEFAULT };
        assert_eq!(cfg.validate(), Err(Error::WindowTooShort));

        let cfg = Config { step_initial: 0, ..Config::DEFAULT };
        assert_eq!(cfg.validate(), Err(Error::InvalidStepRange));

        let cfg = Config { safety_margin: ms(50), ..Config::DEFAULT };
        assert_eq!(cfg.validate(), Err(Error::MarginTooSmall));

        let cfg = Config { safety_margin: ms(10_000), ..Config::DEFAULT };
        assert_eq!(cfg.validate(), Err(Error::DeadlineTooClose));

        let cfg = Config { write_attempts: 0, ..Config::DEFAULT };
        assert_eq!(cfg.validate(), Err(Error::NoWriteAttempts));
    }

    #[test]
    fn banner_precedes_everything() {
        let mut link = Link::<16, 128>::new();
        let (console, mut handler) = link.split();
        let mut port = MockSerial::new();
        let mut fg = Foreground::new(console, &Config::DEFAULT).unwrap();

        fg.announce(BootKind::WatchdogReset);
        port.receive(b"?");
        handler.on_interrupt(&mut port);
        fg.poll(at(0), plenty, &mut port);

        let sent = drain(&mut handler, &fg, &mut port);
        assert!(sent.starts_with(b"WATCHDOG REBOOT\n\r"));
        assert!(sent[17..].starts_with(INTRO.as_bytes()));
        assert_eq!(sent.last(), Some(&b'?'));
    }

    #[test]
    fn control_bytes_adjust_and_others_echo() {
        let mut link = Link::<16, 64>::new();
        let (console, mut handler) = link.split();
        let mut port = MockSerial::new();
        let mut fg = Foreground::new(console, &Config::DEFAULT).unwrap();

        port.receive(b"+a+-+b");
        let mut inputs = Vec::new();
        for _ in 0..6 {
            handler.on_interrupt(&mut port);
            inputs.push(fg.poll(at(0), plenty, &mut port).input);
        }

        assert_eq!(
            inputs,
            [
                Some(Input::Adjusted(2)),
                Some(Input::Echo(b'a')),
                Some(Input::Adjusted(3)),
                Some(Input::Adjusted(2)),
                Some(Input::Adjusted(3)),
                Some(Input::Echo(b'b')),
            ]
        );
        assert_eq!(fg.step().value(), 3);
        assert_eq!(drain(&mut handler, &fg, &mut port), b"ab");
        assert_eq!(fg.stats().echoed, 2);
        assert_eq!(fg.stats().adjusted, 4);
    }

    #[test]
    fn decrement_at_floor_is_not_echoed() {
        let mut link = Link::<4, 16>::new();
        let (console, mut handler) = link.split();
        let mut port = MockSerial::new();
        let mut fg = Foreground::new(console, &Config::DEFAULT).unwrap();

        port.receive(b"-");
        handler.on_interrupt(&mut port);
        let poll = fg.poll(at(0), plenty, &mut port);

        assert_eq!(poll.input, Some(Input::Adjusted(1)));
        assert!(!poll.transmit);
        assert!(!port.tx_armed);
    }

    #[test]
    fn actuator_driven_with_waveform() {
        let mut link = Link::<4, 16>::new();
        let (console, _handler) = link.split();
        let mut port = MockSerial::new();
        let cfg = Config { step_initial: 100, ..Config::DEFAULT };
        let mut fg = Foreground::new(console, &cfg).unwrap().with_actuator(MockDac::default());

        assert_eq!(fg.poll(at(0), plenty, &mut port).drive, Drive::Written(100));
        assert_eq!(fg.poll(at(1), plenty, &mut port).drive, Drive::Written(200));

        let dac = fg.actuator().unwrap();
        assert_eq!(dac.writes, [[0x00, 100], [0x00, 200]]);
        assert!(dac.timeouts.iter().all(|&t| t == ms(50)));
    }

    #[test]
    fn actuator_skipped_near_deadline() {
        let mut link = Link::<4, 16>::new();
        let (console, _handler) = link.split();
        let mut port = MockSerial::new();
        let mut fg = Foreground::new(console, &Config::DEFAULT).unwrap().with_actuator(MockDac::default());

        assert_eq!(fg.poll(at(0), || ms(1000), &mut port).drive, Drive::Skipped(1));
        assert_eq!(fg.poll(at(0), || ms(999), &mut port).drive, Drive::Skipped(2));
        assert_eq!(fg.poll(at(0), || ms(1001), &mut port).drive, Drive::Written(3));

        assert_eq!(fg.actuator().unwrap().writes.len(), 1);
        assert_eq!(fg.stats().drive_skipped, 2);
    }

    #[test]
    fn actuator_failures_counted() {
        let mut link = Link::<4, 16>::new();
        let (console, _handler) = link.split();
        let mut port = MockSerial::new();
        let dac = MockDac { fail: true, ..MockDac::default() };
        let mut fg = Foreground::new(console, &Config::DEFAULT).unwrap().with_actuator(dac);

        assert_eq!(fg.poll(at(0), plenty, &mut port).drive, Drive::Failed(1));
        assert_eq!(fg.poll(at(0), plenty, &mut port).drive, Drive::Failed(2));
        assert_eq!(fg.stats().drive_failed, 2);
        assert_eq!(fg.stats().drive_ok, 0);
    }

    #[test]
    fn reports_on_interval() {
        let mut link = Link::<4, 64>::new();
        let (console, mut handler) = link.split();
        let mut port = MockSerial::new();
        let cfg = Config { report_interval: ms(100), ..Config::DEFAULT };
        let mut fg = Foreground::new(console, &cfg).unwrap().with_sensor(MockAdc(Some(2048)), Sensor::Voltage);

        assert!(fg.poll(at(0), plenty, &mut port).reading.is_some());
        assert!(fg.poll(at(50), plenty, &mut port).reading.is_none());
        assert!(fg.poll(at(100), plenty, &mut port).reading.is_some());
        assert_eq!(fg.stats().reports, 2);

        let sent = drain(&mut handler, &fg, &mut port);
        assert_eq!(sent, b" 1.650000 V\r 1.650000 V\r");
    }

    #[test]
    fn no_report_without_sample() {
        let mut link = Link::<4, 64>::new();
        let (console, _handler) = link.split();
        let mut port = MockSerial::new();
        let sensor = Sensor::Lm45(Lm45::DEFAULT);
        let mut fg = Foreground::new(console, &Config::DEFAULT).unwrap().with_sensor(MockAdc(None), sensor);

        let poll = fg.poll(at(0), plenty, &mut port);
        assert_eq!(poll.reading, None);
        assert!(!poll.transmit);
    }

    #[test]
    fn echo_dropped_when_outbound_full() {
        let mut link = Link::<4, 2>::new();
        let (console, mut handler) = link.split();
        let mut port = MockSerial::new();
        let mut fg = Foreground::new(console, &Config::DEFAULT).unwrap();

        port.receive(b"xyz");
        for _ in 0..3 {
            assert!(matches!(handler.on_interrupt(&mut port), Serviced::Received(_)));
            fg.service_input();
        }
        assert_eq!(fg.stats().echo_dropped, 1);
        assert_eq!(fg.console().take_outbound_lost(), 1);
    }
}
