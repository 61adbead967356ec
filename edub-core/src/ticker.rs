//! Periodic heartbeat.

use crate::{
    hw::{Alarm, DigitalOutput, LivenessTimer, NoOutput},
    liveness::LivenessMonitor,
    Duration, Error, Instant,
};

/// Alarm driven heartbeat.
///
/// Every fire toggles the indicator, drives the optional buzzer, refreshes
/// the watchdog and arms the next alarm at the current counter value plus the
/// period. Rearming from the live counter keeps handler latency from
/// accumulating across ticks.
pub struct PeriodicTicker<L, B = NoOutput> {
    period: Duration,
    led: L,
    buzzer: B,
    lit: bool,
    last_target: Option<Instant>,
    fired: u32,
}

impl<L: DigitalOutput> PeriodicTicker<L> {
    /// Creates a ticker toggling `led` every `period`.
    pub fn new(period: Duration, led: L) -> Result<Self, Error> {
        if period.ticks() == 0 {
            return Err(Error::ZeroPeriod);
        }
        Ok(Self { period, led, buzzer: NoOutput, lit: false, last_target: None, fired: 0 })
    }
}

impl<L: DigitalOutput, B: DigitalOutput> PeriodicTicker<L, B> {
    /// Adds a buzzer that follows the indicator while sound is requested.
    pub fn with_buzzer<B2: DigitalOutput>(self, buzzer: B2) -> PeriodicTicker<L, B2> {
        let Self { period, led, lit, last_target, fired, .. } = self;
        PeriodicTicker { period, led, buzzer, lit, last_target, fired }
    }

    /// Tick period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether the indicator is on.
    pub fn is_lit(&self) -> bool {
        self.lit
    }

    /// Last programmed alarm target.
    pub fn last_target(&self) -> Option<Instant> {
        self.last_target
    }

    /// Number of fires since creation.
    pub fn fired(&self) -> u32 {
        self.fired
    }

    /// Arms the first alarm.
    pub fn start(&mut self, alarm: &mut impl Alarm) -> Instant {
        self.rearm(alarm)
    }

    /// Handles an alarm.
    ///
    /// `sound` is evaluated by the caller at fire time. Returns the next alarm target.
    pub fn fire<T: LivenessTimer>(
        &mut self, alarm: &mut impl Alarm, liveness: &mut LivenessMonitor<T>, sound: bool,
    ) -> Instant {
        self.lit = !self.lit;
        self.led.set(self.lit);
        self.buzzer.set(sound && self.lit);

        liveness.refresh();
        self.fired = self.fired.wrapping_add(1);

        self.rearm(alarm)
    }

    fn rearm(&mut self, alarm: &mut impl Alarm) -> Instant {
        let now = alarm.now();
        let target = now + self.period;
        alarm.arm_at(target);
        self.last_target = Some(target);
        trace!("tick alarm armed for {} ms", target.ticks());
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAlarm, MockPin, MockWatchdog};

    #[test]
    fn zero_period_rejected() {
        assert!(matches!(PeriodicTicker::new(Duration::millis(0), MockPin::default()), Err(Error::ZeroPeriod)));
    }

    #[test]
    fn rearms_from_live_counter() {
        let mut ticker = PeriodicTicker::new(Duration::millis(1000), MockPin::default()).unwrap();
        let mut alarm = MockAlarm::at(5);
        let mut liveness = LivenessMonitor::new(MockWatchdog::new(10_000));

        assert_eq!(ticker.start(&mut alarm), Instant::from_ticks(1005));

        // Handler runs late; the next target is based on the counter, not on 1005.
        alarm.now = Instant::from_ticks(1012);
        assert_eq!(ticker.fire(&mut alarm, &mut liveness, false), Instant::from_ticks(2012));
        alarm.now = Instant::from_ticks(2013);
        ticker.fire(&mut alarm, &mut liveness, false);

        assert_eq!(
            alarm.targets,
            [Instant::from_ticks(1005), Instant::from_ticks(2012), Instant::from_ticks(3013)]
        );
        assert_eq!(ticker.last_target(), Some(Instant::from_ticks(3013)));
    }

    #[test]
    fn fire_toggles_and_refreshes() {
        let mut ticker = PeriodicTicker::new(Duration::millis(1000), MockPin::default()).unwrap();
        let mut alarm = MockAlarm::at(0);
        let mut liveness = LivenessMonitor::new(MockWatchdog::new(10_000));

        for _ in 0..3 {
            ticker.fire(&mut alarm, &mut liveness, false);
        }

        assert_eq!(ticker.led.history, [true, false, true]);
        assert!(ticker.is_lit());
        assert_eq!(ticker.fired(), 3);
        assert_eq!(liveness.refreshes(), 3);
    }

    #[test]
    fn digital_output_drives_level() {
        let mut pin = MockPin::default();
        pin.set(true);
        pin.set(true);
        pin.set(false);
        assert_eq!(pin.history, [true, true, false]);
        assert!(!pin.high);

        // Unconnected outputs accept any level.
        NoOutput.set(true);
    }

    #[test]
    fn buzzer_follows_led_only_while_sounding() {
        let mut ticker =
            PeriodicTicker::new(Duration::millis(500), MockPin::default()).unwrap().with_buzzer(MockPin::default());
        let mut alarm = MockAlarm::at(0);
        let mut liveness = LivenessMonitor::new(MockWatchdog::new(10_000));

        ticker.fire(&mut alarm, &mut liveness, true);
        assert!(ticker.buzzer.high);
        ticker.fire(&mut alarm, &mut liveness, true);
        assert!(!ticker.buzzer.high);
        ticker.fire(&mut alarm, &mut liveness, false);
        assert!(ticker.is_lit());
        assert!(!ticker.buzzer.high);

        assert_eq!(ticker.buzzer.history, [true, false, false]);
    }

    #[test]
    fn target_always_after_counter() {
        let mut ticker = PeriodicTicker::new(Duration::millis(1), MockPin::default()).unwrap();
        let mut liveness = LivenessMonitor::new(MockWatchdog::new(10_000));

        for now in [0, 1, 7, 1_000_000, u32::MAX as u64] {
            let mut alarm = MockAlarm::at(now);
            assert!(ticker.fire(&mut alarm, &mut liveness, false) > alarm.now);
        }
    }
}
