//! Analog sensor readings.

use core::{cell::Cell, fmt, fmt::Write};
use critical_section::Mutex;

use crate::{hw::SampleSource, InterruptGate};

/// ADC reference voltage.
pub const VREF: f32 = 3.3;

/// ADC resolution.
pub const ADC_BITS: u32 = 12;

/// Maximum length of a formatted reading line.
pub const LINE_LEN: usize = 24;

/// Converts a raw ADC sample to volts.
pub fn volts(sample: u16) -> f32 {
    f32::from(sample) * VREF / (1u32 << ADC_BITS) as f32
}

/// Attached sensor.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Sensor {
    /// Potentiometer read as a plain voltage.
    Voltage,
    /// LM45 temperature sensor.
    Lm45(Lm45),
}

impl Sensor {
    /// Converts a raw sample.
    pub fn reading(&self, sample: u16) -> Reading {
        match self {
            Self::Voltage => Reading::Volts(volts(sample)),
            Self::Lm45(lm45) => Reading::Fahrenheit(lm45.fahrenheit(sample)),
        }
    }

    /// Whether the buzzer should sound for this sample.
    pub fn alarm(&self, sample: u16) -> bool {
        match self {
            Self::Voltage => false,
            Self::Lm45(lm45) => lm45.alarm(sample),
        }
    }
}

/// LM45 temperature sensor.
///
/// Outputs 10 mV per °C.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Lm45 {
    /// Added to the converted temperature in °F.
    pub calibration_f: f32,
    /// Buzzer sounds at or above this temperature in °F.
    pub alarm_f: f32,
}

impl Default for Lm45 {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Lm45 {
    /// Output voltage per °C.
    pub const VOLTS_PER_DEG_C: f32 = 0.010;

    /// Calibration of the EDUB board sensor and buzzer threshold.
    pub const DEFAULT: Self = Self { calibration_f: -6.9, alarm_f: 75.0 };

    /// Temperature in °F.
    pub fn fahrenheit(&self, sample: u16) -> f32 {
        let celsius = volts(sample) / Self::VOLTS_PER_DEG_C;
        celsius * 9.0 / 5.0 + 32.0 + self.calibration_f
    }

    /// Whether the temperature reached the alarm threshold.
    pub fn alarm(&self, sample: u16) -> bool {
        self.fahrenheit(sample) >= self.alarm_f
    }
}

/// Converted sample.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reading {
    /// Voltage.
    Volts(f32),
    /// Temperature in °F.
    Fahrenheit(f32),
}

impl Reading {
    /// Formats the reading as a status line.
    pub fn line(&self) -> heapless::String<LINE_LEN> {
        let mut line = heapless::String::new();
        // Too long only for values beyond any sensor range; the line is then truncated.
        let _ = write!(line, "{self}");
        line
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Volts(v) => write!(f, " {v:.6} V\r"),
            Self::Fahrenheit(t) => write!(f, " {t:.6} 'F\r"),
        }
    }
}

/// Latest sample stored by an ADC interrupt.
///
/// The ADC FIFO drain handler keeps only the newest conversion.
pub struct LatestSample(Mutex<Cell<Option<u16>>>);

impl Default for LatestSample {
    fn default() -> Self {
        Self::new()
    }
}

impl LatestSample {
    /// Creates an empty cell.
    pub const fn new() -> Self {
        Self(Mutex::new(Cell::new(None)))
    }

    /// Stores drained FIFO entries, keeping the last one.
    pub fn store_drained(&self, fifo: impl IntoIterator<Item = u16>) {
        if let Some(sample) = fifo.into_iter().last() {
            self.store(sample);
        }
    }

    /// Stores a sample.
    pub fn store(&self, sample: u16) {
        InterruptGate::with(|cs| self.0.borrow(cs).set(Some(sample)));
    }

    /// Latest sample.
    pub fn load(&self) -> Option<u16> {
        InterruptGate::with(|cs| self.0.borrow(cs).get())
    }
}

impl SampleSource for &LatestSample {
    fn sample(&mut self) -> Option<u16> {
        self.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn converts_full_scale() {
        assert_eq!(volts(0), 0.0);
        assert!(close(volts(2048), 1.65));
        assert!(close(volts(4095), 3.3 * 4095.0 / 4096.0));
    }

    #[test]
    fn lm45_fahrenheit() {
        // 0.25 V is 25 °C, 77 °F before calibration.
        let sample = (0.25 / VREF * 4096.0) as u16;
        let lm45 = Lm45::default();
        let t = lm45.fahrenheit(sample);
        assert!((t - (77.0 - 6.9)).abs() < 0.2, "{t}");
        assert!(!lm45.alarm(sample));

        let hot = (0.30 / VREF * 4096.0) as u16;
        assert!(lm45.alarm(hot));
        assert!(Sensor::Lm45(lm45).alarm(hot));
        assert!(!Sensor::Voltage.alarm(hot));
    }

    #[test]
    fn formats_lines() {
        assert_eq!(Reading::Volts(1.5).line().as_str(), " 1.500000 V\r");
        assert_eq!(Reading::Fahrenheit(72.25).line().as_str(), " 72.250000 'F\r");
        assert_eq!(Sensor::Voltage.reading(0).line().as_str(), " 0.000000 V\r");
    }

    #[test]
    fn latest_sample_keeps_newest() {
        let latest = LatestSample::new();
        assert_eq!(latest.load(), None);

        latest.store_drained([10, 20, 30]);
        latest.store_drained([]);
        assert_eq!(latest.load(), Some(30));

        let mut source = &latest;
        assert_eq!(source.sample(), Some(30));
    }
}
