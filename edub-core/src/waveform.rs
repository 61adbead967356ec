//! Triangle waveform for a 12-bit DAC.

/// Highest DAC code.
pub const MAX_CODE: u16 = 0x0fff;

/// Length of a DAC fast-write command.
pub const FAST_WRITE_LEN: usize = 2;

/// DAC fast-write command for `code`.
///
/// The upper nibble selects fast mode with power-down off, followed by the
/// 12-bit code in big-endian order.
pub fn fast_write_payload(code: u16) -> [u8; FAST_WRITE_LEN] {
    (code & MAX_CODE).to_be_bytes()
}

/// Triangle wave between 0 and [MAX_CODE].
///
/// Advances by a step per sample and reverses at either end. Values are clamped
/// to the end points, so every step size reaches both extremes exactly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Triangle {
    code: u16,
    falling: bool,
}

impl Triangle {
    /// Starts at zero, rising.
    pub const fn new() -> Self {
        Self { code: 0, falling: false }
    }

    /// Current code.
    pub const fn code(&self) -> u16 {
        self.code
    }

    /// Whether the wave is falling.
    pub const fn is_falling(&self) -> bool {
        self.falling
    }

    /// Advances by `step` and returns the new code.
    pub fn advance(&mut self, step: u16) -> u16 {
        if self.falling {
            self.code = self.code.saturating_sub(step);
            if self.code == 0 {
                self.falling = false;
            }
        } else {
            self.code = self.code.saturating_add(step).min(MAX_CODE);
            if self.code == MAX_CODE {
                self.falling = true;
            }
        }
        self.code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_big_endian_12_bit() {
        assert_eq!(fast_write_payload(0), [0x00, 0x00]);
        assert_eq!(fast_write_payload(0x0abc), [0x0a, 0xbc]);
        assert_eq!(fast_write_payload(MAX_CODE), [0x0f, 0xff]);
        assert_eq!(fast_write_payload(0xffff), [0x0f, 0xff]);
    }

    #[test]
    fn reverses_at_both_ends() {
        let mut wave = Triangle::new();
        let codes: std::vec::Vec<u16> = (0..6).map(|_| wave.advance(1500)).collect();
        assert_eq!(codes, [1500, 3000, 4095, 2595, 1095, 0]);
        assert!(!wave.is_falling());
        assert_eq!(wave.advance(1500), 1500);
    }

    #[test]
    fn stays_in_range_for_any_step() {
        for step in [1, 7, 200, 4095, u16::MAX] {
            let mut wave = Triangle::new();
            for _ in 0..10_000 {
                assert!(wave.advance(step) <= MAX_CODE);
            }
        }
    }
}
