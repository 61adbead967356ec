//! Boot report.

/// Line queued first after a reset caused by the watchdog.
pub const WATCHDOG_BANNER: &str = "WATCHDOG REBOOT\n\r";

/// Line queued first after any other reset.
pub const CLEAN_BANNER: &str = "CLEAN BOOT\n\r";

/// Introduction queued after the banner.
pub const INTRO: &str = "EDUB serial console: '+' raises the step, '-' lowers it\n\r";

/// Cause of the last reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetCause {
    /// Supply came up.
    PowerOn,
    /// Reset pin was pulled low.
    Pin,
    /// Independent or window watchdog expired.
    Watchdog,
    /// Software or low power reset.
    Other,
}

impl ResetCause {
    const PINRSTF: u32 = 1 << 26;
    const PORRSTF: u32 = 1 << 27;
    const IWDGRSTF: u32 = 1 << 29;
    const WWDGRSTF: u32 = 1 << 30;
    const RESET_FLAGS: u32 = 0xff00_0000;

    /// Decodes the reset flags of the STM32F1 RCC_CSR register.
    ///
    /// The pin flag accompanies every reset, so it only counts when no other
    /// flag is set.
    pub fn from_rcc_csr(csr: u32) -> Self {
        if csr & (Self::IWDGRSTF | Self::WWDGRSTF) != 0 {
            Self::Watchdog
        } else if csr & Self::PORRSTF != 0 {
            Self::PowerOn
        } else if csr & Self::RESET_FLAGS == Self::PINRSTF {
            Self::Pin
        } else {
            Self::Other
        }
    }

    /// Short name for logging.
    pub const fn name(self) -> &'static str {
        match self {
            Self::PowerOn => "power-on",
            Self::Pin => "pin",
            Self::Watchdog => "watchdog",
            Self::Other => "other",
        }
    }

    /// Logs the reset cause.
    pub fn log(self) {
        info!("reset cause: {}", self.name());
    }
}

/// Kind of the last reset as reported over the serial channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootKind {
    /// Power on, reset pin or software reset.
    Clean,
    /// The watchdog expired.
    WatchdogReset,
}

impl BootKind {
    /// Banner announcing this boot.
    pub const fn banner(self) -> &'static str {
        match self {
            Self::Clean => CLEAN_BANNER,
            Self::WatchdogReset => WATCHDOG_BANNER,
        }
    }
}

impl From<ResetCause> for BootKind {
    fn from(cause: ResetCause) -> Self {
        match cause {
            ResetCause::Watchdog => Self::WatchdogReset,
            ResetCause::PowerOn | ResetCause::Pin | ResetCause::Other => Self::Clean,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RCC_CSR reset flags of the STM32F1.
    const PINRSTF: u32 = 1 << 26;
    const PORRSTF: u32 = 1 << 27;
    const SFTRSTF: u32 = 1 << 28;
    const IWDGRSTF: u32 = 1 << 29;
    const WWDGRSTF: u32 = 1 << 30;
    const LSION: u32 = 1 << 0;

    #[test]
    fn power_on_is_clean() {
        let cause = ResetCause::from_rcc_csr(PORRSTF | PINRSTF | LSION);
        assert_eq!(cause, ResetCause::PowerOn);
        assert_eq!(BootKind::from(cause), BootKind::Clean);
        assert_eq!(BootKind::from(cause).banner(), "CLEAN BOOT\n\r");
    }

    #[test]
    fn reset_pin_alone() {
        assert_eq!(ResetCause::from_rcc_csr(PINRSTF | LSION), ResetCause::Pin);
        assert_eq!(ResetCause::from_rcc_csr(PINRSTF | SFTRSTF), ResetCause::Other);
        assert_eq!(ResetCause::from_rcc_csr(0), ResetCause::Other);
        assert_eq!(BootKind::from(ResetCause::Pin), BootKind::Clean);
    }

    #[test]
    fn watchdog_reset_detected() {
        for csr in [IWDGRSTF | PINRSTF, WWDGRSTF | PINRSTF, IWDGRSTF | PORRSTF] {
            let cause = ResetCause::from_rcc_csr(csr);
            assert_eq!(cause, ResetCause::Watchdog);
            assert_eq!(BootKind::from(cause).banner(), WATCHDOG_BANNER);
        }
    }
}
