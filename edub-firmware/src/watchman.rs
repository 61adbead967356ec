//! Watchdog management.

use edub_core::{hw::LivenessTimer, Duration, Instant};
use stm32f1xx_hal::{prelude::*, watchdog::IndependentWatchdog};

use crate::app::monotonics;

/// Independent hardware watchdog.
///
/// The IWDG counter cannot be read back, so the time left before a reset is
/// derived from the monotonic timer and the last refresh.
pub struct Watchman {
    dog: IndependentWatchdog,
    window: Duration,
    last_refresh: Instant,
}

impl Watchman {
    /// Starts the hardware watchdog with the specified window.
    pub fn start(mut dog: IndependentWatchdog, window: Duration) -> Self {
        if option_env!("DISABLE_WATCHDOG").is_some() {
            defmt::warn!("watchdog is disabled");
        } else {
            dog.start((window.to_millis() as u32).millis());
        }
        dog.feed();

        Self { dog, window, last_refresh: monotonics::now() }
    }
}

impl LivenessTimer for Watchman {
    fn refresh(&mut self) {
        defmt::trace!("refreshing hardware watchdog");
        self.dog.feed();
        self.last_refresh = monotonics::now();
    }

    fn time_remaining(&self) -> Duration {
        monotonics::now()
            .checked_duration_since(self.last_refresh)
            .and_then(|elapsed| self.window.checked_sub(elapsed))
            .unwrap_or(Duration::from_ticks(0))
    }

    fn window(&self) -> Duration {
        self.window
    }
}
