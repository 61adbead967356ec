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

//! EDUB serial core.
//!
//! Hardware independent part of the EDUB board programs: a half-duplex serial
//! transport serviced from one shared interrupt, a periodic ticker that refreshes
//! the watchdog, the liveness guard for actuator transactions and the foreground
//! loop that ties them together.
//!
//! Peripherals are accessed through the traits in [hw], so everything in this
//! crate runs on the host as well as on the target.

#![no_std]
#![warn(missing_docs)]

#[cfg(test)]
extern crate std;

#[macro_use]
mod logging;

pub mod app;
pub mod boot;
pub mod bus;
pub mod control;
mod error;
pub mod hw;
pub mod liveness;
pub mod retry;
pub mod sensor;
pub mod ticker;
pub mod transport;
pub mod waveform;

#[cfg(test)]
mod mock;

pub use edub_ringbuf::{InterruptGate, OverflowPolicy, RingBuffer};
pub use error::Error;

/// Tick rate of [Instant] and [Duration].
pub const TICK_HZ: u32 = 1_000;

/// Hardware counter value.
pub type Instant = fugit::TimerInstantU64<TICK_HZ>;

/// Time span in hardware counter ticks.
pub type Duration = fugit::TimerDurationU64<TICK_HZ>;
