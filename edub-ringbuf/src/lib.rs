//! Fixed-capacity byte queues shared between interrupt handlers and a foreground loop.
//!
//! Each [RingBuffer] has exactly one producer context and one consumer context, for example
//! a serial receive interrupt pushing bytes and the main loop popping them. All state changes
//! happen inside an [InterruptGate], so masking interrupts is enough to make every operation
//! atomic on a single core.
//!
//! ```
//! use edub_ringbuf::RingBuffer;
//!
//! static OUTBOUND: RingBuffer<64> = RingBuffer::new();
//!
//! OUTBOUND.push_slice(b"CLEAN BOOT\n\r");
//! assert_eq!(OUTBOUND.pop(), Some(b'C'));
//! ```
//!
//! # Critical sections
//!
//! Interrupts are masked through [`critical-section`](https://github.com/rust-embedded/critical-section),
//! so the final binary must link an implementation of it. On single-core Cortex-M parts the
//! `critical-section-single-core` feature of `cortex-m` provides one; host programs and tests
//! enable the `std` feature of `critical-section`.

#![no_std]

#[cfg(test)]
extern crate std;

mod gate;
mod ring_buffer;

pub use gate::InterruptGate;
pub use ring_buffer::{Drain, OverflowPolicy, RingBuffer, Writer};
