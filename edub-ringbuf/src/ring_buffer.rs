//! Ring buffer.

use core::{
    cell::RefCell,
    fmt,
    sync::atomic::{AtomicU32, AtomicUsize, Ordering},
};
use critical_section::Mutex;

use crate::InterruptGate;

/// What happens to a byte pushed into a full buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OverflowPolicy {
    /// Reject the new byte and leave the buffer contents untouched.
    #[default]
    DropNewest,
    /// Discard the oldest buffered byte to make room for the new one.
    DropOldest,
}

/// Backing storage with wraparound indices.
struct Slots<const SIZE: usize> {
    buf: [u8; SIZE],
    /// Next slot to write.
    head: usize,
    /// Next slot to read.
    tail: usize,
    /// Number of buffered bytes.
    count: usize,
}

impl<const SIZE: usize> Slots<SIZE> {
    const fn new() -> Self {
        Self { buf: [0; SIZE], head: 0, tail: 0, count: 0 }
    }

    const fn advance(pos: usize) -> usize {
        if pos + 1 == SIZE {
            0
        } else {
            pos + 1
        }
    }

    fn push(&mut self, byte: u8) -> bool {
        if self.count == SIZE {
            return false;
        }

        self.buf[self.head] = byte;
        self.head = Self::advance(self.head);
        self.count += 1;
        true
    }

    fn pop(&mut self) -> Option<u8> {
        if self.count == 0 {
            return None;
        }

        let byte = self.buf[self.tail];
        self.tail = Self::advance(self.tail);
        self.count -= 1;
        Some(byte)
    }
}

/// Fixed-capacity FIFO byte queue.
///
/// One context pushes and one context pops for the lifetime of the buffer. Every operation
/// that changes the buffer runs inside an [InterruptGate] and completes in bounded time;
/// nothing ever waits for space or data.
pub struct RingBuffer<const SIZE: usize> {
    slots: Mutex<RefCell<Slots<SIZE>>>,
    /// Copy of the count, readable without disabling interrupts.
    len: AtomicUsize,
    /// Bytes dropped or evicted because the buffer was full.
    lost: AtomicU32,
    policy: OverflowPolicy,
}

impl<const SIZE: usize> Default for RingBuffer<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SIZE: usize> RingBuffer<SIZE> {
    /// Creates an empty buffer that rejects bytes pushed while it is full.
    pub const fn new() -> Self {
        Self::with_policy(OverflowPolicy::DropNewest)
    }

    /// Creates an empty buffer with the specified overflow policy.
    pub const fn with_policy(policy: OverflowPolicy) -> Self {
        assert!(SIZE > 0, "ring buffer capacity must not be zero");
        Self {
            slots: Mutex::new(RefCell::new(Slots::new())),
            len: AtomicUsize::new(0),
            lost: AtomicU32::new(0),
            policy,
        }
    }

    /// Runs `f` on the slots with interrupts disabled and publishes the new count.
    fn locked<R>(&self, f: impl FnOnce(&mut Slots<SIZE>) -> R) -> R {
        InterruptGate::with(|cs| {
            let mut slots = self.slots.borrow(cs).borrow_mut();
            let ret = f(&mut slots);
            self.len.store(slots.count, Ordering::Release);
            ret
        })
    }

    /// Must only be called inside a gate.
    fn add_lost(&self, n: usize) {
        let lost = self.lost.load(Ordering::Relaxed);
        self.lost.store(lost.saturating_add(n as u32), Ordering::Relaxed);
    }

    /// Capacity in bytes.
    pub const fn capacity(&self) -> usize {
        SIZE
    }

    /// Overflow policy.
    pub const fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Number of buffered bytes.
    ///
    /// This is a snapshot that may be outdated by the time it is used. It is fine for
    /// deciding whether to schedule work, but not for deciding whether a pop will succeed.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Whether the buffer is empty, see [Self::len].
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the buffer is full, see [Self::len].
    pub fn is_full(&self) -> bool {
        self.len() == SIZE
    }

    /// Appends a byte.
    ///
    /// Returns whether the byte was stored. With [OverflowPolicy::DropNewest] a full buffer
    /// rejects the byte and stays unchanged. With [OverflowPolicy::DropOldest] the oldest
    /// byte is discarded instead and the new byte is always stored.
    pub fn push(&self, byte: u8) -> bool {
        self.locked(|slots| {
            if slots.push(byte) {
                return true;
            }

            self.add_lost(1);
            match self.policy {
                OverflowPolicy::DropNewest => false,
                OverflowPolicy::DropOldest => {
                    slots.pop();
                    slots.push(byte)
                }
            }
        })
    }

    /// Removes and returns the oldest byte, or `None` if the buffer is empty.
    pub fn pop(&self) -> Option<u8> {
        self.locked(|slots| slots.pop())
    }

    /// Appends all bytes of `data` inside a single critical section.
    ///
    /// With [OverflowPolicy::DropNewest] appending stops at the first byte that does not fit.
    /// Returns the number of bytes from the start of `data` that were stored.
    pub fn push_slice(&self, data: &[u8]) -> usize {
        self.locked(|slots| {
            let mut stored = 0;
            for &byte in data {
                if !slots.push(byte) {
                    match self.policy {
                        OverflowPolicy::DropNewest => break,
                        OverflowPolicy::DropOldest => {
                            slots.pop();
                            slots.push(byte);
                            self.add_lost(1);
                        }
                    }
                }
                stored += 1;
            }
            self.add_lost(data.len() - stored);
            stored
        })
    }

    /// Removes up to `out.len()` bytes inside a single critical section.
    ///
    /// Returns the number of bytes written to the start of `out`.
    pub fn pop_into(&self, out: &mut [u8]) -> usize {
        self.locked(|slots| {
            let mut n = 0;
            for dst in out.iter_mut() {
                match slots.pop() {
                    Some(byte) => *dst = byte,
                    None => break,
                }
                n += 1;
            }
            n
        })
    }

    /// Iterator popping up to `limit` bytes, one critical section per byte.
    ///
    /// Interrupt handlers can run between two bytes, so a long drain does not delay them.
    pub fn drain(&self, limit: usize) -> Drain<'_, SIZE> {
        Drain { buffer: self, remaining: limit }
    }

    /// Number of bytes lost due to overflow since creation or the last [Self::take_lost].
    pub fn lost(&self) -> u32 {
        self.lost.load(Ordering::Relaxed)
    }

    /// Returns and resets the number of bytes lost due to overflow.
    pub fn take_lost(&self) -> u32 {
        InterruptGate::with(|_| {
            let lost = self.lost.load(Ordering::Relaxed);
            self.lost.store(0, Ordering::Relaxed);
            lost
        })
    }

    /// Discards all buffered bytes.
    pub fn clear(&self) {
        self.locked(|slots| {
            slots.head = 0;
            slots.tail = 0;
            slots.count = 0;
        })
    }

    /// Formatter appending to this buffer.
    pub fn writer(&self) -> Writer<'_, SIZE> {
        Writer { buffer: self }
    }
}

/// Iterator returned by [RingBuffer::drain].
pub struct Drain<'a, const SIZE: usize> {
    buffer: &'a RingBuffer<SIZE>,
    remaining: usize,
}

impl<const SIZE: usize> Iterator for Drain<'_, SIZE> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.remaining == 0 {
            return None;
        }

        match self.buffer.pop() {
            Some(byte) => {
                self.remaining -= 1;
                Some(byte)
            }
            None => {
                self.remaining = 0;
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining.min(SIZE)))
    }
}

/// [fmt::Write] adapter returned by [RingBuffer::writer].
///
/// Each `write_str` is appended with [RingBuffer::push_slice]. Formatting fails
/// if bytes had to be dropped.
pub struct Writer<'a, const SIZE: usize> {
    buffer: &'a RingBuffer<SIZE>,
}

impl<const SIZE: usize> fmt::Write for Writer<'_, SIZE> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.buffer.push_slice(s.as_bytes()) == s.len() {
            Ok(())
        } else {
            Err(fmt::Error)
        }
    }
}
