//! Bounded retry of non-blocking operations.

/// Bounded retry error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, displaydoc::Display)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RetryError<E> {
    /// operation would still block after all attempts
    Exhausted,
    /// operation failed
    Other(E),
}

/// Calls `op` until it completes, at most `attempts` times.
///
/// [nb::Error::WouldBlock] consumes one attempt. Any other error is returned immediately.
/// With zero attempts `op` is never called.
pub fn bounded<T, E>(attempts: u32, mut op: impl FnMut() -> nb::Result<T, E>) -> Result<T, RetryError<E>> {
    for _ in 0..attempts {
        match op() {
            Ok(v) => return Ok(v),
            Err(nb::Error::WouldBlock) => (),
            Err(nb::Error::Other(err)) => return Err(RetryError::Other(err)),
        }
    }
    Err(RetryError::Exhausted)
}
