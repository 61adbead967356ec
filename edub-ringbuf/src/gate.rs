//! Interrupt gate.

use critical_section::CriticalSection;

/// Scoped critical section.
///
/// Entering the gate saves the current interrupt enable state and disables interrupts.
/// Leaving it restores the saved state, so a gate entered while another one is held
/// keeps interrupts disabled until the outermost gate is left. This also holds on
/// early return and unwinding.
pub struct InterruptGate(());

impl InterruptGate {
    /// Runs `f` with interrupts disabled.
    ///
    /// The closure receives a [CriticalSection] token that can be used to access
    /// [critical_section::Mutex] protected data.
    #[inline]
    pub fn with<R>(f: impl FnOnce(CriticalSection<'_>) -> R) -> R {
        critical_section::with(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use critical_section::Mutex;

    #[test]
    fn with_returns_closure_value() {
        assert_eq!(InterruptGate::with(|_| 42), 42);
    }

    #[test]
    fn nested_gates_protect_shared_data() {
        let value = Mutex::new(Cell::new(0u32));

        InterruptGate::with(|outer| {
            value.borrow(outer).set(1);
            InterruptGate::with(|inner| {
                let cell = value.borrow(inner);
                cell.set(cell.get() + 1);
            });
            // Still inside the outer gate after the inner one was left.
            let cell = value.borrow(outer);
            cell.set(cell.get() + 1);
        });

        assert_eq!(InterruptGate::with(|cs| value.borrow(cs).get()), 3);
    }

    #[test]
    fn early_return_leaves_gate() {
        fn find(data: &[u8], needle: u8) -> Option<usize> {
            InterruptGate::with(|_| {
                for (i, &b) in data.iter().enumerate() {
                    if b == needle {
                        return Some(i);
                    }
                }
                None
            })
        }

        assert_eq!(find(b"abc", b'b'), Some(1));
        assert_eq!(find(b"abc", b'z'), None);

        // Another thread can only enter if the gates above were left.
        let handle = std::thread::spawn(|| InterruptGate::with(|_| 7));
        assert_eq!(handle.join().unwrap(), 7);
    }
}
