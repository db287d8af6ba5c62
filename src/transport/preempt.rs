//! Optimistic retry guard for bus use from interrupt context.
//!
//! Status reads triggered by the FLAG or BUSY lines run in interrupt context
//! and can interleave with a frame being composed in thread context. Instead
//! of locking the ISR out, composition is optimistic: the thread arms the
//! guard, composes the frame into its stack buffer, and retries if an
//! ISR-context transaction was noted meanwhile. The ISR path never blocks.

use core::sync::atomic::{AtomicBool, Ordering};

/// Tracks ISR-context bus activity overlapping frame composition.
#[derive(Debug, Default)]
pub struct Preemption {
    in_isr: AtomicBool,
    preempted: AtomicBool,
}

impl Preemption {
    /// Creates a guard with no ISR activity noted.
    pub const fn new() -> Preemption {
        Preemption {
            in_isr: AtomicBool::new(false),
            preempted: AtomicBool::new(false),
        }
    }

    /// Marks entry into interrupt context. Call before issuing bus
    /// transactions from an interrupt handler.
    pub fn isr_enter(&self) {
        self.in_isr.store(true, Ordering::Release);
    }

    /// Marks exit from interrupt context.
    pub fn isr_exit(&self) {
        self.in_isr.store(false, Ordering::Release);
    }

    /// Notes a bus transaction; sets the preempted flag when it happens in
    /// interrupt context.
    pub(crate) fn note_transaction(&self) {
        if self.in_isr.load(Ordering::Acquire) {
            self.preempted.store(true, Ordering::Release);
        }
    }

    /// Clears the preempted flag before a composition attempt.
    pub(crate) fn arm(&self) {
        self.preempted.store(false, Ordering::Release);
    }

    /// Whether an ISR transaction landed since the last [`arm`](Self::arm).
    pub(crate) fn was_preempted(&self) -> bool {
        self.preempted.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_context_transactions_do_not_preempt() {
        let p = Preemption::new();
        p.arm();
        p.note_transaction();
        assert!(!p.was_preempted());
    }

    #[test]
    fn isr_context_transaction_forces_retry() {
        let p = Preemption::new();
        p.arm();
        p.isr_enter();
        p.note_transaction();
        assert!(p.was_preempted());
        p.isr_exit();
        p.arm();
        p.note_transaction();
        assert!(!p.was_preempted());
    }
}
