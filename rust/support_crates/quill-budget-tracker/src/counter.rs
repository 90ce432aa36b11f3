use std::sync::atomic::{AtomicU64, Ordering};

/// A thread-safe byte counter that never goes negative.
///
/// Readers (e.g. the RAM balancing check on the indexing hot path) load it without
/// taking any lock; writers deposit and withdraw with atomic operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Withdraws `amount`, or everything that is left when the counter holds less.
    ///
    /// # Returns
    ///
    /// The amount actually withdrawn.
    pub fn withdraw_saturating(&self, amount: u64) -> u64 {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let taken = current.min(amount);
            match self.0.compare_exchange_weak(
                current,
                current - taken,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return taken,
                Err(updated) => current = updated,
            }
        }
    }

    /// Deposits the specified `amount` into the counter.
    pub fn deposit(&self, amount: u64) {
        self.0.fetch_add(amount, Ordering::Release);
    }

    /// Returns the counter value (most likely stale by the time it is observed by the caller).
    pub fn read(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Sets the counter to 0, returning the previous value.
    pub fn drain(&self) -> u64 {
        self.0.swap(0, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_withdraw_saturating() {
        let counter = Counter::default();
        counter.deposit(100);
        assert_eq!(counter.withdraw_saturating(40), 40);
        assert_eq!(counter.withdraw_saturating(100), 60);
        assert_eq!(counter.read(), 0);
        assert_eq!(counter.withdraw_saturating(5), 0);
    }

    #[test]
    fn test_deposit_and_drain() {
        let counter = Counter::default();
        counter.deposit(50);
        counter.deposit(25);
        assert_eq!(counter.drain(), 75);
        assert_eq!(counter.read(), 0);
    }

    #[test]
    fn test_concurrent_deposit_and_withdraw() {
        let counter = Arc::new(Counter::default());
        counter.deposit(500);
        let handles = (0..8)
            .map(|i| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    let mut withdrawn = 0;
                    for _ in 0..100 {
                        if i % 2 == 0 {
                            counter.deposit(10);
                        } else {
                            withdrawn += counter.withdraw_saturating(5);
                        }
                    }
                    withdrawn
                })
            })
            .collect::<Vec<_>>();
        let total_withdrawn: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(counter.read(), 500 + 4 * 100 * 10 - total_withdrawn);
    }
}
