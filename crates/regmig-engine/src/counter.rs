//! Lock-guarded counter shared by worker tasks.

use parking_lot::Mutex;

/// A counter incremented from many tasks.
#[derive(Debug, Default)]
pub struct Counter(Mutex<usize>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        *self.0.lock() += 1;
    }

    pub fn count(&self) -> usize {
        *self.0.lock()
    }

    pub fn set(&self, count: usize) {
        *self.0.lock() = count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counts_across_threads() {
        let counter = Arc::new(Counter::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&counter);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        c.increment();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.count(), 800);
        counter.set(3);
        assert_eq!(counter.count(), 3);
    }
}
