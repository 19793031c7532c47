//! Call identifier allocation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out call identifiers for one connection.
///
/// Identifiers start at 1 and strictly increase. Overflow wraps, but a
/// connection is expected to be recycled long before 2^64 calls.
#[derive(Debug)]
pub struct NonceAllocator {
    next: AtomicU64,
}

impl NonceAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns an identifier greater than every one returned before.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for NonceAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_starts_at_one_and_increases() {
        let nonce = NonceAllocator::new();
        assert_eq!(nonce.next(), 1);
        assert_eq!(nonce.next(), 2);
        assert_eq!(nonce.next(), 3);
    }

    #[test]
    fn test_concurrent_allocation_is_unique() {
        let nonce = Arc::new(NonceAllocator::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let nonce = nonce.clone();
                std::thread::spawn(move || {
                    let mut ids: Vec<u64> = (0..1000).map(|_| nonce.next()).collect();
                    // Per thread, the sequence must be strictly increasing.
                    assert!(ids.windows(2).all(|w| w[0] < w[1]));
                    ids.sort_unstable();
                    ids
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "id {} handed out twice", id);
            }
        }
        assert_eq!(seen.len(), 8000);
        assert_eq!(nonce.next(), 8001);
    }
}
