//! Per-order exclusive try-locks.
//!
//! Short-lived locks serializing writes to a single order. Non-blocking:
//! a failed acquisition tells the caller to retry on the next tick. Stale
//! holders are evicted after the TTL so a crashed task cannot wedge an
//! order forever.

use std::time::{Duration, Instant};

use dashmap::DashMap;

pub const LOCK_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct LockHolder {
    holder: String,
    expires_at: Instant,
}

#[derive(Default)]
pub struct LockRegistry {
    locks: DashMap<String, LockHolder>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take the lock for `holder`. Succeeds when the key is free,
    /// expired, or already held by the same holder.
    pub fn try_acquire(&self, key: &str, holder: &str) -> bool {
        let now = Instant::now();
        let mut acquired = false;
        let entry = self
            .locks
            .entry(key.to_string())
            .and_modify(|current| {
                if current.holder == holder || current.expires_at <= now {
                    current.holder = holder.to_string();
                    current.expires_at = now + LOCK_TTL;
                    acquired = true;
                }
            })
            .or_insert_with(|| {
                acquired = true;
                LockHolder {
                    holder: holder.to_string(),
                    expires_at: now + LOCK_TTL,
                }
            });
        drop(entry);
        acquired
    }

    /// Release the lock, but only when `holder` still owns it.
    pub fn release(&self, key: &str, holder: &str) -> bool {
        self.locks
            .remove_if(key, |_, current| current.holder == holder)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusive_acquisition() {
        let locks = LockRegistry::new();
        assert!(locks.try_acquire("order:1", "a"));
        assert!(!locks.try_acquire("order:1", "b"));
        // re-entrant for the same holder
        assert!(locks.try_acquire("order:1", "a"));
    }

    #[test]
    fn test_release_requires_matching_holder() {
        let locks = LockRegistry::new();
        assert!(locks.try_acquire("order:1", "a"));
        assert!(!locks.release("order:1", "b"));
        assert!(locks.release("order:1", "a"));
        assert!(locks.try_acquire("order:1", "b"));
    }

    #[test]
    fn test_independent_keys() {
        let locks = LockRegistry::new();
        assert!(locks.try_acquire("order:1", "a"));
        assert!(locks.try_acquire("order:2", "b"));
    }
}
