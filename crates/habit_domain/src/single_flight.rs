use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

/// Keys with an operation currently outstanding.
#[derive(Debug, Default, Clone)]
pub struct InFlight {
    keys: Arc<Mutex<HashSet<String>>>,
}

/// Holds a key busy until dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    keys: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`, or `None` when another holder already has it.
    pub fn try_acquire(&self, key: &str) -> Option<InFlightGuard> {
        if !self.keys.lock().insert(key.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            keys: Arc::clone(&self.keys),
            key: key.to_string(),
        })
    }

    #[cfg(test)]
    fn is_busy(&self, key: &str) -> bool {
        self.keys.lock().contains(key)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.keys.lock().remove(&self.key);
    }
}
