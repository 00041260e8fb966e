use dashmap::DashSet;
use std::sync::Arc;

/// Duplicate-submission guard keyed by thread.
///
/// `try_acquire` is an atomic check-and-set; the returned lease clears the key
/// when dropped, including on early return and unwinding.
#[derive(Debug, Clone, Default)]
pub struct ThreadGuard {
    active: Arc<DashSet<String>>,
}

impl ThreadGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, key: &str) -> Option<ThreadLease> {
        if self.active.insert(key.to_string()) {
            Some(ThreadLease {
                active: Arc::clone(&self.active),
                key: key.to_string(),
            })
        } else {
            None
        }
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.active.contains(key)
    }
}

#[derive(Debug)]
pub struct ThreadLease {
    active: Arc<DashSet<String>>,
    key: String,
}

impl Drop for ThreadLease {
    fn drop(&mut self) {
        self.active.remove(&self.key);
    }
}
