use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(0);

/// Identifies one listener registration.
///
/// Returned by every `add_*` method and accepted by the `remove_*` methods. Each registration
/// receives a fresh identifier, even when the same shared listener is registered more than once,
/// so removal by identifier always targets exactly one registration.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn next() -> Self {
        // Only uniqueness matters, there is no ordering relationship with other memory.
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ListenerId {
    #[cfg_attr(test, mutants::skip)] // No API contract for display format.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}
