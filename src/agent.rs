//! Agent Loop (§4.8), Specialist Agents (§4.9), and the Brain (§4.10).

pub mod brain;
pub mod loop_;
pub mod specialist;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide kill flag, checked by every Agent Loop between steps
/// (§5 "Cancellation"). Cheap to clone: the flag is reference-counted.
#[derive(Clone, Default)]
pub struct KillSwitch(Arc<AtomicBool>);

impl KillSwitch {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clears the flag after propagation so subsequent tasks may run.
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clear_and_round_trips() {
        let kill = KillSwitch::new();
        assert!(!kill.is_set());
        kill.set();
        assert!(kill.is_set());
        kill.clear();
        assert!(!kill.is_set());
    }

    #[test]
    fn clones_share_the_same_flag() {
        let kill = KillSwitch::new();
        let other = kill.clone();
        kill.set();
        assert!(other.is_set());
    }
}
