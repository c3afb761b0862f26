//! Cooperative cancellation.
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Polled by long running analyses at well defined points.
///
/// Analyses never get interrupted preemptively. They check the monitor once per literal pair,
/// at the top of every enumeration step and whenever a blocked producer or consumer wakes up.
pub trait Monitor: Sync {
    fn is_canceled(&self) -> bool;
}

/// A monitor that never requests cancellation.
#[derive(Copy, Clone, Default, Debug)]
pub struct NeverCancel;

impl Monitor for NeverCancel {
    fn is_canceled(&self) -> bool {
        false
    }
}

/// A cancellation flag shared between the thread requesting cancellation and the analyses.
#[derive(Clone, Default, Debug)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> CancelFlag {
        CancelFlag::default()
    }

    /// Requests cancellation. Cannot be undone.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

impl Monitor for CancelFlag {
    fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let flag = CancelFlag::new();
        let observer = flag.clone();

        assert!(!observer.is_canceled());
        flag.cancel();
        assert!(observer.is_canceled());
        assert!(!NeverCancel.is_canceled());
    }
}
