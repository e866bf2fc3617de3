//! Callback statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing how a device's callbacks have been running.
///
/// Underruns and overruns are degraded timing, not errors: the audio thread
/// fills silence (or drops samples) and keeps going.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Callbacks processed since the device was created.
    pub callbacks: u64,
    /// Times a FIFO could not supply a full buffer.
    pub underruns: u64,
    /// Times a FIFO could not accept a full buffer.
    pub overruns: u64,
}

/// Internal counters shared between a device and its audio callbacks.
#[derive(Debug, Default)]
pub(crate) struct StatsState {
    callbacks: AtomicU64,
    underruns: AtomicU64,
    overruns: AtomicU64,
}

impl StatsState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_callback(&self) {
        self.callbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DeviceStats {
        DeviceStats {
            callbacks: self.callbacks.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_default() {
        let stats = DeviceStats::default();
        assert_eq!(stats.callbacks, 0);
        assert_eq!(stats.underruns, 0);
        assert_eq!(stats.overruns, 0);
    }

    #[test]
    fn test_state_snapshot() {
        let state = StatsState::new();
        state.record_callback();
        state.record_callback();
        state.record_underrun();
        state.record_overrun();

        assert_eq!(
            state.snapshot(),
            DeviceStats {
                callbacks: 2,
                underruns: 1,
                overruns: 1,
            }
        );
    }
}
