use std::sync::atomic::{AtomicU32, Ordering};

use super::saturation::SaturationParams;

/// Lock-free cell holding the live saturation value.
///
/// One writer (the mode controller on the UI thread) stores; the render loop
/// and background jobs load a snapshot whenever they evaluate the filter.
#[derive(Debug)]
pub struct FilterState {
    bits: AtomicU32,
}

impl FilterState {
    pub fn new(params: SaturationParams) -> Self {
        Self {
            bits: AtomicU32::new(params.saturation().to_bits()),
        }
    }

    /// Stores a new value (clamped) and returns what was stored.
    pub fn store(&self, saturation: f32) -> SaturationParams {
        let params = SaturationParams::new(saturation);
        self.bits
            .store(params.saturation().to_bits(), Ordering::Release);
        params
    }

    pub fn snapshot(&self) -> SaturationParams {
        SaturationParams::new(f32::from_bits(self.bits.load(Ordering::Acquire)))
    }

    pub fn reset(&self) -> SaturationParams {
        self.store(SaturationParams::default().saturation())
    }
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new(SaturationParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn store_clamps_and_snapshot_reads_back() {
        let state = FilterState::default();
        assert_eq!(state.snapshot().saturation(), 1.0);
        assert_eq!(state.store(3.0).saturation(), 2.0);
        assert_eq!(state.snapshot().saturation(), 2.0);
        state.reset();
        assert!(state.snapshot().is_identity());
    }

    #[test]
    fn readers_on_other_threads_only_see_stored_values() {
        let state = Arc::new(FilterState::default());
        let reader = {
            let state = state.clone();
            thread::spawn(move || {
                for _ in 0..10_000 {
                    let s = state.snapshot().saturation();
                    assert!(s == 1.0 || s == 0.25 || s == 1.75, "torn read: {s}");
                }
            })
        };
        for i in 0..10_000 {
            state.store(if i % 2 == 0 { 0.25 } else { 1.75 });
        }
        reader.join().unwrap();
    }
}
