//! Lock-free UI→audio state handoff (spec §4.1).
//!
//! Two preallocated [`StateSnapshot`]s, an `active_index`, and a
//! `processing` counter — the same acquire/release discipline
//! `tutti-core::transport::manager::TransportManager` uses to gate its
//! command queue against the audio thread, generalized here to a whole
//! snapshot value instead of a command enum.

use crate::compat::{AtomicU32, AtomicUsize, Ordering, UnsafeCell};
use crate::config::EngineConfig;
use crate::lockfree::AtomicFlag;
use crate::model::SessionModel;
use crate::snapshot::{build_snapshot, OverflowCounters, StateSnapshot};

/// Single-producer (UI) / single-consumer (audio) exchange of a
/// [`StateSnapshot`]. The consumer always observes either the last
/// published snapshot in its entirety or the prior one.
pub struct StateExchange {
    buffers: [UnsafeCell<StateSnapshot>; 2],
    active_index: AtomicUsize,
    processing: AtomicU32,
    rebuilding: AtomicFlag,
}

// SAFETY: `buffers` are only written by the UI thread (the inactive one,
// per the publish protocol) and only read by the audio thread (the active
// one). `active_index`/`processing` mediate all access; see §4.1/§5.
unsafe impl Send for StateExchange {}
unsafe impl Sync for StateExchange {}

impl StateExchange {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            buffers: [
                UnsafeCell::new(StateSnapshot::new(config)),
                UnsafeCell::new(StateSnapshot::new(config)),
            ],
            active_index: AtomicUsize::new(0),
            processing: AtomicU32::new(0),
            rebuilding: AtomicFlag::new(false),
        }
    }

    /// UI-thread publish (spec §4.1 "Publish").
    ///
    /// Busy-waits on `processing == 0`, writes the inactive buffer in
    /// place (no allocation — see [`crate::snapshot::build_snapshot`]),
    /// then flips `active_index` with release ordering.
    pub fn publish(&self, model: &SessionModel) -> OverflowCounters {
        while self.processing.load(Ordering::Acquire) != 0 {
            std::hint::spin_loop();
        }
        let active = self.active_index.load(Ordering::Acquire);
        let next = 1 - active;

        // SAFETY: the audio thread only ever reads `buffers[active]`; the
        // inactive slot is exclusively owned by the UI thread between
        // publishes.
        let overflow = unsafe {
            let target = &mut *self.buffers[next].get();
            build_snapshot(model, target)
        };

        self.active_index.store(next, Ordering::Release);
        overflow
    }

    /// Audio-thread acquire (spec §4.1 "Acquire"). Returns `None` while a
    /// rebuild is in flight, matching spec §4.2's "observing `rebuilding
    /// != 0` emits silence for that buffer".
    pub fn begin_process(&self) -> Option<SnapshotGuard<'_>> {
        self.processing.fetch_add(1, Ordering::Relaxed);
        if self.rebuilding.get() {
            self.processing.fetch_sub(1, Ordering::Relaxed);
            return None;
        }
        let active = self.active_index.load(Ordering::Acquire);
        Some(SnapshotGuard {
            exchange: self,
            // SAFETY: `processing` is now > 0, so a rebuild/publish will
            // not touch buffer `active` until we drop this guard.
            snapshot: unsafe { &*self.buffers[active].get() },
        })
    }

    pub fn is_rebuilding(&self) -> bool {
        self.rebuilding.get()
    }

    /// UI-thread rebuild handshake (spec §4.2 "Rebuild"): sets the
    /// `rebuilding` flag, spins until the audio thread is idle, runs `f`,
    /// then clears the flag.
    pub fn with_rebuild_barrier<R>(&self, f: impl FnOnce() -> R) -> R {
        self.rebuilding.set(true);
        while self.processing.load(Ordering::Acquire) != 0 {
            std::hint::spin_loop();
        }
        let result = f();
        self.rebuilding.set(false);
        result
    }
}

/// RAII guard bracketing one audio-thread `process` call (spec §4.1
/// `beginProcess`/`endProcess`).
pub struct SnapshotGuard<'a> {
    exchange: &'a StateExchange,
    pub snapshot: &'a StateSnapshot,
}

impl Drop for SnapshotGuard<'_> {
    fn drop(&mut self) {
        self.exchange.processing.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_then_acquire_sees_published_values() {
        let config = EngineConfig::default();
        let exchange = StateExchange::new(&config);
        let mut model = SessionModel::new(config.track_count, config.scene_count, config.max_fx_slots);
        model.transport.bpm = 140.0;
        exchange.publish(&model);

        let guard = exchange.begin_process().expect("not rebuilding");
        assert_eq!(guard.snapshot.transport.bpm, 140.0);
    }

    #[test]
    fn rebuild_barrier_hides_snapshot_access() {
        let config = EngineConfig::default();
        let exchange = StateExchange::new(&config);
        exchange.with_rebuild_barrier(|| {
            assert!(exchange.begin_process().is_none());
        });
        assert!(exchange.begin_process().is_some());
    }

    #[test]
    fn concurrent_publish_and_acquire_never_tears() {
        use std::sync::Arc;
        use std::thread;

        let config = EngineConfig::default();
        let exchange = Arc::new(StateExchange::new(&config));
        let mut model = SessionModel::new(config.track_count, config.scene_count, config.max_fx_slots);

        let reader_exchange = Arc::clone(&exchange);
        let reader = thread::spawn(move || {
            for _ in 0..2000 {
                if let Some(guard) = reader_exchange.begin_process() {
                    let bpm = guard.snapshot.transport.bpm;
                    assert!(bpm == 120.0 || bpm == 140.0);
                }
            }
        });

        for i in 0..2000 {
            model.transport.bpm = if i % 2 == 0 { 120.0 } else { 140.0 };
            exchange.publish(&model);
        }
        reader.join().unwrap();
    }
}
