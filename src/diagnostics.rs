//! Out-of-band diagnostics (spec §7 "Propagation policy"): the audio
//! thread never unwinds or logs synchronously; it only increments atomic
//! counters, which the UI thread periodically drains and forwards to the
//! [`log`] facade.

use crate::compat::{AtomicU64, Ordering};
use crate::snapshot::OverflowCounters;

#[derive(Debug, Default)]
pub struct Counters {
    pub snapshot_notes_dropped: AtomicU64,
    pub snapshot_automation_dropped: AtomicU64,
    pub event_overflow: AtomicU64,
    pub plugin_process_failures: AtomicU64,
    pub graph_silenced_blocks: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_plugin_failure(&self) {
        self.plugin_process_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_overflow(&self, n: u64) {
        if n > 0 {
            self.event_overflow.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn record_silenced_block(&self) {
        self.graph_silenced_blocks.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold one [`StateExchange::publish`](crate::exchange::StateExchange::publish)
    /// call's overflow report into the running totals (spec §7 "Snapshot
    /// overflow"). Called from the UI thread, same as `publish` itself.
    pub fn record_snapshot_overflow(&self, overflow: OverflowCounters) {
        if overflow.notes_dropped > 0 {
            self.snapshot_notes_dropped
                .fetch_add(overflow.notes_dropped, Ordering::Relaxed);
        }
        let automation_dropped =
            overflow.automation_lanes_dropped + overflow.automation_points_dropped;
        if automation_dropped > 0 {
            self.snapshot_automation_dropped
                .fetch_add(automation_dropped, Ordering::Relaxed);
        }
    }

    /// Read all counters and reset them to zero, logging anything
    /// non-trivial through the `log` facade. Meant to be called from the
    /// UI thread on a timer, not from the audio thread.
    pub fn drain_and_log(&self) {
        let failures = self.plugin_process_failures.swap(0, Ordering::Relaxed);
        let overflow = self.event_overflow.swap(0, Ordering::Relaxed);
        let silenced = self.graph_silenced_blocks.swap(0, Ordering::Relaxed);
        let notes = self.snapshot_notes_dropped.swap(0, Ordering::Relaxed);
        let automation = self.snapshot_automation_dropped.swap(0, Ordering::Relaxed);

        if failures > 0 {
            log::warn!("plugin process failures this period: {failures}");
        }
        if overflow > 0 {
            log::warn!("event list overflow dropped {overflow} events this period");
        }
        if silenced > 0 {
            log::debug!("{silenced} blocks silenced by rebuild this period");
        }
        if notes > 0 || automation > 0 {
            log::warn!(
                "snapshot overflow: {notes} notes, {automation} automation points dropped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_drain_resets() {
        let counters = Counters::new();
        counters.record_plugin_failure();
        counters.record_event_overflow(3);
        assert_eq!(
            counters.plugin_process_failures.load(Ordering::Relaxed),
            1
        );
        counters.drain_and_log();
        assert_eq!(
            counters.plugin_process_failures.load(Ordering::Relaxed),
            0
        );
    }

    #[test]
    fn snapshot_overflow_folds_notes_and_automation() {
        let counters = Counters::new();
        counters.record_snapshot_overflow(OverflowCounters {
            notes_dropped: 2,
            automation_lanes_dropped: 1,
            automation_points_dropped: 3,
        });
        assert_eq!(
            counters.snapshot_notes_dropped.load(Ordering::Relaxed),
            2
        );
        assert_eq!(
            counters.snapshot_automation_dropped.load(Ordering::Relaxed),
            4
        );
    }
}
