//! The external PluginABI and JobQueue boundaries (spec §6.1, §6.2).
//!
//! Neither trait is implemented by this crate — a concrete plugin ABI
//! adapter and a concrete work-stealing pool are external collaborators
//! (spec §1). These traits are the narrow surface the engine calls
//! through; `tests` in [`crate::engine`] implement them with trivial test
//! doubles.

use crate::events::EventList;

/// One per-track instrument handle or per-track-FX-slot handle (spec §6.1).
///
/// Lifecycle is split across threads: `activate`/`deactivate`/`destroy`
/// are main-thread-only; `start_processing`/`process`/`stop_processing`
/// are audio-thread-only. The core never calls `init`/`create` directly —
/// those live in the PluginHost adapter that constructs a `Box<dyn
/// PluginAbi>` and hands it to the graph.
pub trait PluginAbi: Send {
    /// Main thread. Must precede any `process` call.
    fn activate(&mut self, sample_rate: f64, min_block: usize, max_block: usize) -> bool;

    /// Audio thread. Idempotent once `started`.
    fn start_processing(&mut self) -> bool;

    /// Audio thread. `frames <= max_block` from `activate`. Returns
    /// `false` on failure; spec §4.2 says the node then emits silence for
    /// this block without marking the plugin broken.
    fn process(
        &mut self,
        in_audio: &[[f32; 2]],
        out_audio: &mut [[f32; 2]],
        in_events: &EventList,
        out_events: &mut EventList,
        frames: usize,
        steady_time: u64,
    ) -> bool;

    /// Audio thread. Called before `deactivate`.
    fn stop_processing(&mut self);

    /// Main thread. Reverses `activate`.
    fn deactivate(&mut self);

    /// Opaque capability lookup, callable from any thread.
    fn get_extension(&self, id: &str) -> Option<&dyn std::any::Any>;
}

/// Host callbacks exposed to plugins (spec §6.1 "Host callbacks exposed to
/// plugins").
pub trait HostCallbacks: Send + Sync {
    fn is_main_thread(&self) -> bool;
    fn is_audio_thread(&self) -> bool;
    /// Forward a plugin's internal-parallelism request to the JobQueue.
    fn request_exec(&self, task_count: u32, exec: &(dyn Fn(u32) + Sync));
}

/// A work-stealing pool used when a plugin reports internal parallel
/// tasks (spec §6.2). External collaborator; not implemented here.
pub trait JobQueue: Send + Sync {
    fn start(&self);
    fn stop(&self);

    /// Blocks until every task index in `[0, task_count)` has been
    /// dispatched and completed. Called by the audio thread via a
    /// plugin's `thread_pool.exec` fanout.
    fn execute(&self, exec_fn: &(dyn Fn(u32) + Sync), task_count: u32);

    /// Worker idle-sleep hint, tuned from [`crate::metering::LoadBand`].
    fn set_sleep_ns(&self, ns: u64);
}

thread_local! {
    static IS_AUDIO_THREAD: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

/// Per-thread token marking "this is the audio thread" (spec §5, §9). Set
/// once when the audio callback thread starts running.
pub struct ThreadToken;

impl ThreadToken {
    /// Call once from the thread that will drive the audio callback.
    pub fn mark_current_thread_as_audio_thread() {
        IS_AUDIO_THREAD.with(|flag| flag.set(true));
    }

    pub fn is_audio_thread() -> bool {
        IS_AUDIO_THREAD.with(|flag| flag.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullPlugin;
    impl PluginAbi for NullPlugin {
        fn activate(&mut self, _: f64, _: usize, _: usize) -> bool {
            true
        }
        fn start_processing(&mut self) -> bool {
            true
        }
        fn process(
            &mut self,
            _in_audio: &[[f32; 2]],
            out_audio: &mut [[f32; 2]],
            _in_events: &EventList,
            _out_events: &mut EventList,
            _frames: usize,
            _steady_time: u64,
        ) -> bool {
            for frame in out_audio.iter_mut() {
                *frame = [0.0, 0.0];
            }
            true
        }
        fn stop_processing(&mut self) {}
        fn deactivate(&mut self) {}
        fn get_extension(&self, _id: &str) -> Option<&dyn std::any::Any> {
            None
        }
    }

    #[test]
    fn null_plugin_satisfies_the_trait() {
        let mut plugin = NullPlugin;
        assert!(plugin.activate(48000.0, 1, 128));
        assert!(plugin.start_processing());
        let in_audio = [[0.0f32; 2]; 4];
        let mut out_audio = [[1.0f32; 2]; 4];
        let in_events = EventList::with_capacity(4);
        let mut out_events = EventList::with_capacity(4);
        assert!(plugin.process(&in_audio, &mut out_audio, &in_events, &mut out_events, 4, 0));
        assert_eq!(out_audio[0], [0.0, 0.0]);
    }

    #[test]
    fn thread_token_defaults_false() {
        assert!(!ThreadToken::is_audio_thread());
    }
}
