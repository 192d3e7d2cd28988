//! The audio engine (spec §4.7): the device-callback entry point that ties
//! [`crate::exchange::StateExchange`], [`crate::scheduler::Scheduler`], and
//! [`crate::graph::Graph`] together into one `render` call.
//!
//! Grounded on `tutti-core::callback::process_audio` / `AudioCallbackState`
//! for the overall shape (a plain struct owning everything the callback
//! touches, one `render`/`process_audio` entry point, CPU metering wrapped
//! around the real work) — generalized from a single `fundsp::Net` call to
//! chunked `Scheduler::populate` + `Graph::process` calls bounded by
//! `max_block`.

use std::time::Instant;

use crate::config::EngineConfig;
use crate::diagnostics::Counters;
use crate::error::Result;
use crate::exchange::StateExchange;
use crate::graph::Graph;
use crate::metering::{CpuMeter, CpuMetrics};
use crate::model::SessionModel;
use crate::plugin::JobQueue;
use crate::scheduler::Scheduler;
use crate::transport::TransportClock;

/// Owns the whole audio-thread-side state: the snapshot exchange, the node
/// graph, the scheduler, the transport clock, and CPU telemetry. One
/// `AudioEngine` per device stream.
pub struct AudioEngine {
    exchange: StateExchange,
    graph: Graph,
    scheduler: Scheduler,
    transport: TransportClock,
    meter: CpuMeter,
    counters: Counters,
    max_block: usize,
    job_queue: Option<std::sync::Arc<dyn JobQueue>>,
}

impl AudioEngine {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            exchange: StateExchange::new(config),
            graph: Graph::build(config)?,
            scheduler: Scheduler::new(config.track_count),
            transport: TransportClock::new(config.sample_rate),
            meter: CpuMeter::new(config.sample_rate),
            counters: Counters::new(),
            max_block: config.max_block,
            job_queue: None,
        })
    }

    /// Attach the external work-stealing pool (spec §6.2); its sleep hint
    /// is retuned from [`crate::metering::LoadBand`] after every block.
    pub fn set_job_queue(&mut self, job_queue: std::sync::Arc<dyn JobQueue>) {
        self.job_queue = Some(job_queue);
    }

    pub fn exchange(&self) -> &StateExchange {
        &self.exchange
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn cpu_metrics(&self) -> CpuMetrics {
        self.meter.metrics()
    }

    /// UI-thread convenience: publish a fresh snapshot from `model`,
    /// folding any truncation it caused into `counters()` (spec §7).
    pub fn publish(&self, model: &SessionModel) {
        let overflow = self.exchange.publish(model);
        self.counters.record_snapshot_overflow(overflow);
    }

    /// The device-callback entry point (spec §4.7 "render"). `output` is
    /// interleaved stereo, `output.len() == frames * 2`.
    ///
    /// 1. beginProcess (acquire snapshot, bail to silence if rebuilding)
    /// 2. zero `output`
    /// 3. (rebuild-in-flight case folded into step 1)
    /// 4. already acquired in step 1
    /// 5. chunk into `<= max_block` pieces: populate + process per chunk
    /// 6. advance steady_time / playhead_beat
    /// 7. endProcess (snapshot guard drops, releasing `processing`)
    pub fn render(&mut self, output: &mut [f32], frames: usize) {
        debug_assert_eq!(output.len(), frames * 2);
        let started = Instant::now();
        for sample in output.iter_mut() {
            *sample = 0.0;
        }

        let Some(guard) = self.exchange.begin_process() else {
            self.counters.record_silenced_block();
            self.meter.record(frames, started.elapsed());
            return;
        };
        let snapshot = guard.snapshot;

        let mut rendered = 0usize;
        while rendered < frames {
            let chunk = (frames - rendered).min(self.max_block);
            self.scheduler.populate(
                snapshot,
                &mut self.graph,
                chunk,
                &self.transport,
                &self.counters,
            );
            self.graph
                .process(snapshot, chunk, self.transport.steady_time(), &self.counters);

            let master = self.graph.master_output();
            for i in 0..chunk {
                output[(rendered + i) * 2] = master[i][0];
                output[(rendered + i) * 2 + 1] = master[i][1];
            }

            self.transport.advance(chunk as u64);
            rendered += chunk;
        }
        drop(guard);

        self.meter.record(frames, started.elapsed());
        if let Some(job_queue) = &self.job_queue {
            job_queue.set_sleep_ns(self.meter.load_band().sleep_ns());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventList;
    use crate::model::{ClipState, Note, PianoClip, SessionModel};
    use crate::plugin::PluginAbi;

    /// A minimal instrument that emits a constant amplitude while any note
    /// is held, silence otherwise — enough to drive spec §8's end-to-end
    /// scenarios without a real plugin ABI adapter.
    struct ConstantSynth {
        amplitude: f32,
        held: u32,
    }

    impl ConstantSynth {
        fn new(amplitude: f32) -> Self {
            Self { amplitude, held: 0 }
        }
    }

    impl PluginAbi for ConstantSynth {
        fn activate(&mut self, _sample_rate: f64, _min_block: usize, _max_block: usize) -> bool {
            true
        }
        fn start_processing(&mut self) -> bool {
            true
        }
        fn process(
            &mut self,
            _in_audio: &[[f32; 2]],
            out_audio: &mut [[f32; 2]],
            in_events: &EventList,
            _out_events: &mut EventList,
            _frames: usize,
            _steady_time: u64,
        ) -> bool {
            for event in in_events.as_slice() {
                match event.payload {
                    crate::events::EventPayload::NoteOn { .. } => self.held += 1,
                    crate::events::EventPayload::NoteOff { .. } => {
                        self.held = self.held.saturating_sub(1)
                    }
                    _ => {}
                }
            }
            let level = if self.held > 0 { self.amplitude } else { 0.0 };
            for frame in out_audio.iter_mut() {
                *frame = [level, level];
            }
            true
        }
        fn stop_processing(&mut self) {}
        fn deactivate(&mut self) {}
        fn get_extension(&self, _id: &str) -> Option<&dyn std::any::Any> {
            None
        }
    }

    fn scenario_config() -> EngineConfig {
        EngineConfig {
            sample_rate: 48000.0,
            max_block: 128,
            track_count: 1,
            scene_count: 1,
            max_fx_slots: 0,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn silence_when_no_clip_is_playing() {
        let config = scenario_config();
        let mut engine = AudioEngine::new(&config).unwrap();
        let model = SessionModel::new(config.track_count, config.scene_count, config.max_fx_slots);
        engine.publish(&model);

        let mut output = vec![1.0f32; 256 * 2];
        engine.render(&mut output, 256);
        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn constant_synth_renders_note_at_full_then_half_volume() {
        let config = scenario_config();
        let mut engine = AudioEngine::new(&config).unwrap();
        let node_ids = engine.graph_mut().track_nodes()[0].clone();
        engine
            .graph_mut()
            .set_plugin(node_ids.synth, Some(Box::new(ConstantSynth::new(1.0))));

        let mut model = SessionModel::new(config.track_count, config.scene_count, config.max_fx_slots);
        model.transport.bpm = 120.0;
        model.transport.playing = true;
        model.tracks[0].volume = 0.5;
        let mut clip = PianoClip::new(4.0);
        clip.notes.push(Note::new(60, 0.0, 4.0, 1.0));
        model.tracks[0].slots[0].clip = Some(clip);
        model.tracks[0].slots[0].state = ClipState::Playing;
        model.tracks[0].slots[0].length_beats = 4.0;
        engine.publish(&model);

        let mut output = vec![0.0f32; 512 * 2];
        engine.render(&mut output, 512);
        // Track volume of 0.5 halves the ConstantSynth's 1.0 output once the
        // note is sounding.
        assert!(output[output.len() - 2] > 0.0);
        assert!((output[output.len() - 2] - 0.5).abs() < 1e-4);
    }
}
