//! The scheduler (spec §4.6): six per-block responsibilities executed
//! before [`crate::graph::Graph::process`], turning clip/automation/live
//! input into the event lists each `NoteSource` node carries into this
//! block's plugin calls.

use crate::compat::HashMap;
use crate::config::QuantizeIndex;
use crate::diagnostics::Counters;
use crate::events::EventPayload;
use crate::graph::Graph;
use crate::model::ClipState;
use crate::snapshot::{ClipSnapshot, StateSnapshot};
use crate::transport::TransportClock;

/// A note recorded live during a `Recording` clip slot, emitted to the UI
/// thread for persistence into the target [`crate::model::PianoClip`].
/// The audio thread never mutates `SessionModel` directly — it only
/// reports what happened.
#[derive(Debug, Clone, Copy)]
pub struct RecordedNote {
    pub track: usize,
    pub scene: usize,
    pub pitch: u8,
    pub start: f64,
    pub duration: f64,
    pub velocity: f32,
}

/// Per-track playback state the scheduler owns (spec §4.6 #1: "advance
/// queued slots to playing/stopped"). `SessionModel`/`StateSnapshot` stay
/// read-only on the audio thread (spec §3 "Lifecycle & ownership"), so the
/// *effective* transition the clip slot has actually reached is tracked
/// here rather than written back into the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TrackPlayback {
    playing_scene: Option<usize>,
    queued_scene: Option<usize>,
    recording_scene: Option<usize>,
}

impl Default for TrackPlayback {
    fn default() -> Self {
        Self {
            playing_scene: None,
            queued_scene: None,
            recording_scene: None,
        }
    }
}

pub struct Scheduler {
    track_count: usize,
    playhead_beat: f64,
    playback: Vec<TrackPlayback>,
    prev_raw_state: Vec<Vec<ClipState>>,
    /// `hanging[track]`: pitch -> beat the note should end, for notes
    /// whose `NoteOff` didn't fall in the block that emitted their
    /// `NoteOn` (spec §4.6 #3 "carry to the next block").
    hanging: Vec<HashMap<u8, f64>>,
    prev_live_key_state: Vec<[bool; 128]>,
    recorded_notes_tx: crossbeam_channel::Sender<RecordedNote>,
    recorded_notes_rx: crossbeam_channel::Receiver<RecordedNote>,
}

impl Scheduler {
    pub fn new(track_count: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(256);
        Self {
            track_count,
            playhead_beat: 0.0,
            playback: vec![TrackPlayback::default(); track_count],
            prev_raw_state: Vec::new(),
            hanging: vec![HashMap::new(); track_count],
            prev_live_key_state: vec![[false; 128]; track_count],
            recorded_notes_tx: tx,
            recorded_notes_rx: rx,
        }
    }

    /// UI-thread drain of notes recorded live since the last call.
    pub fn drain_recorded_notes(&self) -> Vec<RecordedNote> {
        self.recorded_notes_rx.try_iter().collect()
    }

    pub fn playhead_beat(&self) -> f64 {
        self.playhead_beat
    }

    /// Populate every `NoteSource` node's event list for this block
    /// (spec §4.6). Must run before [`Graph::process`].
    pub fn populate(
        &mut self,
        snapshot: &StateSnapshot,
        graph: &mut Graph,
        frames: usize,
        transport: &TransportClock,
        counters: &Counters,
    ) {
        if self.prev_raw_state.is_empty() {
            self.prev_raw_state = snapshot
                .tracks
                .iter()
                .map(|t| t.clips.iter().map(|c| c.state).collect())
                .collect();
            self.playhead_beat = snapshot.transport.playhead_beat;
            // A clip can already be Playing/Recording the first time the
            // scheduler ever sees a snapshot (no queue-boundary transition
            // to observe), so seed playback state directly from it.
            for (t, track_snap) in snapshot.tracks.iter().enumerate() {
                for (s, clip) in track_snap.clips.iter().enumerate() {
                    match clip.state {
                        ClipState::Playing => self.playback[t].playing_scene = Some(s),
                        ClipState::Recording => {
                            self.playback[t].playing_scene = Some(s);
                            self.playback[t].recording_scene = Some(s);
                        }
                        _ => {}
                    }
                }
            }
        }
        if !snapshot.transport.playing {
            // Keep the displayed playhead in sync with UI-initiated seeks
            // while stopped; resume advancing independently once playing.
            self.playhead_beat = snapshot.transport.playhead_beat;
        }

        let bps = transport.beats_per_sample(snapshot.transport.bpm);

        graph.clear_note_source_events(counters);

        self.track_quantize_transitions(snapshot);

        for track in 0..self.track_count.min(snapshot.tracks.len()) {
            self.emit_clip_events(track, snapshot, graph, frames, bps);
        }

        self.emit_live_keyboard_events(snapshot, graph, frames);
        self.emit_automation_events(snapshot, graph, frames, bps);

        // Every NoteSource's list was filled in insertion order across the
        // three passes above; sort each into non-decreasing frame_offset
        // (tie-broken ParamValue < NoteOff < NoteOn) before Graph::process
        // forwards it to a plugin (spec §4.3).
        graph.sort_note_source_events();

        if snapshot.transport.playing {
            self.playhead_beat += frames as f64 * bps;
        }
    }

    /// Responsibility #1: quantize-boundary transitions.
    fn track_quantize_transitions(&mut self, snapshot: &StateSnapshot) {
        for (t, track_snap) in snapshot.tracks.iter().enumerate() {
            if t >= self.prev_raw_state.len() {
                continue;
            }
            for (s, clip) in track_snap.clips.iter().enumerate() {
                if s >= self.prev_raw_state[t].len() {
                    continue;
                }
                let was = self.prev_raw_state[t][s];
                let now = clip.state;
                if now != was {
                    match now {
                        ClipState::Queued => self.playback[t].queued_scene = Some(s),
                        ClipState::QueuedRecording => {
                            self.playback[t].queued_scene = Some(s);
                            self.playback[t].recording_scene = Some(s);
                        }
                        ClipState::Recording => {
                            self.playback[t].playing_scene = Some(s);
                            self.playback[t].recording_scene = Some(s);
                        }
                        ClipState::Stopped | ClipState::Empty => {
                            if self.playback[t].playing_scene == Some(s) {
                                self.playback[t].playing_scene = None;
                                self.hanging[t].clear();
                            }
                            if self.playback[t].recording_scene == Some(s) {
                                self.playback[t].recording_scene = None;
                            }
                        }
                        _ => {}
                    }
                    self.prev_raw_state[t][s] = now;
                }
            }
        }
    }

    /// Responsibilities #2 and #3: loop wrap plus clip-to-NoteSource
    /// event generation for one track.
    fn emit_clip_events(
        &mut self,
        track: usize,
        snapshot: &StateSnapshot,
        graph: &mut Graph,
        frames: usize,
        bps: f64,
    ) {
        let Some(q_index) = QuantizeIndex::from_index(snapshot.transport.quantize_index) else {
            return;
        };
        let q = q_index.beats();

        // Quantize boundary: commit a queued launch once the playhead
        // crosses the next multiple of `q`.
        if let Some(queued_scene) = self.playback[track].queued_scene {
            let before = (self.playhead_beat / q).floor();
            let after = ((self.playhead_beat + frames as f64 * bps) / q).floor();
            if after > before {
                if let Some(prev_scene) = self.playback[track].playing_scene {
                    self.flush_all_notes_off(track, prev_scene, graph);
                }
                self.playback[track].playing_scene = Some(queued_scene);
                self.playback[track].queued_scene = None;
            }
        }

        let Some(scene) = self.playback[track].playing_scene else {
            return;
        };
        if scene >= snapshot.tracks[track].clips.len() {
            return;
        }
        let clip_snap: &ClipSnapshot = &snapshot.tracks[track].clips[scene];
        if !matches!(clip_snap.state, ClipState::Playing | ClipState::Recording) {
            return;
        }
        let loop_length = clip_snap.piano.length_beats.max(clip_snap.length_beats);
        if loop_length <= 0.0 {
            return;
        }

        let instrument_note_source = graph.instrument_note_source(track);
        let start = self.playhead_beat.rem_euclid(loop_length);
        let mut end = start + frames as f64 * bps;
        let wraps = end >= loop_length;
        if wraps {
            end -= loop_length;
        }

        for note in &clip_snap.piano.notes {
            let in_window = |beat: f64| -> Option<f64> {
                if !wraps {
                    (beat >= start && beat < end).then_some(beat - start)
                } else if beat >= start {
                    Some(beat - start)
                } else if beat < end {
                    Some(beat + (loop_length - start))
                } else {
                    None
                }
            };

            if let Some(delta) = in_window(note.start) {
                let offset = ((delta / bps).round() as i64).clamp(0, frames as i64 - 1) as u32;
                graph
                    .note_source_events_mut(instrument_note_source)
                    .push(crate::events::TimedEvent {
                        frame_offset: offset,
                        payload: EventPayload::NoteOn {
                            channel: 0,
                            key: note.pitch,
                            velocity: note.velocity,
                        },
                    });
                self.hanging[track].insert(note.pitch, note.start + note.duration);
            }

            // A note as long as (or longer than) the loop itself never
            // retriggers its own note-off each pass; it only ends when the
            // clip stops (`flush_all_notes_off`).
            let note_off_beat = (note.start + note.duration).rem_euclid(loop_length.max(1e-9));
            if note.duration < loop_length {
                if let Some(delta) = in_window(note_off_beat) {
                    let offset = ((delta / bps).round() as i64).clamp(0, frames as i64 - 1) as u32;
                    graph
                        .note_source_events_mut(instrument_note_source)
                        .push(crate::events::TimedEvent {
                            frame_offset: offset,
                            payload: EventPayload::NoteOff {
                                channel: 0,
                                key: note.pitch,
                                release_velocity: 0.0,
                            },
                        });
                    self.hanging[track].remove(&note.pitch);
                }
            }
        }

        if wraps {
            self.hanging[track].clear();
        }
    }

    fn flush_all_notes_off(&mut self, track: usize, scene: usize, graph: &mut Graph) {
        let instrument_note_source = graph.instrument_note_source(track);
        for &pitch in self.hanging[track].keys() {
            graph
                .note_source_events_mut(instrument_note_source)
                .push(crate::events::TimedEvent {
                    frame_offset: 0,
                    payload: EventPayload::NoteOff {
                        channel: 0,
                        key: pitch,
                        release_velocity: 0.0,
                    },
                });
        }
        self.hanging[track].clear();
        let _ = scene;
    }

    /// Responsibility #4: live keyboard -> armed track.
    fn emit_live_keyboard_events(&mut self, snapshot: &StateSnapshot, graph: &mut Graph, _frames: usize) {
        let Some(armed_track) = snapshot.recording.armed_track else {
            self.sync_prev_live_key_state(snapshot);
            return;
        };
        if armed_track >= snapshot.tracks.len() {
            return;
        }
        let instrument_note_source = graph.instrument_note_source(armed_track);
        let now = snapshot.live_key_state[armed_track];
        let was = self
            .prev_live_key_state
            .get(armed_track)
            .copied()
            .unwrap_or([false; 128]);

        for pitch in 0u8..128 {
            let pressed_now = now[pitch as usize];
            let pressed_before = was[pitch as usize];
            if pressed_now && !pressed_before {
                graph
                    .note_source_events_mut(instrument_note_source)
                    .push(crate::events::TimedEvent {
                        frame_offset: 0,
                        payload: EventPayload::NoteOn {
                            channel: 0,
                            key: pitch,
                            velocity: 1.0,
                        },
                    });
            } else if !pressed_now && pressed_before {
                graph
                    .note_source_events_mut(instrument_note_source)
                    .push(crate::events::TimedEvent {
                        frame_offset: 0,
                        payload: EventPayload::NoteOff {
                            channel: 0,
                            key: pitch,
                            release_velocity: 0.0,
                        },
                    });

                if let Some(start) = snapshot.recording.note_start_beat[pitch as usize] {
                    if let Some(scene) = self.playback[armed_track].recording_scene {
                        let duration = (self.playhead_beat - start).max(1.0 / 96.0);
                        let _ = self.recorded_notes_tx.try_send(RecordedNote {
                            track: armed_track,
                            scene,
                            pitch,
                            start,
                            duration,
                            velocity: 1.0,
                        });
                    }
                }
            }
        }

        if snapshot.tracks.len() == self.prev_live_key_state.len() {
            self.prev_live_key_state[armed_track] = now;
        } else {
            self.sync_prev_live_key_state(snapshot);
        }
    }

    /// Copy `snapshot.live_key_state` into `prev_live_key_state` in place
    /// (both are fixed-size `[bool; 128]` per track) so no track is armed
    /// this block without allocating a fresh `Vec` to hold the copy.
    fn sync_prev_live_key_state(&mut self, snapshot: &StateSnapshot) {
        let n = self.prev_live_key_state.len().min(snapshot.live_key_state.len());
        self.prev_live_key_state[..n].copy_from_slice(&snapshot.live_key_state[..n]);
    }

    /// Responsibility #5: automation -> ParamValue events, breakpoint-only
    /// (see `SPEC_FULL.md` §9 on the Open Question decision).
    fn emit_automation_events(
        &mut self,
        snapshot: &StateSnapshot,
        graph: &mut Graph,
        frames: usize,
        bps: f64,
    ) {
        for (t, track_snap) in snapshot.tracks.iter().enumerate() {
            if t >= self.track_count {
                continue;
            }
            let Some(scene) = self.playback[t].playing_scene else {
                continue;
            };
            if scene >= track_snap.clips.len() {
                continue;
            }
            let clip = &track_snap.clips[scene];
            if !matches!(clip.state, ClipState::Playing | ClipState::Recording) {
                continue;
            }
            let loop_length = clip.piano.length_beats.max(clip.length_beats).max(1e-9);
            let start = self.playhead_beat.rem_euclid(loop_length);
            let mut end = start + frames as f64 * bps;
            let wraps = end >= loop_length;
            if wraps {
                end -= loop_length;
            }

            let instrument_note_source = graph.instrument_note_source(t);
            for lane in &clip.piano.automation {
                for point in &lane.points {
                    let in_window = if !wraps {
                        point.time >= start && point.time < end
                    } else {
                        point.time >= start || point.time < end
                    };
                    if !in_window {
                        continue;
                    }
                    let delta = if point.time >= start {
                        point.time - start
                    } else {
                        point.time + (loop_length - start)
                    };
                    let offset = ((delta / bps).round() as i64).clamp(0, frames as i64 - 1) as u32;
                    // Parameter events ride into the plugin via the event
                    // port its own NoteSource feeds.
                    let event_source = match lane.target.fx_slot {
                        Some(slot) => graph.fx_note_source(t, slot).unwrap_or(instrument_note_source),
                        None => instrument_note_source,
                    };
                    graph.note_source_events_mut(event_source).push(crate::events::TimedEvent {
                        frame_offset: offset,
                        payload: EventPayload::ParamValue {
                            param_id: lane.target.param_id,
                            value: point.value,
                        },
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::graph::Graph;
    use crate::model::{ClipState, Note, PianoClip, SessionModel};
    use crate::snapshot::{build_snapshot, StateSnapshot};

    fn setup() -> (EngineConfig, SessionModel) {
        let config = EngineConfig {
            track_count: 1,
            scene_count: 1,
            max_fx_slots: 0,
            max_block: 128,
            sample_rate: 48000.0,
            ..EngineConfig::default()
        };
        let mut model = SessionModel::new(config.track_count, config.scene_count, config.max_fx_slots);
        model.transport.bpm = 120.0;
        model.transport.playing = true;
        let mut clip = PianoClip::new(4.0);
        clip.notes.push(Note::new(60, 0.0, 1.0, 1.0));
        model.tracks[0].slots[0].clip = Some(clip);
        model.tracks[0].slots[0].state = ClipState::Playing;
        model.tracks[0].slots[0].length_beats = 4.0;
        (config, model)
    }

    #[test]
    fn emits_note_on_at_block_start() {
        let (config, model) = setup();
        let mut graph = Graph::build(&config).unwrap();
        let mut snap = StateSnapshot::new(&config);
        build_snapshot(&model, &mut snap);
        let mut scheduler = Scheduler::new(config.track_count);
        let transport = TransportClock::new(config.sample_rate);

        let counters = Counters::new();
        scheduler.populate(&snap, &mut graph, 128, &transport, &counters);
        let node_ids = graph.track_nodes()[0].clone();
        let events = graph.note_source_events_mut(node_ids.instrument_note_source);
        assert!(events
            .as_slice()
            .iter()
            .any(|e| matches!(e.payload, EventPayload::NoteOn { key: 60, .. })));
    }
}
