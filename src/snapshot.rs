//! The audio-thread-facing [`StateSnapshot`] (spec §3 invariant 5, §4.1,
//! §4.5) and the UI-thread conversion that produces one from a
//! [`crate::model::SessionModel`].
//!
//! Every collection here is pre-sized once (at [`StateSnapshot::new`]) to
//! the capacities in [`crate::config::EngineConfig`] and is only ever
//! `clear()`-ed and refilled in place afterwards — `build_snapshot` never
//! grows a `Vec` past its initial capacity, so publishing a snapshot never
//! allocates on the UI thread's hot path either (keeping publish latency
//! bounded, even though only the audio thread has a hard real-time budget).

use crate::config::EngineConfig;
use crate::model::{ClipState, SessionModel};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteSnapshot {
    pub pitch: u8,
    pub start: f64,
    pub duration: f64,
    pub velocity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutomationPointSnapshot {
    pub time: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutomationTargetSnapshot {
    pub param_id: u32,
    pub fx_slot: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct AutomationLaneSnapshot {
    pub target: AutomationTargetSnapshot,
    pub points: Vec<AutomationPointSnapshot>,
}

impl AutomationLaneSnapshot {
    fn empty(target: AutomationTargetSnapshot, capacity: usize) -> Self {
        Self {
            target,
            points: Vec::with_capacity(capacity),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PianoClipSnapshot {
    pub length_beats: f64,
    pub notes: Vec<NoteSnapshot>,
    pub automation: Vec<AutomationLaneSnapshot>,
}

#[derive(Debug, Clone)]
pub struct ClipSnapshot {
    pub state: ClipState,
    pub length_beats: f64,
    pub piano: PianoClipSnapshot,
}

#[derive(Debug, Clone)]
pub struct TrackSnapshot {
    pub volume: f32,
    pub mute: bool,
    pub solo: bool,
    pub armed: bool,
    /// One entry per scene, index-aligned with [`StateSnapshot::tracks`].
    pub clips: Vec<ClipSnapshot>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingSnapshot {
    pub armed_track: Option<usize>,
    pub start_beat: f64,
    pub note_start_beat: [Option<f64>; 128],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TransportSnapshot {
    pub playing: bool,
    pub bpm: f32,
    pub quantize_index: u8,
    pub playhead_beat: f64,
}

/// Counters for truncation that happened at snapshot-build time (spec §7
/// "Snapshot overflow"). Drained by the UI thread for diagnostics; see
/// [`crate::diagnostics`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OverflowCounters {
    pub notes_dropped: u64,
    pub automation_lanes_dropped: u64,
    pub automation_points_dropped: u64,
}

/// Value copy of the session state, read-only on the audio thread.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub tracks: Vec<TrackSnapshot>,
    pub transport: TransportSnapshot,
    pub recording: RecordingSnapshot,
    /// `live_key_state[track][pitch]`.
    pub live_key_state: Vec<[bool; 128]>,
}

impl StateSnapshot {
    /// Pre-allocate every nested collection to its configured capacity.
    /// Called twice at startup (front and back buffer) — never again.
    pub fn new(config: &EngineConfig) -> Self {
        let make_clip = || ClipSnapshot {
            state: ClipState::Empty,
            length_beats: 0.0,
            piano: PianoClipSnapshot {
                length_beats: 0.0,
                notes: Vec::with_capacity(config.max_notes_per_clip),
                automation: (0..config.max_automation_lanes)
                    .map(|_| {
                        AutomationLaneSnapshot::empty(
                            AutomationTargetSnapshot {
                                param_id: 0,
                                fx_slot: None,
                            },
                            config.max_automation_points,
                        )
                    })
                    .collect(),
            },
        };
        let make_track = || TrackSnapshot {
            volume: 1.0,
            mute: false,
            solo: false,
            armed: false,
            clips: (0..config.scene_count).map(|_| make_clip()).collect(),
        };
        Self {
            tracks: (0..config.track_count).map(|_| make_track()).collect(),
            transport: TransportSnapshot::default(),
            recording: RecordingSnapshot::default(),
            live_key_state: vec![[false; 128]; config.track_count],
        }
    }
}

/// Overwrite `out` in place from `model`, truncating anything beyond the
/// capacities `out` was originally allocated with (spec §3 invariant 5).
/// This is the "overwrite snapshot `next` by value copy" step of the
/// publish protocol (spec §4.1); it performs no allocation as long as
/// `out` was produced by [`StateSnapshot::new`] with the same config.
pub fn build_snapshot(model: &SessionModel, out: &mut StateSnapshot) -> OverflowCounters {
    let mut overflow = OverflowCounters::default();

    out.transport = TransportSnapshot {
        playing: model.transport.playing,
        bpm: model.transport.bpm,
        quantize_index: model.transport.quantize_index,
        playhead_beat: model.transport.playhead_beat,
    };

    out.recording = RecordingSnapshot {
        armed_track: model.recording.armed_track,
        start_beat: model.recording.start_beat,
        note_start_beat: model.recording.note_start_beat,
    };

    for (t, track) in model.tracks.iter().enumerate() {
        if t >= out.tracks.len() {
            break;
        }
        out.live_key_state[t] = model.live_key_state[t];

        let snap_track = &mut out.tracks[t];
        snap_track.volume = track.volume;
        snap_track.mute = track.mute;
        snap_track.solo = track.solo;
        snap_track.armed = track.armed;

        for (s, slot) in track.slots.iter().enumerate() {
            if s >= snap_track.clips.len() {
                break;
            }
            let snap_clip = &mut snap_track.clips[s];
            snap_clip.state = slot.state;
            snap_clip.length_beats = slot.length_beats;
            snap_clip.piano.notes.clear();
            for lane in &mut snap_clip.piano.automation {
                lane.points.clear();
            }

            let Some(clip) = &slot.clip else {
                snap_clip.piano.length_beats = 0.0;
                continue;
            };
            snap_clip.piano.length_beats = clip.length_beats;

            let note_cap = snap_clip.piano.notes.capacity();
            for note in &clip.notes {
                if snap_clip.piano.notes.len() >= note_cap {
                    overflow.notes_dropped += 1;
                    continue;
                }
                snap_clip.piano.notes.push(NoteSnapshot {
                    pitch: note.pitch,
                    start: note.start,
                    duration: note.duration,
                    velocity: note.velocity,
                });
            }

            let lane_cap = snap_clip.piano.automation.len();
            for (li, lane) in clip.automation.iter().enumerate() {
                if li >= lane_cap {
                    overflow.automation_lanes_dropped += 1;
                    continue;
                }
                let snap_lane = &mut snap_clip.piano.automation[li];
                snap_lane.target = AutomationTargetSnapshot {
                    param_id: lane.target.param_id,
                    fx_slot: lane.target.fx_slot,
                };
                let point_cap = snap_lane.points.capacity();
                for point in &lane.points {
                    if snap_lane.points.len() >= point_cap {
                        overflow.automation_points_dropped += 1;
                        continue;
                    }
                    snap_lane.points.push(AutomationPointSnapshot {
                        time: point.time,
                        value: point.value,
                    });
                }
            }
        }
    }

    overflow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AutomationLane, AutomationPoint, AutomationTarget, Note, PianoClip};

    fn cfg() -> EngineConfig {
        EngineConfig {
            track_count: 2,
            scene_count: 2,
            max_notes_per_clip: 2,
            max_automation_lanes: 1,
            max_automation_points: 2,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn round_trip_preserves_fields() {
        let config = cfg();
        let mut model = SessionModel::new(config.track_count, config.scene_count, config.max_fx_slots);
        model.tracks[0].volume = 0.5;
        let mut clip = PianoClip::new(4.0);
        clip.notes.push(Note::new(60, 0.0, 1.0, 1.0));
        model.tracks[0].slots[0].clip = Some(clip);
        model.tracks[0].slots[0].state = ClipState::Playing;
        model.tracks[0].slots[0].length_beats = 4.0;

        let mut snap = StateSnapshot::new(&config);
        let overflow = build_snapshot(&model, &mut snap);
        assert_eq!(overflow.notes_dropped, 0);
        assert_eq!(snap.tracks[0].volume, 0.5);
        assert_eq!(snap.tracks[0].clips[0].piano.notes.len(), 1);
        assert_eq!(snap.tracks[0].clips[0].piano.notes[0].pitch, 60);
    }

    #[test]
    fn overflow_truncates_and_counts() {
        let config = cfg();
        let mut model = SessionModel::new(config.track_count, config.scene_count, config.max_fx_slots);
        let mut clip = PianoClip::new(4.0);
        for i in 0..5 {
            clip.notes.push(Note::new(60 + i, 0.0, 1.0, 1.0));
        }
        clip.automation.push(AutomationLane {
            target: AutomationTarget {
                param_id: 1,
                fx_slot: None,
            },
            unit: "db".into(),
            points: (0..5)
                .map(|i| AutomationPoint {
                    time: i as f64,
                    value: 0.0,
                })
                .collect(),
        });
        model.tracks[0].slots[0].clip = Some(clip);

        let mut snap = StateSnapshot::new(&config);
        let overflow = build_snapshot(&model, &mut snap);
        assert_eq!(snap.tracks[0].clips[0].piano.notes.len(), 2);
        assert_eq!(overflow.notes_dropped, 3);
        assert_eq!(snap.tracks[0].clips[0].piano.automation[0].points.len(), 2);
        assert_eq!(overflow.automation_points_dropped, 3);
    }
}
