//! The UI-owned session model (spec §3). Mutated freely on the UI thread;
//! never touched by the audio thread directly — only through
//! [`crate::snapshot::build_snapshot`].

use serde::{Deserialize, Serialize};

/// State machine of a clip slot (spec §3, GLOSSARY "Clip slot").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClipState {
    Empty,
    Stopped,
    Queued,
    Playing,
    Recording,
    QueuedRecording,
}

/// A single note in a [`PianoClip`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub pitch: u8,
    pub start: f64,
    pub duration: f64,
    pub velocity: f32,
}

impl Note {
    pub fn new(pitch: u8, start: f64, duration: f64, velocity: f32) -> Self {
        debug_assert!(pitch <= 127);
        debug_assert!(start >= 0.0);
        debug_assert!(duration > 0.0);
        debug_assert!((0.0..=1.0).contains(&velocity));
        Self {
            pitch,
            start,
            duration,
            velocity,
        }
    }
}

/// One breakpoint of an [`AutomationLane`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutomationPoint {
    pub time: f64,
    pub value: f64,
}

/// Target of an automation lane: a parameter on the instrument (`fx_slot =
/// None`) or on a specific FX slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationTarget {
    pub param_id: u32,
    pub fx_slot: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationLane {
    pub target: AutomationTarget,
    pub unit: String,
    /// Insertion order, not assumed sorted by `time` (mirrors [`PianoClip::notes`]).
    pub points: Vec<AutomationPoint>,
}

/// A piano-roll clip living at `[track][scene]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PianoClip {
    pub length_beats: f64,
    /// Insertion order; consumers must not assume sort by `start` (invariant 4).
    pub notes: Vec<Note>,
    pub automation: Vec<AutomationLane>,
}

impl PianoClip {
    pub fn new(length_beats: f64) -> Self {
        Self {
            length_beats,
            notes: Vec::new(),
            automation: Vec::new(),
        }
    }
}

/// The `(track, scene)` cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipSlot {
    pub state: ClipState,
    pub length_beats: f64,
    pub clip: Option<PianoClip>,
}

impl ClipSlot {
    pub fn empty() -> Self {
        Self {
            state: ClipState::Empty,
            length_beats: 0.0,
            clip: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub name: String,
}

/// An effect slot choice; `None` means the slot is empty (pass-through).
pub type PluginChoice = Option<String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    pub volume: f32,
    pub mute: bool,
    pub solo: bool,
    pub armed: bool,
    pub instrument: PluginChoice,
    pub fx_chain: Vec<PluginChoice>,
    pub slots: Vec<ClipSlot>,
}

impl Track {
    pub fn new(name: impl Into<String>, scene_count: usize, max_fx_slots: usize) -> Self {
        Self {
            name: name.into(),
            volume: 1.0,
            mute: false,
            solo: false,
            armed: false,
            instrument: None,
            fx_chain: vec![None; max_fx_slots],
            slots: (0..scene_count).map(|_| ClipSlot::empty()).collect(),
        }
    }
}

/// In-flight live-keyboard recording state (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordingState {
    pub armed_track: Option<usize>,
    pub armed_scene: Option<usize>,
    pub start_beat: f64,
    /// `note_start_beat[pitch]` — the beat at which a live key-down began,
    /// for pitches currently held while recording.
    pub note_start_beat: [Option<f64>; 128],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportState {
    pub playing: bool,
    pub bpm: f32,
    pub quantize_index: u8,
    pub playhead_beat: f64,
}

impl Default for TransportState {
    fn default() -> Self {
        Self {
            playing: false,
            bpm: 120.0,
            quantize_index: 2,
            playhead_beat: 0.0,
        }
    }
}

/// The full UI-owned session. Source of truth; never read directly by the
/// audio thread.
#[derive(Debug, Clone)]
pub struct SessionModel {
    pub tracks: Vec<Track>,
    pub scenes: Vec<Scene>,
    pub recording: RecordingState,
    pub transport: TransportState,
    /// `live_key_state[track][pitch]`, written by UI/MIDI input, read each
    /// block by the scheduler (spec §4.1 "fine-grained live key-state").
    pub live_key_state: Vec<[bool; 128]>,
}

impl SessionModel {
    pub fn new(track_count: usize, scene_count: usize, max_fx_slots: usize) -> Self {
        Self {
            tracks: (0..track_count)
                .map(|i| Track::new(format!("Track {}", i + 1), scene_count, max_fx_slots))
                .collect(),
            scenes: (0..scene_count)
                .map(|i| Scene {
                    name: format!("Scene {}", i + 1),
                })
                .collect(),
            recording: RecordingState::default(),
            transport: TransportState::default(),
            live_key_state: vec![[false; 128]; track_count],
        }
    }

    /// Currently-playing clip length for a track, used by invariant 1
    /// (`loop_length`).
    pub fn loop_length(&self, track: usize) -> Option<f64> {
        self.tracks[track]
            .slots
            .iter()
            .find(|s| matches!(s.state, ClipState::Playing | ClipState::Recording))
            .map(|s| s.length_beats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_has_requested_shape() {
        let m = SessionModel::new(4, 8, 2);
        assert_eq!(m.tracks.len(), 4);
        assert_eq!(m.scenes.len(), 8);
        assert_eq!(m.tracks[0].slots.len(), 8);
        assert_eq!(m.tracks[0].fx_chain.len(), 2);
    }

    #[test]
    fn note_rejects_nothing_at_release_build_but_debug_asserts() {
        let n = Note::new(60, 0.0, 1.0, 1.0);
        assert_eq!(n.pitch, 60);
    }
}
