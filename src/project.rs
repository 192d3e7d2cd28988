//! The session-exchange boundary value (spec §6.3). The core neither reads
//! nor writes a file format; it only produces/consumes this plain value.
//! Grounded on `other_examples/mlm-games-yadaw/src/state.rs`'s
//! `impl From<&AppState> for Project`.

use serde::{Deserialize, Serialize};

use crate::model::{
    AutomationLane, ClipSlot, ClipState, PianoClip, PluginChoice, Scene, SessionModel, Track,
    TransportState,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectTrack {
    pub name: String,
    pub volume: f32,
    pub mute: bool,
    pub solo: bool,
    pub instrument: PluginChoice,
    pub fx_chain: Vec<PluginChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectScene {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectClip {
    pub track: usize,
    pub scene: usize,
    pub state: ClipState,
    pub length_beats: f64,
    pub piano_length_beats: f64,
    pub notes: Vec<crate::model::Note>,
    pub automation: Vec<AutomationLane>,
}

/// The serialization-agnostic project value (spec §6.3). Whether this is
/// written out as JSON, XML, or a ZIP-packaged bundle is an external
/// concern; this crate only implements the conversion to/from
/// [`SessionModel`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub bpm: f32,
    pub quantize_index: u8,
    pub tracks: Vec<ProjectTrack>,
    pub scenes: Vec<ProjectScene>,
    pub clips: Vec<ProjectClip>,
    pub playhead_beat: f64,
}

impl From<&SessionModel> for Project {
    fn from(model: &SessionModel) -> Self {
        let mut clips = Vec::new();
        for (t, track) in model.tracks.iter().enumerate() {
            for (s, slot) in track.slots.iter().enumerate() {
                if matches!(slot.state, ClipState::Empty) {
                    continue;
                }
                let clip = slot.clip.as_ref();
                clips.push(ProjectClip {
                    track: t,
                    scene: s,
                    state: slot.state,
                    length_beats: slot.length_beats,
                    piano_length_beats: clip.map(|c| c.length_beats).unwrap_or(0.0),
                    notes: clip.map(|c| c.notes.clone()).unwrap_or_default(),
                    automation: clip.map(|c| c.automation.clone()).unwrap_or_default(),
                });
            }
        }

        Self {
            bpm: model.transport.bpm,
            quantize_index: model.transport.quantize_index,
            tracks: model
                .tracks
                .iter()
                .map(|t| ProjectTrack {
                    name: t.name.clone(),
                    volume: t.volume,
                    mute: t.mute,
                    solo: t.solo,
                    instrument: t.instrument.clone(),
                    fx_chain: t.fx_chain.clone(),
                })
                .collect(),
            scenes: model
                .scenes
                .iter()
                .map(|s| ProjectScene { name: s.name.clone() })
                .collect(),
            clips,
            playhead_beat: model.transport.playhead_beat,
        }
    }
}

impl Project {
    /// Rehydrate a [`SessionModel`] sized to this project's track/scene
    /// counts. `max_fx_slots` isn't recoverable from the project value
    /// alone (a track may have fewer configured FX choices than the
    /// engine's configured cap), so the caller supplies it.
    pub fn to_session_model(&self, max_fx_slots: usize) -> SessionModel {
        let mut model = SessionModel::new(self.tracks.len(), self.scenes.len(), max_fx_slots);
        model.transport = TransportState {
            playing: false,
            bpm: self.bpm,
            quantize_index: self.quantize_index,
            playhead_beat: self.playhead_beat,
        };

        for (t, project_track) in self.tracks.iter().enumerate() {
            let track: &mut Track = &mut model.tracks[t];
            track.name = project_track.name.clone();
            track.volume = project_track.volume;
            track.mute = project_track.mute;
            track.solo = project_track.solo;
            track.instrument = project_track.instrument.clone();
            for (i, choice) in project_track.fx_chain.iter().enumerate() {
                if let Some(slot) = track.fx_chain.get_mut(i) {
                    *slot = choice.clone();
                }
            }
        }

        for project_scene in self.scenes.iter() {
            let _ = project_scene;
        }

        for clip in &self.clips {
            if clip.track >= model.tracks.len() {
                continue;
            }
            let Some(slot): Option<&mut ClipSlot> = model.tracks[clip.track].slots.get_mut(clip.scene)
            else {
                continue;
            };
            slot.state = clip.state;
            slot.length_beats = clip.length_beats;
            let mut piano = PianoClip::new(clip.piano_length_beats);
            piano.notes = clip.notes.clone();
            piano.automation = clip.automation.clone();
            slot.clip = Some(piano);
        }

        model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Note;

    #[test]
    fn round_trips_through_project() {
        let mut model = SessionModel::new(2, 2, 2);
        model.transport.bpm = 128.0;
        let mut clip = PianoClip::new(4.0);
        clip.notes.push(Note::new(60, 0.0, 1.0, 1.0));
        model.tracks[0].slots[0].clip = Some(clip);
        model.tracks[0].slots[0].state = ClipState::Stopped;
        model.tracks[0].slots[0].length_beats = 4.0;
        model.tracks[0].volume = 0.75;

        let project = Project::from(&model);
        assert_eq!(project.bpm, 128.0);
        assert_eq!(project.clips.len(), 1);

        let restored = project.to_session_model(2);
        assert_eq!(restored.transport.bpm, 128.0);
        assert_eq!(restored.tracks[0].volume, 0.75);
        assert_eq!(
            restored.tracks[0].slots[0].clip.as_ref().unwrap().notes[0].pitch,
            60
        );
    }
}
