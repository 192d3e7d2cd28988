//! Engine configuration — the upper bounds the snapshot, graph, and
//! scheduler are all sized against (spec §6.5).

use crate::{Error, Result};

/// One of the five supported launch-quantize granularities (spec §6.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantizeIndex {
    Quarter = 0,
    Half = 1,
    One = 2,
    Two = 3,
    Four = 4,
}

impl QuantizeIndex {
    pub fn from_index(i: u8) -> Option<Self> {
        Some(match i {
            0 => Self::Quarter,
            1 => Self::Half,
            2 => Self::One,
            3 => Self::Two,
            4 => Self::Four,
            _ => return None,
        })
    }

    /// Quantize boundary expressed in beats.
    pub fn beats(self) -> f64 {
        match self {
            Self::Quarter => 0.25,
            Self::Half => 0.5,
            Self::One => 1.0,
            Self::Two => 2.0,
            Self::Four => 4.0,
        }
    }
}

/// Engine-wide configuration. Sizes every fixed-capacity array in
/// [`crate::snapshot::StateSnapshot`] and [`crate::graph::Graph`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sample_rate: f64,
    /// Upper bound on frames per plugin `process` call.
    pub max_block: usize,
    /// Fixed at 2 (stereo); kept as a field so callers don't hardcode it.
    pub channels: usize,
    pub track_count: usize,
    pub scene_count: usize,
    pub max_fx_slots: usize,
    pub max_notes_per_clip: usize,
    pub max_automation_lanes: usize,
    pub max_automation_points: usize,
    pub quantize_index: QuantizeIndex,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            max_block: 128,
            channels: 2,
            track_count: 8,
            scene_count: 8,
            max_fx_slots: 4,
            max_notes_per_clip: 256,
            max_automation_lanes: 4,
            max_automation_points: 64,
            quantize_index: QuantizeIndex::One,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate < 8000.0 || self.sample_rate > 384000.0 {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if self.max_block == 0 {
            return Err(Error::InvalidConfig("max_block must be > 0".into()));
        }
        if self.channels != 2 {
            return Err(Error::InvalidConfig("channels must be 2".into()));
        }
        if self.track_count == 0 {
            return Err(Error::InvalidConfig("track_count must be > 0".into()));
        }
        if self.scene_count == 0 {
            return Err(Error::InvalidConfig("scene_count must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.sample_rate, 44100.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_sample_rate() {
        let mut config = EngineConfig::default();
        config.sample_rate = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_quantize_beats() {
        assert_eq!(QuantizeIndex::Quarter.beats(), 0.25);
        assert_eq!(QuantizeIndex::Four.beats(), 4.0);
    }
}
