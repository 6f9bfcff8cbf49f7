// GM drum key map and the per-segment drums mix

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Groups of drum kit pieces sharing one drums-mix setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrumGroup {
    BassDrum,
    Snare,
    HiHat,
    Toms,
    Crash,
    Ride,
    Percussion,
}

impl DrumGroup {
    /// All groups (for iteration)
    pub const ALL: &'static [DrumGroup] = &[
        DrumGroup::BassDrum,
        DrumGroup::Snare,
        DrumGroup::HiHat,
        DrumGroup::Toms,
        DrumGroup::Crash,
        DrumGroup::Ride,
        DrumGroup::Percussion,
    ];

    /// Group of a pitch on the General MIDI drum key map
    pub fn from_gm_pitch(pitch: u8) -> DrumGroup {
        match pitch {
            35 | 36 => DrumGroup::BassDrum,
            37 | 38 | 39 | 40 => DrumGroup::Snare,
            42 | 44 | 46 => DrumGroup::HiHat,
            41 | 43 | 45 | 47 | 48 | 50 => DrumGroup::Toms,
            49 | 52 | 55 | 57 => DrumGroup::Crash,
            51 | 53 | 59 => DrumGroup::Ride,
            _ => DrumGroup::Percussion,
        }
    }
}

/// GM drum notes used by the built-in generators
pub mod gm {
    pub const KICK: u8 = 36;
    pub const SNARE: u8 = 38;
    pub const CLOSED_HIHAT: u8 = 42;
    pub const OPEN_HIHAT: u8 = 46;
    pub const LOW_TOM: u8 = 45;
    pub const HIGH_TOM: u8 = 50;
    pub const CRASH: u8 = 49;
    pub const RIDE: u8 = 51;
}

/// Lowest and highest accepted velocity multiplier
pub const MIN_DRUMS_MIX: f32 = 0.0;
pub const MAX_DRUMS_MIX: f32 = 2.0;

/// Velocity multipliers per drum group. Groups without an entry use 1.0.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DrumsMix {
    multipliers: BTreeMap<DrumGroup, f32>,
}

impl DrumsMix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, group: DrumGroup, multiplier: f32) {
        let multiplier = multiplier.clamp(MIN_DRUMS_MIX, MAX_DRUMS_MIX);
        if multiplier == 1.0 {
            self.multipliers.remove(&group);
        } else {
            self.multipliers.insert(group, multiplier);
        }
    }

    pub fn with(mut self, group: DrumGroup, multiplier: f32) -> Self {
        self.set(group, multiplier);
        self
    }

    pub fn multiplier(&self, group: DrumGroup) -> f32 {
        self.multipliers.get(&group).copied().unwrap_or(1.0)
    }

    /// Multiplier for a drum note pitch
    pub fn multiplier_for_pitch(&self, pitch: u8) -> f32 {
        self.multiplier(DrumGroup::from_gm_pitch(pitch))
    }

    /// True when no group is changed
    pub fn is_neutral(&self) -> bool {
        self.multipliers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gm_key_map() {
        assert_eq!(DrumGroup::from_gm_pitch(gm::KICK), DrumGroup::BassDrum);
        assert_eq!(DrumGroup::from_gm_pitch(gm::SNARE), DrumGroup::Snare);
        assert_eq!(DrumGroup::from_gm_pitch(gm::CLOSED_HIHAT), DrumGroup::HiHat);
        assert_eq!(DrumGroup::from_gm_pitch(gm::CRASH), DrumGroup::Crash);
        assert_eq!(DrumGroup::from_gm_pitch(70), DrumGroup::Percussion);
    }

    #[test]
    fn test_drums_mix_defaults_and_clamp() {
        let mix = DrumsMix::new().with(DrumGroup::Snare, 5.0).with(DrumGroup::HiHat, 1.0);
        assert_eq!(mix.multiplier(DrumGroup::Snare), MAX_DRUMS_MIX);
        assert_eq!(mix.multiplier(DrumGroup::HiHat), 1.0);
        assert_eq!(mix.multiplier_for_pitch(gm::KICK), 1.0);
        assert!(!mix.is_neutral());
        assert!(DrumsMix::new().with(DrumGroup::Ride, 1.0).is_neutral());
    }
}
