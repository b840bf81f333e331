//! Voice presets and gender-aware preset selection

use crate::ConfigIntegrityError;
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashMap;

/// Speaker gender hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Gender {
    #[default]
    None,
    Male,
    Female,
}

impl Gender {
    /// Map the engine's raw appearance byte to a gender
    pub fn from_customize(byte: u8) -> Self {
        match byte {
            0 => Gender::Male,
            1 => Gender::Female,
            _ => Gender::None,
        }
    }
}

/// Host-supplied lookup from a speaker name to its gender
///
/// Returning `None` (unknown actor, unreadable data) means `Gender::None`.
pub type GenderResolver = Box<dyn Fn(&str) -> Option<Gender> + Send>;

/// Named bundle of voice parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VoicePreset {
    pub id: u32,
    pub name: String,
    /// Speaking rate, -10 (slowest) to 10 (fastest)
    pub rate: i32,
    /// Volume, 0 to 100
    pub volume: i32,
    /// Installed voice name; empty means the engine default
    #[serde(rename = "VoiceName")]
    pub voice_identity: String,
}

impl VoicePreset {
    pub const MIN_RATE: i32 = -10;
    pub const MAX_RATE: i32 = 10;
    pub const MAX_VOLUME: i32 = 100;

    pub fn new(id: u32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            rate: 0,
            volume: Self::MAX_VOLUME,
            voice_identity: String::new(),
        }
    }
}

/// Which preset id each role is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PresetBindings {
    pub current: u32,
    pub ungendered: u32,
    pub male: u32,
    pub female: u32,
}

/// Maps a gender to a concrete voice preset
///
/// Bindings may point at presets that were since deleted; resolution then
/// falls back to the ungendered preset, then the current one, then the
/// lowest id. Only an empty preset table is an error.
#[derive(Debug, Clone, Default)]
pub struct VoicePresetResolver {
    presets: HashMap<u32, VoicePreset>,
    bindings: PresetBindings,
    gendered: bool,
}

impl VoicePresetResolver {
    pub fn new(presets: Vec<VoicePreset>, bindings: PresetBindings, gendered: bool) -> Self {
        Self {
            presets: presets.into_iter().map(|p| (p.id, p)).collect(),
            bindings,
            gendered,
        }
    }

    /// Is gender-based selection enabled?
    pub fn is_gendered(&self) -> bool {
        self.gendered
    }

    pub fn set_gendered(&mut self, gendered: bool) {
        self.gendered = gendered;
    }

    pub fn get(&self, id: u32) -> Option<&VoicePreset> {
        self.presets.get(&id)
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    /// Resolve the preset to speak with for `gender`
    pub fn resolve(&self, gender: Gender) -> Result<&VoicePreset, ConfigIntegrityError> {
        if !self.gendered {
            return self
                .get(self.bindings.current)
                .or_else(|| self.get(self.bindings.ungendered))
                .or_else(|| self.lowest())
                .ok_or(ConfigIntegrityError::NoVoicePresets);
        }

        let wanted = match gender {
            Gender::Male => self.bindings.male,
            Gender::Female => self.bindings.female,
            Gender::None => self.bindings.ungendered,
        };

        if let Some(preset) = self.get(wanted) {
            return Ok(preset);
        }

        debug!(
            "Preset {} bound to {:?} no longer exists, using ungendered preset",
            wanted, gender
        );
        let fallback = self
            .get(self.bindings.ungendered)
            .or_else(|| self.get(self.bindings.current))
            .or_else(|| self.lowest());

        match fallback {
            Some(preset) => Ok(preset),
            None => {
                warn!("No voice presets configured");
                Err(ConfigIntegrityError::NoVoicePresets)
            }
        }
    }

    fn lowest(&self) -> Option<&VoicePreset> {
        self.presets.values().min_by_key(|p| p.id)
    }
}
