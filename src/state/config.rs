//! Configuration management

use crate::speech::BackendKind;
use crate::text::TextReplacement;
use crate::triggers::Trigger;
use crate::voice::{PresetBindings, VoicePreset, VoicePresetResolver};
use crate::{ChatSpeakError, Result};
use ini::{EscapePolicy, Ini, ParseOption, WriteOption};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const GENERAL: &str = "general";
const VOICE: &str = "voice";
const VOICE_PRESET_PREFIX: &str = "voice_preset.";
const EXCLUDE_PREFIX: &str = "trigger.exclude.";
const INCLUDE_PREFIX: &str = "trigger.include.";
const REPLACEMENT_PREFIX: &str = "replacement.";
const CHAT_TYPES: &str = "chat_types";
const CHAT_TYPES_PREFIX: &str = "chat_types.";
const CLOUD: &str = "cloud";
const SERVER: &str = "server";

const DEFAULT_PRESET_NAME: &str = "Default";

/// Numeric chat channel codes used by the host
pub mod chat_type {
    pub const SAY: u16 = 0x000A;
    pub const SHOUT: u16 = 0x000B;
    pub const PARTY: u16 = 0x000E;
    pub const SYSTEM: u16 = 0x0039;
    pub const NPC_DIALOGUE: u16 = 0x003D;
}

/// Which chat channels are spoken
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatTypesPreset {
    pub id: u32,
    pub name: String,
    pub enable_all: bool,
    pub enabled: HashSet<u16>,
}

impl ChatTypesPreset {
    pub fn accepts(&self, chat_type: u16) -> bool {
        self.enable_all || self.enabled.contains(&chat_type)
    }
}

/// Cloud backend settings
#[derive(Debug, Clone, PartialEq)]
pub struct CloudSettings {
    pub region: String,
    pub engine: String,
    pub sample_rate: u32,
    /// Playback volume, 0.0 to 1.0
    pub volume: f32,
    /// Speaking rate in percent of normal
    pub playback_rate: u32,
    pub voice: String,
    pub voice_male: String,
    pub voice_female: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Maximum characters per request
    pub char_limit: usize,
    pub timeout_secs: u64,
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            engine: "neural".to_string(),
            sample_rate: 22050,
            volume: 1.0,
            playback_rate: 100,
            voice: String::new(),
            voice_male: String::new(),
            voice_female: String::new(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            char_limit: 3000,
            timeout_secs: 10,
        }
    }
}

/// Streaming server settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// Settings for every backend variant
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BackendSettings {
    pub cloud: CloudSettings,
    pub server: ServerSettings,
}

/// Application configuration
///
/// Backed by an INI file; typed accessors parse on demand and fall back
/// to defaults for missing or unparsable values.
pub struct Config {
    /// INI configuration storage
    ini: Ini,

    /// Config file path; `None` for in-memory configs
    path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from disk or create default
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, writing defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);

        let ini = if path.exists() {
            Ini::load_from_file_opt(path, Self::parse_option())
                .map_err(|e| ChatSpeakError::IniParse(format!("Failed to load config: {}", e)))?
        } else {
            info!("Config file not found, creating default");
            let default = Self::default_config();
            default
                .write_to_file_opt(path, Self::write_option())
                .map_err(|e| ChatSpeakError::IniParse(format!("Failed to write config: {}", e)))?;
            default
        };

        Ok(Self {
            ini,
            path: Some(path.to_path_buf()),
        })
    }

    /// Parse configuration from INI text without touching disk
    pub fn from_str(text: &str) -> Result<Self> {
        let ini = Ini::load_from_str_opt(text, Self::parse_option())
            .map_err(|e| ChatSpeakError::IniParse(format!("Failed to parse config: {}", e)))?;
        Ok(Self { ini, path: None })
    }

    /// In-memory configuration with default content
    pub fn with_defaults() -> Self {
        Self {
            ini: Self::default_config(),
            path: None,
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };
        debug!("Saving config to {:?}", path);
        self.ini
            .write_to_file_opt(path, Self::write_option())
            .map_err(|e| ChatSpeakError::Config(format!("Failed to save config: {}", e)))
    }

    // Trigger and replacement patterns are regexes; backslashes stay literal
    fn parse_option() -> ParseOption {
        ParseOption {
            enabled_escape: false,
            ..ParseOption::default()
        }
    }

    fn write_option() -> WriteOption {
        WriteOption {
            escape_policy: EscapePolicy::Nothing,
            ..WriteOption::default()
        }
    }

    /// Default config file location
    fn config_path() -> PathBuf {
        match dirs::config_dir() {
            Some(dir) => dir.join("chatspeak.ini"),
            None => {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".chatspeak.ini")
            }
        }
    }

    /// Expose the config file path for display
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Create default configuration
    fn default_config() -> Ini {
        let mut ini = Ini::new();

        ini.with_section(Some(GENERAL))
            .set("enabled", "true")
            .set("backend", "local")
            .set("disallow_multiple_say", "false")
            .set("cancel_queue_on_toggle", "false")
            .set("name_with_say", "true")
            .set("name_npc_with_say", "true")
            .set("says_postfix", "says")
            .set("read_from_quest_talk_addon", "true")
            .set("use_gendered_voice_presets", "false");

        ini.with_section(Some(VOICE))
            .set("current_preset", "0")
            .set("ungendered_preset", "0")
            .set("male_preset", "0")
            .set("female_preset", "0");

        // Empty voice keeps the engine's default voice
        ini.with_section(Some(format!("{}0", VOICE_PRESET_PREFIX)))
            .set("name", DEFAULT_PRESET_NAME)
            .set("rate", "0")
            .set("volume", "100")
            .set("voice", "");

        ini.with_section(Some(CHAT_TYPES)).set("current_preset", "0");
        ini.with_section(Some(format!("{}0", CHAT_TYPES_PREFIX)))
            .set("name", DEFAULT_PRESET_NAME)
            .set("enable_all", "false")
            .set(
                "types",
                format!(
                    "{},{},{}",
                    chat_type::SAY,
                    chat_type::SHOUT,
                    chat_type::PARTY
                ),
            );

        ini.with_section(Some(format!("{}0", REPLACEMENT_PREFIX)))
            .set("match", "ul'dah")
            .set("replace", "uldaahr");

        let cloud = CloudSettings::default();
        ini.with_section(Some(CLOUD))
            .set("region", cloud.region)
            .set("engine", cloud.engine)
            .set("sample_rate", cloud.sample_rate.to_string())
            .set("volume", cloud.volume.to_string())
            .set("playback_rate", cloud.playback_rate.to_string())
            .set("voice", "Matthew")
            .set("char_limit", cloud.char_limit.to_string());

        ini.with_section(Some(SERVER))
            .set("port", ServerSettings::default().port.to_string());

        ini
    }

    /// Get a boolean value from config
    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Get a string value from config
    pub fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.ini
            .get_from(Some(section), key)
            .unwrap_or(default)
            .to_string()
    }

    /// Get an integer value from config
    pub fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Get a float value from config
    pub fn get_float(&self, section: &str, key: &str, default: f32) -> f32 {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Set a value in config
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.ini.with_section(Some(section)).set(key, value);
    }

    fn get_u32(&self, section: &str, key: &str, default: u32) -> u32 {
        u32::try_from(self.get_int(section, key, default as i64)).unwrap_or(default)
    }

    /// Sections named `<prefix><n>` in ascending `n` order
    fn numbered_sections(&self, prefix: &str) -> Vec<(u32, String)> {
        let mut found: Vec<(u32, String)> = self
            .ini
            .sections()
            .flatten()
            .filter_map(|name| {
                let idx = name.strip_prefix(prefix)?.parse().ok()?;
                Some((idx, name.to_string()))
            })
            .collect();
        found.sort_by_key(|(idx, _)| *idx);
        found
    }

    // Behavior toggles

    /// Is speech enabled at all?
    pub fn enabled(&self) -> bool {
        self.get_bool(GENERAL, "enabled", true)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.set(GENERAL, "enabled", &enabled.to_string());
    }

    /// Drop new speech while speaking, and skip repeated speaker names
    pub fn disallow_multiple_say(&self) -> bool {
        self.get_bool(GENERAL, "disallow_multiple_say", false)
    }

    /// Cancel speech when TTS is toggled off
    pub fn cancel_queue_on_toggle(&self) -> bool {
        self.get_bool(GENERAL, "cancel_queue_on_toggle", false)
    }

    /// Announce speaker names before chat lines
    pub fn name_with_say(&self) -> bool {
        self.get_bool(GENERAL, "name_with_say", true)
    }

    /// Announce speaker names for NPC dialogue too
    pub fn name_npc_with_say(&self) -> bool {
        self.get_bool(GENERAL, "name_npc_with_say", true)
    }

    /// Word placed between speaker and text ("Alphinaud says ...")
    pub fn says_postfix(&self) -> String {
        self.get_string(GENERAL, "says_postfix", "says")
    }

    /// Read quest dialogue boxes
    pub fn read_from_quest_talk_addon(&self) -> bool {
        self.get_bool(GENERAL, "read_from_quest_talk_addon", true)
    }

    pub fn use_gendered_voice_presets(&self) -> bool {
        self.get_bool(GENERAL, "use_gendered_voice_presets", false)
    }

    /// Log every chat line and its parsed form
    pub fn debug(&self) -> bool {
        self.get_bool(GENERAL, "debug", false)
    }

    // Backends

    pub fn backend(&self) -> BackendKind {
        let value = self.get_string(GENERAL, "backend", "local");
        value.parse().unwrap_or_else(|e| {
            warn!("{}, using local backend", e);
            BackendKind::Local
        })
    }

    pub fn set_backend(&mut self, kind: BackendKind) {
        self.set(GENERAL, "backend", kind.as_str());
    }

    pub fn server_port(&self) -> u16 {
        let default = ServerSettings::default().port;
        u16::try_from(self.get_int(SERVER, "port", default as i64)).unwrap_or(default)
    }

    pub fn set_server_port(&mut self, port: u16) {
        self.set(SERVER, "port", &port.to_string());
    }

    pub fn cloud_settings(&self) -> CloudSettings {
        let d = CloudSettings::default();
        CloudSettings {
            region: self.get_string(CLOUD, "region", &d.region),
            engine: self.get_string(CLOUD, "engine", &d.engine),
            sample_rate: self.get_u32(CLOUD, "sample_rate", d.sample_rate),
            volume: self.get_float(CLOUD, "volume", d.volume).clamp(0.0, 1.0),
            playback_rate: self.get_u32(CLOUD, "playback_rate", d.playback_rate),
            voice: self.get_string(CLOUD, "voice", &d.voice),
            voice_male: self.get_string(CLOUD, "voice_male", &d.voice_male),
            voice_female: self.get_string(CLOUD, "voice_female", &d.voice_female),
            access_key_id: self.get_string(CLOUD, "access_key_id", ""),
            secret_access_key: self.get_string(CLOUD, "secret_access_key", ""),
            char_limit: self.get_u32(CLOUD, "char_limit", d.char_limit as u32) as usize,
            timeout_secs: self.get_u32(CLOUD, "timeout_secs", d.timeout_secs as u32) as u64,
        }
    }

    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            cloud: self.cloud_settings(),
            server: ServerSettings {
                port: self.server_port(),
            },
        }
    }

    // Triggers and replacements

    fn triggers(&self, prefix: &str) -> Vec<Trigger> {
        self.numbered_sections(prefix)
            .into_iter()
            .map(|(_, section)| Trigger {
                pattern: self.get_string(&section, "text", ""),
                is_regex: self.get_bool(&section, "regex", false),
            })
            .collect()
    }

    /// Triggers that prevent a line from being spoken
    pub fn exclude_triggers(&self) -> Vec<Trigger> {
        self.triggers(EXCLUDE_PREFIX)
    }

    /// Triggers of which a line must match one, when any exist
    pub fn include_triggers(&self) -> Vec<Trigger> {
        self.triggers(INCLUDE_PREFIX)
    }

    /// Replacements in order, without entries that have an empty pattern
    pub fn replacements(&self) -> Vec<TextReplacement> {
        self.numbered_sections(REPLACEMENT_PREFIX)
            .into_iter()
            .map(|(_, section)| {
                TextReplacement::new(
                    &self.get_string(&section, "match", ""),
                    &self.get_string(&section, "replace", ""),
                )
            })
            .filter(|r| !r.match_pattern.is_empty())
            .collect()
    }

    // Chat channels

    /// The chat-types preset currently in effect
    ///
    /// Falls back to the lowest-numbered preset, then to accepting every
    /// channel when none is configured.
    pub fn chat_types_preset(&self) -> ChatTypesPreset {
        let current = self.get_u32(CHAT_TYPES, "current_preset", 0);
        let presets = self.numbered_sections(CHAT_TYPES_PREFIX);

        let chosen = presets
            .iter()
            .find(|(id, _)| *id == current)
            .or_else(|| presets.first());

        match chosen {
            Some((id, section)) => ChatTypesPreset {
                id: *id,
                name: self.get_string(section, "name", DEFAULT_PRESET_NAME),
                enable_all: self.get_bool(section, "enable_all", false),
                enabled: self
                    .get_string(section, "types", "")
                    .split(',')
                    .filter_map(|t| t.trim().parse().ok())
                    .collect(),
            },
            None => ChatTypesPreset {
                enable_all: true,
                ..ChatTypesPreset::default()
            },
        }
    }

    pub fn set_current_chat_types_preset(&mut self, id: u32) {
        self.set(CHAT_TYPES, "current_preset", &id.to_string());
    }

    // Voice presets

    pub fn voice_presets(&self) -> Vec<VoicePreset> {
        self.numbered_sections(VOICE_PRESET_PREFIX)
            .into_iter()
            .map(|(id, section)| VoicePreset {
                id,
                name: self.get_string(&section, "name", DEFAULT_PRESET_NAME),
                rate: self.get_int(&section, "rate", 0).clamp(
                    VoicePreset::MIN_RATE as i64,
                    VoicePreset::MAX_RATE as i64,
                ) as i32,
                volume: self
                    .get_int(&section, "volume", VoicePreset::MAX_VOLUME as i64)
                    .clamp(0, VoicePreset::MAX_VOLUME as i64) as i32,
                voice_identity: self.get_string(&section, "voice", ""),
            })
            .collect()
    }

    pub fn preset_bindings(&self) -> PresetBindings {
        PresetBindings {
            current: self.get_u32(VOICE, "current_preset", 0),
            ungendered: self.get_u32(VOICE, "ungendered_preset", 0),
            male: self.get_u32(VOICE, "male_preset", 0),
            female: self.get_u32(VOICE, "female_preset", 0),
        }
    }

    /// Voice resolver built from the presets and bindings
    pub fn voice_resolver(&self) -> VoicePresetResolver {
        VoicePresetResolver::new(
            self.voice_presets(),
            self.preset_bindings(),
            self.use_gendered_voice_presets(),
        )
    }

    /// Add a preset with default parameters; its id is one above the highest
    pub fn new_voice_preset(&mut self) -> Result<VoicePreset> {
        let id = match self.voice_presets().iter().map(|p| p.id).max() {
            Some(highest) => highest.checked_add(1).ok_or_else(|| {
                ChatSpeakError::Config(format!("no voice preset id left above {}", highest))
            })?,
            None => 0,
        };
        let preset = VoicePreset::new(id, "New preset");
        self.save_voice_preset(&preset);
        Ok(preset)
    }

    /// Store `preset` under its id, replacing any existing one
    pub fn save_voice_preset(&mut self, preset: &VoicePreset) {
        let section = format!("{}{}", VOICE_PRESET_PREFIX, preset.id);
        self.ini
            .with_section(Some(section))
            .set("name", preset.name.as_str())
            .set("rate", preset.rate.to_string())
            .set("volume", preset.volume.to_string())
            .set("voice", preset.voice_identity.as_str());
    }

    /// Remove a preset; bindings that point at it fall back at resolution
    pub fn delete_voice_preset(&mut self, id: u32) -> bool {
        let section = format!("{}{}", VOICE_PRESET_PREFIX, id);
        self.ini.delete(Some(section)).is_some()
    }

    pub fn set_current_voice_preset(&mut self, id: u32) {
        self.set(VOICE, "current_preset", &id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::with_defaults();
        assert!(config.enabled());
        assert!(!config.disallow_multiple_say());
        assert_eq!(config.says_postfix(), "says");
        assert_eq!(config.backend(), BackendKind::Local);
        assert_eq!(config.server_port(), 8080);

        let chat = config.chat_types_preset();
        assert!(chat.accepts(chat_type::SAY));
        assert!(chat.accepts(chat_type::PARTY));
        assert!(!chat.accepts(chat_type::NPC_DIALOGUE));

        assert_eq!(
            config.replacements(),
            vec![TextReplacement::new("ul'dah", "uldaahr")]
        );
        assert_eq!(config.voice_presets().len(), 1);
    }

    #[test]
    fn test_numbered_sections_sorted() {
        let config = Config::from_str(
            "[replacement.10]\nmatch=b\nreplace=c\n\
             [replacement.2]\nmatch=a\nreplace=b\n\
             [replacement.5]\nmatch=\nreplace=never\n",
        )
        .unwrap();
        let replacements = config.replacements();
        assert_eq!(
            replacements,
            vec![TextReplacement::new("a", "b"), TextReplacement::new("b", "c")]
        );
    }

    #[test]
    fn test_triggers() {
        let config = Config::from_str(
            "[trigger.exclude.0]\ntext=gil\n\
             [trigger.include.0]\ntext=^\\[Party\\]\nregex=true\n",
        )
        .unwrap();
        assert_eq!(config.exclude_triggers(), vec![Trigger::literal("gil")]);
        assert_eq!(config.include_triggers(), vec![Trigger::regex("^\\[Party\\]")]);
    }

    #[test]
    fn test_voice_preset_editing() {
        let mut config = Config::with_defaults();
        let preset = config.new_voice_preset().unwrap();
        assert_eq!(preset.id, 1);
        assert_eq!(config.voice_presets().len(), 2);

        assert!(config.delete_voice_preset(1));
        assert!(!config.delete_voice_preset(1));
        assert_eq!(config.voice_presets().len(), 1);
    }

    #[test]
    fn test_new_voice_preset_at_highest_id() {
        let mut config =
            Config::from_str("[voice_preset.0]
name=Default
[voice_preset.4294967295]
name=Last
")
                .unwrap();
        assert!(matches!(
            config.new_voice_preset(),
            Err(ChatSpeakError::Config(_))
        ));
        // Preset 0 is untouched
        let presets = config.voice_presets();
        assert_eq!(presets.len(), 2);
        assert_eq!(presets[0].name, "Default");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = Config::from_str(
            "[general]\nbackend=telegraph\nenabled=maybe\n\
             [server]\nport=99999\n\
             [voice_preset.0]\nrate=42\nvolume=-5\n",
        )
        .unwrap();
        assert_eq!(config.backend(), BackendKind::Local);
        assert!(config.enabled());
        assert_eq!(config.server_port(), 8080);

        let presets = config.voice_presets();
        assert_eq!(presets[0].rate, 10);
        assert_eq!(presets[0].volume, 0);
    }

    #[test]
    fn test_missing_chat_presets_accept_everything() {
        let config = Config::from_str("[general]\nenabled=true\n").unwrap();
        assert!(config.chat_types_preset().accepts(chat_type::SYSTEM));
    }
}
