//! Configuration loading tests
//!
//! Tests that the INI configuration is created with expected defaults,
//! survives a save/load cycle and feeds the typed accessors.

use chatspeak::speech::BackendKind;
use chatspeak::state::{chat_type, Config};
use chatspeak::text::TextReplacement;
use chatspeak::voice::Gender;

#[test]
fn test_missing_file_creates_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chatspeak.ini");

    let config = Config::load_from(&path).expect("Failed to load config");
    assert!(path.exists(), "default config should be written");
    assert_eq!(config.path(), Some(path.as_path()));

    assert!(config.enabled());
    assert_eq!(config.backend(), BackendKind::Local);
    assert_eq!(config.says_postfix(), "says");

    // The default preset leaves the voice to the engine
    let presets = config.voice_presets();
    assert_eq!(presets.len(), 1);
    assert_eq!(presets[0].voice_identity, "");
    assert_eq!(
        config.replacements(),
        vec![TextReplacement::new("ul'dah", "uldaahr")]
    );

    let chat = config.chat_types_preset();
    assert_eq!(chat.name, "Default");
    assert!(chat.accepts(chat_type::SAY));
    assert!(chat.accepts(chat_type::SHOUT));
    assert!(chat.accepts(chat_type::PARTY));
    assert!(!chat.accepts(chat_type::SYSTEM));
}

#[test]
fn test_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chatspeak.ini");

    {
        let mut config = Config::load_from(&path).unwrap();
        config.set_enabled(false);
        config.set_backend(BackendKind::Server);
        config.set_server_port(9001);
        let preset = config.new_voice_preset().unwrap();
        config.set_current_voice_preset(preset.id);
        config.save().expect("Failed to save config");
    }

    let config = Config::load_from(&path).unwrap();
    assert!(!config.enabled());
    assert_eq!(config.backend(), BackendKind::Server);
    assert_eq!(config.backend_settings().server.port, 9001);

    let voices = config.voice_resolver();
    assert_eq!(voices.len(), 2);
    assert_eq!(voices.resolve(Gender::None).unwrap().id, 1);
}

#[test]
fn test_cloud_settings() {
    let config = Config::from_str(
        "[cloud]\n\
         region=eu-west-1\n\
         engine=standard\n\
         sample_rate=16000\n\
         volume=0.5\n\
         playback_rate=125\n\
         voice=Amy\n\
         voice_male=Brian\n\
         char_limit=1500\n",
    )
    .unwrap();

    let cloud = config.cloud_settings();
    assert_eq!(cloud.region, "eu-west-1");
    assert_eq!(cloud.engine, "standard");
    assert_eq!(cloud.sample_rate, 16000);
    assert!((cloud.volume - 0.5).abs() < f32::EPSILON);
    assert_eq!(cloud.playback_rate, 125);
    assert_eq!(cloud.voice, "Amy");
    assert_eq!(cloud.voice_male, "Brian");
    assert_eq!(cloud.voice_female, "");
    assert_eq!(cloud.char_limit, 1500);
    assert_eq!(cloud.timeout_secs, 10);
}

#[test]
fn test_gendered_bindings() {
    let config = Config::from_str(
        "[general]\nuse_gendered_voice_presets=true\n\
         [voice]\ncurrent_preset=0\nungendered_preset=0\nmale_preset=1\nfemale_preset=7\n\
         [voice_preset.0]\nname=Narrator\n\
         [voice_preset.1]\nname=Deep\nrate=-3\n",
    )
    .unwrap();

    let voices = config.voice_resolver();
    assert!(voices.is_gendered());
    assert_eq!(voices.resolve(Gender::Male).unwrap().name, "Deep");
    assert_eq!(voices.resolve(Gender::Male).unwrap().rate, -3);
    // Female is bound to a preset that does not exist
    assert_eq!(voices.resolve(Gender::Female).unwrap().name, "Narrator");
}

#[test]
fn test_chat_types_preset_selection() {
    let config = Config::from_str(
        "[chat_types]\ncurrent_preset=2\n\
         [chat_types.0]\nname=Default\ntypes=10\n\
         [chat_types.2]\nname=Everything\nenable_all=true\n",
    )
    .unwrap();
    let preset = config.chat_types_preset();
    assert_eq!(preset.id, 2);
    assert!(preset.accepts(chat_type::SYSTEM));

    let mut config = config;
    config.set_current_chat_types_preset(0);
    let preset = config.chat_types_preset();
    assert_eq!(preset.name, "Default");
    assert!(preset.accepts(chat_type::SAY));
    assert!(!preset.accepts(chat_type::SHOUT));
}
