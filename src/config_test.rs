use std::collections::HashMap;

use super::*;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_when_nothing_set() {
    let config = EngineConfig::from_lookup(lookup(&[])).expect("config");
    assert_eq!(config, EngineConfig::default());
    assert_eq!(config.tick_period, Duration::from_millis(16));
    assert_eq!(config.handshake_timeout, Duration::from_secs(10));
    assert!(!config.draw_self);
    assert_eq!(config.state_file, None);
}

#[test]
fn all_values_parsed() {
    let config = EngineConfig::from_lookup(lookup(&[
        ("COBROWSE_DIRECTORY_URL", "https://dir.example"),
        ("COBROWSE_TICK_MS", "33"),
        ("COBROWSE_HANDSHAKE_TIMEOUT_MS", " 2500 "),
        ("COBROWSE_DRAW_SELF", "TRUE"),
        ("COBROWSE_STATE_FILE", "/tmp/cobrowse.json"),
    ]))
    .expect("config");
    assert_eq!(config.directory_url, "https://dir.example");
    assert_eq!(config.tick_period, Duration::from_millis(33));
    assert_eq!(config.handshake_timeout, Duration::from_millis(2500));
    assert!(config.draw_self);
    assert_eq!(config.state_file, Some(PathBuf::from("/tmp/cobrowse.json")));
}

#[test]
fn blank_directory_url_uses_default() {
    let config = EngineConfig::from_lookup(lookup(&[("COBROWSE_DIRECTORY_URL", "  ")])).expect("config");
    assert_eq!(config.directory_url, DEFAULT_DIRECTORY_URL);
}

#[test]
fn invalid_tick_is_rejected() {
    let err = EngineConfig::from_lookup(lookup(&[("COBROWSE_TICK_MS", "fast")])).expect_err("should fail");
    assert_eq!(err, ConfigError::Invalid { key: "COBROWSE_TICK_MS", value: "fast".to_owned() });
}

#[test]
fn zero_tick_is_rejected() {
    let err = EngineConfig::from_lookup(lookup(&[("COBROWSE_TICK_MS", "0")])).expect_err("should fail");
    assert!(matches!(err, ConfigError::Invalid { key: "COBROWSE_TICK_MS", .. }));
}

#[test]
fn zero_handshake_timeout_is_rejected() {
    let err = EngineConfig::from_lookup(lookup(&[("COBROWSE_HANDSHAKE_TIMEOUT_MS", "0")])).expect_err("should fail");
    assert!(matches!(err, ConfigError::Invalid { key: "COBROWSE_HANDSHAKE_TIMEOUT_MS", .. }));
}

#[test]
fn draw_self_accepts_common_spellings() {
    for (raw, expected) in [("1", true), ("yes", true), ("on", true), ("0", false), ("off", false), ("False", false)] {
        let config = EngineConfig::from_lookup(lookup(&[("COBROWSE_DRAW_SELF", raw)])).expect("config");
        assert_eq!(config.draw_self, expected, "{raw}");
    }
}

#[test]
fn draw_self_rejects_garbage() {
    let err = EngineConfig::from_lookup(lookup(&[("COBROWSE_DRAW_SELF", "maybe")])).expect_err("should fail");
    assert_eq!(err.to_string(), "invalid value for COBROWSE_DRAW_SELF: \"maybe\"");
}

#[test]
fn from_env_reads_process_environment() {
    unsafe { std::env::set_var("COBROWSE_HANDSHAKE_TIMEOUT_MS", "1234") };
    let config = EngineConfig::from_env();
    unsafe { std::env::remove_var("COBROWSE_HANDSHAKE_TIMEOUT_MS") };
    assert_eq!(config.expect("config").handshake_timeout, Duration::from_millis(1234));
}
