//! Configuration fixtures and the settings derived from them.

use std::path::PathBuf;

use sqlt_session::{
    Command, Config, KeyChord, Layout, Platform, PlatformSetting, SessionError, SessionSettings,
};

/// Path to the fixture directory.
fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

/// Tests that the sample config loads and fills unset fields with defaults.
#[test]
fn test_sample_config_loads() {
    let config =
        Config::load_from_dir(&fixture_dir()).expect("Failed to load config fixture");

    assert_eq!(config.api_base_url, "http://127.0.0.1:8000/api/");
    assert_eq!(config.min_query_length, 5);
    assert_eq!(config.pane_transition_ms, 200);
    assert_eq!(config.narrow_viewport_width, 600);
    assert_eq!(config.platform, PlatformSetting::Mac);
    assert_eq!(config.easter_egg_one_in, 10);
    assert_eq!(config.event_capacity, 64);
    config.validate().expect("Fixture should validate");
}

/// Tests that a missing config file yields defaults.
#[test]
fn test_missing_config_uses_defaults() {
    let config = Config::load_from_file(&fixture_dir().join("does-not-exist.json"))
        .expect("Missing file should yield defaults");
    assert_eq!(config.api_base_url, "http://localhost:8000/api/");
    assert_eq!(config.min_query_length, 3);
}

/// Tests that a base URL override without a trailing slash is rejected.
#[test]
fn test_override_revalidated() {
    let mut config = Config::load_from_dir(&fixture_dir()).expect("Failed to load config");
    config.api_base_url = "http://127.0.0.1:8000/api".to_string();

    let err = config.validate().expect_err("Missing slash should fail");
    assert!(matches!(err, SessionError::ConfigValidationError { .. }));
}

/// Tests that settings follow the fixture's platform and breakpoint.
#[test]
fn test_settings_from_fixture() {
    let config = Config::load_from_dir(&fixture_dir()).expect("Failed to load config");
    let platform = config.platform.resolve("Mozilla/5.0 (X11; Linux x86_64)");
    assert_eq!(platform, Platform::Mac);

    let narrow = SessionSettings::from_config(&config, platform, 600).expect("settings");
    assert_eq!(narrow.layout, Layout::Stacked);
    assert_eq!(narrow.min_query_length, 5);

    let wide = SessionSettings::from_config(&config, platform, 601).expect("settings");
    assert_eq!(wide.layout, Layout::Split);

    let toolbar = &wide.toolbar;
    assert_eq!(
        toolbar.handle_key(KeyChord::plain('x').ctrl(), false),
        Some(Command::Execute)
    );
    assert_eq!(toolbar.handle_key(KeyChord::plain('x').alt(), false), None);
    assert_eq!(
        toolbar.accelerator_label(Command::Check).as_deref(),
        Some("ctrl+c")
    );
}
