//! Configuration for the exercise workspace.
//!
//! Settings are read from `sqlt.json` (camelCase keys). Every field has a
//! default, so a missing file or an empty object yields a working setup that
//! talks to a local exercise service.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::commands::Platform;
use crate::error::{Result, SessionError};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "sqlt.json";

/// Default base URL of the exercise service.
fn default_api_base_url() -> String {
    "http://localhost:8000/api/".to_string()
}

/// Default minimum trimmed query length accepted by toolbar commands.
const fn default_min_query_length() -> usize {
    3
}

/// Default pane transition interval in milliseconds.
const fn default_pane_transition_ms() -> u64 {
    150
}

/// Default viewport width at or below which panes stack vertically.
const fn default_narrow_viewport_width() -> u32 {
    450
}

/// Default 1-in-N chance of an easter-egg feedback message.
const fn default_easter_egg_one_in() -> u32 {
    10
}

/// Default per-subscriber event buffer.
const fn default_event_capacity() -> usize {
    64
}

/// Main configuration for the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Base URL of the exercise service. Must end with `/`.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Minimum number of characters in the trimmed query.
    #[serde(default = "default_min_query_length")]
    pub min_query_length: usize,

    /// How long a pane visibility change stays in transition.
    #[serde(default = "default_pane_transition_ms")]
    pub pane_transition_ms: u64,

    /// Viewports this wide or narrower stack panes vertically.
    #[serde(default = "default_narrow_viewport_width")]
    pub narrow_viewport_width: u32,

    /// One check in this many picks an easter-egg message.
    #[serde(default = "default_easter_egg_one_in")]
    pub easter_egg_one_in: u32,

    /// Which modifier family the keyboard dispatcher expects.
    #[serde(default)]
    pub platform: PlatformSetting,

    /// Buffered events per subscriber before lagging.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            min_query_length: default_min_query_length(),
            pane_transition_ms: default_pane_transition_ms(),
            narrow_viewport_width: default_narrow_viewport_width(),
            easter_egg_one_in: default_easter_egg_one_in(),
            platform: PlatformSetting::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `sqlt.json` exists but is invalid.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            SessionError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads `sqlt.json` from a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ConfigParseError` for unreadable files or bad
    /// JSON, and `SessionError::ConfigValidationError` for out-of-range values.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(SessionError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| SessionError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ConfigValidationError` naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        let base = self.api_base_url.trim();
        if base.is_empty() {
            return Err(SessionError::config_validation(
                "apiBaseUrl must not be empty",
                "Set apiBaseUrl to the exercise service, e.g. http://localhost:8000/api/",
            ));
        }

        if !base.starts_with("http://") && !base.starts_with("https://") {
            return Err(SessionError::config_validation(
                format!("apiBaseUrl '{base}' is not an http(s) URL"),
                "Prefix apiBaseUrl with http:// or https://",
            ));
        }

        if !base.ends_with('/') {
            return Err(SessionError::config_validation(
                format!("apiBaseUrl '{base}' must end with '/'"),
                format!("Use '{base}/' so endpoint paths resolve beneath it"),
            ));
        }

        if self.min_query_length == 0 {
            return Err(SessionError::config_validation(
                "minQueryLength must be greater than 0",
                "Set minQueryLength to at least 1 in your sqlt.json",
            ));
        }

        if self.pane_transition_ms == 0 {
            return Err(SessionError::config_validation(
                "paneTransitionMs must be greater than 0",
                "Set paneTransitionMs to at least 1 in your sqlt.json",
            ));
        }

        if self.easter_egg_one_in == 0 {
            return Err(SessionError::config_validation(
                "easterEggOneIn must be greater than 0",
                "Set easterEggOneIn to 1 for always, or a larger number for rarer easter eggs",
            ));
        }

        if self.event_capacity == 0 {
            return Err(SessionError::config_validation(
                "eventCapacity must be greater than 0",
                "Set eventCapacity to at least 1 in your sqlt.json",
            ));
        }

        Ok(())
    }

    /// Returns the pane transition interval as a `Duration`.
    #[must_use]
    pub const fn pane_transition(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.pane_transition_ms)
    }
}

// ============================================================================
// PlatformSetting
// ============================================================================

/// Platform selection for keyboard chords.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlatformSetting {
    /// Detect from the host user agent.
    #[default]
    Auto,
    /// Force the Control-modifier family.
    Mac,
    /// Force the Alt-modifier family.
    Other,
}

impl PlatformSetting {
    /// Parses a string into a `PlatformSetting`, case-insensitively.
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "mac" => Some(Self::Mac),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Resolves the setting to a concrete platform.
    ///
    /// `Auto` inspects the given user agent string.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlt_session::{Platform, PlatformSetting};
    ///
    /// assert_eq!(PlatformSetting::Auto.resolve("Mozilla/5.0 (Macintosh)"), Platform::Mac);
    /// assert_eq!(PlatformSetting::Other.resolve("Mozilla/5.0 (Macintosh)"), Platform::Other);
    /// ```
    #[must_use]
    pub fn resolve(self, user_agent: &str) -> Platform {
        match self {
            Self::Auto => Platform::from_user_agent(user_agent),
            Self::Mac => Platform::Mac,
            Self::Other => Platform::Other,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Mac => "mac",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for PlatformSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PlatformSetting {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid platform '{s}': expected one of 'auto', 'mac', 'other'"
            ))
        })
    }
}

impl Serialize for PlatformSetting {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("sqlt_config_{}_{name}", std::process::id()))
    }

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.api_base_url, "http://localhost:8000/api/");
        assert_eq!(config.min_query_length, 3);
        assert_eq!(config.pane_transition_ms, 150);
        assert_eq!(config.narrow_viewport_width, 450);
        assert_eq!(config.easter_egg_one_in, 10);
        assert_eq!(config.platform, PlatformSetting::Auto);
        assert_eq!(config.event_capacity, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialization_with_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_deserialization_with_overrides() {
        let json = r#"{
            "apiBaseUrl": "https://sql.example.org/api/",
            "minQueryLength": 5,
            "platform": "MAC",
            "easterEggOneIn": 1
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.api_base_url, "https://sql.example.org/api/");
        assert_eq!(config.min_query_length, 5);
        assert_eq!(config.platform, PlatformSetting::Mac);
        assert_eq!(config.easter_egg_one_in, 1);
        assert_eq!(config.pane_transition_ms, 150);
    }

    #[test]
    fn test_platform_case_insensitive() {
        for (raw, expected) in [
            ("auto", PlatformSetting::Auto),
            ("Mac", PlatformSetting::Mac),
            ("OTHER", PlatformSetting::Other),
        ] {
            let config: Config =
                serde_json::from_str(&format!(r#"{{"platform": "{raw}"}}"#)).unwrap();
            assert_eq!(config.platform, expected);
        }
    }

    #[test]
    fn test_invalid_platform_error() {
        let result: std::result::Result<Config, _> =
            serde_json::from_str(r#"{"platform": "amiga"}"#);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("invalid platform"));
        assert!(err.contains("amiga"));
    }

    #[test]
    fn test_platform_setting_serialization() {
        assert_eq!(
            serde_json::to_string(&PlatformSetting::Other).unwrap(),
            "\"other\""
        );
    }

    #[test]
    fn test_platform_setting_resolve() {
        let mac_ua = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)";
        let linux_ua = "Mozilla/5.0 (X11; Linux x86_64)";

        assert_eq!(PlatformSetting::Auto.resolve(mac_ua), Platform::Mac);
        assert_eq!(PlatformSetting::Auto.resolve(linux_ua), Platform::Other);
        assert_eq!(PlatformSetting::Mac.resolve(linux_ua), Platform::Mac);
        assert_eq!(PlatformSetting::Other.resolve(mac_ua), Platform::Other);
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    #[test]
    fn test_validate_base_url_trailing_slash() {
        let config = Config {
            api_base_url: "http://localhost:8000/api".to_string(),
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must end with '/'"));
    }

    #[test]
    fn test_validate_base_url_scheme() {
        let config = Config {
            api_base_url: "localhost:8000/api/".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_values() {
        let cases = [
            Config {
                min_query_length: 0,
                ..Config::default()
            },
            Config {
                pane_transition_ms: 0,
                ..Config::default()
            },
            Config {
                easter_egg_one_in: 0,
                ..Config::default()
            },
            Config {
                event_capacity: 0,
                ..Config::default()
            },
        ];
        for config in cases {
            assert!(matches!(
                config.validate(),
                Err(SessionError::ConfigValidationError { .. })
            ));
        }
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    #[test]
    fn test_load_from_file_missing_returns_defaults() {
        let config = Config::load_from_file(&temp_path("does_not_exist.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_file_valid_json() {
        let path = temp_path("valid.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(br#"{"minQueryLength": 4, "platform": "other"}"#)
            .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.min_query_length, 4);
        assert_eq!(config.platform, PlatformSetting::Other);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let path = temp_path("invalid.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Config::load_from_file(&path).unwrap_err();
        assert!(matches!(err, SessionError::ConfigParseError { .. }));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_from_file_invalid_values() {
        let path = temp_path("invalid_values.json");
        std::fs::write(&path, r#"{"eventCapacity": 0}"#).unwrap();

        let err = Config::load_from_file(&path).unwrap_err();
        assert!(matches!(err, SessionError::ConfigValidationError { .. }));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_pane_transition_duration() {
        let config = Config::default();
        assert_eq!(
            config.pane_transition(),
            std::time::Duration::from_millis(150)
        );
    }
}
