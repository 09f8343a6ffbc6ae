//! Application-level configuration loading: cycle durations, debug mode,
//! and the prompt parameters used in blend mode.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::timers::{MIN_AUTO_REPEAT_DURATION, MIN_VOTE_DURATION};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "CHORUS_BACK_CONFIG_PATH";

const DEFAULT_VOTE_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_MAX_COMPLETION_TOKENS: u32 = 400;
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_PARTY_NAME: &str = "The Party";
const DEFAULT_CHARACTER_NAME: &str = "The Hero";

#[derive(Debug, Clone, Deserialize)]
#[serde(from = "RawConfig")]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    vote_duration: Duration,
    auto_repeat: Option<Duration>,
    debug_mode: bool,
    max_completion_tokens: u32,
    model: String,
    party_name: String,
    character_name: String,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults
    /// when the file is missing or malformed.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        vote_secs = config.vote_duration.as_secs(),
                        auto_repeat = ?config.auto_repeat.map(|d| d.as_secs()),
                        debug_mode = config.debug_mode,
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Vote countdown length, never below the engine minimum.
    pub fn vote_duration(&self) -> Duration {
        self.vote_duration
    }

    /// Cooldown before the next automatic cycle; `None` disables auto-repeat.
    pub fn auto_repeat(&self) -> Option<Duration> {
        self.auto_repeat
    }

    /// Whether submissions and votes use the relaxed debug semantics.
    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }

    /// Upper bound on response tokens per completion call.
    pub fn max_completion_tokens(&self) -> u32 {
        self.max_completion_tokens
    }

    /// Model identifier used for completion calls.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Party name handed to the story service with each action.
    pub fn party_name(&self) -> &str {
        &self.party_name
    }

    /// Character name addressed in merge prompts.
    pub fn character_name(&self) -> &str {
        &self.character_name
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            vote_duration: DEFAULT_VOTE_DURATION,
            auto_repeat: None,
            debug_mode: false,
            max_completion_tokens: DEFAULT_MAX_COMPLETION_TOKENS,
            model: DEFAULT_MODEL.to_string(),
            party_name: DEFAULT_PARTY_NAME.to_string(),
            character_name: DEFAULT_CHARACTER_NAME.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file.
struct RawConfig {
    vote_duration_secs: Option<u64>,
    auto_repeat_secs: Option<u64>,
    #[serde(default)]
    debug_mode: bool,
    max_completion_tokens: Option<u32>,
    model: Option<String>,
    party_name: Option<String>,
    character_name: Option<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();

        let vote_duration = raw
            .vote_duration_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.vote_duration);
        let vote_duration = clamp_min(vote_duration, MIN_VOTE_DURATION, "vote_duration_secs");

        // A cooldown of zero disables auto-repeat entirely.
        let auto_repeat = raw
            .auto_repeat_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .map(|delay| clamp_min(delay, MIN_AUTO_REPEAT_DURATION, "auto_repeat_secs"));

        Self {
            vote_duration,
            auto_repeat,
            debug_mode: raw.debug_mode,
            max_completion_tokens: raw
                .max_completion_tokens
                .unwrap_or(defaults.max_completion_tokens),
            model: raw.model.unwrap_or(defaults.model),
            party_name: raw.party_name.unwrap_or(defaults.party_name),
            character_name: raw.character_name.unwrap_or(defaults.character_name),
        }
    }
}

fn clamp_min(requested: Duration, minimum: Duration, field: &str) -> Duration {
    if requested < minimum {
        warn!(
            field,
            requested_secs = requested.as_secs(),
            minimum_secs = minimum.as_secs(),
            "configured duration below minimum; clamping"
        );
        minimum
    } else {
        requested
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> AppConfig {
        serde_json::from_str::<RawConfig>(json).unwrap().into()
    }

    #[test]
    fn vote_duration_is_clamped_to_minimum() {
        let config = parse(r#"{"vote_duration_secs": 3}"#);
        assert_eq!(config.vote_duration(), Duration::from_secs(5));
    }

    #[test]
    fn auto_repeat_is_clamped_to_minimum() {
        let config = parse(r#"{"auto_repeat_secs": 10}"#);
        assert_eq!(config.auto_repeat(), Some(Duration::from_secs(20)));
    }

    #[test]
    fn auto_repeat_zero_disables_the_cycle() {
        let config = parse(r#"{"auto_repeat_secs": 0}"#);
        assert_eq!(config.auto_repeat(), None);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = parse("{}");
        assert_eq!(config.vote_duration(), DEFAULT_VOTE_DURATION);
        assert_eq!(config.auto_repeat(), None);
        assert!(!config.debug_mode());
        assert_eq!(config.model(), DEFAULT_MODEL);
        assert_eq!(config.party_name(), DEFAULT_PARTY_NAME);
    }

    #[test]
    fn valid_values_pass_through_unchanged() {
        let config = parse(
            r#"{
                "vote_duration_secs": 90,
                "auto_repeat_secs": 45,
                "debug_mode": true,
                "max_completion_tokens": 256,
                "model": "local-merge",
                "party_name": "Night Watch",
                "character_name": "Ilya"
            }"#,
        );
        assert_eq!(config.vote_duration(), Duration::from_secs(90));
        assert_eq!(config.auto_repeat(), Some(Duration::from_secs(45)));
        assert!(config.debug_mode());
        assert_eq!(config.max_completion_tokens(), 256);
        assert_eq!(config.model(), "local-merge");
        assert_eq!(config.party_name(), "Night Watch");
        assert_eq!(config.character_name(), "Ilya");
    }
}
