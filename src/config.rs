//! Engine configuration loading, including default timers and player colors.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::game::{MAX_PLAYERS, TimerSettings};

/// Default location on disk where the engine looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TRIAD_BOARD_CONFIG_PATH";
/// Default location of the persisted game snapshot.
const DEFAULT_STATE_PATH: &str = "data/game_state.json";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the engine.
pub struct EngineConfig {
    /// Path of the whole-snapshot JSON state file.
    pub state_path: PathBuf,
    /// Timer durations a fresh session starts with.
    pub default_timers: TimerSettings,
    /// Color tokens handed to players in id order.
    pub player_colors: Vec<String>,
    /// Number of players a default-constructed session gets.
    pub default_player_count: u8,
    /// Theme a default-constructed session uses.
    pub default_theme: String,
}

impl EngineConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded engine configuration");
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
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
            default_timers: TimerSettings::default(),
            player_colors: default_player_colors(),
            default_player_count: 2,
            default_theme: "classic".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file.
struct RawConfig {
    state_path: Option<PathBuf>,
    countdown_ms: Option<u64>,
    buzz_hold_ms: Option<u64>,
    selection_ms: Option<u64>,
    player_colors: Option<Vec<String>>,
    default_player_count: Option<u8>,
    default_theme: Option<String>,
}

impl From<RawConfig> for EngineConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = EngineConfig::default();
        let mut timers = defaults.default_timers.clone();
        if let Some(countdown_ms) = raw.countdown_ms {
            timers.countdown_ms = countdown_ms;
        }
        if let Some(buzz_hold_ms) = raw.buzz_hold_ms {
            timers.buzz_hold_ms = buzz_hold_ms;
        }
        if let Some(selection_ms) = raw.selection_ms {
            timers.selection_ms = selection_ms;
        }

        let default_player_count = raw
            .default_player_count
            .filter(|count| (1..=MAX_PLAYERS).contains(count))
            .unwrap_or(defaults.default_player_count);

        Self {
            state_path: raw.state_path.unwrap_or(defaults.state_path),
            default_timers: timers,
            player_colors: raw.player_colors.unwrap_or(defaults.player_colors),
            default_player_count,
            default_theme: raw.default_theme.unwrap_or(defaults.default_theme),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in player colors shipped with the engine, in player-id order.
fn default_player_colors() -> Vec<String> {
    ["#ff3366", "#33a1ff", "#4caf50", "#ffc107"]
        .iter()
        .map(|color| color.to_string())
        .collect()
}
