//! Application-level configuration loading: bus credentials, game identity and stations.

use std::{
    env, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::info;
use validator::{Validate, ValidationErrors};

use crate::{
    bus::wamp::WampConfig,
    dto::station::StationsFile,
    state::station::StationDirectory,
};

/// Default location on disk where the stations configuration is looked up.
const DEFAULT_STATIONS_PATH: &str = "config/stations.json";
/// Environment variable that overrides [`DEFAULT_STATIONS_PATH`].
const STATIONS_PATH_ENV: &str = "BADGE_STATIONS_PATH";
const DEFAULT_BUS_URL: &str = "ws://api.swadge.com:1337/ws";
const DEFAULT_REALM: &str = "swadges";
/// Placeholder game id shipped in examples; running with it would clash with other games.
const PLACEHOLDER_GAME_ID: &str = "demo_game";
const MAX_JOIN_SEQUENCE_LEN: usize = 12;
/// Buttons as spelled in join sequences: [u]p, [l]eft, [d]own, [r]ight, s[e]lect, [s]tart, a, b.
const JOIN_SEQUENCE_KEYS: &str = "uldresab";
const DEFAULT_PORT: u16 = 8080;

/// Failures that prevent the process from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("invalid value for `{var}`: {reason}")]
    InvalidEnvVar { var: &'static str, reason: String },
    #[error("failed to read stations file `{path}`")]
    ReadStations {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse stations file `{path}`")]
    ParseStations {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid stations file `{path}`: {errors}")]
    InvalidStations {
        path: String,
        errors: ValidationErrors,
    },
}

/// Which game runs on top of the session substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameMode {
    /// Buttons pick lights, colors and brightness.
    Simple,
    /// Players are assigned to stations whose buttons must be held to score.
    Station,
}

/// Identity the game registers under.
#[derive(Debug, Clone)]
pub struct GameSettings {
    pub id: String,
    /// Button sequence that joins a badge to the game; empty disables it.
    pub join_sequence: String,
    /// Location that joins badges automatically; empty disables it.
    pub join_location: String,
    pub mode: GameMode,
}

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bus: WampConfig,
    pub game: GameSettings,
    pub webhook_url: Option<reqwest::Url>,
    pub port: u16,
    pub stations: StationDirectory,
}

impl AppConfig {
    /// Load the configuration from the process environment and the stations file.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self::from_lookup(|var| env::var(var).ok())?;
        info!(
            game_id = %config.game.id,
            mode = ?config.game.mode,
            stations = config.stations.len(),
            "loaded configuration"
        );
        Ok(config)
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|value| !value.is_empty());
        let require = |var: &'static str| get(var).ok_or(ConfigError::MissingEnvVar { var });

        let bus = WampConfig::new(
            get("BADGE_BUS_URL").unwrap_or_else(|| DEFAULT_BUS_URL.into()),
            get("BADGE_BUS_REALM").unwrap_or_else(|| DEFAULT_REALM.into()),
        )
        .with_credentials(require("BADGE_BUS_USER")?, require("BADGE_BUS_PASSWORD")?);

        let id = require("BADGE_GAME_ID")?;
        if id == PLACEHOLDER_GAME_ID {
            return Err(ConfigError::InvalidEnvVar {
                var: "BADGE_GAME_ID",
                reason: format!("`{PLACEHOLDER_GAME_ID}` is reserved, pick a unique game id"),
            });
        }

        let join_sequence = get("BADGE_JOIN_SEQUENCE").unwrap_or_default();
        validate_join_sequence(&join_sequence)?;

        let mode = match get("BADGE_GAME_MODE").as_deref() {
            None | Some("simple") => GameMode::Simple,
            Some("station") => GameMode::Station,
            Some(other) => {
                return Err(ConfigError::InvalidEnvVar {
                    var: "BADGE_GAME_MODE",
                    reason: format!("expected `simple` or `station`, got `{other}`"),
                });
            }
        };

        let webhook_url = get("BADGE_WEBHOOK_URL")
            .map(|raw| {
                reqwest::Url::parse(&raw).map_err(|err| ConfigError::InvalidEnvVar {
                    var: "BADGE_WEBHOOK_URL",
                    reason: err.to_string(),
                })
            })
            .transpose()?;

        let port = get("PORT")
            .map(|raw| {
                raw.parse::<u16>().map_err(|err| ConfigError::InvalidEnvVar {
                    var: "PORT",
                    reason: err.to_string(),
                })
            })
            .transpose()?
            .unwrap_or(DEFAULT_PORT);

        let stations_path = get(STATIONS_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIONS_PATH));

        Ok(Self {
            bus,
            game: GameSettings {
                id,
                join_sequence,
                join_location: get("BADGE_JOIN_LOCATION").unwrap_or_default(),
                mode,
            },
            webhook_url,
            port,
            stations: load_stations(&stations_path)?,
        })
    }
}

fn validate_join_sequence(sequence: &str) -> Result<(), ConfigError> {
    if sequence.len() > MAX_JOIN_SEQUENCE_LEN {
        return Err(ConfigError::InvalidEnvVar {
            var: "BADGE_JOIN_SEQUENCE",
            reason: format!("at most {MAX_JOIN_SEQUENCE_LEN} buttons allowed"),
        });
    }
    if let Some(key) = sequence.chars().find(|c| !JOIN_SEQUENCE_KEYS.contains(*c)) {
        return Err(ConfigError::InvalidEnvVar {
            var: "BADGE_JOIN_SEQUENCE",
            reason: format!("`{key}` is not a button, use one of `{JOIN_SEQUENCE_KEYS}`"),
        });
    }
    Ok(())
}

/// Read the stations file; a missing file yields an empty directory.
fn load_stations(path: &Path) -> Result<StationDirectory, ConfigError> {
    let path_str = path.display().to_string();
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!(path = %path_str, "stations file not found; no stations configured");
            return Ok(StationDirectory::default());
        }
        Err(source) => {
            return Err(ConfigError::ReadStations {
                path: path_str,
                source,
            });
        }
    };

    parse_stations(&contents).map_err(|err| match err {
        StationsParseError::Json(source) => ConfigError::ParseStations {
            path: path_str.clone(),
            source,
        },
        StationsParseError::Invalid(errors) => ConfigError::InvalidStations {
            path: path_str.clone(),
            errors,
        },
    })
}

enum StationsParseError {
    Json(serde_json::Error),
    Invalid(ValidationErrors),
}

fn parse_stations(contents: &str) -> Result<StationDirectory, StationsParseError> {
    let file: StationsFile = serde_json::from_str(contents).map_err(StationsParseError::Json)?;
    file.validate().map_err(StationsParseError::Invalid)?;
    Ok(file.into())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use crate::state::station::Button;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    const REQUIRED: [(&str, &str); 4] = [
        ("BADGE_BUS_USER", "team"),
        ("BADGE_BUS_PASSWORD", "hunter2"),
        ("BADGE_GAME_ID", "lights"),
        ("BADGE_STATIONS_PATH", "/nonexistent/stations.json"),
    ];

    #[test]
    fn defaults_apply_when_only_required_vars_are_set() {
        let config = AppConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.bus.url, DEFAULT_BUS_URL);
        assert_eq!(config.bus.realm, DEFAULT_REALM);
        assert_eq!(config.bus.authid, "team");
        assert_eq!(config.game.mode, GameMode::Simple);
        assert_eq!(config.game.join_sequence, "");
        assert!(config.webhook_url.is_none());
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.stations.is_empty());
    }

    #[test]
    fn missing_credentials_are_fatal() {
        let err = AppConfig::from_lookup(lookup(&[("BADGE_GAME_ID", "lights")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingEnvVar {
                var: "BADGE_BUS_USER"
            }
        ));
    }

    #[test]
    fn placeholder_game_id_is_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("BADGE_GAME_ID", "demo_game"));
        vars.remove(2);
        let err = AppConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnvVar {
                var: "BADGE_GAME_ID",
                ..
            }
        ));
    }

    #[test]
    fn join_sequence_is_checked() {
        assert!(validate_join_sequence("uuddlrlrbaes").is_ok());
        assert!(validate_join_sequence("").is_ok());
        assert!(validate_join_sequence("uuddlrlrbaess").is_err());
        assert!(validate_join_sequence("uux").is_err());
    }

    #[test]
    fn bad_webhook_url_is_fatal() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("BADGE_WEBHOOK_URL", "not a url"));
        assert!(AppConfig::from_lookup(lookup(&vars)).is_err());
    }

    #[test]
    fn parses_station_file() {
        let directory = parse_stations(
            r#"{
                "stations": {
                    "bar": {
                        "buttons": {
                            "a": { "message": "flag{bar}", "flag_after": 3, "message_after": 1,
                                   "cooldown_ms": 1000, "hold_ms": 800 },
                            "start": { "message": "hello" }
                        }
                    }
                }
            }"#,
        )
        .ok()
        .unwrap();
        let station = directory.get("bar").unwrap();
        let action = station.action(Button::A).unwrap();
        assert_eq!(action.hold, Duration::from_millis(800));
        assert_eq!(action.cooldown, Duration::from_secs(1));
        assert_eq!(action.flag_after, 3);
        assert!(!station.action(Button::Start).unwrap().requires_hold());
    }

    #[test]
    fn rejects_invalid_station_actions() {
        let result = parse_stations(
            r#"{ "stations": { "bar": { "buttons": { "a": { "message": "" } } } } }"#,
        );
        assert!(matches!(result, Err(StationsParseError::Invalid(_))));
        let result = parse_stations(r#"{ "stations": { "bar": { "buttons": { "z": {} } } } }"#);
        assert!(matches!(result, Err(StationsParseError::Json(_))));
    }
}
