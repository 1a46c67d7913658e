//! Station configuration as stored on disk and reported over the bus.

use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::state::{
    actor::Actor,
    station::{Action, Button, Station, StationDirectory},
};

/// Upper bound for hold and cooldown windows.
const MAX_WINDOW: Duration = Duration::from_secs(60);

/// Root of the stations file.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct StationsFile {
    #[serde(default)]
    pub stations: IndexMap<String, StationConfig>,
}

/// Buttons configured at one station.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StationConfig {
    #[serde(default)]
    pub buttons: IndexMap<Button, ActionConfig>,
}

/// One button's action; windows are expressed in milliseconds.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Validate)]
pub struct ActionConfig {
    #[validate(length(min = 1, max = 64))]
    pub message: String,
    #[serde(default)]
    pub flag_after: u32,
    #[serde(default)]
    pub message_after: u32,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "cooldown_ms", default)]
    #[validate(custom(function = "validate_window"))]
    pub cooldown: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "hold_ms", default)]
    #[validate(custom(function = "validate_window"))]
    pub hold: Duration,
}

fn validate_window(window: &Duration) -> Result<(), ValidationError> {
    if *window > MAX_WINDOW {
        let mut err = ValidationError::new("window_too_long");
        err.message = Some(
            format!(
                "window must not exceed {} ms (got {} ms)",
                MAX_WINDOW.as_millis(),
                window.as_millis()
            )
            .into(),
        );
        return Err(err);
    }
    Ok(())
}

impl Validate for StationConfig {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        for (button, action) in &self.buttons {
            if let Err(action_errors) = action.validate() {
                errors.merge_self(button.as_str(), Err(action_errors));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Validate for StationsFile {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        for (name, station) in &self.stations {
            if name.trim().is_empty() {
                let mut err = ValidationError::new("station_name");
                err.message = Some("station names must not be blank".into());
                errors.add("stations", err);
            }
            // Station names are dynamic, so nested errors are flattened into one entry each.
            if let Err(station_errors) = station.validate() {
                let mut err = ValidationError::new("invalid_station");
                err.message = Some(format!("station `{name}`: {station_errors}").into());
                errors.add("stations", err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl From<ActionConfig> for Action {
    fn from(config: ActionConfig) -> Self {
        Self {
            message: config.message,
            flag_after: config.flag_after,
            message_after: config.message_after,
            cooldown: config.cooldown,
            hold: config.hold,
        }
    }
}

impl From<&Action> for ActionConfig {
    fn from(action: &Action) -> Self {
        Self {
            message: action.message.clone(),
            flag_after: action.flag_after,
            message_after: action.message_after,
            cooldown: action.cooldown,
            hold: action.hold,
        }
    }
}

impl From<&Station> for StationConfig {
    fn from(station: &Station) -> Self {
        Self {
            buttons: station
                .buttons
                .iter()
                .map(|(button, action)| (*button, action.into()))
                .collect(),
        }
    }
}

impl From<StationsFile> for StationDirectory {
    fn from(file: StationsFile) -> Self {
        StationDirectory::new(file.stations.into_iter().map(|(name, config)| Station {
            name,
            buttons: config
                .buttons
                .into_iter()
                .map(|(button, action)| (button, action.into()))
                .collect(),
        }))
    }
}

/// Public view of a player, broadcast on `player_updated` and listed by `get_config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerSnapshot {
    pub id: String,
    pub station: Option<String>,
    pub flags: Vec<String>,
    /// Successful presses per button; buttons never counted are omitted.
    pub presses: IndexMap<Button, u32>,
}

impl From<&Actor> for PlayerSnapshot {
    fn from(actor: &Actor) -> Self {
        Self {
            id: actor.id.to_string(),
            station: actor.station.clone(),
            flags: actor.flags().iter().cloned().collect(),
            presses: Button::ALL
                .into_iter()
                .map(|button| (button, actor.timing(button).press_count))
                .filter(|(_, count)| *count > 0)
                .collect(),
        }
    }
}

/// Reply of `game.<id>.get_config`.
#[derive(Debug, Serialize)]
pub struct GameConfigReply {
    pub players: Vec<PlayerSnapshot>,
    pub stations: IndexMap<String, StationConfig>,
}

impl GameConfigReply {
    pub fn new(players: Vec<PlayerSnapshot>, stations: &StationDirectory) -> Self {
        Self {
            players,
            stations: stations
                .iter()
                .map(|station| (station.name.clone(), station.into()))
                .collect(),
        }
    }
}

/// Payload of `game.<id>.station_updated`.
#[derive(Debug, Serialize)]
pub struct StationUpdated {
    pub id: String,
    pub config: StationConfig,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::state::actor::ActorId;

    fn action(message: &str, hold_ms: u64) -> ActionConfig {
        ActionConfig {
            message: message.into(),
            flag_after: 0,
            message_after: 0,
            cooldown: Duration::ZERO,
            hold: Duration::from_millis(hold_ms),
        }
    }

    #[test]
    fn windows_serialize_as_milliseconds() {
        let value = serde_json::to_value(action("ok", 800)).unwrap();
        assert_eq!(value["hold_ms"], json!(800));
        assert_eq!(value["cooldown_ms"], json!(0));
    }

    #[test]
    fn oversized_windows_are_rejected() {
        let mut station = StationConfig::default();
        station.buttons.insert(Button::A, action("ok", 61_000));
        let errors = station.validate().unwrap_err();
        assert!(errors.errors().contains_key("a"));
    }

    #[test]
    fn blank_station_names_are_rejected() {
        let mut file = StationsFile::default();
        file.stations.insert(" ".into(), StationConfig::default());
        assert!(file.validate().is_err());
    }

    #[test]
    fn directory_round_trips_into_config_view() {
        let mut file = StationsFile::default();
        let mut station = StationConfig::default();
        station.buttons.insert(Button::B, action("flag{b}", 500));
        file.stations.insert("bar".into(), station.clone());

        let directory = StationDirectory::from(file);
        let reply = GameConfigReply::new(Vec::new(), &directory);
        assert_eq!(reply.stations.get("bar"), Some(&station));
    }

    #[test]
    fn snapshot_omits_uncounted_buttons() {
        let mut actor = Actor::new(ActorId::new("7"));
        actor.station = Some("bar".into());
        let held: Action = action("flag{b}", 100).into();
        actor.press(Button::B, Some(&held), 0);
        actor.release(Button::B, Some(&held), 500);

        let snapshot = PlayerSnapshot::from(&actor);
        assert_eq!(snapshot.id, "7");
        assert_eq!(snapshot.presses.get(&Button::B), Some(&1));
        assert!(!snapshot.presses.contains_key(&Button::A));
        assert_eq!(snapshot.flags, vec!["flag{b}".to_string()]);
    }
}
