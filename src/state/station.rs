//! Stations: named bundles of per-button actions that players can be assigned to.

use std::{fmt, str::FromStr, time::Duration};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Physical buttons on a badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Button {
    Up,
    Down,
    Left,
    Right,
    Select,
    Start,
    A,
    B,
}

impl Button {
    /// Every button, in a stable order.
    pub const ALL: [Button; 8] = [
        Button::Up,
        Button::Down,
        Button::Left,
        Button::Right,
        Button::Select,
        Button::Start,
        Button::A,
        Button::B,
    ];

    /// Wire name of the button.
    pub fn as_str(self) -> &'static str {
        match self {
            Button::Up => "up",
            Button::Down => "down",
            Button::Left => "left",
            Button::Right => "right",
            Button::Select => "select",
            Button::Start => "start",
            Button::A => "a",
            Button::B => "b",
        }
    }

    /// Dense index, usable to address per-button arrays.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a button name is not one of the eight badge buttons.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown button `{0}`")]
pub struct UnknownButton(pub String);

impl FromStr for Button {
    type Err = UnknownButton;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Button::ALL
            .into_iter()
            .find(|button| button.as_str() == value)
            .ok_or_else(|| UnknownButton(value.to_string()))
    }
}

/// What pressing one button at a station does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Text emitted once the message threshold is passed; doubles as the flag label.
    pub message: String,
    /// Successful presses required (strictly more than) before the flag is set.
    pub flag_after: u32,
    /// Successful presses required (strictly more than) before the message is emitted.
    pub message_after: u32,
    /// Minimum gap between the previous release and the next press.
    pub cooldown: Duration,
    /// Minimum hold time; zero fires on press without any gating.
    pub hold: Duration,
}

impl Action {
    /// Action firing immediately on press.
    pub fn instant(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            flag_after: 0,
            message_after: 0,
            cooldown: Duration::ZERO,
            hold: Duration::ZERO,
        }
    }

    /// Whether the action needs a hold/release cycle.
    pub fn requires_hold(&self) -> bool {
        !self.hold.is_zero()
    }
}

/// Named configuration bundle mapping buttons to actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Station {
    pub name: String,
    pub buttons: IndexMap<Button, Action>,
}

impl Station {
    /// Build an empty station.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buttons: IndexMap::new(),
        }
    }

    /// Attach `action` to `button`.
    pub fn with_action(mut self, button: Button, action: Action) -> Self {
        self.buttons.insert(button, action);
        self
    }

    /// Action configured for `button`, if any.
    pub fn action(&self, button: Button) -> Option<&Action> {
        self.buttons.get(&button)
    }
}

/// Read-only lookup of stations by name.
#[derive(Debug, Clone, Default)]
pub struct StationDirectory {
    stations: IndexMap<String, Station>,
}

impl StationDirectory {
    /// Build a directory from already-validated stations.
    pub fn new(stations: impl IntoIterator<Item = Station>) -> Self {
        Self {
            stations: stations
                .into_iter()
                .map(|station| (station.name.clone(), station))
                .collect(),
        }
    }

    /// Look up a station by name.
    pub fn get(&self, name: &str) -> Option<&Station> {
        self.stations.get(name)
    }

    /// Iterate stations in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.stations.values()
    }

    /// Number of configured stations.
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    /// Whether no station is configured.
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buttons_parse_from_wire_names() {
        for button in Button::ALL {
            assert_eq!(button.as_str().parse::<Button>(), Ok(button));
        }
        assert_eq!(
            "x".parse::<Button>(),
            Err(UnknownButton("x".to_string()))
        );
    }

    #[test]
    fn button_indexes_are_dense() {
        let indexes: Vec<usize> = Button::ALL.iter().map(|b| b.index()).collect();
        assert_eq!(indexes, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn directory_lookup_is_by_name() {
        let directory = StationDirectory::new([
            Station::new("bar").with_action(Button::A, Action::instant("cheers")),
            Station::new("arcade"),
        ]);
        assert_eq!(directory.len(), 2);
        assert!(directory.get("bar").and_then(|s| s.action(Button::A)).is_some());
        assert!(directory.get("bar").and_then(|s| s.action(Button::B)).is_none());
        assert!(directory.get("lobby").is_none());
    }
}
