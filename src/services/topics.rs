//! Topic and procedure names, parameterized by game and badge id.

use crate::state::actor::ActorId;

/// Directory service procedure registering a game.
pub const REGISTER: &str = "game.register";
/// Broadcast asking every game to register again.
pub const REQUEST_REGISTER: &str = "game.request_register";

pub fn player_join(game_id: &str) -> String {
    format!("game.{game_id}.player.join")
}

pub fn player_leave(game_id: &str) -> String {
    format!("game.{game_id}.player.leave")
}

pub fn player_updated(game_id: &str) -> String {
    format!("game.{game_id}.player_updated")
}

pub fn station_updated(game_id: &str) -> String {
    format!("game.{game_id}.station_updated")
}

/// Procedure `name` exposed by this game.
pub fn procedure(game_id: &str, name: &str) -> String {
    format!("game.{game_id}.{name}")
}

pub fn button_press(badge_id: &ActorId) -> String {
    format!("badge.{badge_id}.button.press")
}

pub fn button_release(badge_id: &ActorId) -> String {
    format!("badge.{badge_id}.button.release")
}

pub fn lights_static(badge_id: &ActorId) -> String {
    format!("badge.{badge_id}.lights_static")
}

pub fn text(badge_id: &ActorId) -> String {
    format!("badge.{badge_id}.text")
}
