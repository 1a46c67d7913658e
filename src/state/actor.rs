//! Per-player state for a connected badge.

use std::fmt;

use futures::future::join_all;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    bus::{Bus, BusError, Subscription},
    state::{
        color::{self, Color, lighten},
        interaction::{
            self, ButtonTiming, LIGHT_SLOTS, PressOutcome, ReleaseOutcome, Timestamp,
        },
        station::{Action, Button},
    },
};

const DEFAULT_BRIGHTNESS: f64 = 0.1;
const BRIGHTNESS_STEP: f64 = 0.1;

/// Stable identifier of a badge, as assigned by the router.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A connected player: light settings, button counters and the subscriptions it owns.
#[derive(Debug)]
pub struct Actor {
    pub id: ActorId,
    /// Minted on every join; events carrying another token belong to an earlier session.
    pub session: Uuid,
    /// Name of the assigned station, looked up in the directory on use.
    pub station: Option<String>,
    selected_light: usize,
    brightness: f64,
    lights: [Color; LIGHT_SLOTS],
    buttons: [ButtonTiming; Button::ALL.len()],
    flags: IndexSet<String>,
    subscriptions: Vec<Subscription>,
}

impl Actor {
    /// Fresh actor: dim white lights, nothing selected beyond slot 0, no counters.
    pub fn new(id: ActorId) -> Self {
        Self {
            id,
            session: Uuid::new_v4(),
            station: None,
            selected_light: 0,
            brightness: DEFAULT_BRIGHTNESS,
            lights: [Color::WHITE; LIGHT_SLOTS],
            buttons: Default::default(),
            flags: IndexSet::new(),
            subscriptions: Vec::new(),
        }
    }

    pub fn selected_light(&self) -> usize {
        self.selected_light
    }

    pub fn brightness(&self) -> f64 {
        self.brightness
    }

    pub fn lights(&self) -> &[Color; LIGHT_SLOTS] {
        &self.lights
    }

    pub fn flags(&self) -> &IndexSet<String> {
        &self.flags
    }

    pub fn timing(&self, button: Button) -> &ButtonTiming {
        &self.buttons[button.index()]
    }

    pub fn select_next_light(&mut self) {
        self.selected_light = (self.selected_light + 1) % LIGHT_SLOTS;
    }

    pub fn select_prev_light(&mut self) {
        self.selected_light = (self.selected_light + LIGHT_SLOTS - 1) % LIGHT_SLOTS;
    }

    pub fn brighten(&mut self) {
        self.brightness = (self.brightness + BRIGHTNESS_STEP).clamp(0.0, 1.0);
    }

    pub fn dim(&mut self) {
        self.brightness = (self.brightness - BRIGHTNESS_STEP).clamp(0.0, 1.0);
    }

    pub fn set_selected_light_color(&mut self, color: Color) {
        self.lights[self.selected_light] = color;
    }

    /// Step the selected light forward through the rainbow.
    pub fn next_selected_color(&mut self) {
        self.set_selected_light_color(color::next_color(self.lights[self.selected_light]));
    }

    /// Step the selected light backward through the rainbow.
    pub fn prev_selected_color(&mut self) {
        self.set_selected_light_color(color::prev_color(self.lights[self.selected_light]));
    }

    /// Lights as they should be shown, scaled by the current brightness.
    pub fn rendered_lights(&self) -> [Color; LIGHT_SLOTS] {
        self.lights.map(|color| lighten(self.brightness, color))
    }

    pub fn press(&mut self, button: Button, action: Option<&Action>, at: Timestamp) -> PressOutcome {
        interaction::press(&mut self.buttons[button.index()], action, at)
    }

    pub fn release(
        &mut self,
        button: Button,
        action: Option<&Action>,
        at: Timestamp,
    ) -> ReleaseOutcome {
        interaction::release(&mut self.buttons[button.index()], &mut self.flags, action, at)
    }

    /// Clear counters for `button` and remove the flag its action sets.
    pub fn reset(&mut self, button: Button, action: Option<&Action>) {
        interaction::reset(&mut self.buttons[button.index()], &mut self.flags, action);
    }

    /// Record a subscription owned by this actor.
    pub fn add_subscription(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Release every owned subscription, waiting for all of them.
    ///
    /// Consumes the actor; each handle is released exactly once. Returns the
    /// failures, if any, so the caller can report what may still be outstanding.
    pub async fn release_subscriptions(self, bus: &dyn Bus) -> Vec<BusError> {
        let releases = self
            .subscriptions
            .into_iter()
            .map(|subscription| bus.unsubscribe(subscription));
        join_all(releases)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{event_handler, memory::MemoryBus};

    fn actor() -> Actor {
        Actor::new(ActorId::new("42"))
    }

    #[test]
    fn new_actor_defaults() {
        let actor = actor();
        assert_eq!(actor.selected_light(), 0);
        assert_eq!(actor.brightness(), 0.1);
        assert_eq!(actor.lights(), &[Color::WHITE; 4]);
        assert!(actor.flags().is_empty());
        assert_eq!(actor.subscription_count(), 0);
        assert_eq!(actor.rendered_lights(), [Color(0x191919); 4]);
    }

    #[test]
    fn light_selection_wraps_both_ways() {
        let mut actor = actor();
        actor.select_prev_light();
        assert_eq!(actor.selected_light(), 3);
        for _ in 0..4 {
            actor.select_next_light();
        }
        assert_eq!(actor.selected_light(), 3);
        for _ in 0..4 {
            actor.select_prev_light();
        }
        assert_eq!(actor.selected_light(), 3);
    }

    #[test]
    fn brightness_saturates_at_bounds() {
        let mut actor = actor();
        for _ in 0..20 {
            actor.brighten();
        }
        assert_eq!(actor.brightness(), 1.0);
        for _ in 0..20 {
            actor.dim();
        }
        assert_eq!(actor.brightness(), 0.0);
        actor.dim();
        assert_eq!(actor.brightness(), 0.0);
    }

    #[test]
    fn color_changes_only_touch_selected_light() {
        let mut actor = actor();
        actor.select_next_light();
        actor.next_selected_color();
        assert_eq!(
            actor.lights(),
            &[Color::WHITE, Color::RED, Color::WHITE, Color::WHITE]
        );
        actor.next_selected_color();
        assert_eq!(actor.lights()[1], Color::ORANGE);
        actor.prev_selected_color();
        actor.prev_selected_color();
        assert_eq!(actor.lights()[1], Color::PURPLE);
    }

    #[tokio::test]
    async fn release_drops_every_subscription() {
        let bus = MemoryBus::new();
        let mut actor = actor();
        for topic in ["badge.42.button.press", "badge.42.button.release"] {
            let sub = bus
                .subscribe(topic, event_handler(|_| async {}))
                .await
                .unwrap();
            actor.add_subscription(sub);
        }
        assert_eq!(bus.total_subscriptions(), 2);

        let failures = actor.release_subscriptions(bus.as_ref()).await;
        assert!(failures.is_empty());
        assert_eq!(bus.total_subscriptions(), 0);
    }
}
