//! Per-button hold/cooldown state machine.
//!
//! Each `(actor, button)` pair owns a [`ButtonTiming`]. A press either fires
//! straight away (zero-hold actions) or moves the button into
//! [`HoldPhase::Holding`]; the matching release decides between success and
//! failure from the badge-supplied timestamps and returns the button to idle.
//! Timers only drive visual feedback, see [`ProgressPlan`].

use std::time::Duration;

use indexmap::IndexSet;

use crate::state::station::Action;

/// Badge clock reading in milliseconds.
pub type Timestamp = u64;

/// Number of progress samples shown while a button is held.
pub const PROGRESS_TICKS: u32 = 5;

/// Number of light slots on a badge.
pub const LIGHT_SLOTS: usize = 4;

/// Whether a press is waiting for its release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HoldPhase {
    #[default]
    Idle,
    /// Identifies the press being held, so stale feedback loops can notice a newer press.
    Holding { press: u64 },
}

/// Timing and counters for one button of one actor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ButtonTiming {
    pub last_down: Option<Timestamp>,
    pub last_up: Option<Timestamp>,
    pub press_count: u32,
    pub phase: HoldPhase,
    presses: u64,
}

impl ButtonTiming {
    /// Whether `press` is still the hold in progress.
    pub fn is_holding(&self, press: u64) -> bool {
        self.phase == HoldPhase::Holding { press }
    }
}

/// Result of a press event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PressOutcome {
    /// No action configured; nothing changed.
    Ignored,
    /// Zero-hold action: emit the message and show success right away.
    Fired { message: String },
    /// Hold started; run the progress feedback for `press`.
    Holding { press: u64, plan: ProgressPlan },
}

/// Why a release did not count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Released before the required hold time.
    TooShort,
    /// Pressed again before the cooldown elapsed.
    CoolingDown,
}

/// Result of a release event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Nothing to evaluate: no action, zero-hold action, or no press pending.
    Ignored,
    Failed(FailureReason),
    Succeeded {
        press_count: u32,
        /// Message to emit externally, once past the message threshold.
        message: Option<String>,
        /// Whether the action's flag is now set on the actor.
        flagged: bool,
    },
}

/// Handle a press at `at`.
pub fn press(timing: &mut ButtonTiming, action: Option<&Action>, at: Timestamp) -> PressOutcome {
    let Some(action) = action else {
        return PressOutcome::Ignored;
    };

    timing.last_down = Some(at);
    if !action.requires_hold() {
        return PressOutcome::Fired {
            message: action.message.clone(),
        };
    }

    timing.presses += 1;
    let press = timing.presses;
    timing.phase = HoldPhase::Holding { press };
    PressOutcome::Holding {
        press,
        plan: ProgressPlan::for_hold(action.hold),
    }
}

/// Handle a release at `at`, updating counters and `flags` on success.
///
/// Thresholds compare with a strict "greater than": with `message_after = 1`
/// the message goes out on the second successful press, not the first.
pub fn release(
    timing: &mut ButtonTiming,
    flags: &mut IndexSet<String>,
    action: Option<&Action>,
    at: Timestamp,
) -> ReleaseOutcome {
    let Some(action) = action.filter(|action| action.requires_hold()) else {
        return ReleaseOutcome::Ignored;
    };
    let (HoldPhase::Holding { .. }, Some(down)) = (timing.phase, timing.last_down) else {
        return ReleaseOutcome::Ignored;
    };

    let held = Duration::from_millis(at.saturating_sub(down));
    // An absent previous release means the cooldown has never started.
    let since_last_release = timing
        .last_up
        .map(|up| Duration::from_millis(down.saturating_sub(up)));
    timing.last_up = Some(at);
    timing.phase = HoldPhase::Idle;

    if held <= action.hold {
        return ReleaseOutcome::Failed(FailureReason::TooShort);
    }
    if since_last_release.is_some_and(|since| since <= action.cooldown) {
        return ReleaseOutcome::Failed(FailureReason::CoolingDown);
    }

    timing.press_count += 1;
    let message = (timing.press_count > action.message_after).then(|| action.message.clone());
    let flagged = timing.press_count > action.flag_after;
    if flagged {
        flags.insert(action.message.clone());
    }

    ReleaseOutcome::Succeeded {
        press_count: timing.press_count,
        message,
        flagged,
    }
}

/// Re-arm a button: clear its counters and timestamps and drop the action's flag.
///
/// Flags are matched by message text, so actions sharing a message share a flag.
pub fn reset(timing: &mut ButtonTiming, flags: &mut IndexSet<String>, action: Option<&Action>) {
    let presses = timing.presses;
    *timing = ButtonTiming {
        presses,
        ..ButtonTiming::default()
    };
    if let Some(action) = action {
        flags.shift_remove(&action.message);
    }
}

/// Timer schedule for the progress feedback shown while a button is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressPlan {
    pub ticks: u32,
    pub tick: Duration,
    pub hold: Duration,
}

/// What the feedback loop should show at a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickVerdict {
    /// Show `lit` slots in the progress color.
    Progress { lit: usize },
    /// Sampling fell behind the hold window; show failure and stop.
    Overrun,
}

impl ProgressPlan {
    /// Spread [`PROGRESS_TICKS`] samples evenly over `hold`.
    pub fn for_hold(hold: Duration) -> Self {
        Self {
            ticks: PROGRESS_TICKS,
            tick: hold / PROGRESS_TICKS,
            hold,
        }
    }

    /// Decide what tick `tick` (1-based) shows, `elapsed` after the press was received.
    pub fn verdict(&self, tick: u32, elapsed: Duration) -> TickVerdict {
        if tick < self.ticks && elapsed > self.hold {
            return TickVerdict::Overrun;
        }
        let lit = (LIGHT_SLOTS * tick as usize).div_ceil(self.ticks as usize);
        TickVerdict::Progress {
            lit: lit.min(LIGHT_SLOTS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held(hold_ms: u64, cooldown_ms: u64) -> Action {
        Action {
            message: "flag{hold}".into(),
            flag_after: 2,
            message_after: 1,
            cooldown: Duration::from_millis(cooldown_ms),
            hold: Duration::from_millis(hold_ms),
        }
    }

    fn cycle(
        timing: &mut ButtonTiming,
        flags: &mut IndexSet<String>,
        action: &Action,
        down: Timestamp,
        up: Timestamp,
    ) -> ReleaseOutcome {
        press(timing, Some(action), down);
        release(timing, flags, Some(action), up)
    }

    #[test]
    fn zero_hold_fires_on_press() {
        let mut timing = ButtonTiming::default();
        let outcome = press(&mut timing, Some(&Action::instant("hi")), 42);
        assert_eq!(
            outcome,
            PressOutcome::Fired {
                message: "hi".into()
            }
        );
        assert_eq!(timing.last_down, Some(42));
        assert_eq!(timing.phase, HoldPhase::Idle);
    }

    #[test]
    fn zero_hold_release_is_ignored() {
        let mut timing = ButtonTiming::default();
        let mut flags = IndexSet::new();
        let action = Action::instant("hi");
        assert_eq!(
            release(&mut timing, &mut flags, Some(&action), 10),
            ReleaseOutcome::Ignored
        );
        press(&mut timing, Some(&action), 20);
        assert_eq!(
            release(&mut timing, &mut flags, Some(&action), 30),
            ReleaseOutcome::Ignored
        );
        assert_eq!(timing.press_count, 0);
    }

    #[test]
    fn unconfigured_button_is_ignored() {
        let mut timing = ButtonTiming::default();
        assert_eq!(press(&mut timing, None, 5), PressOutcome::Ignored);
        assert_eq!(timing, ButtonTiming::default());
    }

    #[test]
    fn hold_longer_than_required_counts() {
        let mut timing = ButtonTiming::default();
        let mut flags = IndexSet::new();
        let action = held(800, 0);

        let outcome = press(&mut timing, Some(&action), 0);
        assert!(matches!(outcome, PressOutcome::Holding { .. }));
        assert_eq!(
            release(&mut timing, &mut flags, Some(&action), 900),
            ReleaseOutcome::Succeeded {
                press_count: 1,
                message: None,
                flagged: false,
            }
        );
        assert_eq!(timing.press_count, 1);
        assert_eq!(timing.last_up, Some(900));
        assert_eq!(timing.phase, HoldPhase::Idle);
    }

    #[test]
    fn short_hold_fails_without_counting() {
        let mut timing = ButtonTiming::default();
        let mut flags = IndexSet::new();
        let action = held(800, 0);
        assert_eq!(
            cycle(&mut timing, &mut flags, &action, 0, 500),
            ReleaseOutcome::Failed(FailureReason::TooShort)
        );
        assert_eq!(timing.press_count, 0);
    }

    #[test]
    fn hold_of_exactly_required_time_fails() {
        let mut timing = ButtonTiming::default();
        let mut flags = IndexSet::new();
        assert_eq!(
            cycle(&mut timing, &mut flags, &held(800, 0), 100, 900),
            ReleaseOutcome::Failed(FailureReason::TooShort)
        );
    }

    #[test]
    fn cooldown_blocks_quick_repeat() {
        let mut timing = ButtonTiming::default();
        let mut flags = IndexSet::new();
        let action = held(100, 1_000);

        assert!(matches!(
            cycle(&mut timing, &mut flags, &action, 0, 200),
            ReleaseOutcome::Succeeded { .. }
        ));
        assert_eq!(
            cycle(&mut timing, &mut flags, &action, 700, 900),
            ReleaseOutcome::Failed(FailureReason::CoolingDown)
        );
        // Measured from the previous release, 900 -> 2000.
        assert!(matches!(
            cycle(&mut timing, &mut flags, &action, 2_000, 2_200),
            ReleaseOutcome::Succeeded { press_count: 2, .. }
        ));
    }

    #[test]
    fn thresholds_need_one_more_press_than_configured() {
        let mut timing = ButtonTiming::default();
        let mut flags = IndexSet::new();
        let action = held(100, 0);

        let first = cycle(&mut timing, &mut flags, &action, 0, 200);
        assert_eq!(
            first,
            ReleaseOutcome::Succeeded {
                press_count: 1,
                message: None,
                flagged: false
            }
        );

        let second = cycle(&mut timing, &mut flags, &action, 300, 500);
        assert_eq!(
            second,
            ReleaseOutcome::Succeeded {
                press_count: 2,
                message: Some("flag{hold}".into()),
                flagged: false
            }
        );
        assert!(flags.is_empty());

        let third = cycle(&mut timing, &mut flags, &action, 600, 800);
        assert!(matches!(
            third,
            ReleaseOutcome::Succeeded {
                press_count: 3,
                flagged: true,
                ..
            }
        ));
        assert!(flags.contains("flag{hold}"));
    }

    #[test]
    fn duplicate_release_is_ignored() {
        let mut timing = ButtonTiming::default();
        let mut flags = IndexSet::new();
        let action = held(100, 0);
        cycle(&mut timing, &mut flags, &action, 0, 200);
        assert_eq!(
            release(&mut timing, &mut flags, Some(&action), 400),
            ReleaseOutcome::Ignored
        );
        assert_eq!(timing.press_count, 1);
    }

    #[test]
    fn reset_clears_counters_and_flag() {
        let mut timing = ButtonTiming::default();
        let mut flags = IndexSet::new();
        let mut action = held(100, 0);
        action.flag_after = 0;
        cycle(&mut timing, &mut flags, &action, 0, 200);
        flags.insert("other".to_string());

        reset(&mut timing, &mut flags, Some(&action));
        assert_eq!(timing.press_count, 0);
        assert_eq!(timing.last_down, None);
        assert_eq!(timing.last_up, None);
        assert_eq!(flags.iter().collect::<Vec<_>>(), vec!["other"]);

        // A fresh press after reset is a new hold, not a replay of an old one.
        match press(&mut timing, Some(&action), 300) {
            PressOutcome::Holding { press, .. } => assert_eq!(press, 2),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn newer_press_supersedes_older_hold() {
        let mut timing = ButtonTiming::default();
        let action = held(800, 0);
        let PressOutcome::Holding { press: first, .. } = press(&mut timing, Some(&action), 0)
        else {
            panic!("expected hold");
        };
        let PressOutcome::Holding { press: second, .. } = press(&mut timing, Some(&action), 50)
        else {
            panic!("expected hold");
        };
        assert!(!timing.is_holding(first));
        assert!(timing.is_holding(second));
    }

    #[test]
    fn progress_lights_fill_up() {
        let plan = ProgressPlan::for_hold(Duration::from_millis(1_000));
        assert_eq!(plan.tick, Duration::from_millis(200));
        let lit: Vec<TickVerdict> = (1..=PROGRESS_TICKS)
            .map(|tick| plan.verdict(tick, Duration::from_millis(200 * tick as u64)))
            .collect();
        assert_eq!(
            lit,
            [1, 2, 3, 4, 4]
                .into_iter()
                .map(|lit| TickVerdict::Progress { lit })
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn lagging_sampler_reports_overrun() {
        let plan = ProgressPlan::for_hold(Duration::from_millis(1_000));
        assert_eq!(
            plan.verdict(2, Duration::from_millis(1_500)),
            TickVerdict::Overrun
        );
        assert_eq!(
            plan.verdict(PROGRESS_TICKS, Duration::from_millis(1_050)),
            TickVerdict::Progress { lit: 4 }
        );
    }
}
