use thiserror::Error;

/// Lifecycle phases of the bus session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No transport; initial and terminal phase.
    Disconnected,
    /// Opening the WebSocket.
    Connecting,
    /// Answering the router's authentication challenge.
    Authenticating,
    /// Realm joined; population channels are being subscribed.
    Joined,
    /// Waiting for the directory service to accept the game.
    Registering,
    /// Processing events.
    Active,
}

impl SessionPhase {
    /// Lowercase name used in logs and the health payload.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Disconnected => "disconnected",
            SessionPhase::Connecting => "connecting",
            SessionPhase::Authenticating => "authenticating",
            SessionPhase::Joined => "joined",
            SessionPhase::Registering => "registering",
            SessionPhase::Active => "active",
        }
    }
}

/// Events that move the session between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Transport connection attempt started.
    Connect,
    /// Router sent an authentication challenge.
    Challenged,
    /// Router welcomed the session into the realm.
    Welcomed,
    /// Registration with the directory service started.
    RegistrationStarted,
    /// Registration finished, whether accepted or not.
    RegistrationFinished,
    /// Transport went away or the process is shutting down.
    Disconnected,
}

/// Error returned when an event does not apply to the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// The phase the session was in.
    pub from: SessionPhase,
    /// The rejected event.
    pub event: SessionEvent,
}

/// Pure transition table for the session lifecycle.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    phase: SessionPhase,
    version: usize,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Disconnected,
            version: 0,
        }
    }
}

impl SessionStateMachine {
    /// Create a state machine in the disconnected phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Apply `event`, returning the new phase.
    pub fn apply(&mut self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.phase = next;
        self.version += 1;
        Ok(next)
    }

    fn compute_transition(&self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (_, SessionEvent::Disconnected) => SessionPhase::Disconnected,
            (SessionPhase::Disconnected, SessionEvent::Connect) => SessionPhase::Connecting,
            (SessionPhase::Connecting, SessionEvent::Challenged) => SessionPhase::Authenticating,
            (SessionPhase::Connecting | SessionPhase::Authenticating, SessionEvent::Welcomed) => {
                SessionPhase::Joined
            }
            // Re-registration directives arrive while active.
            (SessionPhase::Joined | SessionPhase::Active, SessionEvent::RegistrationStarted) => {
                SessionPhase::Registering
            }
            (SessionPhase::Registering, SessionEvent::RegistrationFinished) => SessionPhase::Active,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut SessionStateMachine, event: SessionEvent) -> SessionPhase {
        sm.apply(event).unwrap()
    }

    #[test]
    fn initial_state_is_disconnected() {
        let sm = SessionStateMachine::new();
        assert_eq!(sm.phase(), SessionPhase::Disconnected);
        assert_eq!(sm.version(), 0);
    }

    #[test]
    fn full_happy_path_through_session() {
        let mut sm = SessionStateMachine::new();
        assert_eq!(apply(&mut sm, SessionEvent::Connect), SessionPhase::Connecting);
        assert_eq!(
            apply(&mut sm, SessionEvent::Challenged),
            SessionPhase::Authenticating
        );
        assert_eq!(apply(&mut sm, SessionEvent::Welcomed), SessionPhase::Joined);
        assert_eq!(
            apply(&mut sm, SessionEvent::RegistrationStarted),
            SessionPhase::Registering
        );
        assert_eq!(
            apply(&mut sm, SessionEvent::RegistrationFinished),
            SessionPhase::Active
        );
        assert_eq!(
            apply(&mut sm, SessionEvent::Disconnected),
            SessionPhase::Disconnected
        );
        assert_eq!(sm.version(), 6);
    }

    #[test]
    fn unauthenticated_routers_skip_challenge() {
        let mut sm = SessionStateMachine::new();
        apply(&mut sm, SessionEvent::Connect);
        assert_eq!(apply(&mut sm, SessionEvent::Welcomed), SessionPhase::Joined);
    }

    #[test]
    fn reregistration_from_active() {
        let mut sm = SessionStateMachine::new();
        for event in [
            SessionEvent::Connect,
            SessionEvent::Welcomed,
            SessionEvent::RegistrationStarted,
            SessionEvent::RegistrationFinished,
        ] {
            apply(&mut sm, event);
        }
        assert_eq!(
            apply(&mut sm, SessionEvent::RegistrationStarted),
            SessionPhase::Registering
        );
    }

    #[test]
    fn invalid_transition_returns_error() {
        let mut sm = SessionStateMachine::new();
        let err = sm.apply(SessionEvent::RegistrationStarted).unwrap_err();
        assert_eq!(err.from, SessionPhase::Disconnected);
        assert_eq!(err.event, SessionEvent::RegistrationStarted);
        assert_eq!(sm.version(), 0);
    }
}
