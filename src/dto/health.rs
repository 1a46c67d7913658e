use serde::Serialize;

use crate::state::session::SessionPhase;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: &'static str,
    /// Current session phase.
    pub phase: &'static str,
    /// Whether the game is registered with the directory service.
    pub registered: bool,
    /// Number of live players.
    pub players: usize,
}

impl HealthResponse {
    /// Build a response; anything short of an active session is reported as degraded.
    pub fn new(phase: SessionPhase, registered: bool, players: usize) -> Self {
        let status = if phase == SessionPhase::Active {
            "ok"
        } else {
            "degraded"
        };
        Self {
            status,
            phase: phase.as_str(),
            registered,
            players,
        }
    }
}
